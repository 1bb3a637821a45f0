//! Errors returned by the simulation API.

use crate::components::EntityId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown entity {0:?}")]
    UnknownEntity(EntityId),
    #[error("entity {0:?} already exists")]
    DuplicateEntity(EntityId),
    #[error("entity {0:?} is not remotely owned")]
    NotRemote(EntityId),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
