//! SimCore dead reckoning - networked entity motion core
//!
//! Decides when locally owned entities publish state updates, extrapolates
//! remotely owned entities between updates, and clamps both onto terrain and
//! water surfaces with optional buoyancy. Runs as a fixed-timestep ECS
//! simulation built on `bevy_ecs`.

pub mod api;
pub mod buoyancy;
pub mod clamp;
pub mod components;
pub mod config;
pub mod dead_reckoning;
pub mod error;
pub mod surface;
pub mod systems;
pub mod terrain;
pub mod update;
pub mod world;

pub use api::SimWorld;
pub use buoyancy::BuoyancyConfig;
pub use clamp::{ClampType, GroundClampConfig, SurfaceClamper};
pub use components::*;
pub use config::SimConfig;
pub use dead_reckoning::{DeadReckoningAlgorithm, DeadReckoningRecord, RemoteUpdate};
pub use error::SimError;
pub use surface::{FlatWater, GroundQuery, OceanSurface, SurfaceHit, SurfaceSampler, WaterQuery, Wave};
pub use systems::*;
pub use terrain::TerrainGrid;
pub use update::{UpdateDecision, UpdateDecisionEngine, UpdateKind, UpdateThresholds};
pub use world::{EntitySnapshot, Snapshot};
