//! Publish system - decides when local entities send state updates.

use crate::components::*;
use crate::dead_reckoning::DeadReckoningRecord;
use crate::systems::movement::{DeltaTime, SimClock};
use crate::update::{PublishedProperty, UpdateDecisionEngine, UpdateKind};
use bevy_ecs::prelude::*;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// State update handed to the network publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedUpdate {
    pub entity: EntityId,
    pub kind: UpdateKind,
    pub properties: Vec<PublishedProperty>,
    pub translation: Vec3,
    pub rotation: Vec3,
    pub velocity: Vec3,
    /// Simulation time of the publish.
    pub time: f64,
}

/// Updates waiting to be drained by the publisher.
#[derive(Resource, Debug, Default)]
pub struct UpdateOutbox(pub Vec<PublishedUpdate>);

impl UpdateOutbox {
    pub fn drain(&mut self) -> Vec<PublishedUpdate> {
        std::mem::take(&mut self.0)
    }
}

/// System that runs the update-decision engine of every local entity.
///
/// Runs after clamping, so published positions are already on the ground.
///
/// ## Data Access
/// - Reads: DeltaTime, SimClock, EntityId, Ownership, Transform, Motion
/// - Writes: DeadReckoningRecord, UpdateDecisionEngine, UpdateOutbox
pub fn update_decision_system(
    dt: Res<DeltaTime>,
    clock: Res<SimClock>,
    mut outbox: ResMut<UpdateOutbox>,
    mut query: Query<(
        &EntityId,
        &Ownership,
        &Transform,
        &Motion,
        &mut DeadReckoningRecord,
        &mut UpdateDecisionEngine,
    )>,
) {
    for (id, ownership, transform, motion, mut record, mut engine) in query.iter_mut() {
        if *ownership != Ownership::Local {
            continue;
        }
        let (decision, published) = engine.evaluate(dt.0, transform, motion.velocity, &mut record);
        if let Some(state) = published {
            outbox.0.push(PublishedUpdate {
                entity: *id,
                kind: decision.kind(),
                properties: engine.properties_to_publish().to_vec(),
                translation: state.translation,
                rotation: state.rotation,
                velocity: state.velocity,
                time: clock.time,
            });
        }
    }
}
