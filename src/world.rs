//! Snapshot types.
//!
//! The `Snapshot` struct provides a serializable view of the simulation state
//! for visualization, logging and replay tooling.

use crate::components::*;
use crate::dead_reckoning::{DeadReckoningAlgorithm, DeadReckoningRecord};
use crate::update::{UpdateDecisionEngine, UpdateKind};
use bevy_ecs::prelude::*;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Snapshot of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: u32,
    pub domain: Domain,
    pub ownership: Ownership,
    pub translation: Vec3,
    pub rotation: Vec3,
    /// Buoyancy bob to add to `translation.z` when drawing.
    pub bob_offset: f32,
    pub velocity: Vec3,
    pub last_known_translation: Vec3,
    pub last_known_rotation: Vec3,
    pub algorithm: DeadReckoningAlgorithm,
    pub time_since_update: f32,
    pub update_count: u64,
    /// Last publish decision; only local entities have one.
    pub update_due: Option<UpdateKind>,
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f64,
    /// All entities, ordered by id.
    pub entities: Vec<EntitySnapshot>,
}

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, tick: u64, time: f64) -> Self {
        let mut query = world.query::<(
            &EntityId,
            &Domain,
            &Ownership,
            &Transform,
            &Motion,
            &DeadReckoningRecord,
            Option<&UpdateDecisionEngine>,
            Option<&BuoyancyOffset>,
        )>();

        let mut entities: Vec<EntitySnapshot> = query
            .iter(world)
            .map(|(id, domain, ownership, transform, motion, record, engine, bob)| {
                let velocity = match ownership {
                    Ownership::Local => motion.velocity,
                    Ownership::Remote => record.velocity,
                };
                EntitySnapshot {
                    id: id.0,
                    domain: *domain,
                    ownership: *ownership,
                    translation: transform.translation,
                    rotation: transform.rotation,
                    bob_offset: bob.map_or(0.0, |bob| bob.0),
                    velocity,
                    last_known_translation: record.last_known_translation(),
                    last_known_rotation: record.last_known_rotation(),
                    algorithm: record.algorithm(),
                    time_since_update: record.time_since_update(),
                    update_count: record.update_count(),
                    update_due: engine.map(UpdateDecisionEngine::is_update_due),
                }
            })
            .collect();
        entities.sort_by_key(|e| e.id);

        Self { tick, time, entities }
    }

    pub fn entity(&self, id: u32) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_orders_entities() {
        let mut world = World::new();
        for id in [7, 2, 5] {
            world.spawn(EntityBundle::new(
                EntityId(id),
                Domain::Ground,
                Ownership::Remote,
                Transform::from_translation(Vec3::new(id as f32, 0.0, 0.0)),
            ));
        }
        let snapshot = Snapshot::from_world(&mut world, 3, 0.1);
        let ids: Vec<u32> = snapshot.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 5, 7]);
        assert_eq!(snapshot.entity(5).map(|e| e.translation.x), Some(5.0));
        assert!(snapshot.entity(5).and_then(|e| e.update_due).is_none());
    }

    #[test]
    fn test_snapshot_json() {
        let mut world = World::new();
        world.spawn(EntityBundle::new(EntityId(1), Domain::Surface, Ownership::Local, Transform::default()));
        let json = Snapshot::from_world(&mut world, 0, 0.0).to_json().unwrap();
        assert!(json.contains("\"entities\""));
        assert!(json.contains("Surface"));
    }
}
