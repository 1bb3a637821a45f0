//! Public API for the simulation.
//!
//! `SimWorld` is the interface a host application (network layer, viewer,
//! test harness) uses to drive entities, feed remote updates in and collect
//! outgoing ones.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 30 Hz). When `step(dt)` is called,
//! the simulation accumulates time and runs fixed updates as needed. This ensures deterministic
//! behavior regardless of frame rate.

use crate::clamp::{GroundClampConfig, SurfaceClamper};
use crate::components::*;
use crate::config::SimConfig;
use crate::dead_reckoning::{DeadReckoningAlgorithm, DeadReckoningRecord, RemoteUpdate};
use crate::error::SimError;
use crate::surface::{GroundQuery, SurfaceSampler, WaterQuery};
use crate::systems::*;
use crate::terrain::TerrainGrid;
use crate::update::{UpdateDecisionEngine, UpdateThresholds};
use crate::world::Snapshot;
use bevy_ecs::prelude::*;
use glam::Vec3;
use std::collections::HashMap;

/// The main simulation world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Spawning local and remote entities
/// - Stepping the simulation forward
/// - Receiving and publishing state updates
/// - Extracting state snapshots
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    /// Lookup from network ids to ECS entities.
    entities: HashMap<EntityId, Entity>,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
    fixed_timestep: f32,
    default_thresholds: UpdateThresholds,
}

impl SimWorld {
    /// Create a new empty simulation world.
    pub fn new() -> Self {
        Self::build(SimConfig::default())
    }

    /// Create a new simulation world with custom configuration.
    pub fn with_config(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimConfig) -> Self {
        let mut world = World::new();

        let mut clamper = SurfaceClamper::new(SurfaceSampler::with_probe_length(config.probe_length));
        clamper.set_eye_point(config.eye_point);

        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SimClock::default());
        world.insert_resource(UpdateOutbox::default());
        world.insert_resource(clamper);

        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                movement_system,
                remote_dead_reckoning_system,
                ground_clamp_system,
                update_decision_system,
            )
                .chain(),
        );

        let fixed_timestep = config.fixed_timestep;
        let default_thresholds = config.default_thresholds;
        world.insert_resource(config);

        Self {
            world,
            schedule,
            entities: HashMap::new(),
            time_accumulator: 0.0,
            fixed_timestep,
            default_thresholds,
        }
    }

    /// Step the simulation forward by `dt` seconds.
    ///
    /// Uses fixed timestep internally - accumulates time and runs fixed updates
    /// as needed.
    pub fn step(&mut self, dt: f32) {
        self.time_accumulator += dt.max(0.0);

        while self.time_accumulator >= self.fixed_timestep {
            self.fixed_update(self.fixed_timestep);
            self.time_accumulator -= self.fixed_timestep;
        }
    }

    /// Run a single fixed timestep update.
    fn fixed_update(&mut self, dt: f32) {
        if let Some(mut dt_res) = self.world.get_resource_mut::<DeltaTime>() {
            dt_res.0 = dt;
        }
        if let Some(mut clock) = self.world.get_resource_mut::<SimClock>() {
            clock.advance(dt);
        }
        if let Some(mut clamper) = self.world.get_resource_mut::<SurfaceClamper>() {
            clamper.sampler_mut().advance(dt);
        }

        self.schedule.run(&mut self.world);
    }

    /// Add an entity. Local entities get an update-decision engine; entities
    /// with a clamp configuration are clamped every tick.
    pub fn spawn_entity(&mut self, desc: EntityDesc) -> Result<Entity, SimError> {
        if self.entities.contains_key(&desc.id) {
            return Err(SimError::DuplicateEntity(desc.id));
        }

        let mut bundle = EntityBundle::new(desc.id, desc.domain, desc.ownership, desc.transform);
        bundle.motion = desc.motion;
        bundle.record.velocity = desc.motion.velocity;
        bundle.record.angular_velocity = desc.motion.angular_velocity;
        bundle.record.acceleration = desc.motion.acceleration;
        bundle.record.set_algorithm(desc.algorithm);

        let engine = (desc.ownership == Ownership::Local).then(|| desc.update_engine(self.default_thresholds));

        let mut entity = self.world.spawn(bundle);
        if let Some(engine) = engine {
            entity.insert(engine);
        }
        if let Some(clamp) = desc.clamp {
            entity.insert(clamp);
        }
        let entity = entity.id();

        log::debug!("spawned {:?} ({:?}, {:?})", desc.id, desc.domain, desc.ownership);
        self.entities.insert(desc.id, entity);
        Ok(entity)
    }

    /// Remove an entity together with its clamp runtime data.
    pub fn despawn_entity(&mut self, id: EntityId) -> Result<(), SimError> {
        let entity = self.entities.remove(&id).ok_or(SimError::UnknownEntity(id))?;
        self.world.despawn(entity);
        if let Some(mut clamper) = self.world.get_resource_mut::<SurfaceClamper>() {
            clamper.remove_entity(id);
        }
        Ok(())
    }

    fn lookup(&self, id: EntityId) -> Result<Entity, SimError> {
        self.entities.get(&id).copied().ok_or(SimError::UnknownEntity(id))
    }

    fn component_mut<T: Component>(&mut self, id: EntityId) -> Result<Mut<'_, T>, SimError> {
        let entity = self.lookup(id)?;
        self.world.get_mut::<T>(entity).ok_or(SimError::UnknownEntity(id))
    }

    /// Apply a state update received for a remote entity. The entity jumps to
    /// the received pose and is extrapolated from there.
    pub fn receive_update(&mut self, id: EntityId, update: &RemoteUpdate) -> Result<(), SimError> {
        if *self.component_mut::<Ownership>(id)? != Ownership::Remote {
            return Err(SimError::NotRemote(id));
        }
        self.component_mut::<DeadReckoningRecord>(id)?.apply_remote_update(update);
        *self.component_mut::<Transform>(id)? = Transform::new(update.translation, update.rotation);
        Ok(())
    }

    pub fn set_dead_reckoning_algorithm(
        &mut self,
        id: EntityId,
        algorithm: DeadReckoningAlgorithm,
    ) -> Result<(), SimError> {
        self.component_mut::<DeadReckoningRecord>(id)?.set_algorithm(algorithm);
        Ok(())
    }

    /// Replace the motion driving a local entity.
    pub fn set_motion(&mut self, id: EntityId, motion: Motion) -> Result<(), SimError> {
        *self.component_mut::<Motion>(id)? = motion;
        Ok(())
    }

    pub fn set_transform(&mut self, id: EntityId, transform: Transform) -> Result<(), SimError> {
        *self.component_mut::<Transform>(id)? = transform;
        Ok(())
    }

    pub fn set_clamp_config(&mut self, id: EntityId, config: GroundClampConfig) -> Result<(), SimError> {
        let entity = self.lookup(id)?;
        self.world.entity_mut(entity).insert(config);
        Ok(())
    }

    pub fn set_thresholds(&mut self, id: EntityId, thresholds: UpdateThresholds) -> Result<(), SimError> {
        self.component_mut::<UpdateDecisionEngine>(id)?.set_thresholds(thresholds);
        Ok(())
    }

    /// Replace all ground sources with a single terrain grid.
    pub fn set_terrain(&mut self, terrain: TerrainGrid) {
        self.with_sampler(|sampler| sampler.set_ground(Box::new(terrain)));
    }

    /// Stack another ground source on top of the existing ones.
    pub fn add_ground(&mut self, ground: Box<dyn GroundQuery>) {
        self.with_sampler(|sampler| sampler.add_ground(ground));
    }

    pub fn set_water(&mut self, water: Option<Box<dyn WaterQuery>>) {
        self.with_sampler(|sampler| sampler.set_water(water));
    }

    fn with_sampler(&mut self, f: impl FnOnce(&mut SurfaceSampler)) {
        if let Some(mut clamper) = self.world.get_resource_mut::<SurfaceClamper>() {
            f(clamper.sampler_mut());
        }
    }

    /// Observer position for high-res and ranged clamping.
    pub fn set_eye_point(&mut self, eye: Option<Vec3>) {
        if let Some(mut clamper) = self.world.get_resource_mut::<SurfaceClamper>() {
            clamper.set_eye_point(eye);
        }
    }

    pub fn entity_transform(&self, id: EntityId) -> Option<Transform> {
        let entity = self.entities.get(&id)?;
        self.world.get::<Transform>(*entity).copied()
    }

    /// Pose to render: the transform plus any buoyancy bob.
    pub fn drawn_transform(&self, id: EntityId) -> Option<Transform> {
        let entity = *self.entities.get(&id)?;
        let transform = self.world.get::<Transform>(entity)?;
        let bob = self.world.get::<BuoyancyOffset>(entity).copied().unwrap_or_default();
        Some(bob.drawn(transform))
    }

    pub fn entity_record(&self, id: EntityId) -> Option<&DeadReckoningRecord> {
        let entity = self.entities.get(&id)?;
        self.world.get::<DeadReckoningRecord>(*entity)
    }

    pub fn update_engine(&self, id: EntityId) -> Option<&UpdateDecisionEngine> {
        let entity = self.entities.get(&id)?;
        self.world.get::<UpdateDecisionEngine>(*entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Take every update published since the last call.
    pub fn drain_published_updates(&mut self) -> Vec<PublishedUpdate> {
        self.world
            .get_resource_mut::<UpdateOutbox>()
            .map(|mut outbox| outbox.drain())
            .unwrap_or_default()
    }

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&mut self) -> Snapshot {
        let (tick, time) = (self.current_tick(), self.current_time());
        Snapshot::from_world(&mut self.world, tick, time)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> Result<String, SimError> {
        Ok(self.snapshot().to_json()?)
    }

    /// Get the current tick number.
    pub fn current_tick(&self) -> u64 {
        self.world.get_resource::<SimClock>().map_or(0, |clock| clock.tick)
    }

    /// Get the elapsed simulation time.
    pub fn current_time(&self) -> f64 {
        self.world.get_resource::<SimClock>().map_or(0.0, |clock| clock.time)
    }

    pub fn clamper(&self) -> Option<&SurfaceClamper> {
        self.world.get_resource::<SurfaceClamper>()
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clamp::ClampType;
    use crate::surface::FlatWater;
    use crate::update::UpdateKind;
    use approx::assert_abs_diff_eq;

    fn flat_terrain(height: f32) -> TerrainGrid {
        let mut grid = TerrainGrid::new(50, 50, 4.0).with_origin(-100.0, -100.0);
        grid.fill_height(height);
        grid
    }

    #[test]
    fn test_new_world() {
        let sim = SimWorld::new();
        assert_eq!(sim.current_tick(), 0);
        assert_eq!(sim.entity_count(), 0);
    }

    #[test]
    fn test_step_advances_tick() {
        let config = SimConfig { fixed_timestep: 0.05, ..Default::default() };
        let mut sim = SimWorld::with_config(config).unwrap();
        sim.step(0.05);
        assert_eq!(sim.current_tick(), 1);
        sim.step(0.02);
        assert_eq!(sim.current_tick(), 1);
        sim.step(0.1);
        assert!(sim.current_tick() >= 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimConfig { fixed_timestep: -1.0, ..Default::default() };
        assert!(matches!(SimWorld::with_config(config), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_and_unknown_entities() {
        let mut sim = SimWorld::new();
        sim.spawn_entity(EntityDesc::local(1, Domain::Ground, Vec3::ZERO)).unwrap();
        let again = sim.spawn_entity(EntityDesc::local(1, Domain::Air, Vec3::ZERO));
        assert!(matches!(again, Err(SimError::DuplicateEntity(EntityId(1)))));
        assert!(matches!(sim.despawn_entity(EntityId(9)), Err(SimError::UnknownEntity(_))));
        assert!(sim.entity_transform(EntityId(9)).is_none());
    }

    #[test]
    fn test_clamped_entity_publishes_ground_height() {
        let mut sim = SimWorld::new();
        sim.set_terrain(flat_terrain(2.0));
        let thresholds = UpdateThresholds { max_translation_error: 1.0, ..Default::default() };
        sim.spawn_entity(
            EntityDesc::local(1, Domain::Ground, Vec3::new(0.0, 0.0, 10.0))
                .with_clamp(GroundClampConfig::default())
                .with_thresholds(thresholds),
        )
        .unwrap();

        sim.step(0.5);

        let transform = sim.entity_transform(EntityId(1)).unwrap();
        assert_abs_diff_eq!(transform.translation.z, 2.0);

        let updates = sim.drain_published_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, UpdateKind::Full);
        assert_abs_diff_eq!(updates[0].translation.z, 2.0);

        let record = sim.entity_record(EntityId(1)).unwrap();
        assert_abs_diff_eq!(record.last_known_translation().z, 2.0);
        assert!(sim.drain_published_updates().is_empty());
    }

    #[test]
    fn test_remote_entity_is_extrapolated_and_clamped() {
        let config = SimConfig { fixed_timestep: 0.1, ..Default::default() };
        let mut sim = SimWorld::with_config(config).unwrap();
        sim.set_terrain(flat_terrain(1.0));
        sim.spawn_entity(
            EntityDesc::remote(2, Domain::Ground, Vec3::ZERO).with_clamp(GroundClampConfig::default()),
        )
        .unwrap();

        sim.receive_update(
            EntityId(2),
            &RemoteUpdate {
                translation: Vec3::new(0.0, 0.0, 5.0),
                velocity: Vec3::new(4.0, 0.0, 0.0),
                ..Default::default()
            },
        )
        .unwrap();
        sim.step(0.5);

        let transform = sim.entity_transform(EntityId(2)).unwrap();
        assert!(transform.translation.x > 1.5);
        assert_abs_diff_eq!(transform.translation.z, 1.0);

        // Clamping only touches the drawn pose.
        let record = sim.entity_record(EntityId(2)).unwrap();
        assert_abs_diff_eq!(record.last_known_translation().z, 5.0);
        assert!(sim.update_engine(EntityId(2)).is_none());
        assert!(sim.drain_published_updates().is_empty());
    }

    #[test]
    fn test_receive_update_rejects_local() {
        let mut sim = SimWorld::new();
        sim.spawn_entity(EntityDesc::local(3, Domain::Ground, Vec3::ZERO)).unwrap();
        let result = sim.receive_update(EntityId(3), &RemoteUpdate::default());
        assert!(matches!(result, Err(SimError::NotRemote(EntityId(3)))));
    }

    #[test]
    fn test_surface_vessel_floats_on_water() {
        let mut sim = SimWorld::new();
        sim.set_water(Some(Box::new(FlatWater::new(0.5))));
        sim.spawn_entity(
            EntityDesc::local(4, Domain::Surface, Vec3::new(10.0, 0.0, 3.0)).with_clamp(GroundClampConfig::default()),
        )
        .unwrap();
        sim.step(0.2);
        let transform = sim.entity_transform(EntityId(4)).unwrap();
        assert_abs_diff_eq!(transform.translation.z, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_floating_vessel_never_publishes_bob() {
        let mut sim = SimWorld::new();
        sim.set_water(Some(Box::new(FlatWater::new(0.0))));
        let thresholds = UpdateThresholds { max_translation_error: 0.01, ..Default::default() };
        sim.spawn_entity(
            EntityDesc::local(4, Domain::Surface, Vec3::ZERO)
                .with_clamp(GroundClampConfig::default())
                .with_thresholds(thresholds),
        )
        .unwrap();
        sim.step(0.5);
        sim.set_water(Some(Box::new(FlatWater::new(1.0))));

        let mut max_published = f32::MIN;
        let mut max_known = f32::MIN;
        let mut max_drawn = f32::MIN;
        for _ in 0..90 {
            sim.step(1.0 / 30.0);
            for update in sim.drain_published_updates() {
                max_published = max_published.max(update.translation.z);
            }
            let record = sim.entity_record(EntityId(4)).unwrap();
            max_known = max_known.max(record.last_known_translation().z);
            max_drawn = max_drawn.max(sim.drawn_transform(EntityId(4)).unwrap().translation.z);
        }
        assert_abs_diff_eq!(max_published, 1.0, epsilon = 1e-5);
        assert!(max_known <= 1.0 + 1e-5, "last known z = {}", max_known);
        assert!(max_drawn > 1.0, "drawn pose never bobbed");
    }

    #[test]
    fn test_idle_keep_above_entity_hovers() {
        let mut sim = SimWorld::new();
        sim.set_terrain(flat_terrain(0.0));
        sim.spawn_entity(
            EntityDesc::local(8, Domain::Air, Vec3::new(0.0, 0.0, 50.0))
                .with_clamp(GroundClampConfig::with_type(ClampType::KeepAbove)),
        )
        .unwrap();
        for _ in 0..60 {
            sim.step(1.0 / 30.0);
            assert_eq!(sim.entity_transform(EntityId(8)).unwrap().translation.z, 50.0);
        }
    }

    #[test]
    fn test_idle_entity_moved_off_terrain_keeps_height() {
        let mut sim = SimWorld::new();
        let mut grid = TerrainGrid::new(10, 10, 1.0);
        grid.fill_height(2.0);
        sim.set_terrain(grid);
        sim.spawn_entity(
            EntityDesc::local(9, Domain::Ground, Vec3::new(0.0, 0.0, 10.0)).with_clamp(GroundClampConfig::default()),
        )
        .unwrap();
        sim.step(0.2);
        assert_abs_diff_eq!(sim.entity_transform(EntityId(9)).unwrap().translation.z, 2.0);

        let off_terrain = Transform::from_translation(Vec3::new(500.0, 500.0, 40.0));
        sim.set_transform(EntityId(9), off_terrain).unwrap();
        for _ in 0..30 {
            sim.step(1.0 / 30.0);
            assert_eq!(sim.entity_transform(EntityId(9)), Some(off_terrain));
        }
    }

    #[test]
    fn test_despawn_drops_clamp_data() {
        let mut sim = SimWorld::new();
        sim.set_terrain(flat_terrain(0.0));
        sim.spawn_entity(EntityDesc::local(5, Domain::Ground, Vec3::Z).with_clamp(GroundClampConfig::default()))
            .unwrap();
        sim.step(0.1);
        assert_eq!(sim.clamper().map(SurfaceClamper::runtime_count), Some(1));

        sim.despawn_entity(EntityId(5)).unwrap();
        assert_eq!(sim.clamper().map(SurfaceClamper::runtime_count), Some(0));
        assert_eq!(sim.entity_count(), 0);
    }

    #[test]
    fn test_snapshot_json() {
        let mut sim = SimWorld::new();
        sim.spawn_entity(EntityDesc::remote(6, Domain::Air, Vec3::new(0.0, 0.0, 100.0))).unwrap();
        sim.step(0.1);
        let json = sim.snapshot_json().unwrap();
        assert!(json.contains("\"entities\""));
        assert!(json.contains("Air"));
        assert_eq!(sim.snapshot().entities.len(), 1);
    }
}
