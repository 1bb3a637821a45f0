//! Ground clamp system - runs the surface clamper over every clamped entity.
//!
//! All requests for a tick go through [`SurfaceClamper::clamp_batch`], so with
//! `--features parallel` the surface queries are spread across threads while
//! the per-entity runtime data is still updated on one thread.

use crate::clamp::{get_best_clamp_type, ClampRequest, GroundClampConfig, SurfaceClamper};
use crate::components::*;
use crate::dead_reckoning::DeadReckoningRecord;
use crate::systems::movement::SimClock;
use bevy_ecs::prelude::*;

/// System that clamps local and remote entities onto terrain or water.
///
/// ## Data Access
/// - Reads: SimClock, EntityId, Domain, Ownership, GroundClampConfig, Motion, DeadReckoningRecord
/// - Writes: SurfaceClamper, Transform, BuoyancyOffset
pub fn ground_clamp_system(
    clock: Res<SimClock>,
    mut clamper: ResMut<SurfaceClamper>,
    mut query: Query<(
        &EntityId,
        &Domain,
        &Ownership,
        &GroundClampConfig,
        &Motion,
        &DeadReckoningRecord,
        &mut Transform,
        Option<&mut BuoyancyOffset>,
    )>,
) {
    // Without any surface the raw transforms are left as they are.
    if !clamper.has_valid_surface() {
        return;
    }

    let mut rows: Vec<_> = query.iter_mut().collect();
    let mut requests: Vec<ClampRequest<'_>> = rows
        .iter()
        .map(|(id, domain, ownership, config, motion, record, transform, _)| {
            let velocity = match ownership {
                Ownership::Local => motion.velocity,
                Ownership::Remote => record.velocity,
            };
            let transform_changed = clamper.transform_changed(**id, transform);
            ClampRequest {
                entity: **id,
                clamp_type: get_best_clamp_type(config.clamp_type, **domain, transform_changed, velocity),
                domain: **domain,
                config: *config,
                transform: **transform,
                transform_changed,
                velocity,
                modified: false,
                bob_offset: 0.0,
            }
        })
        .collect();

    clamper.clamp_batch(clock.time, &mut requests);

    for (row, request) in rows.iter_mut().zip(&requests) {
        if request.modified {
            row.6.set_if_neq(request.transform);
        }
        if let Some(bob) = row.7.as_mut() {
            bob.set_if_neq(BuoyancyOffset(request.bob_offset));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clamp::ClampType;
    use crate::surface::{FlatWater, SurfaceSampler};
    use crate::terrain::TerrainGrid;
    use glam::Vec3;

    fn world_with_ground(height: f32) -> World {
        let mut grid = TerrainGrid::new(50, 50, 2.0);
        grid.fill_height(height);
        let mut sampler = SurfaceSampler::new();
        sampler.add_ground(Box::new(grid));

        let mut world = World::new();
        world.insert_resource(SimClock::default());
        world.insert_resource(SurfaceClamper::new(sampler));
        world
    }

    fn spawn(world: &mut World, id: u32, domain: Domain, z: f32) {
        spawn_with(world, id, domain, z, GroundClampConfig::default());
    }

    fn spawn_with(world: &mut World, id: u32, domain: Domain, z: f32, config: GroundClampConfig) {
        world.spawn((
            EntityBundle::new(EntityId(id), domain, Ownership::Local, Transform::from_translation(Vec3::new(0.0, 0.0, z))),
            config,
        ));
    }

    fn run_ticks(world: &mut World, ticks: usize) {
        let mut schedule = Schedule::default();
        schedule.add_systems(ground_clamp_system);
        for _ in 0..ticks {
            world.resource_mut::<SimClock>().advance(1.0 / 30.0);
            schedule.run(world);
        }
    }

    fn height_of(world: &mut World, id: u32) -> f32 {
        let mut query = world.query::<(&EntityId, &Transform)>();
        query
            .iter(world)
            .find(|(entity, _)| entity.0 == id)
            .map(|(_, transform)| transform.translation.z)
            .unwrap()
    }

    #[test]
    fn test_clamp_system_moves_entities_to_ground() {
        let mut world = world_with_ground(1.5);
        spawn(&mut world, 1, Domain::Ground, 9.0);
        spawn(&mut world, 2, Domain::Space, 9.0);

        let mut schedule = Schedule::default();
        schedule.add_systems(ground_clamp_system);
        schedule.run(&mut world);

        let mut query = world.query::<(&EntityId, &Transform)>();
        for (id, transform) in query.iter(&world) {
            let expected = if id.0 == 1 { 1.5 } else { 9.0 };
            assert!((transform.translation.z - expected).abs() < 1e-5, "entity {}", id.0);
        }
        let clamper = world.resource::<SurfaceClamper>();
        assert!(clamper.runtime_data(EntityId(1)).is_some());
        assert!(clamper.runtime_data(EntityId(2)).is_none());
    }

    #[test]
    fn test_idle_entities_keep_their_clamp_behavior() {
        let mut world = world_with_ground(1.5);
        spawn_with(&mut world, 1, Domain::Ground, 9.0, GroundClampConfig::with_type(ClampType::Full));
        spawn_with(&mut world, 2, Domain::Ground, 9.0, GroundClampConfig::with_type(ClampType::Intermittent));
        spawn_with(&mut world, 3, Domain::Ground, 9.0, GroundClampConfig::with_type(ClampType::Ranged));
        spawn_with(&mut world, 4, Domain::Air, 9.0, GroundClampConfig::with_type(ClampType::KeepAbove));
        spawn_with(&mut world, 5, Domain::Air, 0.5, GroundClampConfig::with_type(ClampType::KeepAbove));

        // Every entity sits still, so after the first tick all of them are
        // resampled intermittently.
        run_ticks(&mut world, 30);

        assert!((height_of(&mut world, 1) - 1.5).abs() < 1e-5);
        assert!((height_of(&mut world, 2) - 1.5).abs() < 1e-5);
        assert!((height_of(&mut world, 3) - 1.5).abs() < 1e-5);
        assert_eq!(height_of(&mut world, 4), 9.0);
        assert!((height_of(&mut world, 5) - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_idle_far_ranged_entity_is_left_above_ground() {
        let mut world = world_with_ground(1.5);
        world.resource_mut::<SurfaceClamper>().set_eye_point(Some(Vec3::new(0.0, 0.0, 5000.0)));
        spawn_with(&mut world, 1, Domain::Ground, 9.0, GroundClampConfig::with_type(ClampType::Ranged));
        run_ticks(&mut world, 30);
        assert_eq!(height_of(&mut world, 1), 9.0);
    }

    #[test]
    fn test_idle_entity_moved_off_terrain_is_left_alone() {
        let mut world = world_with_ground(1.5);
        spawn(&mut world, 1, Domain::Ground, 9.0);
        run_ticks(&mut world, 5);
        assert!((height_of(&mut world, 1) - 1.5).abs() < 1e-5);

        let mut query = world.query::<&mut Transform>();
        query.single_mut(&mut world).translation = Vec3::new(500.0, 500.0, 40.0);
        run_ticks(&mut world, 30);
        assert_eq!(height_of(&mut world, 1), 40.0);
    }

    #[test]
    fn test_floating_entity_gets_bob_offset() {
        let mut sampler = SurfaceSampler::new();
        sampler.set_water(Some(Box::new(FlatWater::new(0.0))));
        let mut world = World::new();
        world.insert_resource(SimClock::default());
        world.insert_resource(SurfaceClamper::new(sampler));
        spawn(&mut world, 1, Domain::Surface, 0.0);
        run_ticks(&mut world, 1);

        world
            .resource_mut::<SurfaceClamper>()
            .sampler_mut()
            .set_water(Some(Box::new(FlatWater::new(1.0))));
        world.query::<&mut Motion>().single_mut(&mut world).velocity = Vec3::X;
        run_ticks(&mut world, 3);

        let (transform, bob) = world.query::<(&Transform, &BuoyancyOffset)>().single(&world);
        assert!((transform.translation.z - 1.0).abs() < 1e-6);
        assert!(bob.0 < 0.0);
        assert!(bob.drawn(transform).translation.z < 1.0);
    }

    #[test]
    fn test_no_surface_skips_clamping() {
        let mut world = World::new();
        world.insert_resource(SimClock::default());
        world.insert_resource(SurfaceClamper::default());
        spawn(&mut world, 1, Domain::Ground, 9.0);

        let mut schedule = Schedule::default();
        schedule.add_systems(ground_clamp_system);
        schedule.run(&mut world);

        let mut query = world.query::<&Transform>();
        assert_eq!(query.single(&world).translation.z, 9.0);
        assert_eq!(world.resource::<SurfaceClamper>().runtime_count(), 0);
    }
}
