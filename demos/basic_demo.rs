//! Basic demonstration of dead reckoning and ground clamping.
//!
//! Run with: RUST_LOG=debug cargo run --example basic_demo

use glam::Vec3;
use simcore_dr::*;

fn main() {
    env_logger::init();

    println!("=== SimCore Dead Reckoning - Demo ===\n");

    let mut sim = SimWorld::new();

    // Rolling hills with a lake at height 0.5.
    sim.set_terrain(
        TerrainGrid::from_fn(100, 100, 4.0, |x, y| (x * 0.02).sin() * 3.0 + (y * 0.03).cos() * 2.0)
            .with_origin(-200.0, -200.0),
    );
    sim.set_water(Some(Box::new(
        OceanSurface::new(0.5).with_wave(Wave { amplitude: 0.3, wavelength: 20.0, speed: 4.0, direction_deg: 30.0 }),
    )));
    sim.set_eye_point(Some(Vec3::ZERO));

    // A local tank driving north-east and a local boat.
    let tank = GroundClampConfig::default().with_dimensions(Vec3::new(3.0, 6.0, 2.0));
    sim.spawn_entity(
        EntityDesc::local(1, Domain::Ground, Vec3::new(-50.0, -50.0, 20.0))
            .with_clamp(tank.clone())
            .with_motion(Motion::with_velocity(Vec3::new(5.0, 5.0, 0.0))),
    )
    .expect("spawn tank");
    sim.spawn_entity(
        EntityDesc::local(2, Domain::Surface, Vec3::new(0.0, 0.0, 5.0))
            .with_clamp(GroundClampConfig::default().with_dimensions(Vec3::new(4.0, 10.0, 3.0))),
    )
    .expect("spawn boat");

    // A remote copy of the tank, fed from the local tank's published updates.
    sim.spawn_entity(EntityDesc::remote(101, Domain::Ground, Vec3::new(-50.0, -50.0, 20.0)).with_clamp(tank))
        .expect("spawn remote tank");

    for second in 1..=10 {
        for _ in 0..20 {
            sim.step(0.05);
            for update in sim.drain_published_updates() {
                if update.entity == EntityId(1) {
                    let remote = RemoteUpdate {
                        translation: update.translation,
                        rotation: update.rotation,
                        velocity: update.velocity,
                        ..Default::default()
                    };
                    sim.receive_update(EntityId(101), &remote).expect("remote tank exists");
                }
                println!(
                    "  t={:.2}s publish {:?}: pos=({:.1}, {:.1}, {:.2})",
                    update.time, update.entity, update.translation.x, update.translation.y, update.translation.z
                );
            }
        }

        let local = sim.entity_transform(EntityId(1)).unwrap_or_default();
        let remote = sim.entity_transform(EntityId(101)).unwrap_or_default();
        let boat = sim.drawn_transform(EntityId(2)).unwrap_or_default();
        println!(
            "--- {}s: tank error={:.3} pitch={:.1} roll={:.1} | boat z={:.2} ---",
            second,
            local.translation.distance(remote.translation),
            local.rotation.y,
            local.rotation.z,
            boat.translation.z
        );
    }

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot().to_json_pretty().expect("snapshot serializes"));
}
