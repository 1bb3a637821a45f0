//! Movement system - the transform provider for locally owned entities.

use crate::components::*;
use bevy_ecs::prelude::*;
use glam::Vec3;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Resource tracking simulated time across fixed updates.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimClock {
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f64,
}

impl SimClock {
    pub fn advance(&mut self, dt: f32) {
        self.tick = self.tick.wrapping_add(1);
        self.time += f64::from(dt);
    }
}

/// System that integrates motion into the transform of local entities.
///
/// Remote entities are positioned by dead reckoning instead.
pub fn movement_system(
    dt: Res<DeltaTime>,
    mut query: Query<(&Ownership, &mut Motion, &mut Transform)>,
) {
    let delta = dt.0;
    for (ownership, mut motion, mut transform) in query.iter_mut() {
        if *ownership != Ownership::Local {
            continue;
        }
        if motion.velocity == Vec3::ZERO
            && motion.acceleration == Vec3::ZERO
            && motion.angular_velocity == Vec3::ZERO
        {
            continue;
        }

        let accel = motion.acceleration;
        transform.translation += motion.velocity * delta + accel * (0.5 * delta * delta);
        motion.velocity += accel * delta;

        let rotation = transform.rotation + motion.angular_velocity * delta;
        transform.rotation = Vec3::new(
            wrap_degrees(rotation.x),
            wrap_degrees(rotation.y),
            wrap_degrees(rotation.z),
        );
    }
}
