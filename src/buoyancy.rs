//! Bobbing of surface contact points on water.
//!
//! Each contact point that rests on water follows the water height through a
//! damped spring, so floating entities lag behind and overshoot waves a little
//! instead of snapping to them. Heavier and larger points respond more slowly.
//! The motion is purely visual: the clamper reports it as a drawn offset and
//! keeps the entity transform, and so the published state, on the still
//! surface.

use crate::clamp::SurfacePointData;
use serde::{Deserialize, Serialize};

/// Spring parameters for contact points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuoyancyConfig {
    /// Force bobbing even for domains that do not float by default.
    pub enabled: bool,
    pub point_radius: f32,
    pub point_mass: f32,
    /// Largest integration step; longer frames are truncated to this.
    pub max_time_step: f32,
    pub stiffness: f32,
    pub damping: f32,
}

impl Default for BuoyancyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            point_radius: 1.0,
            point_mass: 1.0,
            max_time_step: 0.1,
            stiffness: 40.0,
            damping: 4.0,
        }
    }
}

impl BuoyancyConfig {
    /// Spring response scaled down by mass and radius.
    pub fn spring_factor(&self) -> f32 {
        self.stiffness / (self.point_mass * self.point_radius).max(f32::EPSILON)
    }
}

/// Integrate one water contact point toward `target` height.
///
/// A point that was not floating before (new, or previously on solid ground)
/// starts exactly at the target with no vertical speed.
pub fn update_point_buoyancy(config: &BuoyancyConfig, point: &mut SurfacePointData, target: f32, dt: f32) {
    if !point.floating {
        point.position.z = target;
        point.velocity = 0.0;
        point.floating = true;
        return;
    }

    let dt = dt.clamp(0.0, config.max_time_step);
    let accel = (target - point.position.z) * config.spring_factor() - config.damping * point.velocity;
    point.velocity += accel * dt;
    point.position.z += point.velocity * dt;
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn floating_point(z: f32) -> SurfacePointData {
        SurfacePointData {
            position: Vec3::new(0.0, 0.0, z),
            floating: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_contact_snaps() {
        let config = BuoyancyConfig::default();
        let mut point = SurfacePointData::default();
        update_point_buoyancy(&config, &mut point, 3.0, 0.05);
        assert_eq!(point.position.z, 3.0);
        assert_eq!(point.velocity, 0.0);
        assert!(point.floating);
    }

    #[test]
    fn test_converges_to_target() {
        let config = BuoyancyConfig::default();
        let mut point = floating_point(-1.0);
        for _ in 0..600 {
            update_point_buoyancy(&config, &mut point, 0.0, 1.0 / 60.0);
        }
        assert!(point.position.z.abs() < 1e-2, "z = {}", point.position.z);
        assert!(point.velocity.abs() < 1e-2);
    }

    #[test]
    fn test_heavier_points_move_slower() {
        let light = BuoyancyConfig::default();
        let heavy = BuoyancyConfig { point_mass: 10.0, ..Default::default() };
        let mut a = floating_point(-1.0);
        let mut b = floating_point(-1.0);
        update_point_buoyancy(&light, &mut a, 0.0, 0.05);
        update_point_buoyancy(&heavy, &mut b, 0.0, 0.05);
        assert!(a.position.z > b.position.z);
    }

    #[test]
    fn test_long_frames_are_truncated() {
        let config = BuoyancyConfig { max_time_step: 0.05, ..Default::default() };
        let mut long = floating_point(-1.0);
        let mut capped = floating_point(-1.0);
        update_point_buoyancy(&config, &mut long, 0.0, 5.0);
        update_point_buoyancy(&config, &mut capped, 0.0, 0.05);
        assert_eq!(long.position.z, capped.position.z);
        assert_eq!(long.velocity, capped.velocity);
    }
}
