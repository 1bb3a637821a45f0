//! Dead-reckoning state holder.
//!
//! A [`DeadReckoningRecord`] keeps the pose that remote peers were last told
//! about (the *last-known* pose) together with the motion estimate sent with
//! it. Remote entities are drawn at the pose extrapolated from those values;
//! local entities compare their live pose against them to decide when to
//! publish.
//!
//! Last-known values are written in exactly two places:
//! [`DeadReckoningRecord::commit_published`] when a local update goes out and
//! [`DeadReckoningRecord::apply_remote_update`] when a remote one arrives.

use crate::components::wrap_degrees;
use bevy_ecs::prelude::*;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Extrapolation model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeadReckoningAlgorithm {
    /// No motion.
    None,
    /// No motion; the object is immobile.
    Static,
    /// Constant velocity.
    #[default]
    VelocityOnly,
    /// Constant acceleration.
    VelocityAndAcceleration,
}

impl DeadReckoningAlgorithm {
    pub fn moves(&self) -> bool {
        matches!(self, Self::VelocityOnly | Self::VelocityAndAcceleration)
    }
}

/// State carried by a received update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteUpdate {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub velocity: Vec3,
    #[serde(default)]
    pub angular_velocity: Vec3,
    #[serde(default)]
    pub acceleration: Vec3,
    /// Overrides the extrapolation model when present.
    #[serde(default)]
    pub algorithm: Option<DeadReckoningAlgorithm>,
}

/// Per-entity dead-reckoning state.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadReckoningRecord {
    last_known_translation: Vec3,
    last_known_rotation: Vec3,
    current_translation: Vec3,
    current_rotation: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub acceleration: Vec3,
    algorithm: DeadReckoningAlgorithm,
    /// Seconds since the last-known values were set.
    time_since_update: f32,
    update_count: u64,
}

impl DeadReckoningRecord {
    pub fn new(translation: Vec3, rotation: Vec3) -> Self {
        Self {
            last_known_translation: translation,
            last_known_rotation: rotation,
            current_translation: translation,
            current_rotation: rotation,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            algorithm: DeadReckoningAlgorithm::default(),
            time_since_update: 0.0,
            update_count: 0,
        }
    }

    pub fn last_known_translation(&self) -> Vec3 {
        self.last_known_translation
    }

    pub fn last_known_rotation(&self) -> Vec3 {
        self.last_known_rotation
    }

    pub fn current_dead_reckoned_translation(&self) -> Vec3 {
        self.current_translation
    }

    pub fn current_dead_reckoned_rotation(&self) -> Vec3 {
        self.current_rotation
    }

    pub fn algorithm(&self) -> DeadReckoningAlgorithm {
        self.algorithm
    }

    /// Select the extrapolation model. Gameplay decides when to switch.
    pub fn set_algorithm(&mut self, algorithm: DeadReckoningAlgorithm) {
        if self.algorithm != algorithm {
            log::debug!("dead reckoning algorithm {:?} -> {:?}", self.algorithm, algorithm);
            self.algorithm = algorithm;
        }
    }

    pub fn time_since_update(&self) -> f32 {
        self.time_since_update
    }

    /// Number of updates published or received so far.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Advance by `dt` seconds and return the extrapolated `(translation, rotation)`.
    pub fn extrapolate(&mut self, dt: f32) -> (Vec3, Vec3) {
        self.time_since_update += dt.max(0.0);
        let (translation, rotation) = self.pose_at(self.time_since_update);
        self.current_translation = translation;
        self.current_rotation = rotation;
        (translation, rotation)
    }

    /// Pose `t` seconds after the last-known values, without changing state.
    pub fn pose_at(&self, t: f32) -> (Vec3, Vec3) {
        match self.algorithm {
            DeadReckoningAlgorithm::None | DeadReckoningAlgorithm::Static => {
                (self.last_known_translation, self.last_known_rotation)
            }
            DeadReckoningAlgorithm::VelocityOnly => (
                self.last_known_translation + self.velocity * t,
                self.rotate(t),
            ),
            DeadReckoningAlgorithm::VelocityAndAcceleration => (
                self.last_known_translation + self.velocity * t + self.acceleration * (0.5 * t * t),
                self.rotate(t),
            ),
        }
    }

    fn rotate(&self, t: f32) -> Vec3 {
        let r = self.last_known_rotation + self.angular_velocity * t;
        Vec3::new(wrap_degrees(r.x), wrap_degrees(r.y), wrap_degrees(r.z))
    }

    /// Record that a local update carrying these values was published.
    pub fn commit_published(&mut self, translation: Vec3, rotation: Vec3, velocity: Vec3) {
        self.last_known_translation = translation;
        self.last_known_rotation = rotation;
        self.current_translation = translation;
        self.current_rotation = rotation;
        self.velocity = velocity;
        self.time_since_update = 0.0;
        self.update_count += 1;
    }

    /// Replace the last-known state with a received update.
    pub fn apply_remote_update(&mut self, update: &RemoteUpdate) {
        self.last_known_translation = update.translation;
        self.last_known_rotation = update.rotation;
        self.current_translation = update.translation;
        self.current_rotation = update.rotation;
        self.velocity = update.velocity;
        self.angular_velocity = update.angular_velocity;
        self.acceleration = update.acceleration;
        if let Some(algorithm) = update.algorithm {
            self.set_algorithm(algorithm);
        }
        self.time_since_update = 0.0;
        self.update_count += 1;
    }
}

impl Default for DeadReckoningRecord {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn moving_record(algorithm: DeadReckoningAlgorithm) -> DeadReckoningRecord {
        let mut record = DeadReckoningRecord::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO);
        record.velocity = Vec3::new(2.0, 0.0, 0.0);
        record.acceleration = Vec3::new(0.0, 4.0, 0.0);
        record.angular_velocity = Vec3::new(10.0, 0.0, 0.0);
        record.set_algorithm(algorithm);
        record
    }

    #[test]
    fn test_none_and_static_hold_last_known() {
        for algorithm in [DeadReckoningAlgorithm::None, DeadReckoningAlgorithm::Static] {
            let mut record = moving_record(algorithm);
            let (t, r) = record.extrapolate(5.0);
            assert_eq!(t, Vec3::new(1.0, 2.0, 3.0));
            assert_eq!(r, Vec3::ZERO);
        }
    }

    #[test]
    fn test_velocity_only() {
        let mut record = moving_record(DeadReckoningAlgorithm::VelocityOnly);
        record.extrapolate(0.5);
        let (t, r) = record.extrapolate(0.5);
        assert_abs_diff_eq!(t.x, 3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(t.y, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(r.x, 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_velocity_and_acceleration() {
        let mut record = moving_record(DeadReckoningAlgorithm::VelocityAndAcceleration);
        let (t, _) = record.extrapolate(2.0);
        assert_abs_diff_eq!(t.x, 5.0, epsilon = 1e-5);
        // 0.5 * 4 * 2^2 = 8
        assert_abs_diff_eq!(t.y, 10.0, epsilon = 1e-5);
        assert_eq!(record.current_dead_reckoned_translation(), t);
    }

    #[test]
    fn test_extrapolation_does_not_touch_last_known() {
        let mut record = moving_record(DeadReckoningAlgorithm::VelocityOnly);
        record.extrapolate(3.0);
        assert_eq!(record.last_known_translation(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_remote_update_resets_clock() {
        let mut record = moving_record(DeadReckoningAlgorithm::VelocityOnly);
        record.extrapolate(3.0);
        record.apply_remote_update(&RemoteUpdate {
            translation: Vec3::new(10.0, 0.0, 0.0),
            velocity: Vec3::new(0.0, 1.0, 0.0),
            algorithm: Some(DeadReckoningAlgorithm::VelocityAndAcceleration),
            ..Default::default()
        });
        assert_eq!(record.time_since_update(), 0.0);
        assert_eq!(record.algorithm(), DeadReckoningAlgorithm::VelocityAndAcceleration);
        let (t, _) = record.extrapolate(1.0);
        assert_abs_diff_eq!(t.y, 1.0, epsilon = 1e-5);
        assert_eq!(record.update_count(), 1);
    }

    #[test]
    fn test_rotation_wraps() {
        let mut record = DeadReckoningRecord::new(Vec3::ZERO, Vec3::new(170.0, 0.0, 0.0));
        record.angular_velocity = Vec3::new(20.0, 0.0, 0.0);
        let (_, r) = record.extrapolate(1.0);
        assert_abs_diff_eq!(r.x, -170.0, epsilon = 1e-4);
    }
}
