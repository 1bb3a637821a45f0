//! Simulation configuration.
//!
//! Loaded from JSON (every field optional) or built in code, then checked
//! with [`SimConfig::validate`] before a world is created from it.

use crate::error::SimError;
use crate::surface::DEFAULT_PROBE_LENGTH;
use crate::update::UpdateThresholds;
use bevy_ecs::prelude::*;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Configuration for the simulation.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f32,
    /// Half length of the vertical ground probe, in world units.
    pub probe_length: f32,
    /// Publish thresholds for local entities that do not set their own.
    pub default_thresholds: UpdateThresholds,
    /// Observer position used for high-res and ranged clamping.
    pub eye_point: Option<Vec3>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0, // 30 Hz
            probe_length: DEFAULT_PROBE_LENGTH,
            default_thresholds: UpdateThresholds::default(),
            eye_point: None,
        }
    }
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.fixed_timestep.is_finite() && self.fixed_timestep > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "fixed_timestep must be positive, got {}",
                self.fixed_timestep
            )));
        }
        if !(self.probe_length.is_finite() && self.probe_length > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "probe_length must be positive, got {}",
                self.probe_length
            )));
        }
        // A zero cap is allowed here: it disables publishing and is reported
        // by the engine that owns it.
        let thresholds = &self.default_thresholds;
        if thresholds.max_translation_error < 0.0 || thresholds.max_rotation_error < 0.0 {
            return Err(SimError::InvalidConfig("error thresholds must not be negative".into()));
        }
        Ok(())
    }
}
