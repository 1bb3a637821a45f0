//! ECS Components for simulated entities.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in systems that query these components.
//!
//! Coordinates are Z-up. Rotations are `(heading, pitch, roll)` in degrees;
//! heading 0 faces +Y and increases counter-clockwise.

use bevy_ecs::prelude::*;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::clamp::GroundClampConfig;
use crate::dead_reckoning::{DeadReckoningAlgorithm, DeadReckoningRecord};
use crate::update::{UpdateDecisionEngine, UpdateThresholds};

/// Wrap an angle in degrees into `(-180, 180]`.
pub fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Unique identifier for a simulated entity, shared with remote peers.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Operating medium of an entity.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    Air,
    Amphibious,
    #[default]
    Ground,
    Space,
    Submarine,
    Surface,
    Multi,
}

impl Domain {
    /// Whether ground collision is an eligible clamp target.
    pub fn samples_ground(&self) -> bool {
        match self {
            Domain::Air | Domain::Amphibious | Domain::Ground | Domain::Submarine | Domain::Multi => true,
            Domain::Space | Domain::Surface => false,
        }
    }

    /// Whether the water surface is an eligible clamp target.
    pub fn samples_water(&self) -> bool {
        match self {
            Domain::Air | Domain::Amphibious | Domain::Submarine | Domain::Surface | Domain::Multi => true,
            Domain::Space | Domain::Ground => false,
        }
    }

    /// Whether the entity floats on water and bobs with it.
    pub fn floats(&self) -> bool {
        matches!(self, Domain::Amphibious | Domain::Surface)
    }

    /// Whether water should be approached from below by default.
    pub fn clamps_from_underneath(&self) -> bool {
        matches!(self, Domain::Submarine)
    }
}

/// Who owns the authoritative state of an entity.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ownership {
    /// Simulated here; publishes updates.
    #[default]
    Local,
    /// Simulated by a peer; dead reckoned from received updates.
    Remote,
}

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// World-space pose of an entity.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    /// `(heading, pitch, roll)` in degrees.
    pub rotation: Vec3,
}

impl Transform {
    pub fn new(translation: Vec3, rotation: Vec3) -> Self {
        Self { translation, rotation }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, rotation: Vec3::ZERO }
    }

    #[inline]
    pub fn heading(&self) -> f32 {
        self.rotation.x
    }

    /// Horizontal unit vector the entity faces.
    pub fn forward(&self) -> Vec3 {
        let h = self.heading().to_radians();
        Vec3::new(-h.sin(), h.cos(), 0.0)
    }

    /// Horizontal unit vector to the entity's right.
    pub fn right(&self) -> Vec3 {
        let h = self.heading().to_radians();
        Vec3::new(h.cos(), h.sin(), 0.0)
    }
}

/// Linear and angular motion of an entity.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    pub velocity: Vec3,
    /// Degrees per second, `(heading, pitch, roll)` order.
    pub angular_velocity: Vec3,
    pub acceleration: Vec3,
}

impl Motion {
    pub fn with_velocity(velocity: Vec3) -> Self {
        Self { velocity, ..Default::default() }
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }
}

/// Vertical bob of a floating entity on top of its clamped height.
///
/// Only the drawn pose includes it; [`Transform`] keeps the still water
/// height that gets published.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BuoyancyOffset(pub f32);

impl BuoyancyOffset {
    /// `transform` as it should be drawn.
    pub fn drawn(&self, transform: &Transform) -> Transform {
        let mut drawn = *transform;
        drawn.translation.z += self.0;
        drawn
    }
}

// ============================================================================
// BUNDLES
// ============================================================================

/// Bundle for spawning a simulated entity.
#[derive(Bundle)]
pub struct EntityBundle {
    pub id: EntityId,
    pub domain: Domain,
    pub ownership: Ownership,
    pub transform: Transform,
    pub motion: Motion,
    pub record: DeadReckoningRecord,
    pub bob: BuoyancyOffset,
}

impl EntityBundle {
    pub fn new(id: EntityId, domain: Domain, ownership: Ownership, transform: Transform) -> Self {
        Self {
            id,
            domain,
            ownership,
            transform,
            motion: Motion::default(),
            record: DeadReckoningRecord::new(transform.translation, transform.rotation),
            bob: BuoyancyOffset::default(),
        }
    }
}

/// Description of an entity to spawn through the `SimWorld` API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDesc {
    pub id: EntityId,
    #[serde(default)]
    pub domain: Domain,
    #[serde(default)]
    pub ownership: Ownership,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub motion: Motion,
    #[serde(default)]
    pub algorithm: DeadReckoningAlgorithm,
    /// Ground clamping; `None` leaves the entity unclamped.
    #[serde(default)]
    pub clamp: Option<GroundClampConfig>,
    /// Publish thresholds for local entities; `None` uses the world default.
    #[serde(default)]
    pub thresholds: Option<UpdateThresholds>,
}

impl EntityDesc {
    pub fn local(id: u32, domain: Domain, translation: Vec3) -> Self {
        Self::with_ownership(id, domain, Ownership::Local, translation)
    }

    pub fn remote(id: u32, domain: Domain, translation: Vec3) -> Self {
        Self::with_ownership(id, domain, Ownership::Remote, translation)
    }

    fn with_ownership(id: u32, domain: Domain, ownership: Ownership, translation: Vec3) -> Self {
        Self {
            id: EntityId(id),
            domain,
            ownership,
            transform: Transform::from_translation(translation),
            motion: Motion::default(),
            algorithm: DeadReckoningAlgorithm::default(),
            clamp: None,
            thresholds: None,
        }
    }

    pub fn with_clamp(mut self, clamp: GroundClampConfig) -> Self {
        self.clamp = Some(clamp);
        self
    }

    pub fn with_thresholds(mut self, thresholds: UpdateThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn with_motion(mut self, motion: Motion) -> Self {
        self.motion = motion;
        self
    }

    pub fn with_algorithm(mut self, algorithm: DeadReckoningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub(crate) fn update_engine(&self, default: UpdateThresholds) -> UpdateDecisionEngine {
        UpdateDecisionEngine::new(self.thresholds.unwrap_or(default))
    }
}
