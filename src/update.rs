//! Update-decision engine for locally owned entities.
//!
//! Every tick the engine compares the live (post-clamp) pose and velocity of
//! an entity with what was last published and decides whether a new update
//! should go out. Updates are rate limited per entity; within the allowed
//! rate, position, heading and velocity are checked independently and any
//! one of them being out of tolerance triggers a full update.

use crate::components::{wrap_degrees, Transform};
use crate::dead_reckoning::DeadReckoningRecord;
use bevy_ecs::prelude::*;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Velocity change that forces an update.
pub const VELOCITY_CHANGE_THRESHOLD: f32 = 0.2;
/// Speed below which an entity counts as stopped.
pub const STOPPED_SPEED: f32 = 0.1;

/// Per-entity publish tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateThresholds {
    /// Squared distance from the last-known translation.
    pub max_translation_error: f32,
    /// Squared heading difference in degrees.
    pub max_rotation_error: f32,
    /// Upper bound on published updates per second.
    pub updates_per_second_cap: f32,
}

impl Default for UpdateThresholds {
    fn default() -> Self {
        Self {
            max_translation_error: 0.02,
            max_rotation_error: 2.0,
            updates_per_second_cap: 3.0,
        }
    }
}

impl UpdateThresholds {
    pub fn is_valid(&self) -> bool {
        self.updates_per_second_cap.is_finite() && self.updates_per_second_cap > 0.0
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateDecision {
    /// Rate limited, or the engine is misconfigured.
    #[default]
    NotDue,
    /// Allowed to publish, nothing changed enough.
    DueNone,
    DuePartial,
    DueFull,
}

impl UpdateDecision {
    pub fn kind(&self) -> UpdateKind {
        match self {
            UpdateDecision::NotDue | UpdateDecision::DueNone => UpdateKind::None,
            UpdateDecision::DuePartial => UpdateKind::Partial,
            UpdateDecision::DueFull => UpdateKind::Full,
        }
    }

    pub fn publishes(&self) -> bool {
        self.kind() != UpdateKind::None
    }
}

/// What the network publisher should send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    #[default]
    None,
    Partial,
    Full,
}

/// Property carried by a published update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublishedProperty {
    Translation,
    Rotation,
    Velocity,
}

/// Every property a full update carries.
pub const FULL_UPDATE_PROPERTIES: [PublishedProperty; 3] = [
    PublishedProperty::Translation,
    PublishedProperty::Rotation,
    PublishedProperty::Velocity,
];

/// Which channels were out of tolerance in the last evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedChannels {
    pub translation: bool,
    pub rotation: bool,
    pub velocity: bool,
}

impl ChangedChannels {
    pub fn any(&self) -> bool {
        self.translation || self.rotation || self.velocity
    }
}

/// Values carried by the most recent publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishedState {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub velocity: Vec3,
}

/// Rate limiter plus change detection for one entity.
#[derive(Component, Debug, Clone)]
pub struct UpdateDecisionEngine {
    thresholds: UpdateThresholds,
    accumulated: f32,
    published_velocity: Vec3,
    last_decision: UpdateDecision,
    last_changes: ChangedChannels,
    config_error_reported: bool,
}

impl UpdateDecisionEngine {
    pub fn new(thresholds: UpdateThresholds) -> Self {
        Self {
            thresholds,
            accumulated: 0.0,
            published_velocity: Vec3::ZERO,
            last_decision: UpdateDecision::NotDue,
            last_changes: ChangedChannels::default(),
            config_error_reported: false,
        }
    }

    pub fn thresholds(&self) -> &UpdateThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: UpdateThresholds) {
        self.thresholds = thresholds;
        self.config_error_reported = false;
    }

    /// Velocity carried by the most recent publish.
    pub fn published_velocity(&self) -> Vec3 {
        self.published_velocity
    }

    pub fn last_decision(&self) -> UpdateDecision {
        self.last_decision
    }

    pub fn last_changes(&self) -> ChangedChannels {
        self.last_changes
    }

    /// Seconds accumulated since the last due result.
    pub fn accumulated_time(&self) -> f32 {
        self.accumulated
    }

    /// Publisher view of the last decision.
    pub fn is_update_due(&self) -> UpdateKind {
        self.last_decision.kind()
    }

    /// Properties the publisher should serialize for the last decision.
    pub fn properties_to_publish(&self) -> &'static [PublishedProperty] {
        match self.last_decision.kind() {
            UpdateKind::None => &[],
            UpdateKind::Partial | UpdateKind::Full => &FULL_UPDATE_PROPERTIES,
        }
    }

    /// Evaluate one tick. On a publish the record's last-known values are
    /// committed and the published state is returned alongside the decision.
    pub fn evaluate(
        &mut self,
        dt: f32,
        current: &Transform,
        velocity: Vec3,
        record: &mut DeadReckoningRecord,
    ) -> (UpdateDecision, Option<PublishedState>) {
        self.last_changes = ChangedChannels::default();

        if !self.thresholds.is_valid() {
            if !self.config_error_reported {
                log::error!(
                    "invalid updates_per_second_cap {}; entity will never publish",
                    self.thresholds.updates_per_second_cap
                );
                self.config_error_reported = true;
            }
            self.last_decision = UpdateDecision::NotDue;
            return (self.last_decision, None);
        }

        self.accumulated += dt.max(0.0);
        if self.accumulated < 1.0 / self.thresholds.updates_per_second_cap {
            self.last_decision = UpdateDecision::NotDue;
            return (self.last_decision, None);
        }

        let changes = self.detect_changes(current, velocity, record);
        self.last_changes = changes;
        if !changes.any() {
            // A due check with nothing to send still uses up the window.
            self.accumulated = 0.0;
            self.last_decision = UpdateDecision::DueNone;
            return (self.last_decision, None);
        }

        // Residual motion near rest is published as a clean stop.
        let published_velocity = if velocity.length() < STOPPED_SPEED {
            Vec3::ZERO
        } else {
            velocity
        };

        self.accumulated = 0.0;
        self.published_velocity = published_velocity;
        record.commit_published(current.translation, current.rotation, published_velocity);
        self.last_decision = UpdateDecision::DueFull;

        (
            self.last_decision,
            Some(PublishedState {
                translation: current.translation,
                rotation: current.rotation,
                velocity: published_velocity,
            }),
        )
    }

    fn detect_changes(
        &self,
        current: &Transform,
        velocity: Vec3,
        record: &DeadReckoningRecord,
    ) -> ChangedChannels {
        let translation = current
            .translation
            .distance_squared(record.last_known_translation())
            > self.thresholds.max_translation_error;

        // Pitch and roll come from clamping and are not published on their own.
        let heading_delta = wrap_degrees(current.heading() - record.last_known_rotation().x);
        let rotation = heading_delta * heading_delta > self.thresholds.max_rotation_error;

        let delta_exceeded = (velocity - self.published_velocity).length() > VELOCITY_CHANGE_THRESHOLD;
        let just_stopped = velocity.length() < STOPPED_SPEED && self.published_velocity != Vec3::ZERO;

        ChangedChannels {
            translation,
            rotation,
            velocity: delta_exceeded || just_stopped,
        }
    }
}

impl Default for UpdateDecisionEngine {
    fn default() -> Self {
        Self::new(UpdateThresholds::default())
    }
}
