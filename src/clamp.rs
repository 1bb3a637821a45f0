//! Multi-point surface clamping.
//!
//! The clamper moves an entity onto the terrain or water beneath it. Close to
//! the eye point an entity with a footprint is sampled at three points (front,
//! rear-left, rear-right) and tilted to the plane through them; everywhere
//! else a single center point only corrects the height.
//!
//! Per-entity state lives in an arena keyed by [`EntityId`]. A clamp runs in
//! three phases so the expensive part can be shared across threads:
//!
//! 1. **Plan** (sequential) - pick the effective clamp type, reuse a cached
//!    result for intermittent clamps, build probe points.
//! 2. **Sample** (read-only) - query the [`SurfaceSampler`] for every probe.
//! 3. **Finalize** (sequential) - buoyancy, smoothing, write the transform.
//!
//! The transform always receives the still surface height. Buoyancy bobbing
//! is reported separately as [`ClampRequest::bob_offset`] and only reaches the
//! drawn pose.

use crate::buoyancy::{update_point_buoyancy, BuoyancyConfig};
use crate::components::{Domain, EntityId, Transform};
use crate::surface::{SurfaceHit, SurfaceKind, SurfaceSampler, WaterPolicy};
use bevy_ecs::prelude::*;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Maximum number of probe points per entity.
pub const MAX_SURFACE_POINTS: usize = 3;

/// Speed under which an entity is treated as idle.
const IDLE_SPEED_SQ: f32 = 1.0e-4;

/// Smallest plane normal Z accepted from a three-point fit.
const MIN_PLANE_NORMAL_Z: f32 = 1.0e-3;

/// How an entity is held against the surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClampType {
    None,
    /// Resample and clamp every tick.
    #[default]
    Full,
    /// Resample only every `intermittent_interval` seconds.
    Intermittent,
    /// Full within `ranged_distance` of the eye point, keep-above beyond.
    Ranged,
    /// Only push the entity up when it sinks below the surface.
    KeepAbove,
}

/// Per-entity ground clamping configuration.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundClampConfig {
    /// Suggested clamp type, refined each tick by [`get_best_clamp_type`].
    pub clamp_type: ClampType,
    /// Height of the entity origin above the surface.
    pub ground_offset: f32,
    /// Collision extents: `x` width, `y` length, `z` height.
    pub model_dimensions: Vec3,
    /// Eye distance inside which three-point clamping is used.
    pub high_res_range: f32,
    /// Eye distance inside which `Ranged` behaves like `Full`.
    pub ranged_distance: f32,
    /// Seconds between resamples for `Intermittent`.
    pub intermittent_interval: f32,
    /// Largest vertical correction applied per clamp; unlimited if `None`.
    pub max_vertical_step: Option<f32>,
    pub water: WaterPolicy,
    pub buoyancy: BuoyancyConfig,
    /// Log every clamp of this entity.
    pub debug: bool,
}

impl Default for GroundClampConfig {
    fn default() -> Self {
        Self {
            clamp_type: ClampType::Full,
            ground_offset: 0.0,
            model_dimensions: Vec3::ZERO,
            high_res_range: 250.0,
            ranged_distance: 1000.0,
            intermittent_interval: 0.25,
            max_vertical_step: None,
            water: WaterPolicy::default(),
            buoyancy: BuoyancyConfig::default(),
            debug: false,
        }
    }
}

impl GroundClampConfig {
    pub fn with_type(clamp_type: ClampType) -> Self {
        Self { clamp_type, ..Default::default() }
    }

    pub fn with_dimensions(mut self, dimensions: Vec3) -> Self {
        self.model_dimensions = dimensions;
        self
    }

    fn has_footprint(&self) -> bool {
        self.model_dimensions.x > 0.0 && self.model_dimensions.y > 0.0
    }

    fn water_policy(&self, domain: Domain) -> WaterPolicy {
        WaterPolicy {
            force_clamp: self.water.force_clamp,
            clamp_from_underneath: self.water.clamp_from_underneath || domain.clamps_from_underneath(),
        }
    }

    fn floats(&self, domain: Domain) -> bool {
        self.buoyancy.enabled || domain.floats()
    }
}

/// State of one probe point, kept across ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfacePointData {
    /// Drawn position, including buoyancy motion on water.
    pub position: Vec3,
    pub normal: Vec3,
    /// Resting on ground rather than water.
    pub is_solid: bool,
    /// Vertical bob speed.
    pub velocity: f32,
    /// Whether the point is currently bobbing on water.
    pub floating: bool,
    /// Whether the last sample found a surface.
    pub in_contact: bool,
    pub last_clamp_point: Vec3,
}

/// Height and tilt produced by a clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClampResult {
    /// Entity origin height, offset included.
    pub z: f32,
    /// `(pitch, roll)` from a three-point fit.
    pub tilt: Option<(f32, f32)>,
    /// Drawn height minus `z` for floating entities.
    #[serde(default)]
    pub bob: f32,
}

impl ClampResult {
    fn apply(&self, transform: &mut Transform) -> bool {
        let before = *transform;
        transform.translation.z = self.z;
        if let Some((pitch, roll)) = self.tilt {
            transform.rotation.y = pitch;
            transform.rotation.z = roll;
        }
        *transform != before
    }
}

/// Clamp state owned by the clamper for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ClampRuntimeData {
    pub entity: EntityId,
    pub domain: Domain,
    pub buoyancy: BuoyancyConfig,
    pub points: [SurfacePointData; MAX_SURFACE_POINTS],
    /// Points used by the last sample (1 or 3).
    pub active_points: usize,
    pub last_sample_time: Option<f64>,
    /// Surface target from the last sample that found a surface. Cleared by a
    /// sample that finds nothing.
    pub last_result: Option<ClampResult>,
    /// Transform as the clamper last left it.
    pub last_output: Option<Transform>,
    pub debug: bool,
}

impl ClampRuntimeData {
    fn new(entity: EntityId, domain: Domain, config: &GroundClampConfig) -> Self {
        Self {
            entity,
            domain,
            buoyancy: config.buoyancy,
            points: [SurfacePointData::default(); MAX_SURFACE_POINTS],
            active_points: 0,
            last_sample_time: None,
            last_result: None,
            last_output: None,
            debug: config.debug,
        }
    }

    fn is_compatible(&self, domain: Domain, config: &GroundClampConfig) -> bool {
        self.domain == domain && self.buoyancy == config.buoyancy
    }
}

/// Probe points for one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoints {
    pub points: [Vec3; MAX_SURFACE_POINTS],
    pub count: usize,
}

impl SurfacePoints {
    pub fn as_slice(&self) -> &[Vec3] {
        &self.points[..self.count]
    }
}

/// One entity's clamp for a batch.
#[derive(Debug, Clone)]
pub struct ClampRequest<'a> {
    pub entity: EntityId,
    pub clamp_type: ClampType,
    pub domain: Domain,
    pub config: &'a GroundClampConfig,
    /// Read and written in place.
    pub transform: Transform,
    pub transform_changed: bool,
    pub velocity: Vec3,
    /// Set when the clamp changed `transform`.
    pub modified: bool,
    /// Buoyancy bob to add to the drawn pose; zero unless floating.
    pub bob_offset: f32,
}

/// Effective behavior once `Ranged` is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClampMode {
    Full,
    KeepAbove,
}

#[derive(Debug, Clone, Copy)]
enum ClampPlan {
    Skip,
    Reuse { mode: ClampMode, result: ClampResult },
    Sample {
        mode: ClampMode,
        probes: SurfacePoints,
        domain: Domain,
        policy: WaterPolicy,
    },
}

type ProbeHits = [Option<SurfaceHit>; MAX_SURFACE_POINTS];

/// Choose the clamp type for this tick. Idle entities only need an
/// occasional resample.
pub fn get_best_clamp_type(
    suggested: ClampType,
    domain: Domain,
    transform_changed: bool,
    velocity: Vec3,
) -> ClampType {
    if domain == Domain::Space || suggested == ClampType::None {
        return ClampType::None;
    }
    if velocity.length_squared() < IDLE_SPEED_SQ && !transform_changed {
        ClampType::Intermittent
    } else {
        suggested
    }
}

/// Probe points relative to `transform`: the center, or front / rear-left /
/// rear-right corners of the footprint when `high_res` is set.
pub fn get_surface_points(transform: &Transform, config: &GroundClampConfig, high_res: bool) -> SurfacePoints {
    let center = transform.translation;
    if !high_res || !config.has_footprint() {
        return SurfacePoints { points: [center; MAX_SURFACE_POINTS], count: 1 };
    }
    let half_length = transform.forward() * (config.model_dimensions.y * 0.5);
    let half_width = transform.right() * (config.model_dimensions.x * 0.5);
    SurfacePoints {
        points: [
            center + half_length,
            center - half_length - half_width,
            center - half_length + half_width,
        ],
        count: MAX_SURFACE_POINTS,
    }
}

/// Plane through three points as `(height at xy, pitch, roll)`.
fn fit_plane(points: &[Vec3; 3], center: Vec2, transform: &Transform) -> Option<(f32, f32, f32)> {
    let [a, b, c] = *points;
    let mut normal = (b - a).cross(c - a);
    if normal.z < 0.0 {
        normal = -normal;
    }
    let normal = normal.try_normalize()?;
    if normal.z < MIN_PLANE_NORMAL_Z {
        return None;
    }
    let z = a.z - (normal.x * (center.x - a.x) + normal.y * (center.y - a.y)) / normal.z;
    let pitch = (-normal.dot(transform.forward()) / normal.z).atan().to_degrees();
    let roll = (normal.dot(transform.right()) / normal.z).atan().to_degrees();
    Some((z, pitch, roll))
}

/// Owns the surfaces and every entity's clamp runtime data.
#[derive(Resource, Debug, Default)]
pub struct SurfaceClamper {
    sampler: SurfaceSampler,
    runtime: HashMap<EntityId, ClampRuntimeData>,
    eye_point: Option<Vec3>,
}

impl SurfaceClamper {
    pub fn new(sampler: SurfaceSampler) -> Self {
        Self { sampler, runtime: HashMap::new(), eye_point: None }
    }

    pub fn sampler(&self) -> &SurfaceSampler {
        &self.sampler
    }

    pub fn sampler_mut(&mut self) -> &mut SurfaceSampler {
        &mut self.sampler
    }

    /// Any ground source or a water surface is registered.
    pub fn has_valid_surface(&self) -> bool {
        self.sampler.has_ground() || self.sampler.has_water()
    }

    pub fn eye_point(&self) -> Option<Vec3> {
        self.eye_point
    }

    /// Observer position for high-res and ranged decisions.
    pub fn set_eye_point(&mut self, eye: Option<Vec3>) {
        self.eye_point = eye;
    }

    pub fn runtime_data(&self, entity: EntityId) -> Option<&ClampRuntimeData> {
        self.runtime.get(&entity)
    }

    pub fn runtime_count(&self) -> usize {
        self.runtime.len()
    }

    /// Drop an entity's runtime data.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.runtime.remove(&entity).is_some()
    }

    /// Whether `transform` differs from what the clamper last produced.
    pub fn transform_changed(&self, entity: EntityId, transform: &Transform) -> bool {
        self.runtime
            .get(&entity)
            .and_then(|data| data.last_output)
            .map_or(true, |last| last != *transform)
    }

    fn eye_distance_sq(&self, position: Vec3) -> f32 {
        self.eye_point.map_or(0.0, |eye| eye.distance_squared(position))
    }

    /// Clamp a single entity. Returns whether `transform` changed.
    #[allow(clippy::too_many_arguments)]
    pub fn clamp_to_ground(
        &mut self,
        entity: EntityId,
        clamp_type: ClampType,
        current_time: f64,
        transform: &mut Transform,
        config: &GroundClampConfig,
        domain: Domain,
        transform_changed: bool,
        velocity: Vec3,
    ) -> bool {
        let mut requests = [ClampRequest {
            entity,
            clamp_type,
            domain,
            config,
            transform: *transform,
            transform_changed,
            velocity,
            modified: false,
            bob_offset: 0.0,
        }];
        self.clamp_batch(current_time, &mut requests);
        *transform = requests[0].transform;
        requests[0].modified
    }

    /// Clamp many entities in one pass.
    pub fn clamp_batch(&mut self, current_time: f64, requests: &mut [ClampRequest<'_>]) {
        let plans: Vec<ClampPlan> = requests.iter().map(|r| self.plan(current_time, r)).collect();

        let reader: &Self = self;
        #[cfg(feature = "parallel")]
        let hits: Vec<ProbeHits> = plans.par_iter().map(|plan| reader.sample(plan)).collect();

        #[cfg(not(feature = "parallel"))]
        let hits: Vec<ProbeHits> = plans.iter().map(|plan| reader.sample(plan)).collect();

        for ((request, plan), hits) in requests.iter_mut().zip(&plans).zip(&hits) {
            request.modified = self.finalize(current_time, request, plan, hits);
        }
    }

    fn runtime_entry(&mut self, entity: EntityId, domain: Domain, config: &GroundClampConfig) -> &mut ClampRuntimeData {
        let data = self
            .runtime
            .entry(entity)
            .or_insert_with(|| ClampRuntimeData::new(entity, domain, config));
        if !data.is_compatible(domain, config) {
            log::warn!(
                "clamp data for entity {:?} built for {:?} no longer matches its configuration; rebuilding",
                entity,
                data.domain
            );
            *data = ClampRuntimeData::new(entity, domain, config);
        }
        data
    }

    fn plan(&mut self, current_time: f64, request: &ClampRequest<'_>) -> ClampPlan {
        if request.clamp_type == ClampType::None || request.domain == Domain::Space {
            return ClampPlan::Skip;
        }

        let position = request.transform.translation;
        let eye_distance_sq = self.eye_distance_sq(position);
        let config = request.config;

        // An idle entity is downgraded to Intermittent; it still clamps the way
        // its configured type does, only less often.
        let behavior = match request.clamp_type {
            ClampType::Intermittent => config.clamp_type,
            other => other,
        };
        let mode = match behavior {
            ClampType::KeepAbove => ClampMode::KeepAbove,
            ClampType::Ranged if eye_distance_sq > config.ranged_distance * config.ranged_distance => {
                ClampMode::KeepAbove
            }
            _ => ClampMode::Full,
        };

        let data = self.runtime_entry(request.entity, request.domain, config);
        if request.clamp_type == ClampType::Intermittent {
            if let (Some(last_time), Some(result)) = (data.last_sample_time, data.last_result) {
                if current_time - last_time < f64::from(config.intermittent_interval) {
                    return ClampPlan::Reuse { mode, result };
                }
            }
        }

        let high_res = eye_distance_sq <= config.high_res_range * config.high_res_range;
        ClampPlan::Sample {
            mode,
            probes: get_surface_points(&request.transform, config, high_res),
            domain: request.domain,
            policy: config.water_policy(request.domain),
        }
    }

    fn sample(&self, plan: &ClampPlan) -> ProbeHits {
        let mut hits = [None; MAX_SURFACE_POINTS];
        if let ClampPlan::Sample { probes, domain, policy, .. } = plan {
            for (hit, &point) in hits.iter_mut().zip(probes.as_slice()) {
                *hit = self.sampler.sample(point, Vec3::NEG_Z, *domain, *policy);
            }
        }
        hits
    }

    fn finalize(
        &mut self,
        current_time: f64,
        request: &mut ClampRequest<'_>,
        plan: &ClampPlan,
        hits: &ProbeHits,
    ) -> bool {
        request.bob_offset = 0.0;
        let (mode, probes) = match *plan {
            ClampPlan::Skip => return false,
            ClampPlan::Reuse { mode, result } => {
                let center_z = request.transform.translation.z;
                let modified = match restrict(mode, result, center_z) {
                    Some(applied) => {
                        request.bob_offset = applied.bob;
                        applied.apply(&mut request.transform)
                    }
                    None => false,
                };
                if let Some(data) = self.runtime.get_mut(&request.entity) {
                    data.last_output = Some(request.transform);
                }
                return modified;
            }
            ClampPlan::Sample { mode, probes, .. } => (mode, probes),
        };

        let config = request.config;
        let floats = config.floats(request.domain);
        let Some(data) = self.runtime.get_mut(&request.entity) else {
            return false;
        };

        let dt = data
            .last_sample_time
            .map_or(0.0, |last| (current_time - last).max(0.0) as f32);
        data.last_sample_time = Some(current_time);

        if hits[..probes.count].iter().all(Option::is_none) {
            log::trace!("no surface under entity {:?}; leaving it in place", request.entity);
            for point in data.points.iter_mut() {
                release_point(point);
            }
            data.last_result = None;
            data.last_output = Some(request.transform);
            return false;
        }

        if data.active_points != probes.count {
            // Point layout changed: old contact state belongs to other probes.
            data.points = [SurfacePointData::default(); MAX_SURFACE_POINTS];
            data.active_points = probes.count;
        }
        finalize_surface_points(data, floats, &hits[..probes.count], dt);

        // Heights come from the surface itself; the bobbing point positions
        // only contribute the drawn offset.
        let contacts: Vec<Vec3> = hits[..probes.count].iter().flatten().map(|hit| hit.point).collect();
        let drawn_z: f32 = data.points[..probes.count]
            .iter()
            .filter(|p| p.in_contact)
            .map(|p| p.position.z)
            .sum();
        let count = contacts.len() as f32;
        let still_z = contacts.iter().map(|p| p.z).sum::<f32>() / count;
        let bob = drawn_z / count - still_z;

        let center = request.transform.translation;
        let fitted = if contacts.len() == MAX_SURFACE_POINTS {
            fit_plane(&[contacts[0], contacts[1], contacts[2]], center.truncate(), &request.transform)
        } else {
            None
        };
        let (surface_z, tilt) = match fitted {
            Some((z, pitch, roll)) => (z, Some((pitch, roll))),
            None => (still_z, None),
        };

        let mut target_z = surface_z + config.ground_offset;
        if let (Some(step), Some(previous)) = (config.max_vertical_step, data.last_result) {
            target_z = target_z.clamp(previous.z - step, previous.z + step);
        }
        let target = ClampResult { z: target_z, tilt, bob };
        data.last_result = Some(target);

        let modified = match restrict(mode, target, center.z) {
            Some(applied) => {
                request.bob_offset = applied.bob;
                applied.apply(&mut request.transform)
            }
            None => false,
        };
        data.last_output = Some(request.transform);

        if data.debug {
            log::debug!(
                "clamp {:?} mode={:?} changed={} speed={:.2} points={} contacts={} z={:.3} bob={:.3} tilt={:?}",
                request.entity,
                mode,
                request.transform_changed,
                request.velocity.length(),
                probes.count,
                contacts.len(),
                request.transform.translation.z,
                request.bob_offset,
                tilt
            );
        }
        modified
    }
}

/// The part of a surface target that `mode` applies to an entity at
/// `center_z`. Keep-above only lifts and never tilts.
fn restrict(mode: ClampMode, target: ClampResult, center_z: f32) -> Option<ClampResult> {
    match mode {
        ClampMode::Full => Some(target),
        ClampMode::KeepAbove if center_z < target.z => Some(ClampResult { tilt: None, ..target }),
        ClampMode::KeepAbove => None,
    }
}

/// Forget contact and bobbing state for a point that lost its surface.
fn release_point(point: &mut SurfacePointData) {
    point.in_contact = false;
    point.floating = false;
    point.velocity = 0.0;
}

/// Record probe hits into the runtime points, bobbing water contacts when the
/// entity floats.
pub fn finalize_surface_points(data: &mut ClampRuntimeData, floats: bool, hits: &[Option<SurfaceHit>], dt: f32) {
    let buoyancy = data.buoyancy;
    for (point, hit) in data.points.iter_mut().zip(hits) {
        let Some(hit) = hit else {
            release_point(point);
            continue;
        };
        point.in_contact = true;
        point.normal = hit.normal;
        point.is_solid = hit.kind == SurfaceKind::Ground;
        point.position.x = hit.point.x;
        point.position.y = hit.point.y;

        if floats && hit.kind == SurfaceKind::Water {
            update_point_buoyancy(&buoyancy, point, hit.point.z, dt);
        } else {
            point.position.z = hit.point.z;
            point.velocity = 0.0;
            point.floating = false;
        }
        point.last_clamp_point = point.position;
    }
}
