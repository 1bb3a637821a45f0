//! Surface point sampling against ground and water.
//!
//! The sampler answers one question: given a point and a vertical probe, which
//! surface should the point rest on? Ground collision is queried through
//! [`GroundQuery`] (any number of sources, e.g. a terrain heightmap plus a
//! bridge deck), water through a single optional [`WaterQuery`].
//!
//! Sampling is read-only, so one sampler can serve every entity in a tick,
//! including from several threads at once.

use crate::components::Domain;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Default half-length of the probe segment cast through a sample point.
pub const DEFAULT_PROBE_LENGTH: f32 = 100.0;

/// Which kind of surface produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceKind {
    Ground,
    Water,
}

/// A single surface intersection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub kind: SurfaceKind,
}

impl SurfaceHit {
    pub fn ground(point: Vec3, normal: Vec3) -> Self {
        Self { point, normal, kind: SurfaceKind::Ground }
    }

    pub fn water(point: Vec3, normal: Vec3) -> Self {
        Self { point, normal, kind: SurfaceKind::Water }
    }

    /// Vertical distance from this hit to a height.
    #[inline]
    pub fn height_distance(&self, z: f32) -> f32 {
        (self.point.z - z).abs()
    }
}

/// Terrain/static collision that can be intersected by a segment.
pub trait GroundQuery: Send + Sync {
    /// Push every intersection of the segment `start..end` into `hits`.
    fn ray_hits(&self, start: Vec3, end: Vec3, hits: &mut Vec<SurfaceHit>);
}

/// A water surface described as a height function over the XY plane.
pub trait WaterQuery: Send + Sync {
    /// Water height at `(x, y)`, or `None` where there is no water.
    fn height_at(&self, x: f32, y: f32) -> Option<f32>;

    /// Surface normal at `(x, y)`.
    fn normal_at(&self, _x: f32, _y: f32) -> Vec3 {
        Vec3::Z
    }

    /// Advance any time-dependent state (waves).
    fn advance(&mut self, _dt: f32) {}
}

/// How water competes with ground when both produce a hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterPolicy {
    /// Always take the water hit when there is one.
    pub force_clamp: bool,
    /// Flip the closest-surface comparison (submersibles).
    pub clamp_from_underneath: bool,
}

/// Level water, optionally limited to a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatWater {
    pub level: f32,
    /// `(min, max)` corners of the covered area; unbounded if `None`.
    pub bounds: Option<([f32; 2], [f32; 2])>,
}

impl FlatWater {
    pub fn new(level: f32) -> Self {
        Self { level, bounds: None }
    }

    pub fn bounded(level: f32, min: [f32; 2], max: [f32; 2]) -> Self {
        Self { level, bounds: Some((min, max)) }
    }
}

impl WaterQuery for FlatWater {
    fn height_at(&self, x: f32, y: f32) -> Option<f32> {
        match self.bounds {
            Some((min, max)) if x < min[0] || y < min[1] || x > max[0] || y > max[1] => None,
            _ => Some(self.level),
        }
    }
}

/// One directional sine wave of an [`OceanSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    pub amplitude: f32,
    pub wavelength: f32,
    /// Phase speed in world units per second.
    pub speed: f32,
    /// Heading of travel in degrees (0 = +Y).
    pub direction_deg: f32,
}

impl Wave {
    #[inline]
    fn direction(&self) -> (f32, f32) {
        let h = self.direction_deg.to_radians();
        (-h.sin(), h.cos())
    }

    #[inline]
    fn wavenumber(&self) -> f32 {
        std::f32::consts::TAU / self.wavelength.max(f32::EPSILON)
    }
}

/// Open water whose height is a sum of travelling sine waves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OceanSurface {
    pub base_level: f32,
    pub waves: Vec<Wave>,
    /// Wave clock in seconds.
    pub time: f32,
}

impl OceanSurface {
    pub fn new(base_level: f32) -> Self {
        Self { base_level, waves: Vec::new(), time: 0.0 }
    }

    pub fn with_wave(mut self, wave: Wave) -> Self {
        self.waves.push(wave);
        self
    }

    fn phase(&self, wave: &Wave, x: f32, y: f32) -> f32 {
        let (dx, dy) = wave.direction();
        let k = wave.wavenumber();
        k * (dx * x + dy * y - wave.speed * self.time)
    }
}

impl WaterQuery for OceanSurface {
    fn height_at(&self, x: f32, y: f32) -> Option<f32> {
        let offset: f32 = self
            .waves
            .iter()
            .map(|w| w.amplitude * self.phase(w, x, y).sin())
            .sum();
        Some(self.base_level + offset)
    }

    fn normal_at(&self, x: f32, y: f32) -> Vec3 {
        // Gradient of the height field: d/dx and d/dy of sum(a * sin(phase)).
        let (mut gx, mut gy) = (0.0, 0.0);
        for w in &self.waves {
            let (dx, dy) = w.direction();
            let slope = w.amplitude * w.wavenumber() * self.phase(w, x, y).cos();
            gx += slope * dx;
            gy += slope * dy;
        }
        Vec3::new(-gx, -gy, 1.0).normalize()
    }

    fn advance(&mut self, dt: f32) {
        self.time += dt;
    }
}

/// Read-only access to every registered surface.
pub struct SurfaceSampler {
    ground: Vec<Box<dyn GroundQuery>>,
    water: Option<Box<dyn WaterQuery>>,
    probe_length: f32,
}

impl std::fmt::Debug for SurfaceSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceSampler")
            .field("ground_sources", &self.ground.len())
            .field("has_water", &self.water.is_some())
            .field("probe_length", &self.probe_length)
            .finish()
    }
}

impl Default for SurfaceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceSampler {
    pub fn new() -> Self {
        Self::with_probe_length(DEFAULT_PROBE_LENGTH)
    }

    pub fn with_probe_length(probe_length: f32) -> Self {
        Self { ground: Vec::new(), water: None, probe_length }
    }

    pub fn probe_length(&self) -> f32 {
        self.probe_length
    }

    pub fn set_probe_length(&mut self, probe_length: f32) {
        self.probe_length = probe_length;
    }

    /// Register an additional ground collision source.
    pub fn add_ground(&mut self, ground: Box<dyn GroundQuery>) {
        self.ground.push(ground);
    }

    /// Replace all ground sources with a single one.
    pub fn set_ground(&mut self, ground: Box<dyn GroundQuery>) {
        self.ground.clear();
        self.ground.push(ground);
    }

    pub fn clear_ground(&mut self) {
        self.ground.clear();
    }

    /// Register (or clear) the water surface.
    pub fn set_water(&mut self, water: Option<Box<dyn WaterQuery>>) {
        self.water = water;
    }

    pub fn water(&self) -> Option<&dyn WaterQuery> {
        self.water.as_deref()
    }

    pub fn has_ground(&self) -> bool {
        !self.ground.is_empty()
    }

    pub fn has_water(&self) -> bool {
        self.water.is_some()
    }

    /// Advance time-dependent surfaces.
    pub fn advance(&mut self, dt: f32) {
        if let Some(water) = self.water.as_deref_mut() {
            water.advance(dt);
        }
    }

    /// Ground hit closest in height to `point.z` along the probe.
    pub fn ground_hit(&self, point: Vec3, probe_direction: Vec3) -> Option<SurfaceHit> {
        if self.ground.is_empty() {
            return None;
        }
        let dir = probe_direction.try_normalize().unwrap_or(Vec3::NEG_Z);
        let start = point - dir * self.probe_length;
        let end = point + dir * self.probe_length;

        let mut hits = Vec::new();
        for source in &self.ground {
            source.ray_hits(start, end, &mut hits);
        }

        hits.into_iter().min_by(|a, b| {
            a.height_distance(point.z)
                .total_cmp(&b.height_distance(point.z))
        })
    }

    /// Water hit directly above or below `point`.
    pub fn water_hit(&self, point: Vec3) -> Option<SurfaceHit> {
        let water = self.water.as_deref()?;
        let height = water.height_at(point.x, point.y)?;
        Some(SurfaceHit::water(
            Vec3::new(point.x, point.y, height),
            water.normal_at(point.x, point.y),
        ))
    }

    /// Best surface for `point` under the domain filter and water policy.
    pub fn sample(
        &self,
        point: Vec3,
        probe_direction: Vec3,
        domain: Domain,
        policy: WaterPolicy,
    ) -> Option<SurfaceHit> {
        if domain == Domain::Space {
            return None;
        }
        let ground = if domain.samples_ground() {
            self.ground_hit(point, probe_direction)
        } else {
            None
        };
        if !domain.samples_water() {
            return ground;
        }
        resolve_water(point.z, ground, self.water_hit(point), policy)
    }
}

/// Choose between a ground and a water hit for an object at height `z`.
pub fn resolve_water(
    z: f32,
    ground: Option<SurfaceHit>,
    water: Option<SurfaceHit>,
    policy: WaterPolicy,
) -> Option<SurfaceHit> {
    match (ground, water) {
        (None, None) => None,
        (Some(g), None) => Some(g),
        (None, Some(w)) => Some(w),
        (Some(_), Some(w)) if policy.force_clamp => Some(w),
        (Some(g), Some(w)) => {
            let to_ground = g.height_distance(z);
            let to_water = w.height_distance(z);
            let water_wins = if policy.clamp_from_underneath {
                to_water >= to_ground
            } else {
                to_water < to_ground
            };
            Some(if water_wins { w } else { g })
        }
    }
}
