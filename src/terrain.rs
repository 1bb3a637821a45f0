//! Terrain heightmap used as ground collision.
//!
//! The terrain is a grid of height samples placed at cell centers. Heights
//! between samples are bilinearly interpolated. Points outside the loaded
//! extent have no height, which lets the clamper leave entities alone at the
//! edge of streamed terrain instead of dropping them to a default level.

use crate::error::SimError;
use crate::surface::{GroundQuery, SurfaceHit};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Iterations used to refine a crossing found while marching a slanted probe.
const BISECT_ITERATIONS: usize = 16;

/// A single cell in the terrain grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainCell {
    /// Height at this cell's center (0.0 = sea level).
    pub height: f32,
}

/// Grid-based terrain heightmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainGrid {
    /// Width of the grid in cells.
    pub width: usize,
    /// Height of the grid in cells.
    pub height: usize,
    /// Size of each cell in world units.
    pub cell_size: f32,
    /// Origin offset (world position of the corner of cell 0,0).
    pub origin_x: f32,
    pub origin_y: f32,
    /// Grid cells (row-major order).
    pub cells: Vec<TerrainCell>,
}

impl TerrainGrid {
    /// Create a flat terrain grid centered on the world origin.
    pub fn new(width: usize, height: usize, cell_size: f32) -> Self {
        let origin_x = -(width as f32 * cell_size) / 2.0;
        let origin_y = -(height as f32 * cell_size) / 2.0;

        Self {
            width,
            height,
            cell_size,
            origin_x,
            origin_y,
            cells: vec![TerrainCell::default(); width * height],
        }
    }

    /// Create a grid from row-major height samples.
    pub fn from_heights(
        width: usize,
        height: usize,
        cell_size: f32,
        heights: &[f32],
    ) -> Result<Self, SimError> {
        if heights.len() != width * height {
            return Err(SimError::InvalidConfig(format!(
                "terrain expects {} height samples, got {}",
                width * height,
                heights.len()
            )));
        }
        if width == 0 || height == 0 || cell_size <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "terrain dimensions must be positive ({width}x{height}, cell {cell_size})"
            )));
        }
        let mut grid = Self::new(width, height, cell_size);
        for (cell, &h) in grid.cells.iter_mut().zip(heights) {
            cell.height = h;
        }
        Ok(grid)
    }

    /// Create a grid by evaluating `f(world_x, world_y)` at every cell center.
    pub fn from_fn(width: usize, height: usize, cell_size: f32, f: impl Fn(f32, f32) -> f32) -> Self {
        let mut grid = Self::new(width, height, cell_size);
        for gy in 0..height {
            for gx in 0..width {
                let (wx, wy) = grid.grid_to_world(gx, gy);
                if let Some(cell) = grid.get_cell_mut(gx, gy) {
                    cell.height = f(wx, wy);
                }
            }
        }
        grid
    }

    /// Move the grid so its cell-0 corner sits at `(x, y)`.
    pub fn with_origin(mut self, x: f32, y: f32) -> Self {
        self.origin_x = x;
        self.origin_y = y;
        self
    }

    /// Set every cell to the same height.
    pub fn fill_height(&mut self, height: f32) {
        for cell in &mut self.cells {
            cell.height = height;
        }
    }

    /// Get the cell index for grid coordinates.
    fn cell_index(&self, x: usize, y: usize) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    /// Get a cell by grid coordinates.
    pub fn get_cell(&self, x: usize, y: usize) -> Option<&TerrainCell> {
        self.cell_index(x, y).map(|i| &self.cells[i])
    }

    /// Get a mutable cell by grid coordinates.
    pub fn get_cell_mut(&mut self, x: usize, y: usize) -> Option<&mut TerrainCell> {
        self.cell_index(x, y).map(|i| &mut self.cells[i])
    }

    /// Convert world coordinates to grid coordinates, `None` off the grid.
    pub fn world_to_grid(&self, world_x: f32, world_y: f32) -> Option<(usize, usize)> {
        if !self.contains(world_x, world_y) {
            return None;
        }
        let gx = ((world_x - self.origin_x) / self.cell_size).floor() as usize;
        let gy = ((world_y - self.origin_y) / self.cell_size).floor() as usize;
        Some((gx.min(self.width - 1), gy.min(self.height - 1)))
    }

    /// Convert grid coordinates to world coordinates (center of cell).
    pub fn grid_to_world(&self, gx: usize, gy: usize) -> (f32, f32) {
        let world_x = self.origin_x + (gx as f32 + 0.5) * self.cell_size;
        let world_y = self.origin_y + (gy as f32 + 0.5) * self.cell_size;
        (world_x, world_y)
    }

    /// Whether a world position lies on the loaded grid. An empty grid
    /// contains nothing.
    pub fn contains(&self, world_x: f32, world_y: f32) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let (min_x, min_y, max_x, max_y) = self.get_bounds();
        world_x >= min_x && world_y >= min_y && world_x <= max_x && world_y <= max_y
    }

    fn sample(&self, gx: isize, gy: isize) -> f32 {
        let gx = gx.clamp(0, self.width as isize - 1) as usize;
        let gy = gy.clamp(0, self.height as isize - 1) as usize;
        self.cells[gy * self.width + gx].height
    }

    /// Height at a world position (bilinear between cell centers).
    pub fn get_height_at(&self, world_x: f32, world_y: f32) -> Option<f32> {
        if self.cells.is_empty() || !self.contains(world_x, world_y) {
            return None;
        }
        // Continuous grid coordinates relative to cell centers.
        let fx = (world_x - self.origin_x) / self.cell_size - 0.5;
        let fy = (world_y - self.origin_y) / self.cell_size - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as isize, y0 as isize);

        let h00 = self.sample(x0, y0);
        let h10 = self.sample(x0 + 1, y0);
        let h01 = self.sample(x0, y0 + 1);
        let h11 = self.sample(x0 + 1, y0 + 1);

        let bottom = h00 + (h10 - h00) * tx;
        let top = h01 + (h11 - h01) * tx;
        Some(bottom + (top - bottom) * ty)
    }

    /// Surface normal from central differences of the height field.
    pub fn get_normal_at(&self, world_x: f32, world_y: f32) -> Vec3 {
        let step = self.cell_size * 0.5;
        let center = self.get_height_at(world_x, world_y).unwrap_or(0.0);
        let h = |x: f32, y: f32| self.get_height_at(x, y).unwrap_or(center);

        let dhdx = (h(world_x + step, world_y) - h(world_x - step, world_y)) / (2.0 * step);
        let dhdy = (h(world_x, world_y + step) - h(world_x, world_y - step)) / (2.0 * step);
        Vec3::new(-dhdx, -dhdy, 1.0).normalize()
    }

    /// Get world bounds.
    pub fn get_bounds(&self) -> (f32, f32, f32, f32) {
        let min_x = self.origin_x;
        let min_y = self.origin_y;
        let max_x = self.origin_x + self.width as f32 * self.cell_size;
        let max_y = self.origin_y + self.height as f32 * self.cell_size;
        (min_x, min_y, max_x, max_y)
    }

    /// Signed height of the segment point above the terrain.
    fn clearance(&self, p: Vec3) -> Option<f32> {
        self.get_height_at(p.x, p.y).map(|h| p.z - h)
    }

    fn hit_at(&self, p: Vec3) -> Option<SurfaceHit> {
        let h = self.get_height_at(p.x, p.y)?;
        Some(SurfaceHit::ground(Vec3::new(p.x, p.y, h), self.get_normal_at(p.x, p.y)))
    }
}

impl GroundQuery for TerrainGrid {
    fn ray_hits(&self, start: Vec3, end: Vec3, hits: &mut Vec<SurfaceHit>) {
        let delta = end - start;
        let horizontal = delta.truncate().length();

        // Vertical probes hit a heightfield at most once.
        if horizontal <= self.cell_size * 1e-3 {
            if let Some(hit) = self.hit_at(start) {
                let (lo, hi) = if start.z <= end.z { (start.z, end.z) } else { (end.z, start.z) };
                if hit.point.z >= lo && hit.point.z <= hi {
                    hits.push(hit);
                }
            }
            return;
        }

        // Slanted probes: march at half-cell resolution and bisect each crossing.
        let steps = ((horizontal / (self.cell_size * 0.5)).ceil() as usize).max(1);
        let at = |t: f32| start + delta * t;
        let mut prev_t = 0.0;
        let mut prev = self.clearance(start);

        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            let cur = self.clearance(at(t));
            if let (Some(a), Some(b)) = (prev, cur) {
                if a == 0.0 || a.signum() != b.signum() {
                    let (mut lo, mut hi) = (prev_t, t);
                    let mut lo_sign = a.signum();
                    for _ in 0..BISECT_ITERATIONS {
                        let mid = 0.5 * (lo + hi);
                        match self.clearance(at(mid)) {
                            Some(c) if c.signum() == lo_sign => {
                                lo = mid;
                                lo_sign = c.signum();
                            }
                            Some(_) => hi = mid,
                            None => break,
                        }
                    }
                    if let Some(hit) = self.hit_at(at(0.5 * (lo + hi))) {
                        hits.push(hit);
                    }
                }
            }
            prev = cur;
            prev_t = t;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_terrain_grid_creation() {
        let grid = TerrainGrid::new(100, 100, 2.0);
        assert_eq!(grid.width, 100);
        assert_eq!(grid.height, 100);
        assert_eq!(grid.cells.len(), 10000);
    }

    #[test]
    fn test_world_to_grid() {
        let grid = TerrainGrid::new(100, 100, 2.0);
        // Origin should be at (-100, -100)
        assert_eq!(grid.world_to_grid(0.0, 0.0), Some((50, 50)));
        assert_eq!(grid.world_to_grid(-101.0, 0.0), None);
    }

    #[test]
    fn test_from_heights_rejects_wrong_length() {
        let result = TerrainGrid::from_heights(4, 4, 1.0, &[0.0; 15]);
        assert!(matches!(result, Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_height_is_interpolated() {
        // Height equals world x: interpolation should reproduce it exactly inside.
        let grid = TerrainGrid::from_fn(20, 20, 1.0, |x, _| x);
        assert_abs_diff_eq!(grid.get_height_at(0.25, 3.0).unwrap(), 0.25, epsilon = 1e-4);
        assert_abs_diff_eq!(grid.get_height_at(-4.6, -2.0).unwrap(), -4.6, epsilon = 1e-4);
    }

    #[test]
    fn test_height_off_grid_is_none() {
        let grid = TerrainGrid::new(10, 10, 1.0);
        assert!(grid.get_height_at(5.5, 0.0).is_none());
        assert!(grid.get_height_at(0.0, 0.0).is_some());
    }

    #[test]
    fn test_slope_normal() {
        let grid = TerrainGrid::from_fn(20, 20, 1.0, |x, _| x);
        let n = grid.get_normal_at(0.0, 0.0);
        let expected = Vec3::new(-1.0, 0.0, 1.0).normalize();
        assert_abs_diff_eq!(n.x, expected.x, epsilon = 1e-4);
        assert_abs_diff_eq!(n.z, expected.z, epsilon = 1e-4);
    }

    #[test]
    fn test_vertical_ray_hit() {
        let mut grid = TerrainGrid::new(10, 10, 1.0);
        grid.fill_height(2.0);
        let mut hits = Vec::new();
        grid.ray_hits(Vec3::new(0.0, 0.0, 50.0), Vec3::new(0.0, 0.0, -50.0), &mut hits);
        assert_eq!(hits.len(), 1);
        assert_abs_diff_eq!(hits[0].point.z, 2.0, epsilon = 1e-6);

        // Segment entirely above the ground misses.
        hits.clear();
        grid.ray_hits(Vec3::new(0.0, 0.0, 50.0), Vec3::new(0.0, 0.0, 10.0), &mut hits);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_slanted_ray_hit() {
        let mut grid = TerrainGrid::new(40, 40, 1.0);
        grid.fill_height(0.0);
        let mut hits = Vec::new();
        grid.ray_hits(Vec3::new(-5.0, 0.0, 5.0), Vec3::new(5.0, 0.0, -5.0), &mut hits);
        assert_eq!(hits.len(), 1);
        assert_abs_diff_eq!(hits[0].point.x, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(hits[0].point.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_grid_has_no_cells() {
        let grid = TerrainGrid::new(0, 0, 1.0);
        assert!(!grid.contains(0.0, 0.0));
        assert_eq!(grid.world_to_grid(0.0, 0.0), None);
        assert_eq!(grid.get_height_at(0.0, 0.0), None);
        assert_eq!(grid.get_normal_at(0.0, 0.0), Vec3::Z);

        let mut hits = Vec::new();
        grid.ray_hits(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -10.0), &mut hits);
        assert!(hits.is_empty());
    }
}
