use anyhow::{anyhow, Result};
use serde::Deserialize;

/// Largest accepted `max_radius`, in pixels.
pub const MAX_RADIUS_LIMIT: u32 = 4096;

/// Tunables of the circle search.
///
/// Defaults match the thresholds the sign detector was tuned with on the
/// rover's camera; deployments override them through configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorParams {
    /// Inverse accumulator resolution: 1.0 votes per pixel, 2.0 per 2×2 block.
    pub dp: f32,
    /// Minimum distance between accepted circle centers, in pixels.
    pub min_dist: f32,
    /// Upper hysteresis threshold of the edge detector (lower is half).
    pub edge_threshold: f32,
    /// Votes an accumulator cell (and a radius) needs to count as a circle.
    pub center_threshold: u32,
    pub min_radius: u32,
    pub max_radius: u32,
    /// Gaussian smoothing applied to the intensity image before edge detection.
    pub blur_sigma: f32,
    /// Pixels added around the circle when cutting the crop.
    pub margin: u32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            dp: 1.2,
            min_dist: 25.0,
            edge_threshold: 80.0,
            center_threshold: 35,
            min_radius: 12,
            max_radius: 120,
            blur_sigma: 1.5,
            margin: 15,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.dp.is_finite() && self.dp > 0.0) {
            return Err(anyhow!("detector dp must be positive, got {}", self.dp));
        }
        if !(self.min_dist.is_finite() && self.min_dist >= 0.0) {
            return Err(anyhow!("detector min_dist must be >= 0"));
        }
        if !(self.edge_threshold.is_finite() && self.edge_threshold > 0.0) {
            return Err(anyhow!("detector edge_threshold must be positive"));
        }
        if self.center_threshold == 0 {
            return Err(anyhow!("detector center_threshold must be positive"));
        }
        if self.min_radius == 0 || self.min_radius > self.max_radius {
            return Err(anyhow!(
                "detector radius range [{}, {}] is invalid",
                self.min_radius,
                self.max_radius
            ));
        }
        if self.max_radius > MAX_RADIUS_LIMIT {
            return Err(anyhow!(
                "detector max_radius {} exceeds {}",
                self.max_radius,
                MAX_RADIUS_LIMIT
            ));
        }
        if !(self.blur_sigma.is_finite() && self.blur_sigma > 0.0) {
            return Err(anyhow!("detector blur_sigma must be positive"));
        }
        Ok(())
    }
}
