use anyhow::Result;

use super::backend::RegionDetector;
use super::hough::{find_circles, Circle};
use super::params::DetectorParams;
use crate::frame::{BoundingBox, Frame, Region};

/// Circular sign detector: intensity, Gaussian blur, gradient Hough search.
///
/// When several circles are found the first one returned by the search wins
/// (most accumulator votes, then scan order). There is no further ranking.
#[derive(Clone, Debug)]
pub struct CircleDetector {
    params: DetectorParams,
}

impl CircleDetector {
    pub fn new(params: DetectorParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Every circle candidate, strongest first.
    pub fn detect_all(&self, frame: &Frame) -> Vec<Circle> {
        let gray = frame.to_luma();
        let smoothed = image::imageops::blur(&gray, self.params.blur_sigma);
        find_circles(&smoothed, &self.params)
    }

    /// First candidate, expanded by the margin and clipped to the frame.
    pub fn detect(&self, frame: &Frame) -> Option<Region> {
        let circles = self.detect_all(frame);
        let first = circles.first()?;
        if circles.len() > 1 {
            log::debug!("{} circle candidates, keeping the first", circles.len());
        }
        let bbox = BoundingBox::around_circle(
            first.x,
            first.y,
            first.radius,
            self.params.margin,
            frame.width(),
            frame.height(),
        )?;
        Some(Region {
            center_x: first.x,
            center_y: first.y,
            radius: first.radius,
            bbox,
        })
    }
}

impl RegionDetector for CircleDetector {
    fn name(&self) -> &'static str {
        "hough-circle"
    }

    fn detect(&mut self, frame: &Frame) -> Option<Region> {
        CircleDetector::detect(self, frame)
    }
}
