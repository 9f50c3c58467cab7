//! Frames, detected regions and fixed-size crops.
//!
//! - `Frame`: one decoded RGB image, immutable, owned for a single loop cycle.
//! - `Region`: a detected circle plus its margin-expanded, frame-clipped box.
//! - `Crop`: the region resampled to `CROP_SIZE`×`CROP_SIZE` by area averaging.
//!
//! `Frame` is not `Clone`: a cycle borrows it for detection and
//! cropping and drops it before the next capture.

use std::fmt;

use anyhow::{anyhow, Result};
use image::{GrayImage, Luma, RgbImage};

/// Side length of the square crop fed to the classifier.
pub const CROP_SIZE: u32 = 100;

/// Length of a flattened crop feature vector (R,G,B per pixel).
pub const CROP_FEATURE_LEN: usize = (CROP_SIZE * CROP_SIZE * 3) as usize;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Decoded RGB frame, row-major, channel-interleaved.
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero ({}x{})", width, height));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn from_rgb_image(image: RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Single-channel intensity image (ITU-R BT.601 weights).
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let [r, g, b] = self.pixel(x, y);
            let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            Luma([luma.round().clamp(0.0, 255.0) as u8])
        })
    }

    /// Resample `bbox` to `out_width`×`out_height` by area averaging.
    ///
    /// Each output pixel is the coverage-weighted mean of the source pixels its
    /// footprint overlaps, for both down- and up-scaling.
    fn resample_area(&self, bbox: &BoundingBox, out_width: u32, out_height: u32) -> Vec<u8> {
        let columns = area_weights(bbox.x0, bbox.width(), out_width);
        let rows = area_weights(bbox.y0, bbox.height(), out_height);
        let norm = (bbox.width() as f32 / out_width as f32)
            * (bbox.height() as f32 / out_height as f32);

        let mut out = Vec::with_capacity((out_width * out_height * 3) as usize);
        for row in &rows {
            for column in &columns {
                let mut acc = [0f32; 3];
                for &(sy, wy) in row {
                    for &(sx, wx) in column {
                        let px = self.pixel(sx, sy);
                        let w = wx * wy;
                        acc[0] += px[0] as f32 * w;
                        acc[1] += px[1] as f32 * w;
                        acc[2] += px[2] as f32 * w;
                    }
                }
                for value in acc {
                    out.push((value / norm).round().clamp(0.0, 255.0) as u8);
                }
            }
        }
        out
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Source pixel indices and coverage for each output cell along one axis.
fn area_weights(start: u32, span: u32, out: u32) -> Vec<Vec<(u32, f32)>> {
    let scale = span as f64 / out as f64;
    (0..out)
        .map(|i| {
            let lo = i as f64 * scale;
            let hi = lo + scale;
            let first = lo.floor() as u32;
            let last = (hi.ceil() as u32).min(span);
            (first..last)
                .filter_map(|s| {
                    let cover = (hi.min(s as f64 + 1.0) - lo.max(s as f64)) as f32;
                    (cover > 1e-6).then_some((start + s, cover))
                })
                .collect()
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Region
// ----------------------------------------------------------------------------

/// Half-open pixel box: `x0 <= x < x1`, `y0 <= y < y1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoundingBox {
    /// Square around a circle, expanded by `margin` and clipped to the frame.
    ///
    /// Center and radius are rounded to whole pixels first. Returns `None`
    /// when the clipped box has zero area.
    pub fn around_circle(
        center_x: f32,
        center_y: f32,
        radius: f32,
        margin: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let cx = center_x.round() as i64;
        let cy = center_y.round() as i64;
        let reach = radius.round().max(0.0) as i64 + margin as i64;

        let x0 = (cx - reach).clamp(0, frame_width as i64);
        let y0 = (cy - reach).clamp(0, frame_height as i64);
        let x1 = (cx + reach).clamp(0, frame_width as i64);
        let y1 = (cy + reach).clamp(0, frame_height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x0: x0 as u32,
            y0: y0 as u32,
            x1: x1 as u32,
            y1: y1 as u32,
        })
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// A detected circular area of interest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
    pub bbox: BoundingBox,
}

// ----------------------------------------------------------------------------
// Crop
// ----------------------------------------------------------------------------

/// `CROP_SIZE`×`CROP_SIZE` RGB patch handed to the classifier.
pub struct Crop {
    data: Vec<u8>,
}

impl Crop {
    /// Cut `region` out of `frame` and resample it to the crop size.
    pub fn extract(frame: &Frame, region: &Region) -> Self {
        Self {
            data: frame.resample_area(&region.bbox, CROP_SIZE, CROP_SIZE),
        }
    }

    /// Resample a whole frame (reference images are stored pre-cropped).
    pub fn from_frame(frame: &Frame) -> Self {
        let bbox = BoundingBox {
            x0: 0,
            y0: 0,
            x1: frame.width(),
            y1: frame.height(),
        };
        Self {
            data: frame.resample_area(&bbox, CROP_SIZE, CROP_SIZE),
        }
    }

    pub fn width(&self) -> u32 {
        CROP_SIZE
    }

    pub fn height(&self) -> u32 {
        CROP_SIZE
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crop")
            .field("size", &CROP_SIZE)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Frame::new(data, width, height).unwrap()
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0; 10], 2, 2).is_err());
        assert!(Frame::new(Vec::new(), 0, 4).is_err());
        assert!(Frame::new(vec![0; 12], 2, 2).is_ok());
    }

    #[test]
    fn box_is_clipped_to_frame() {
        let bbox = BoundingBox::around_circle(5.0, 290.0, 40.0, 15, 300, 300).unwrap();
        assert_eq!(bbox.x0, 0);
        assert_eq!(bbox.y1, 300);
        assert_eq!(bbox.x1, 60);
        assert_eq!(bbox.y0, 235);
    }

    #[test]
    fn box_outside_frame_is_absent() {
        assert!(BoundingBox::around_circle(-100.0, 50.0, 10.0, 15, 300, 300).is_none());
        assert!(BoundingBox::around_circle(50.0, 400.0, 10.0, 15, 300, 300).is_none());
    }

    #[test]
    fn area_resample_preserves_flat_color() {
        let frame = solid(37, 53, [10, 200, 90]);
        let crop = Crop::from_frame(&frame);
        assert_eq!(crop.pixels().len(), CROP_FEATURE_LEN);
        assert!(crop.pixels().chunks(3).all(|px| px == [10, 200, 90]));
    }

    #[test]
    fn area_resample_averages_blocks() {
        // 200x100 frame, left half black, right half white, downsampled 2:1 horizontally.
        let mut data = Vec::new();
        for _y in 0..100 {
            for x in 0..200 {
                let v = if x < 100 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let frame = Frame::new(data, 200, 100).unwrap();
        let crop = Crop::from_frame(&frame);
        let px = |x: usize, y: usize| crop.pixels()[(y * 100 + x) * 3];
        assert_eq!(px(0, 0), 0);
        assert_eq!(px(49, 50), 0);
        assert_eq!(px(50, 50), 255);
        assert_eq!(px(99, 99), 255);
    }

    #[test]
    fn extract_uses_region_box() {
        let mut data = vec![0u8; 300 * 300 * 3];
        for y in 100..200 {
            for x in 100..200 {
                let idx = (y * 300 + x) * 3;
                data[idx] = 255;
            }
        }
        let frame = Frame::new(data, 300, 300).unwrap();
        let region = Region {
            center_x: 150.0,
            center_y: 150.0,
            radius: 50.0,
            bbox: BoundingBox {
                x0: 100,
                y0: 100,
                x1: 200,
                y1: 200,
            },
        };
        let crop = Crop::extract(&frame, &region);
        assert!(crop.pixels().chunks(3).all(|px| px == [255, 0, 0]));
    }
}
