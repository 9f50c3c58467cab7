use crate::frame::Crop;

/// Flattened crop: R,G,B per pixel, row-major, raw 0..=255 intensities.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn from_crop(crop: &Crop) -> Self {
        Self(crop.pixels().iter().map(|&v| v as f32).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Squared Euclidean distance, accumulated in f64.
    ///
    /// Both vectors must have the same length.
    pub fn squared_distance(&self, other: &FeatureVector) -> f64 {
        debug_assert_eq!(self.len(), other.len());
        self.0
            .iter()
            .zip(&other.0)
            .map(|(&a, &b)| {
                let d = a as f64 - b as f64;
                d * d
            })
            .sum()
    }

    pub fn distance(&self, other: &FeatureVector) -> f64 {
        self.squared_distance(other).sqrt()
    }
}
