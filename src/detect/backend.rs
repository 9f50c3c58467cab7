use crate::frame::{Frame, Region};

/// Locates the region of interest in a frame.
///
/// The control loop only depends on this trait, so the Hough detector can be
/// swapped for a fixed or scripted detector in tests and bring-up runs.
///
/// Implementations must treat the frame as read-only and must not keep it
/// beyond the `detect` call.
pub trait RegionDetector {
    /// Detector identifier (for logs).
    fn name(&self) -> &'static str;

    /// Locate one region, or `None` when nothing usable is in view.
    ///
    /// A returned region always has a non-empty box inside the frame.
    fn detect(&mut self, frame: &Frame) -> Option<Region>;
}

impl<D: RegionDetector + ?Sized> RegionDetector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Option<Region> {
        (**self).detect(frame)
    }
}
