//! Frame ingestion sources.
//!
//! Every source hands out decoded RGB frames, one per control cycle:
//! - `stub://blank`, `stub://sign`, `stub://alternate`: synthetic frames (tests, bench runs)
//! - a local path: one still image re-read every cycle, or a directory of stills cycled in order
//! - `rpicam://`: a still captured by the `rpicam-still` command, then decoded
//!
//! A failed capture is reported as an error for that cycle only; the control
//! loop treats it like a frame with nothing in it.

mod file;
mod still;
mod stub;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use file::{read_frame, FileSource};
pub use still::{CameraSettings, StillCamera};
pub use stub::{StubScene, StubSource};

/// Image extensions the file source and dataset loader decode.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// A blocking producer of frames.
pub trait FrameSource {
    /// Prepare the source; called once before the first frame.
    fn connect(&mut self) -> Result<()>;

    /// Capture and decode the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        (**self).next_frame()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Counters for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub source: String,
    pub frames_captured: u64,
    pub failures: u64,
}

/// Open the source named by `uri`.
pub fn open_source(uri: &str, camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(anyhow!("frame source must not be empty"));
    }
    if uri.starts_with("stub://") {
        return Ok(Box::new(StubSource::new(uri)?));
    }
    if uri.starts_with("rpicam://") {
        return Ok(Box::new(StillCamera::new(camera.clone())?));
    }
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    if path.contains("://") {
        return Err(anyhow!(
            "unsupported frame source '{}'; expected stub://, rpicam:// or a local path",
            uri
        ));
    }
    Ok(Box::new(FileSource::new(path)?))
}

pub(crate) fn has_image_extension(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_scheme() {
        let camera = CameraSettings::default();
        let mut stub = open_source("stub://sign", &camera).unwrap();
        stub.connect().unwrap();
        assert!(stub.next_frame().is_ok());

        assert!(open_source("", &camera).is_err());
        assert!(open_source("http://camera.local/still.jpg", &camera).is_err());
        assert!(open_source("/definitely/not/here.jpg", &camera).is_err());
    }

    #[test]
    fn image_extensions_are_case_insensitive() {
        assert!(has_image_extension(std::path::Path::new("a/b/sign.JPG")));
        assert!(has_image_extension(std::path::Path::new("sign.bmp")));
        assert!(!has_image_extension(std::path::Path::new("notes.txt")));
        assert!(!has_image_extension(std::path::Path::new("README")));
    }
}
