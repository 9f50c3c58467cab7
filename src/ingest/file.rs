//! Still images from the local filesystem.
//!
//! A file path is re-read on every call, so an external process may keep
//! overwriting it (capture-to-file). A directory is scanned once; its images
//! are served in sorted order and wrap around.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::{has_image_extension, FrameSource, SourceStats};
use crate::frame::Frame;

/// Decode an image file into an RGB frame.
pub fn read_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgb8();
    Frame::from_rgb_image(image)
}

pub struct FileSource {
    root: PathBuf,
    images: Vec<PathBuf>,
    cursor: usize,
    frames_captured: u64,
    failures: u64,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        let images = if root.is_dir() {
            let mut images = Vec::new();
            for entry in std::fs::read_dir(&root)
                .with_context(|| format!("failed to read {}", root.display()))?
            {
                let path = entry?.path();
                if path.is_file() && has_image_extension(&path) {
                    images.push(path);
                }
            }
            images.sort();
            if images.is_empty() {
                return Err(anyhow!("no images in {}", root.display()));
            }
            images
        } else if root.is_file() {
            vec![root.clone()]
        } else {
            return Err(anyhow!("frame source {} does not exist", root.display()));
        };
        Ok(Self {
            root,
            images,
            cursor: 0,
            frames_captured: 0,
            failures: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "FileSource: {} ({} image(s))",
            self.root.display(),
            self.images.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let path = &self.images[self.cursor];
        self.cursor = (self.cursor + 1) % self.images.len();
        match read_frame(path) {
            Ok(frame) => {
                self.frames_captured += 1;
                Ok(frame)
            }
            Err(err) => {
                self.failures += 1;
                Err(err)
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.root.exists()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            source: self.root.display().to_string(),
            frames_captured: self.frames_captured,
            failures: self.failures,
        }
    }
}
