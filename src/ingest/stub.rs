use anyhow::{anyhow, Result};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub const STUB_WIDTH: u32 = 320;
pub const STUB_HEIGHT: u32 = 240;
/// Outer radius of the synthetic sign.
pub const STUB_SIGN_RADIUS: f32 = 70.0;

const BACKGROUND: [u8; 3] = [24, 28, 24];
const SIGN_FACE: [u8; 3] = [236, 236, 236];
const SIGN_RING: [u8; 3] = [200, 24, 24];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StubScene {
    /// Empty background, nothing to detect.
    Blank,
    /// A round sign centred in the frame.
    Sign,
    /// Sign and blank frames in turn, starting with the sign.
    Alternate,
}

impl StubScene {
    pub fn parse(uri: &str) -> Result<Self> {
        match uri.trim_start_matches("stub://") {
            "" | "blank" => Ok(Self::Blank),
            "sign" => Ok(Self::Sign),
            "alternate" => Ok(Self::Alternate),
            other => Err(anyhow!(
                "unknown stub scene '{}'; expected blank, sign or alternate",
                other
            )),
        }
    }
}

/// Synthetic frame source (`stub://…`).
pub struct StubSource {
    uri: String,
    scene: StubScene,
    frame_count: u64,
}

impl StubSource {
    pub fn new(uri: &str) -> Result<Self> {
        Ok(Self {
            uri: uri.to_string(),
            scene: StubScene::parse(uri)?,
            frame_count: 0,
        })
    }

    fn shows_sign(&self) -> bool {
        match self.scene {
            StubScene::Blank => false,
            StubScene::Sign => true,
            StubScene::Alternate => self.frame_count % 2 == 1,
        }
    }
}

impl FrameSource for StubSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("StubSource: connected to {} (synthetic)", self.uri);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let data = if self.shows_sign() {
            sign_pixels(STUB_WIDTH, STUB_HEIGHT)
        } else {
            BACKGROUND.repeat((STUB_WIDTH * STUB_HEIGHT) as usize)
        };
        Frame::new(data, STUB_WIDTH, STUB_HEIGHT)
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            source: self.uri.clone(),
            frames_captured: self.frame_count,
            failures: 0,
        }
    }
}

/// White disc with a red band inside its rim, centred on the frame.
fn sign_pixels(width: u32, height: u32) -> Vec<u8> {
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let ring_outer = STUB_SIGN_RADIUS * 0.85;
    let ring_inner = STUB_SIGN_RADIUS * 0.7;

    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            let color = if d > STUB_SIGN_RADIUS {
                BACKGROUND
            } else if d > ring_inner && d <= ring_outer {
                SIGN_RING
            } else {
                SIGN_FACE
            };
            data.extend_from_slice(&color);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scenes() {
        assert_eq!(StubScene::parse("stub://sign").unwrap(), StubScene::Sign);
        assert_eq!(StubScene::parse("stub://").unwrap(), StubScene::Blank);
        assert!(StubScene::parse("stub://video").is_err());
    }

    #[test]
    fn alternate_starts_with_sign() {
        let mut source = StubSource::new("stub://alternate").unwrap();
        let center = |f: &Frame| f.pixel(STUB_WIDTH / 2, STUB_HEIGHT / 2);
        assert_eq!(center(&source.next_frame().unwrap()), SIGN_FACE);
        assert_eq!(center(&source.next_frame().unwrap()), BACKGROUND);
        assert_eq!(center(&source.next_frame().unwrap()), SIGN_FACE);
        assert_eq!(source.stats().frames_captured, 3);
    }

    #[test]
    fn blank_frame_is_uniform() {
        let mut source = StubSource::new("stub://blank").unwrap();
        let frame = source.next_frame().unwrap();
        assert!(frame.pixels().chunks(3).all(|p| p == BACKGROUND));
    }
}
