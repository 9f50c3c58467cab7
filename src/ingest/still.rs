use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use super::file::read_frame;
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// How to invoke the still-capture command.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraSettings {
    pub command: String,
    /// File the command writes; re-read after each capture.
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Sensor warm-up before the shot (exposure and white balance settle).
    pub warmup: Duration,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            command: "rpicam-still".to_string(),
            output: std::env::temp_dir().join("signpilot-still.jpg"),
            width: 640,
            height: 480,
            warmup: Duration::from_millis(1500),
        }
    }
}

impl CameraSettings {
    fn args(&self) -> Vec<String> {
        vec![
            "--nopreview".to_string(),
            "--immediate".to_string(),
            "-t".to_string(),
            self.warmup.as_millis().to_string(),
            "--width".to_string(),
            self.width.to_string(),
            "--height".to_string(),
            self.height.to_string(),
            "-o".to_string(),
            self.output.display().to_string(),
        ]
    }
}

/// Captures one still per frame by running `rpicam-still`.
pub struct StillCamera {
    settings: CameraSettings,
    frames_captured: u64,
    failures: u64,
}

impl StillCamera {
    pub fn new(settings: CameraSettings) -> Result<Self> {
        if settings.command.trim().is_empty() {
            return Err(anyhow!("camera command must not be empty"));
        }
        if settings.width == 0 || settings.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero, got {}x{}",
                settings.width,
                settings.height
            ));
        }
        Ok(Self {
            settings,
            frames_captured: 0,
            failures: 0,
        })
    }

    fn capture(&mut self) -> Result<Frame> {
        let output = Command::new(&self.settings.command)
            .args(self.settings.args())
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to run {}", self.settings.command))?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.settings.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        read_frame(&self.settings.output)
    }
}

impl FrameSource for StillCamera {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "StillCamera: {} {}x{} -> {}",
            self.settings.command,
            self.settings.width,
            self.settings.height,
            self.settings.output.display()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match self.capture() {
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
        self.failures == 0 || self.frames_captured > 0
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            source: format!("rpicam://{}", self.settings.command),
            frames_captured: self.frames_captured,
            failures: self.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_capture_arguments() {
        let settings = CameraSettings {
            output: PathBuf::from("/tmp/shot.jpg"),
            warmup: Duration::from_millis(250),
            ..CameraSettings::default()
        };
        let args = settings.args();
        assert_eq!(args[2..4], ["-t", "250"]);
        assert_eq!(args[args.len() - 2..], ["-o", "/tmp/shot.jpg"]);
    }

    #[test]
    fn missing_command_is_a_frame_failure() {
        let mut camera = StillCamera::new(CameraSettings {
            command: "signpilot-no-such-camera-tool".to_string(),
            ..CameraSettings::default()
        })
        .unwrap();
        assert!(camera.next_frame().is_err());
        assert_eq!(camera.stats().failures, 1);
        assert!(!camera.is_healthy());
    }

    #[test]
    fn rejects_zero_resolution() {
        let settings = CameraSettings {
            width: 0,
            ..CameraSettings::default()
        };
        assert!(StillCamera::new(settings).is_err());
    }
}
