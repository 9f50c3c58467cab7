use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actuate::{SpeedTable, DEFAULT_ADDRESS, DEFAULT_MAGNITUDE};
use crate::classify::ClassLabel;
use crate::detect::DetectorParams;
use crate::hw::HardwareBackend;
use crate::ingest::CameraSettings;

const DEFAULT_SOURCE: &str = "rpicam://";
const DEFAULT_REFERENCES: &str = "data/train";
const DEFAULT_K: usize = 5;
const DEFAULT_DWELL_MS: u64 = 200;
const DEFAULT_REVERSED: bool = true;
const DEFAULT_PWM_FREQUENCY_HZ: f32 = 50.0;
const DEFAULT_TRIGGER_PIN: u8 = 23;
const DEFAULT_ECHO_PIN: u8 = 24;
const DEFAULT_ECHO_TIMEOUT_MS: u64 = 30;
const DEFAULT_MIN_CLEARANCE_CM: f64 = 20.0;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RobotConfigFile {
    hardware: Option<String>,
    source: Option<String>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorParams>,
    classifier: Option<ClassifierConfigFile>,
    motion: Option<MotionConfigFile>,
    range: Option<RangeConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    command: Option<String>,
    output: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    warmup_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ClassifierConfigFile {
    references: Option<PathBuf>,
    k: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MotionConfigFile {
    reversed: Option<bool>,
    dwell_ms: Option<u64>,
    default_speed: Option<i32>,
    speeds: Option<BTreeMap<String, i32>>,
    pwm_address: Option<u16>,
    pwm_frequency_hz: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RangeConfigFile {
    enabled: Option<bool>,
    trigger: Option<u8>,
    echo: Option<u8>,
    timeout_ms: Option<u64>,
    min_clearance_cm: Option<f64>,
    stop_on_unknown_distance: Option<bool>,
}

/// Runtime configuration of the rover.
#[derive(Debug, Clone)]
pub struct RobotConfig {
    pub hardware: HardwareBackend,
    /// Frame source URI (`stub://…`, `rpicam://`, or a local path).
    pub source: String,
    pub camera: CameraSettings,
    pub detector: DetectorParams,
    pub classifier: ClassifierSettings,
    pub motion: MotionSettings,
    pub range: RangeSettings,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    /// Dataset root laid out as `<root>/<label>/*.png`.
    pub references: PathBuf,
    pub k: usize,
}

#[derive(Debug, Clone)]
pub struct MotionSettings {
    /// Drive with negated duties (the rover's motors are mounted backwards).
    pub reversed: bool,
    /// Pause after each actuation or safe stop.
    pub dwell: Duration,
    pub speeds: SpeedTable,
    pub pwm_address: u16,
    pub pwm_frequency_hz: f32,
}

#[derive(Debug, Clone)]
pub struct RangeSettings {
    pub enabled: bool,
    pub trigger: u8,
    pub echo: u8,
    pub timeout: Duration,
    pub min_clearance_cm: f64,
    pub stop_on_unknown_distance: bool,
}

impl RobotConfig {
    /// Defaults, then the TOML file named by `SIGNPILOT_CONFIG`, then
    /// `SIGNPILOT_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SIGNPILOT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Compiled-in defaults only.
    pub fn defaults() -> Result<Self> {
        let cfg = Self::from_file(RobotConfigFile::default())?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RobotConfigFile) -> Result<Self> {
        let hardware = match file.hardware.as_deref() {
            Some(name) => HardwareBackend::parse(name)?,
            None => HardwareBackend::default_for_build(),
        };
        let source = file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());

        let camera_file = file.camera.unwrap_or_default();
        let camera_defaults = CameraSettings::default();
        let camera = CameraSettings {
            command: camera_file.command.unwrap_or(camera_defaults.command),
            output: camera_file.output.unwrap_or(camera_defaults.output),
            width: camera_file.width.unwrap_or(camera_defaults.width),
            height: camera_file.height.unwrap_or(camera_defaults.height),
            warmup: camera_file
                .warmup_ms
                .map(Duration::from_millis)
                .unwrap_or(camera_defaults.warmup),
        };

        let classifier = ClassifierSettings {
            references: file
                .classifier
                .as_ref()
                .and_then(|c| c.references.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REFERENCES)),
            k: file
                .classifier
                .as_ref()
                .and_then(|c| c.k)
                .unwrap_or(DEFAULT_K),
        };

        let motion_file = file.motion.unwrap_or_default();
        let speeds = match motion_file.speeds {
            Some(entries) => SpeedTable::new(
                entries
                    .into_iter()
                    .map(|(label, magnitude)| (ClassLabel::from(label), magnitude)),
                motion_file.default_speed.unwrap_or(DEFAULT_MAGNITUDE),
            )?,
            None => match motion_file.default_speed {
                Some(default) => {
                    let table = SpeedTable::default();
                    SpeedTable::new(
                        table.entries().map(|(label, m)| (label.clone(), m)),
                        default,
                    )?
                }
                None => SpeedTable::default(),
            },
        };
        let motion = MotionSettings {
            reversed: motion_file.reversed.unwrap_or(DEFAULT_REVERSED),
            dwell: Duration::from_millis(motion_file.dwell_ms.unwrap_or(DEFAULT_DWELL_MS)),
            speeds,
            pwm_address: motion_file.pwm_address.unwrap_or(DEFAULT_ADDRESS),
            pwm_frequency_hz: motion_file
                .pwm_frequency_hz
                .unwrap_or(DEFAULT_PWM_FREQUENCY_HZ),
        };

        let range_file = file.range.unwrap_or_default();
        let range = RangeSettings {
            enabled: range_file.enabled.unwrap_or(false),
            trigger: range_file.trigger.unwrap_or(DEFAULT_TRIGGER_PIN),
            echo: range_file.echo.unwrap_or(DEFAULT_ECHO_PIN),
            timeout: Duration::from_millis(
                range_file.timeout_ms.unwrap_or(DEFAULT_ECHO_TIMEOUT_MS),
            ),
            min_clearance_cm: range_file
                .min_clearance_cm
                .unwrap_or(DEFAULT_MIN_CLEARANCE_CM),
            stop_on_unknown_distance: range_file.stop_on_unknown_distance.unwrap_or(false),
        };

        Ok(Self {
            hardware,
            source,
            camera,
            detector: file.detector.unwrap_or_default(),
            classifier,
            motion,
            range,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(hardware) = std::env::var("SIGNPILOT_HARDWARE") {
            if !hardware.trim().is_empty() {
                self.hardware = HardwareBackend::parse(&hardware)?;
            }
        }
        if let Ok(source) = std::env::var("SIGNPILOT_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(references) = std::env::var("SIGNPILOT_REFERENCES") {
            if !references.trim().is_empty() {
                self.classifier.references = PathBuf::from(references);
            }
        }
        if let Ok(k) = std::env::var("SIGNPILOT_K") {
            self.classifier.k = k
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGNPILOT_K must be a positive integer"))?;
        }
        if let Ok(reversed) = std::env::var("SIGNPILOT_REVERSED") {
            self.motion.reversed = parse_bool("SIGNPILOT_REVERSED", &reversed)?;
        }
        if let Ok(dwell) = std::env::var("SIGNPILOT_DWELL_MS") {
            let millis: u64 = dwell.trim().parse().map_err(|_| {
                anyhow!("SIGNPILOT_DWELL_MS must be an integer number of milliseconds")
            })?;
            self.motion.dwell = Duration::from_millis(millis);
        }
        if let Ok(enabled) = std::env::var("SIGNPILOT_RANGE_ENABLED") {
            self.range.enabled = parse_bool("SIGNPILOT_RANGE_ENABLED", &enabled)?;
        }
        if let Ok(clearance) = std::env::var("SIGNPILOT_MIN_CLEARANCE_CM") {
            self.range.min_clearance_cm = clearance
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGNPILOT_MIN_CLEARANCE_CM must be a number"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        self.detector.validate()?;
        if self.classifier.k == 0 {
            return Err(anyhow!("classifier k must be at least 1"));
        }
        if !(self.motion.pwm_frequency_hz.is_finite() && self.motion.pwm_frequency_hz > 0.0) {
            return Err(anyhow!("pwm_frequency_hz must be positive"));
        }
        if self.range.trigger == self.range.echo {
            return Err(anyhow!(
                "range trigger and echo must be different pins (both {})",
                self.range.trigger
            ));
        }
        if self.range.timeout.is_zero() {
            return Err(anyhow!("range timeout must be greater than zero"));
        }
        if !(self.range.min_clearance_cm.is_finite() && self.range.min_clearance_cm >= 0.0) {
            return Err(anyhow!("min_clearance_cm must be >= 0"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<RobotConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be true or false", key)),
    }
}
