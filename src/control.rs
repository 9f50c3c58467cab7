//! The sense, detect, classify, actuate cycle.
//!
//! ```text
//!   Sensing ──► Detecting ──► Classifying ──► Actuating ──► Sensing
//!                   │              │
//!                   └──► SafeStop ◄┘ ──► Sensing
//!
//!   any ──(stop flag)──► Shutdown
//! ```
//!
//! Entering `SafeStop` writes the zero profile; leaving it dwells. Leaving
//! `Actuating` writes the label's profile and dwells. The stop flag is read
//! before every transition; `Shutdown` writes the zero profile and is terminal.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::actuate::{MotorDriver, SpeedTable};
use crate::classify::{ClassLabel, NearestNeighborClassifier};
use crate::config::RobotConfig;
use crate::detect::RegionDetector;
use crate::frame::{Crop, Frame, CROP_FEATURE_LEN};
use crate::hw::PwmChannels;
use crate::ingest::FrameSource;
use crate::range::{Distance, Ranging};

/// Why the loop forced a zero profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The frame source failed this cycle.
    NoFrame,
    /// No circular region in the frame.
    NoRegion,
    /// The range sensor reported something too close (or nothing, when unknown
    /// distances are treated as blocked).
    Obstacle,
    /// The classifier rejected the crop.
    Unclassified,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopReason::NoFrame => "no frame",
            StopReason::NoRegion => "no region",
            StopReason::Obstacle => "obstacle",
            StopReason::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

/// Loop state, with the data carried into it.
#[derive(Debug)]
pub enum LoopState {
    Sensing,
    Detecting {
        frame: Option<Frame>,
        distance: Option<Distance>,
    },
    Classifying {
        crop: Crop,
    },
    Actuating {
        label: ClassLabel,
    },
    SafeStop(StopReason),
    Shutdown,
}

/// Payload-free view of [`LoopState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Sensing,
    Detecting,
    Classifying,
    Actuating,
    SafeStop(StopReason),
    Shutdown,
}

impl LoopState {
    pub fn phase(&self) -> Phase {
        match self {
            LoopState::Sensing => Phase::Sensing,
            LoopState::Detecting { .. } => Phase::Detecting,
            LoopState::Classifying { .. } => Phase::Classifying,
            LoopState::Actuating { .. } => Phase::Actuating,
            LoopState::SafeStop(reason) => Phase::SafeStop(*reason),
            LoopState::Shutdown => Phase::Shutdown,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub actuations: u64,
    pub no_frame: u64,
    pub no_region: u64,
    pub obstacles: u64,
    pub unclassified: u64,
}

impl LoopStats {
    pub fn safe_stops(&self) -> u64 {
        self.no_frame + self.no_region + self.obstacles + self.unclassified
    }

    fn record_stop(&mut self, reason: StopReason) {
        match reason {
            StopReason::NoFrame => self.no_frame += 1,
            StopReason::NoRegion => self.no_region += 1,
            StopReason::Obstacle => self.obstacles += 1,
            StopReason::Unclassified => self.unclassified += 1,
        }
    }
}

/// Behaviour knobs of the loop.
#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub speeds: SpeedTable,
    pub reversed: bool,
    pub dwell: Duration,
    pub range_timeout: Duration,
    pub min_clearance_cm: f64,
    pub stop_on_unknown_distance: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            speeds: SpeedTable::default(),
            reversed: true,
            dwell: Duration::from_millis(200),
            range_timeout: crate::range::DEFAULT_ECHO_TIMEOUT,
            min_clearance_cm: 20.0,
            stop_on_unknown_distance: false,
        }
    }
}

impl LoopSettings {
    pub fn from_config(cfg: &RobotConfig) -> Self {
        Self {
            speeds: cfg.motion.speeds.clone(),
            reversed: cfg.motion.reversed,
            dwell: cfg.motion.dwell,
            range_timeout: cfg.range.timeout,
            min_clearance_cm: cfg.range.min_clearance_cm,
            stop_on_unknown_distance: cfg.range.stop_on_unknown_distance,
        }
    }

    /// Whether a reading should keep the rover from driving.
    pub fn blocks(&self, distance: Distance) -> bool {
        match distance {
            Distance::Centimeters(cm) => cm < self.min_clearance_cm,
            Distance::Unknown => self.stop_on_unknown_distance,
        }
    }
}

pub struct ControlLoop<P: PwmChannels> {
    source: Box<dyn FrameSource>,
    detector: Box<dyn RegionDetector>,
    classifier: NearestNeighborClassifier,
    motors: MotorDriver<P>,
    ranging: Option<Box<dyn Ranging>>,
    settings: LoopSettings,
    stop: Arc<AtomicBool>,
    state: LoopState,
    stats: LoopStats,
}

impl<P: PwmChannels> ControlLoop<P> {
    /// Connect the source and check the references fit the crop size.
    ///
    /// Nothing is written to the motors here.
    pub fn new(
        mut source: Box<dyn FrameSource>,
        detector: Box<dyn RegionDetector>,
        classifier: NearestNeighborClassifier,
        motors: MotorDriver<P>,
        settings: LoopSettings,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        let feature_len = classifier.references().feature_len();
        if feature_len != CROP_FEATURE_LEN {
            return Err(anyhow!(
                "reference vectors have {} values, crops produce {}",
                feature_len,
                CROP_FEATURE_LEN
            ));
        }
        source.connect()?;
        log::info!(
            "control loop: detector={}, k={}, {} references, reversed={}",
            detector.name(),
            classifier.k(),
            classifier.references().len(),
            settings.reversed
        );
        Ok(Self {
            source,
            detector,
            classifier,
            motors,
            ranging: None,
            settings,
            stop,
            state: LoopState::Sensing,
            stats: LoopStats::default(),
        })
    }

    /// Poll `sensor` at the start of every cycle.
    pub fn with_range_sensor(mut self, sensor: Box<dyn Ranging>) -> Self {
        self.ranging = Some(sensor);
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn motors(&self) -> &MotorDriver<P> {
        &self.motors
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Perform one transition and return the phase reached.
    ///
    /// Errors are motor write failures only; perception failures become
    /// `SafeStop`.
    pub fn step(&mut self) -> Result<Phase> {
        if matches!(self.state, LoopState::Shutdown) {
            return Ok(Phase::Shutdown);
        }
        if self.stop.load(Ordering::SeqCst) {
            log::info!("stop requested in {:?}; shutting down", self.state.phase());
            self.state = LoopState::Shutdown;
            self.motors.stop()?;
            return Ok(Phase::Shutdown);
        }

        let state = std::mem::replace(&mut self.state, LoopState::Sensing);
        self.state = match state {
            LoopState::Sensing => self.sense(),
            LoopState::Detecting { frame, distance } => self.detect(frame, distance)?,
            LoopState::Classifying { crop } => self.classify(&crop)?,
            LoopState::Actuating { label } => {
                let profile = self
                    .settings
                    .speeds
                    .map_to_duties(&label, self.settings.reversed);
                self.motors.apply(profile)?;
                self.stats.actuations += 1;
                log::info!("sign {}: duties {:?}", label, profile.duties());
                self.dwell();
                LoopState::Sensing
            }
            LoopState::SafeStop(_) => {
                self.dwell();
                LoopState::Sensing
            }
            LoopState::Shutdown => LoopState::Shutdown,
        };
        Ok(self.state.phase())
    }

    /// Step until the stop flag is observed.
    ///
    /// On a motor error the zero profile is attempted before the error is
    /// returned.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match self.step() {
                Ok(Phase::Shutdown) => break,
                Ok(_) => {}
                Err(err) => {
                    if let Err(stop_err) = self.motors.stop() {
                        log::error!("failed to stop motors after error: {:#}", stop_err);
                    }
                    return Err(err);
                }
            }
        }
        let source = self.source.stats();
        log::info!(
            "loop finished: {} cycles, {} actuations, {} safe stops ({} no frame, {} no region, {} obstacle, {} unclassified); {} frames from {}",
            self.stats.cycles,
            self.stats.actuations,
            self.stats.safe_stops(),
            self.stats.no_frame,
            self.stats.no_region,
            self.stats.obstacles,
            self.stats.unclassified,
            source.frames_captured,
            source.source
        );
        Ok(())
    }

    /// Write the zero profile and hand back the PWM backend.
    pub fn release(self) -> Result<P> {
        self.motors.release()
    }

    fn sense(&mut self) -> LoopState {
        self.stats.cycles += 1;
        let distance = self
            .ranging
            .as_mut()
            .map(|sensor| sensor.measure(self.settings.range_timeout));
        if let Some(d) = distance {
            log::debug!("range: {}", d);
            if self.settings.blocks(d) {
                return LoopState::Detecting {
                    frame: None,
                    distance,
                };
            }
        }
        let frame = match self.source.next_frame() {
            Ok(frame) => Some(frame),
            Err(err) => {
                log::warn!("frame capture failed: {:#}", err);
                None
            }
        };
        LoopState::Detecting { frame, distance }
    }

    fn detect(&mut self, frame: Option<Frame>, distance: Option<Distance>) -> Result<LoopState> {
        if let Some(d) = distance.filter(|d| self.settings.blocks(*d)) {
            log::warn!("obstacle at {}; stopping", d);
            return self.safe_stop(StopReason::Obstacle);
        }
        let Some(frame) = frame else {
            return self.safe_stop(StopReason::NoFrame);
        };
        match self.detector.detect(&frame) {
            Some(region) => {
                log::debug!(
                    "region at ({:.0}, {:.0}) r={:.0}",
                    region.center_x,
                    region.center_y,
                    region.radius
                );
                Ok(LoopState::Classifying {
                    crop: Crop::extract(&frame, &region),
                })
            }
            None => {
                log::info!("no circle detected; stopping motors");
                self.safe_stop(StopReason::NoRegion)
            }
        }
    }

    fn classify(&mut self, crop: &Crop) -> Result<LoopState> {
        match self.classifier.classify(crop) {
            Ok(label) => Ok(LoopState::Actuating { label }),
            Err(err) => {
                log::warn!("classification failed: {:#}", err);
                self.safe_stop(StopReason::Unclassified)
            }
        }
    }

    fn safe_stop(&mut self, reason: StopReason) -> Result<LoopState> {
        self.motors.stop()?;
        self.stats.record_stop(reason);
        Ok(LoopState::SafeStop(reason))
    }

    fn dwell(&self) {
        if !self.settings.dwell.is_zero() {
            thread::sleep(self.settings.dwell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_guard() {
        let settings = LoopSettings::default();
        assert!(settings.blocks(Distance::Centimeters(5.0)));
        assert!(!settings.blocks(Distance::Centimeters(20.0)));
        assert!(!settings.blocks(Distance::Unknown));

        let strict = LoopSettings {
            stop_on_unknown_distance: true,
            ..LoopSettings::default()
        };
        assert!(strict.blocks(Distance::Unknown));
    }

    #[test]
    fn stats_count_stops_by_reason() {
        let mut stats = LoopStats::default();
        stats.record_stop(StopReason::NoRegion);
        stats.record_stop(StopReason::NoRegion);
        stats.record_stop(StopReason::Obstacle);
        assert_eq!(stats.no_region, 2);
        assert_eq!(stats.safe_stops(), 3);
        assert_eq!(StopReason::NoFrame.to_string(), "no frame");
    }
}
