use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use signpilot::classify::Reference;
use signpilot::hw::stub::RecordingPwm;
use signpilot::hw::PwmChannels;
use signpilot::ingest::{SourceStats, StubSource};
use signpilot::{
    BoundingBox, ControlLoop, Crop, Distance, FeatureVector, Frame, FrameSource, LoopSettings,
    LoopState, MotorDriver, NearestNeighborClassifier, Phase, Ranging, ReferenceSet, Region, RegionDetector,
    StopReason, CROP_FEATURE_LEN,
};

/// Detector that replays a script of outcomes, then reports nothing.
struct ScriptedDetector {
    script: VecDeque<Option<Region>>,
}

impl ScriptedDetector {
    fn new(script: impl IntoIterator<Item = Option<Region>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl RegionDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Option<Region> {
        self.script.pop_front().flatten()
    }
}

struct FailingSource;

impl FrameSource for FailingSource {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        Err(anyhow!("camera unplugged"))
    }

    fn is_healthy(&self) -> bool {
        false
    }

    fn stats(&self) -> SourceStats {
        SourceStats::default()
    }
}

/// Sign source that raises the stop flag after `limit` frames.
struct StoppingSource {
    inner: StubSource,
    remaining: usize,
    stop: Arc<AtomicBool>,
}

impl FrameSource for StoppingSource {
    fn connect(&mut self) -> Result<()> {
        self.inner.connect()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.stop.store(true, Ordering::SeqCst);
        }
        self.inner.next_frame()
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        self.inner.stats()
    }
}

/// PWM board that accepts zero duties and rejects everything else.
struct StallingPwm {
    inner: RecordingPwm,
}

impl PwmChannels for StallingPwm {
    fn set_duty(&mut self, channel: u8, value: u16) -> Result<()> {
        if value > 0 {
            return Err(anyhow!("i2c write to channel {} failed", channel));
        }
        self.inner.set_duty(channel, value)
    }
}

struct FixedRange(Distance);

impl Ranging for FixedRange {
    fn measure(&mut self, _timeout: Duration) -> Distance {
        self.0
    }
}

fn sign_frame() -> Frame {
    StubSource::new("stub://sign").unwrap().next_frame().unwrap()
}

fn sign_region() -> Region {
    let bbox = BoundingBox::around_circle(160.0, 120.0, 70.0, 15, 320, 240).unwrap();
    Region {
        center_x: 160.0,
        center_y: 120.0,
        radius: 70.0,
        bbox,
    }
}

/// "70" is the exact crop of the stub sign; "90" is a black patch.
fn classifier() -> NearestNeighborClassifier {
    let sign = FeatureVector::from_crop(&Crop::extract(&sign_frame(), &sign_region()));
    let references = ReferenceSet::new(vec![
        Reference::new(sign, "70"),
        Reference::new(FeatureVector::new(vec![0.0; CROP_FEATURE_LEN]), "90"),
    ])
    .unwrap();
    NearestNeighborClassifier::new(references, 1).unwrap()
}

fn settings() -> LoopSettings {
    LoopSettings {
        dwell: Duration::ZERO,
        ..LoopSettings::default()
    }
}

fn control(
    source: Box<dyn FrameSource>,
    detector: ScriptedDetector,
) -> ControlLoop<RecordingPwm> {
    ControlLoop::new(
        source,
        Box::new(detector),
        classifier(),
        MotorDriver::new(RecordingPwm::new()),
        settings(),
        Arc::new(AtomicBool::new(false)),
    )
    .expect("control loop")
}

fn channels(control: &ControlLoop<RecordingPwm>) -> [u16; 8] {
    let pwm = control.motors().backend().expect("pwm");
    let mut out = [0; 8];
    out.copy_from_slice(&pwm.channels()[..8]);
    out
}

#[test]
fn full_cycle_drives_at_label_speed() {
    let mut control = control(
        Box::new(StubSource::new("stub://sign").unwrap()),
        ScriptedDetector::new([Some(sign_region())]),
    );

    assert_eq!(control.phase(), Phase::Sensing);
    assert_eq!(control.step().unwrap(), Phase::Detecting);
    assert_eq!(control.step().unwrap(), Phase::Classifying);
    assert_eq!(control.step().unwrap(), Phase::Actuating);
    assert_eq!(control.step().unwrap(), Phase::Sensing);

    // Reversed by default: every wheel runs its reverse channel at 1900.
    assert_eq!(control.motors().last_applied().duties(), [-1900; 4]);
    assert_eq!(channels(&control), [1900, 0, 0, 1900, 0, 1900, 1900, 0]);
    assert_eq!(control.stats().actuations, 1);
    assert_eq!(control.stats().cycles, 1);
}

#[test]
fn missing_region_forces_safe_stop() {
    let mut control = control(
        Box::new(StubSource::new("stub://sign").unwrap()),
        ScriptedDetector::new([Some(sign_region()), None]),
    );
    for _ in 0..4 {
        control.step().unwrap();
    }
    assert!(channels(&control).iter().any(|&v| v > 0));

    assert_eq!(control.step().unwrap(), Phase::Detecting);
    assert_eq!(
        control.step().unwrap(),
        Phase::SafeStop(StopReason::NoRegion)
    );
    assert_eq!(channels(&control), [0; 8]);
    assert!(control.motors().last_applied().is_stop());
    assert_eq!(control.step().unwrap(), Phase::Sensing);
    assert_eq!(control.stats().no_region, 1);
}

#[test]
fn frame_failure_forces_safe_stop() {
    let mut control = control(Box::new(FailingSource), ScriptedDetector::new([]));
    assert_eq!(control.step().unwrap(), Phase::Detecting);
    assert_eq!(
        control.step().unwrap(),
        Phase::SafeStop(StopReason::NoFrame)
    );
    assert_eq!(control.stats().no_frame, 1);
}

#[test]
fn close_obstacle_forces_safe_stop() {
    let mut control = control(
        Box::new(StubSource::new("stub://sign").unwrap()),
        ScriptedDetector::new([Some(sign_region())]),
    )
    .with_range_sensor(Box::new(FixedRange(Distance::Centimeters(8.0))));

    assert_eq!(control.step().unwrap(), Phase::Detecting);
    assert_eq!(
        control.step().unwrap(),
        Phase::SafeStop(StopReason::Obstacle)
    );
    assert_eq!(channels(&control), [0; 8]);
}

#[test]
fn unknown_distance_does_not_block_by_default() {
    let mut control = control(
        Box::new(StubSource::new("stub://sign").unwrap()),
        ScriptedDetector::new([Some(sign_region())]),
    )
    .with_range_sensor(Box::new(FixedRange(Distance::Unknown)));

    control.step().unwrap();
    assert_eq!(control.step().unwrap(), Phase::Classifying);
}

#[test]
fn stop_flag_shuts_down_with_zero_profile() {
    let mut control = control(
        Box::new(StubSource::new("stub://sign").unwrap()),
        ScriptedDetector::new([Some(sign_region())]),
    );
    for _ in 0..4 {
        control.step().unwrap();
    }
    control.step().unwrap();

    control.stop_flag().store(true, Ordering::SeqCst);
    assert_eq!(control.step().unwrap(), Phase::Shutdown);
    assert_eq!(channels(&control), [0; 8]);
    assert_eq!(control.step().unwrap(), Phase::Shutdown);

    let pwm = control.release().unwrap();
    let writes = pwm.writes();
    assert!(writes[writes.len() - 8..].iter().all(|&(_, v)| v == 0));
}

#[test]
fn run_loops_until_stop_requested() {
    let stop = Arc::new(AtomicBool::new(false));
    let source = StoppingSource {
        inner: StubSource::new("stub://sign").unwrap(),
        remaining: 3,
        stop: Arc::clone(&stop),
    };
    let mut control = ControlLoop::new(
        Box::new(source),
        Box::new(ScriptedDetector::new(vec![Some(sign_region()); 3])),
        classifier(),
        MotorDriver::new(RecordingPwm::new()),
        settings(),
        stop,
    )
    .unwrap();

    control.run().unwrap();
    assert_eq!(control.phase(), Phase::Shutdown);
    assert_eq!(control.stats().cycles, 3);
    assert_eq!(control.stats().actuations, 2);
    assert_eq!(channels(&control), [0; 8]);
}

#[test]
fn rejects_references_of_the_wrong_size() {
    let references =
        ReferenceSet::new(vec![Reference::new(FeatureVector::new(vec![0.0; 12]), "50")]).unwrap();
    let result = ControlLoop::new(
        Box::new(StubSource::new("stub://sign").unwrap()),
        Box::new(ScriptedDetector::new([])),
        NearestNeighborClassifier::new(references, 1).unwrap(),
        MotorDriver::new(RecordingPwm::new()),
        settings(),
        Arc::new(AtomicBool::new(false)),
    );
    assert!(result.is_err());
}

#[test]
fn motor_write_failure_still_ends_with_zero_profile() {
    let mut control = ControlLoop::new(
        Box::new(StubSource::new("stub://sign").unwrap()),
        Box::new(ScriptedDetector::new([Some(sign_region())])),
        classifier(),
        MotorDriver::new(StallingPwm {
            inner: RecordingPwm::new(),
        }),
        settings(),
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();

    assert!(control.run().is_err());
    assert_eq!(control.stats().actuations, 0);
    assert!(control.motors().last_applied().is_stop());

    let pwm = &control.motors().backend().expect("pwm").inner;
    let writes = pwm.writes();
    assert!(writes.len() >= 8);
    assert!(writes[writes.len() - 8..].iter().all(|&(_, v)| v == 0));
    let mut stopped: Vec<u8> = writes[writes.len() - 8..].iter().map(|&(ch, _)| ch).collect();
    stopped.sort_unstable();
    assert_eq!(stopped, (0..8).collect::<Vec<u8>>());
}

#[test]
fn stop_flag_while_classifying_shuts_down() {
    let mut control = control(
        Box::new(StubSource::new("stub://sign").unwrap()),
        ScriptedDetector::new([Some(sign_region()), Some(sign_region())]),
    );
    for _ in 0..4 {
        control.step().unwrap();
    }
    assert!(channels(&control).iter().any(|&v| v > 0));

    control.step().unwrap();
    assert_eq!(control.step().unwrap(), Phase::Classifying);
    assert!(matches!(control.state(), LoopState::Classifying { .. }));

    control.stop_flag().store(true, Ordering::SeqCst);
    assert_eq!(control.step().unwrap(), Phase::Shutdown);
    assert!(matches!(control.state(), LoopState::Shutdown));
    assert_eq!(channels(&control), [0; 8]);
    assert_eq!(control.stats().actuations, 1);
}
