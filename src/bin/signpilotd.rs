//! signpilotd - sign-following drive loop
//!
//! This daemon:
//! 1. Loads configuration (`SIGNPILOT_CONFIG` TOML plus `SIGNPILOT_*` overrides)
//! 2. Loads the labelled reference images into the nearest-neighbour classifier
//! 3. Acquires the motor PWM controller (and the range sensor, when enabled)
//! 4. Runs sense, detect, classify, actuate until Ctrl-C
//! 5. Writes the zero profile and releases the hardware

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signpilot::{
    hw, open_source, CircleDetector, ControlLoop, LoopSettings, MotorDriver,
    NearestNeighborClassifier, RangeSensor, ReferenceSet, RobotConfig,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = RobotConfig::load()?;
    log::info!(
        "signpilotd {} starting: hardware={}, source={}",
        env!("CARGO_PKG_VERSION"),
        cfg.hardware.as_str(),
        cfg.source
    );

    let references = ReferenceSet::load_dir(&cfg.classifier.references)?;
    let classifier = NearestNeighborClassifier::new(references, cfg.classifier.k)?;
    let detector = CircleDetector::new(cfg.detector.clone())?;
    let source = open_source(&cfg.source, &cfg.camera)?;

    let pwm = hw::open_pwm(
        cfg.hardware,
        cfg.motion.pwm_address,
        cfg.motion.pwm_frequency_hz,
    )?;
    let motors = MotorDriver::new(pwm);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut control = ControlLoop::new(
        source,
        Box::new(detector),
        classifier,
        motors,
        LoopSettings::from_config(&cfg),
        stop,
    )?;
    if cfg.range.enabled {
        let (trigger, echo) = hw::open_echo_lines(cfg.hardware, cfg.range.trigger, cfg.range.echo)?;
        control = control.with_range_sensor(Box::new(RangeSensor::new(trigger, echo)));
        log::info!(
            "range guard: stop below {} cm (unknown distance blocks: {})",
            cfg.range.min_clearance_cm,
            cfg.range.stop_on_unknown_distance
        );
    }

    log::info!("signpilotd running. Ctrl-C to stop.");
    control.run()?;
    control.release()?;
    log::info!("motors stopped, hardware released");
    Ok(())
}
