//! range_probe - print ultrasonic distance readings until Ctrl-C

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use signpilot::hw::{self, HardwareBackend};
use signpilot::RangeSensor;

#[derive(Parser, Debug)]
#[command(name = "range_probe", about = "Periodic ultrasonic distance readout")]
struct Args {
    /// GPIO (BCM) pin wired to the sensor trigger
    #[arg(long, default_value_t = 23)]
    trigger: u8,

    /// GPIO (BCM) pin wired to the sensor echo
    #[arg(long, default_value_t = 24)]
    echo: u8,

    /// Seconds between readings
    #[arg(long, default_value_t = 1.0)]
    interval: f64,

    /// Seconds to wait for each echo edge
    #[arg(long, default_value_t = 0.03)]
    timeout: f64,

    /// Stop after this many readings (0 = until Ctrl-C)
    #[arg(long, default_value_t = 0)]
    count: u64,

    /// Hardware backend (stub|rpi)
    #[arg(long, env = "SIGNPILOT_HARDWARE", value_name = "BACKEND")]
    hardware: Option<String>,
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| anyhow!("--{} must be a positive number of seconds", name))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let interval = seconds("interval", args.interval)?;
    let timeout = seconds("timeout", args.timeout)?;
    let backend = match args.hardware.as_deref() {
        Some(name) => HardwareBackend::parse(name)?,
        None => HardwareBackend::default_for_build(),
    };

    let (trigger, echo) = hw::open_echo_lines(backend, args.trigger, args.echo)?;
    let mut sensor = RangeSensor::new(trigger, echo);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!(
        "range_probe: trigger={}, echo={}, every {:?}, timeout {:?}",
        args.trigger,
        args.echo,
        interval,
        timeout
    );
    let mut readings = 0u64;
    while !stop.load(Ordering::SeqCst) {
        let distance = sensor.measure(timeout);
        println!("Distance: {}", distance);
        readings += 1;
        if args.count > 0 && readings >= args.count {
            break;
        }
        std::thread::sleep(interval);
    }
    sensor.release();
    Ok(())
}
