//! motor_test - drive a fixed forward / back / left / right sequence
//!
//! Each step is held for `--hold` seconds. Ctrl-C cuts the sequence short;
//! every exit path ends with the zero profile.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use signpilot::hw::{self, HardwareBackend};
use signpilot::{DutyProfile, MotorDriver};

const SEQUENCE: [(&str, [i32; 4]); 4] = [
    ("forward", [2000, 2000, 2000, 2000]),
    ("back", [-2000, -2000, -2000, -2000]),
    ("left", [-500, -500, 2000, 2000]),
    ("right", [2000, 2000, -500, -500]),
];

#[derive(Parser, Debug)]
#[command(name = "motor_test", about = "Run the wheel motor test sequence")]
struct Args {
    /// Seconds to hold each step
    #[arg(long, default_value_t = 3.0)]
    hold: f64,

    /// Hardware backend (stub|rpi)
    #[arg(long, env = "SIGNPILOT_HARDWARE", value_name = "BACKEND")]
    hardware: Option<String>,

    /// I2C address of the PWM controller
    #[arg(long, default_value_t = signpilot::actuate::DEFAULT_ADDRESS)]
    address: u16,

    /// PWM frequency in Hz
    #[arg(long, default_value_t = 50.0)]
    frequency: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let hold = Duration::try_from_secs_f64(args.hold)
        .map_err(|_| anyhow!("--hold must be a non-negative number of seconds"))?;
    let backend = match args.hardware.as_deref() {
        Some(name) => HardwareBackend::parse(name)?,
        None => HardwareBackend::default_for_build(),
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut motors = MotorDriver::new(hw::open_pwm(backend, args.address, args.frequency)?);
    for (name, duties) in SEQUENCE {
        if stop.load(Ordering::SeqCst) {
            log::info!("interrupted");
            break;
        }
        let profile = DutyProfile::new(duties);
        log::info!("{}: {:?}", name, profile.duties());
        motors.apply(profile)?;
        hold_unless_stopped(hold, &stop);
    }
    motors.release()?;
    log::info!("motors stopped");
    Ok(())
}

fn hold_unless_stopped(hold: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + hold;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}
