//! PCA9685 16-channel, 12-bit PWM controller.
//!
//! Each channel has four registers starting at `LED0_ON_L + 4 * channel`
//! (ON low/high, OFF low/high). The output is high between the ON and OFF
//! counts of a 4096-step period; the period is set through `PRESCALE`, which
//! can only be written while the oscillator sleeps.

use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::hw::{PwmChannels, RegisterBus, PWM_MAX};

/// Default I2C address of the motor HAT.
pub const DEFAULT_ADDRESS: u16 = 0x40;
pub const CHANNELS: u8 = 16;

const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;

const MODE1_SLEEP: u8 = 0x10;
const MODE1_RESTART: u8 = 0x80;

const OSCILLATOR_HZ: f32 = 25_000_000.0;
const OSCILLATOR_SETTLE: Duration = Duration::from_millis(5);

pub struct Pca9685<B: RegisterBus> {
    bus: B,
}

impl<B: RegisterBus> Pca9685<B> {
    /// Reset MODE1 (all call off, oscillator running).
    pub fn new(mut bus: B) -> Result<Self> {
        bus.write_register(MODE1, 0x00)?;
        Ok(Self { bus })
    }

    /// Prescale value for an output frequency, rounded to the nearest step.
    pub fn prescale_for(frequency_hz: f32) -> Result<u8> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            bail!("pwm frequency must be positive, got {}", frequency_hz);
        }
        let prescale = (OSCILLATOR_HZ / 4096.0 / frequency_hz - 1.0 + 0.5).floor();
        if !(3.0..=255.0).contains(&prescale) {
            bail!("pwm frequency {} Hz is outside the controller range", frequency_hz);
        }
        Ok(prescale as u8)
    }

    pub fn set_pwm_frequency(&mut self, frequency_hz: f32) -> Result<()> {
        let prescale = Self::prescale_for(frequency_hz)?;
        let old_mode = self.bus.read_register(MODE1)?;
        self.bus
            .write_register(MODE1, (old_mode & 0x7F) | MODE1_SLEEP)?;
        self.bus.write_register(PRESCALE, prescale)?;
        self.bus.write_register(MODE1, old_mode)?;
        thread::sleep(OSCILLATOR_SETTLE);
        self.bus.write_register(MODE1, old_mode | MODE1_RESTART)?;
        log::debug!("pca9685 prescale {} for {} Hz", prescale, frequency_hz);
        Ok(())
    }

    pub fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<()> {
        if channel >= CHANNELS {
            bail!("pca9685 channel {} out of range", channel);
        }
        let base = LED0_ON_L + 4 * channel;
        self.bus.write_register(base, (on & 0xFF) as u8)?;
        self.bus.write_register(base + 1, (on >> 8) as u8)?;
        self.bus.write_register(base + 2, (off & 0xFF) as u8)?;
        self.bus.write_register(base + 3, (off >> 8) as u8)?;
        Ok(())
    }

    pub fn into_bus(self) -> B {
        self.bus
    }
}

impl<B: RegisterBus> PwmChannels for Pca9685<B> {
    fn set_duty(&mut self, channel: u8, value: u16) -> Result<()> {
        if value > PWM_MAX {
            bail!("pwm duty {} exceeds {}", value, PWM_MAX);
        }
        self.set_pwm(channel, 0, value)
    }
}
