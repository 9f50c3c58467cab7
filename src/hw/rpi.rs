#![cfg(feature = "hw-rpi")]

//! Raspberry Pi GPIO and I2C via `rppal`.
//!
//! Pins are reset to their previous mode when dropped, which is how the trigger
//! and echo lines are released on shutdown.

use anyhow::{Context, Result};
use rppal::gpio::{self, Gpio, InputPin, OutputPin};
use rppal::i2c::I2c;

use super::{InputLine, Level, OutputLine, RegisterBus};

pub struct RpiOutputLine {
    pin: OutputPin,
}

impl OutputLine for RpiOutputLine {
    fn set_level(&mut self, level: Level) {
        match level {
            Level::High => self.pin.set_high(),
            Level::Low => self.pin.set_low(),
        }
    }
}

pub struct RpiInputLine {
    pin: InputPin,
}

impl InputLine for RpiInputLine {
    fn read(&mut self) -> Level {
        match self.pin.read() {
            gpio::Level::High => Level::High,
            gpio::Level::Low => Level::Low,
        }
    }
}

/// Claim BCM pins `trigger` (output, initially low) and `echo` (input).
pub fn acquire_echo_lines(trigger: u8, echo: u8) -> Result<(RpiOutputLine, RpiInputLine)> {
    let gpio = Gpio::new().context("failed to open GPIO (is this a Raspberry Pi?)")?;
    let trigger_pin = gpio
        .get(trigger)
        .with_context(|| format!("failed to claim trigger pin BCM{}", trigger))?
        .into_output_low();
    let echo_pin = gpio
        .get(echo)
        .with_context(|| format!("failed to claim echo pin BCM{}", echo))?
        .into_input();
    log::info!("echo lines acquired: trigger=BCM{} echo=BCM{}", trigger, echo);
    Ok((
        RpiOutputLine { pin: trigger_pin },
        RpiInputLine { pin: echo_pin },
    ))
}

/// SMBus byte-register access to one I2C slave.
pub struct RpiI2cBus {
    i2c: I2c,
}

impl RpiI2cBus {
    pub fn open(address: u16) -> Result<Self> {
        let mut i2c = I2c::new().context("failed to open I2C bus")?;
        i2c.set_slave_address(address)
            .with_context(|| format!("failed to select I2C address 0x{:02x}", address))?;
        Ok(Self { i2c })
    }
}

impl RegisterBus for RpiI2cBus {
    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        self.i2c
            .smbus_write_byte(register, value)
            .with_context(|| format!("i2c write to register 0x{:02x} failed", register))
    }

    fn read_register(&mut self, register: u8) -> Result<u8> {
        self.i2c
            .smbus_read_byte(register)
            .with_context(|| format!("i2c read of register 0x{:02x} failed", register))
    }
}
