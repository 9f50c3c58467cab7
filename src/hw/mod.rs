//! Hardware seams.
//!
//! The rover touches hardware through four narrow traits:
//! - `OutputLine` / `InputLine`: single digital GPIO lines (ultrasonic trigger/echo)
//! - `RegisterBus`: byte-register access to an I2C peripheral (PWM controller)
//! - `PwmChannels`: per-channel duty writes on a half-bridge driver
//!
//! Acquiring a line or bus is fallible and happens once at startup. Once acquired,
//! line reads and writes are infallible; releasing happens on drop.
//!
//! Backends:
//! - `stub`: in-memory lines and recording buses (tests, `stub` runs)
//! - `rpi`: Raspberry Pi GPIO and I2C via `rppal` (feature: hw-rpi)

use anyhow::{anyhow, Result};

pub mod stub;

#[cfg(feature = "hw-rpi")]
pub mod rpi;

/// Largest duty value accepted by a PWM channel (12-bit).
pub const PWM_MAX: u16 = 4095;

/// Logic level of a digital line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// A driven digital line.
pub trait OutputLine {
    fn set_level(&mut self, level: Level);
}

/// A sampled digital line.
pub trait InputLine {
    fn read(&mut self) -> Level;
}

/// Byte-wide register access to a bus peripheral.
pub trait RegisterBus {
    fn write_register(&mut self, register: u8, value: u8) -> Result<()>;
    fn read_register(&mut self, register: u8) -> Result<u8>;
}

/// Half-bridge PWM driver: one duty value per physical channel.
pub trait PwmChannels {
    /// Set `channel` to `value` in `0..=PWM_MAX`.
    fn set_duty(&mut self, channel: u8, value: u16) -> Result<()>;
}

impl<T: OutputLine + ?Sized> OutputLine for Box<T> {
    fn set_level(&mut self, level: Level) {
        (**self).set_level(level)
    }
}

impl<T: InputLine + ?Sized> InputLine for Box<T> {
    fn read(&mut self) -> Level {
        (**self).read()
    }
}

impl<T: PwmChannels + ?Sized> PwmChannels for Box<T> {
    fn set_duty(&mut self, channel: u8, value: u16) -> Result<()> {
        (**self).set_duty(channel, value)
    }
}

/// Which hardware implementation to bind at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HardwareBackend {
    Stub,
    RaspberryPi,
}

impl HardwareBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "rpi" | "raspberry-pi" => Ok(Self::RaspberryPi),
            other => Err(anyhow!(
                "unknown hardware backend '{}'; expected 'stub' or 'rpi'",
                other
            )),
        }
    }

    /// Backend used when nothing is configured: real hardware when compiled in.
    pub fn default_for_build() -> Self {
        if cfg!(feature = "hw-rpi") {
            Self::RaspberryPi
        } else {
            Self::Stub
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stub => "stub",
            Self::RaspberryPi => "rpi",
        }
    }
}

pub type EchoLines = (Box<dyn OutputLine>, Box<dyn InputLine>);

/// Acquire the trigger (output) and echo (input) lines of an ultrasonic sensor.
///
/// The stub echo line never rises, so every measurement times out.
pub fn open_echo_lines(backend: HardwareBackend, trigger: u8, echo: u8) -> Result<EchoLines> {
    match backend {
        HardwareBackend::Stub => {
            log::info!(
                "echo lines: stub backend (trigger={}, echo={})",
                trigger,
                echo
            );
            Ok((
                Box::new(stub::RecordingLine::without_history()),
                Box::new(stub::FixedLine::new(Level::Low)),
            ))
        }
        HardwareBackend::RaspberryPi => {
            #[cfg(feature = "hw-rpi")]
            {
                let (trigger, echo) = rpi::acquire_echo_lines(trigger, echo)?;
                Ok((Box::new(trigger), Box::new(echo)))
            }
            #[cfg(not(feature = "hw-rpi"))]
            {
                let _ = (trigger, echo);
                Err(anyhow!("GPIO access requires the hw-rpi feature"))
            }
        }
    }
}

/// Acquire the motor PWM driver.
///
/// The Raspberry Pi backend talks to a PCA9685 on I2C bus 1 at `i2c_address`.
pub fn open_pwm(
    backend: HardwareBackend,
    i2c_address: u16,
    frequency_hz: f32,
) -> Result<Box<dyn PwmChannels>> {
    match backend {
        HardwareBackend::Stub => {
            log::info!("motor pwm: stub backend");
            Ok(Box::new(stub::RecordingPwm::without_history()))
        }
        HardwareBackend::RaspberryPi => {
            #[cfg(feature = "hw-rpi")]
            {
                let bus = rpi::RpiI2cBus::open(i2c_address)?;
                let mut pca = crate::actuate::Pca9685::new(bus)?;
                pca.set_pwm_frequency(frequency_hz)?;
                log::info!(
                    "motor pwm: pca9685 at 0x{:02x}, {} Hz",
                    i2c_address,
                    frequency_hz
                );
                Ok(Box::new(pca))
            }
            #[cfg(not(feature = "hw-rpi"))]
            {
                let _ = (i2c_address, frequency_hz);
                Err(anyhow!("PCA9685 access requires the hw-rpi feature"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!(HardwareBackend::parse("stub").unwrap(), HardwareBackend::Stub);
        assert_eq!(
            HardwareBackend::parse(" RPI ").unwrap(),
            HardwareBackend::RaspberryPi
        );
        assert!(HardwareBackend::parse("arduino").is_err());
    }

    #[test]
    fn stub_echo_line_stays_low() {
        let (mut trigger, mut echo) = open_echo_lines(HardwareBackend::Stub, 23, 24).unwrap();
        trigger.set_level(Level::High);
        assert_eq!(echo.read(), Level::Low);
    }
}
