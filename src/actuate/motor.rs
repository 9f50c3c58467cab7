use anyhow::{anyhow, Result};

use super::duty::DutyProfile;
use crate::hw::PwmChannels;

/// Physical wheel, in profile order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wheel {
    LeftUpper,
    LeftLower,
    RightUpper,
    RightLower,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::LeftUpper,
        Wheel::LeftLower,
        Wheel::RightUpper,
        Wheel::RightLower,
    ];

    /// `(forward, reverse)` PWM channels of the half-bridge.
    pub fn channels(self) -> (u8, u8) {
        match self {
            Wheel::LeftUpper => (1, 0),
            Wheel::LeftLower => (2, 3),
            Wheel::RightUpper => (7, 6),
            Wheel::RightLower => (4, 5),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WheelCommand {
    Forward(u16),
    Reverse(u16),
    Stop,
}

impl WheelCommand {
    /// Command for one clamped duty.
    pub fn from_duty(duty: i32) -> Self {
        let magnitude = duty.unsigned_abs().min(crate::hw::PWM_MAX as u32) as u16;
        match duty {
            0 => WheelCommand::Stop,
            d if d > 0 => WheelCommand::Forward(magnitude),
            _ => WheelCommand::Reverse(magnitude),
        }
    }
}

/// Owns the PWM backend for the four wheel motors.
///
/// Dropping the driver stops every wheel; `release` stops and returns the
/// backend.
pub struct MotorDriver<P: PwmChannels> {
    pwm: Option<P>,
    last: DutyProfile,
}

impl<P: PwmChannels> MotorDriver<P> {
    pub fn new(pwm: P) -> Self {
        Self {
            pwm: Some(pwm),
            last: DutyProfile::STOP,
        }
    }

    pub fn apply(&mut self, profile: DutyProfile) -> Result<()> {
        let pwm = self
            .pwm
            .as_mut()
            .ok_or_else(|| anyhow!("motor driver already released"))?;
        for (wheel, duty) in Wheel::ALL.into_iter().zip(profile.duties()) {
            drive_wheel(pwm, wheel, WheelCommand::from_duty(duty))?;
        }
        self.last = profile;
        log::trace!("duties {:?}", profile.duties());
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.apply(DutyProfile::STOP)
    }

    /// Last profile written in full.
    pub fn last_applied(&self) -> DutyProfile {
        self.last
    }

    /// The PWM backend; `None` only once released.
    pub fn backend(&self) -> Option<&P> {
        self.pwm.as_ref()
    }

    pub fn release(mut self) -> Result<P> {
        self.stop()?;
        self.pwm
            .take()
            .ok_or_else(|| anyhow!("motor driver already released"))
    }
}

impl<P: PwmChannels> Drop for MotorDriver<P> {
    fn drop(&mut self) {
        if self.pwm.is_some() {
            if let Err(err) = self.stop() {
                log::error!("failed to stop motors on drop: {:#}", err);
            }
        }
    }
}

fn drive_wheel<P: PwmChannels>(pwm: &mut P, wheel: Wheel, command: WheelCommand) -> Result<()> {
    let (forward, reverse) = wheel.channels();
    match command {
        WheelCommand::Forward(v) => {
            pwm.set_duty(reverse, 0)?;
            pwm.set_duty(forward, v)?;
        }
        WheelCommand::Reverse(v) => {
            pwm.set_duty(forward, 0)?;
            pwm.set_duty(reverse, v)?;
        }
        WheelCommand::Stop => {
            pwm.set_duty(forward, 0)?;
            pwm.set_duty(reverse, 0)?;
        }
    }
    Ok(())
}
