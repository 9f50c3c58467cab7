//! In-memory hardware for tests and `stub` runs.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::{InputLine, Level, OutputLine, PwmChannels, RegisterBus, PWM_MAX};
use crate::range::Clock;

/// Output line that remembers every level it was driven to.
#[derive(Debug)]
pub struct RecordingLine {
    level: Level,
    history: Vec<Level>,
    keep_history: bool,
}

impl RecordingLine {
    pub fn new() -> Self {
        Self {
            level: Level::Low,
            history: Vec::new(),
            keep_history: true,
        }
    }

    /// Long-running variant: tracks the current level only.
    pub fn without_history() -> Self {
        Self {
            keep_history: false,
            ..Self::new()
        }
    }

    pub fn history(&self) -> &[Level] {
        &self.history
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for RecordingLine {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputLine for RecordingLine {
    fn set_level(&mut self, level: Level) {
        self.level = level;
        if self.keep_history {
            self.history.push(level);
        }
    }
}

/// Input line stuck at one level (disconnected sensor, jammed echo).
#[derive(Clone, Copy, Debug)]
pub struct FixedLine {
    level: Level,
}

impl FixedLine {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl InputLine for FixedLine {
    fn read(&mut self) -> Level {
        self.level
    }
}

/// Clock that advances by a fixed step every time it is read.
///
/// Clones share the same time, so an echo line can observe the instant the
/// sensor sees without advancing it (`peek`).
#[derive(Clone, Debug)]
pub struct SteppingClock {
    now: Rc<Cell<Duration>>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(step: Duration) -> Self {
        Self {
            now: Rc::new(Cell::new(Duration::ZERO)),
            step,
        }
    }

    pub fn peek(&self) -> Duration {
        self.now.get()
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Duration {
        let current = self.now.get();
        self.now.set(current + self.step);
        current
    }
}

/// Echo line driven by a `SteppingClock`: high from `rise_at` until `fall_at`.
#[derive(Clone, Debug)]
pub struct ScriptedEcho {
    clock: SteppingClock,
    rise_at: Option<Duration>,
    fall_at: Option<Duration>,
}

impl ScriptedEcho {
    pub fn new(clock: SteppingClock, rise_at: Option<Duration>, fall_at: Option<Duration>) -> Self {
        Self {
            clock,
            rise_at,
            fall_at,
        }
    }
}

impl InputLine for ScriptedEcho {
    fn read(&mut self) -> Level {
        let t = self.clock.peek();
        let risen = self.rise_at.is_some_and(|rise| t >= rise);
        let fallen = self.fall_at.is_some_and(|fall| t >= fall);
        if risen && !fallen {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// PWM driver that records channel writes instead of driving hardware.
#[derive(Debug)]
pub struct RecordingPwm {
    channels: [u16; 16],
    writes: Vec<(u8, u16)>,
    keep_history: bool,
}

impl RecordingPwm {
    pub fn new() -> Self {
        Self {
            channels: [0; 16],
            writes: Vec::new(),
            keep_history: true,
        }
    }

    /// Long-running variant: tracks channel state only.
    pub fn without_history() -> Self {
        Self {
            keep_history: false,
            ..Self::new()
        }
    }

    pub fn channel(&self, channel: u8) -> u16 {
        self.channels[channel as usize]
    }

    pub fn channels(&self) -> &[u16; 16] {
        &self.channels
    }

    pub fn writes(&self) -> &[(u8, u16)] {
        &self.writes
    }
}

impl Default for RecordingPwm {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmChannels for RecordingPwm {
    fn set_duty(&mut self, channel: u8, value: u16) -> Result<()> {
        if channel as usize >= self.channels.len() {
            return Err(anyhow!("pwm channel {} out of range", channel));
        }
        if value > PWM_MAX {
            return Err(anyhow!("pwm duty {} exceeds {}", value, PWM_MAX));
        }
        self.channels[channel as usize] = value;
        if self.keep_history {
            self.writes.push((channel, value));
        }
        log::trace!("pwm ch{} <- {}", channel, value);
        Ok(())
    }
}

/// 256-register peripheral kept in memory.
#[derive(Debug)]
pub struct MemoryRegisterBus {
    registers: [u8; 256],
    writes: Vec<(u8, u8)>,
}

impl MemoryRegisterBus {
    pub fn new() -> Self {
        Self {
            registers: [0; 256],
            writes: Vec::new(),
        }
    }

    pub fn register(&self, register: u8) -> u8 {
        self.registers[register as usize]
    }

    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }
}

impl Default for MemoryRegisterBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for MemoryRegisterBus {
    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        self.registers[register as usize] = value;
        self.writes.push((register, value));
        Ok(())
    }

    fn read_register(&mut self, register: u8) -> Result<u8> {
        Ok(self.registers[register as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_echo_follows_shared_clock() {
        let clock = SteppingClock::new(Duration::from_micros(10));
        let mut echo = ScriptedEcho::new(
            clock.clone(),
            Some(Duration::from_micros(20)),
            Some(Duration::from_micros(40)),
        );

        assert_eq!(echo.read(), Level::Low);
        clock.now();
        clock.now();
        assert_eq!(echo.read(), Level::High);
        clock.now();
        clock.now();
        assert_eq!(echo.read(), Level::Low);
    }

    #[test]
    fn line_without_history_tracks_level_only() {
        let mut line = RecordingLine::without_history();
        for _ in 0..1_000 {
            line.set_level(Level::High);
            line.set_level(Level::Low);
        }
        line.set_level(Level::High);
        assert_eq!(line.level(), Level::High);
        assert!(line.history().is_empty());

        let mut line = RecordingLine::new();
        line.set_level(Level::High);
        assert_eq!(line.history(), &[Level::High]);
    }

    #[test]
    fn recording_pwm_rejects_out_of_range() {
        let mut pwm = RecordingPwm::new();
        assert!(pwm.set_duty(16, 0).is_err());
        assert!(pwm.set_duty(0, PWM_MAX + 1).is_err());
        pwm.set_duty(3, 1200).unwrap();
        assert_eq!(pwm.channel(3), 1200);
        assert_eq!(pwm.writes(), &[(3, 1200)]);
    }
}
