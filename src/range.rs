//! Ultrasonic pulse-echo ranging (HC-SR04 style).
//!
//! A measurement drives a 10 µs trigger pulse, then waits in two independently
//! bounded busy-poll phases:
//! 1. echo line rises (no rise before the deadline: nothing in range)
//! 2. echo line falls (no fall before the deadline: echo held abnormally long)
//!
//! Either timeout yields `Distance::Unknown`. A timeout is an ordinary outcome,
//! not an error; acquiring the lines is the only fallible step and happens before
//! the sensor is built.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crate::hw::{InputLine, Level, OutputLine};

/// Speed of sound in air at room temperature, in cm/s.
pub const SPEED_OF_SOUND_CM_S: f64 = 34_300.0;

pub const TRIGGER_PULSE: Duration = Duration::from_micros(10);

pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_millis(30);

/// One ranging result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Distance {
    Centimeters(f64),
    /// No complete echo within the timeout.
    Unknown,
}

impl Distance {
    /// Convert the high time of an echo pulse (round trip) into a one-way distance.
    pub fn from_echo(high_time: Duration) -> Self {
        Distance::Centimeters(high_time.as_secs_f64() * SPEED_OF_SOUND_CM_S / 2.0)
    }

    pub fn centimeters(self) -> Option<f64> {
        match self {
            Distance::Centimeters(cm) => Some(cm),
            Distance::Unknown => None,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Distance::Unknown)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distance::Centimeters(cm) => write!(f, "{:.2} cm", cm),
            Distance::Unknown => write!(f, "-- (timeout)"),
        }
    }
}

/// Monotonic time source, as an offset from an arbitrary origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Anything that can produce a distance reading.
pub trait Ranging {
    fn measure(&mut self, timeout: Duration) -> Distance;
}

/// Pulse-echo range sensor over one output and one input line.
pub struct RangeSensor<T, E, C = MonotonicClock> {
    trigger: T,
    echo: E,
    clock: C,
}

impl<T: OutputLine, E: InputLine> RangeSensor<T, E> {
    pub fn new(trigger: T, echo: E) -> Self {
        Self::with_clock(trigger, echo, MonotonicClock::new())
    }
}

impl<T: OutputLine, E: InputLine, C: Clock> RangeSensor<T, E, C> {
    pub fn with_clock(mut trigger: T, echo: E, clock: C) -> Self {
        trigger.set_level(Level::Low);
        Self {
            trigger,
            echo,
            clock,
        }
    }

    /// Fire one ping and time its echo.
    pub fn measure(&mut self, timeout: Duration) -> Distance {
        self.trigger.set_level(Level::High);
        thread::sleep(TRIGGER_PULSE);
        self.trigger.set_level(Level::Low);

        let sent = self.clock.now();
        let Some(rise) = self.wait_for(Level::High, sent, timeout) else {
            log::trace!("echo never rose within {:?}", timeout);
            return Distance::Unknown;
        };
        let Some(fall) = self.wait_for(Level::Low, rise, timeout) else {
            log::trace!("echo held high longer than {:?}", timeout);
            return Distance::Unknown;
        };
        Distance::from_echo(fall.saturating_sub(rise))
    }

    /// Poll until the echo line reads `level`; `None` once `timeout` has passed since `since`.
    fn wait_for(&mut self, level: Level, since: Duration, timeout: Duration) -> Option<Duration> {
        loop {
            if self.echo.read() == level {
                return Some(self.clock.now());
            }
            if self.clock.now().saturating_sub(since) > timeout {
                return None;
            }
        }
    }

    /// Drive the trigger low and hand the lines back.
    pub fn release(mut self) -> (T, E) {
        self.trigger.set_level(Level::Low);
        (self.trigger, self.echo)
    }
}

impl<T: OutputLine, E: InputLine, C: Clock> Ranging for RangeSensor<T, E, C> {
    fn measure(&mut self, timeout: Duration) -> Distance {
        RangeSensor::measure(self, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::stub::{FixedLine, RecordingLine, ScriptedEcho, SteppingClock};

    fn step_clock() -> SteppingClock {
        SteppingClock::new(Duration::from_micros(10))
    }

    #[test]
    fn converts_round_trip_to_one_way_distance() {
        let d = Distance::from_echo(Duration::from_micros(1000));
        let cm = d.centimeters().unwrap();
        assert!((cm - 17.15).abs() < 1e-9);
    }

    #[test]
    fn measures_scripted_echo() {
        let clock = step_clock();
        // ~583 µs round trip is ~10 cm.
        let echo = ScriptedEcho::new(
            clock.clone(),
            Some(Duration::from_micros(1_000)),
            Some(Duration::from_micros(1_583)),
        );
        let mut sensor = RangeSensor::with_clock(RecordingLine::new(), echo, clock);

        let cm = sensor
            .measure(DEFAULT_ECHO_TIMEOUT)
            .centimeters()
            .expect("echo should be timed");
        assert!((cm - 10.0).abs() < 0.5, "measured {cm} cm");
    }

    #[test]
    fn trigger_pulses_high_then_low() {
        let clock = step_clock();
        let echo = ScriptedEcho::new(clock.clone(), None, None);
        let mut sensor = RangeSensor::with_clock(RecordingLine::new(), echo, clock);
        sensor.measure(Duration::from_millis(1));
        let (trigger, _) = sensor.release();
        assert_eq!(
            trigger.history(),
            &[Level::Low, Level::High, Level::Low, Level::Low]
        );
    }

    #[test]
    fn missing_rise_is_unknown() {
        let clock = step_clock();
        let echo = ScriptedEcho::new(clock.clone(), None, None);
        let mut sensor = RangeSensor::with_clock(RecordingLine::new(), echo, clock.clone());

        assert_eq!(sensor.measure(DEFAULT_ECHO_TIMEOUT), Distance::Unknown);
        // Deadline checked every poll: stops one step past the timeout.
        assert!(clock.peek() <= DEFAULT_ECHO_TIMEOUT + Duration::from_micros(50));
    }

    #[test]
    fn missing_fall_is_unknown() {
        let clock = step_clock();
        let echo = ScriptedEcho::new(clock.clone(), Some(Duration::from_micros(500)), None);
        let mut sensor = RangeSensor::with_clock(RecordingLine::new(), echo, clock.clone());

        assert_eq!(sensor.measure(DEFAULT_ECHO_TIMEOUT), Distance::Unknown);
        let bound = Duration::from_micros(500) + DEFAULT_ECHO_TIMEOUT + Duration::from_micros(50);
        assert!(clock.peek() <= bound);
    }

    #[test]
    fn never_rising_line_returns_within_bound() {
        let mut sensor = RangeSensor::new(RecordingLine::new(), FixedLine::new(Level::Low));
        let timeout = Duration::from_millis(30);

        let start = Instant::now();
        let distance = sensor.measure(timeout);
        let elapsed = start.elapsed();

        assert_eq!(distance, Distance::Unknown);
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout * 3, "took {:?}", elapsed);
    }

    #[test]
    fn stuck_high_line_returns_within_bound() {
        let mut sensor = RangeSensor::new(RecordingLine::new(), FixedLine::new(Level::High));
        let timeout = Duration::from_millis(30);

        let start = Instant::now();
        let distance = sensor.measure(timeout);
        let elapsed = start.elapsed();

        assert_eq!(distance, Distance::Unknown);
        assert!(elapsed < timeout * 3, "took {:?}", elapsed);
    }

    #[test]
    fn displays_timeout_sentinel() {
        assert_eq!(Distance::Unknown.to_string(), "-- (timeout)");
        assert_eq!(Distance::Centimeters(12.345).to_string(), "12.35 cm");
    }
}
