//! Label to wheel duties, and the motor driver that writes them.

mod duty;
mod motor;
mod pca9685;

pub use duty::{DutyProfile, SpeedTable, DEFAULT_MAGNITUDE, MAX_DUTY};
pub use motor::{MotorDriver, Wheel, WheelCommand};
pub use pca9685::{Pca9685, DEFAULT_ADDRESS};
