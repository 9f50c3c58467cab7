//! signpilot
//!
//! A sign-following rover: it reads a round traffic sign off a camera still,
//! recognises the speed it shows and drives its four wheels at that speed,
//! stopping whenever perception fails.
//!
//! # Architecture
//!
//! One cycle turns a raw frame into a wheel command:
//!
//! ```text
//! frame -> region -> crop -> feature vector -> label -> duty profile -> PWM writes
//! ```
//!
//! Safety rules hold by construction:
//!
//! 1. **Stop on doubt**: no frame, no circle or an unusable crop writes the zero profile.
//! 2. **Bounded sensing**: every echo wait has a deadline; a timeout is a value, not an error.
//! 3. **Clamped output**: every duty is clamped to the 12-bit PWM range.
//! 4. **Stopped on exit**: shutdown, early return and unwinding all end in a zero write.
//!
//! # Module Structure
//!
//! - `hw`: digital lines, register bus and PWM seams (stub and Raspberry Pi backends)
//! - `range`: ultrasonic pulse-echo ranging
//! - `frame`: RGB frames, regions and fixed-size crops
//! - `detect`: gradient Hough circle detection
//! - `classify`: k-nearest-neighbour labels over raw crop pixels, and hold-out evaluation
//! - `actuate`: label to duty mapping, motor driver and PCA9685 controller
//! - `ingest`: frame sources (stub, still files, `rpicam-still`)
//! - `config`: file and environment configuration
//! - `control`: the cyclic state machine tying it together

pub mod actuate;
pub mod classify;
pub mod config;
pub mod control;
pub mod detect;
pub mod frame;
pub mod hw;
pub mod ingest;
pub mod range;

pub use actuate::{DutyProfile, MotorDriver, SpeedTable, WheelCommand};
pub use classify::{ClassLabel, FeatureVector, NearestNeighborClassifier, ReferenceSet};
pub use config::RobotConfig;
pub use control::{ControlLoop, LoopSettings, LoopState, LoopStats, Phase, StopReason};
pub use detect::{CircleDetector, DetectorParams, RegionDetector};
pub use frame::{BoundingBox, Crop, Frame, Region, CROP_FEATURE_LEN, CROP_SIZE};
pub use ingest::{open_source, FrameSource};
pub use range::{Distance, RangeSensor, Ranging};
