//! # Shake Detector
//!
//! Turns a raw accelerometer stream into discrete "triple-shake" triggers.
//!
//! - [`ShakeDetector`]: pure per-sample state transition (no I/O)
//! - [`MotionSignalProcessor`]: owns the single sensor subscription and the
//!   trigger callback, with enable/disable and live reconfiguration
//!
//! ## Usage
//!
//! ```ignore
//! use shake_detector::MotionSignalProcessor;
//!
//! let processor = MotionSignalProcessor::new(sensor, config.shake);
//! processor.start(Arc::new(move || trigger_tx.send(TriggerSource::Sensor).ok()));
//! ```

mod detector;
mod processor;

pub use contracts::{MotionSample, ShakeConfig, ShakeConfigPatch};
pub use detector::{SampleOutcome, ShakeDetector};
pub use processor::{MotionSignalProcessor, TriggerCallback};
