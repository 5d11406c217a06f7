//! # Contracts
//!
//! Frozen interface contracts for the emergency-alert engine: the data model
//! shared by every component, the narrow traits through which the engine
//! reaches its external collaborators, and the engine configuration.
//! All component crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Motion samples carry the sensor's own millisecond timestamp, which is the
//!   only clock the shake detector reads
//! - Countdown, cache freshness and location deadlines run on the tokio clock

mod alert;
mod engine_config;
mod error;
mod motion;
mod operation;
mod services;
mod sink;
mod user_id;

pub use alert::*;
pub use engine_config::*;
pub use error::*;
pub use motion::{MotionCallback, MotionSample, MotionSource, SubscriptionHandle};
pub use operation::*;
pub use services::*;
pub use sink::*;
pub use user_id::UserId;
