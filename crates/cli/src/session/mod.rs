//! Alert session orchestration.

mod runner;
mod services;
mod stats;

pub use runner::{Session, SessionConfig, TriggerPlan};
pub use services::ServiceOptions;
pub use stats::{SessionEnd, SessionStats};
