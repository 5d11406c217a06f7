//! # Coordinator
//!
//! Operation coordinator for emergency alerts.
//!
//! Responsibilities:
//! - Turn a trigger (sensor or manual) into one cancellable countdown
//! - Pre-flight classification / contact checks before committing to it
//! - Prefetch the location while the countdown runs
//! - Dispatch at most once per completed countdown; file the report record
//!   without waiting on it

pub mod coordinator;
pub mod error;
pub mod sinks;

pub use contracts::{AlertOutcome, BeginOutcome, FeedbackHooks, OperationId, OperationState};
pub use coordinator::{Collaborators, OperationCoordinator};
pub use error::{CoordinatorError, Delivery};
pub use sinks::{FileReportSink, LogAlertDispatcher, LogReportSink};
