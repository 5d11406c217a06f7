//! Operation lifecycle types
//!
//! Identity, state and outcome of a single alert intent, and the
//! observational hooks the coordinator reports them through.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Classification;

/// Generation number of an alert intent
///
/// Allocated from a monotonically increasing counter; a continuation whose
/// captured id differs from the active one must discard itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Operation state machine
///
/// `Idle → CountingDown → Dispatching → Completed` or
/// `Idle → CountingDown → Cancelled`; terminal states fall back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum OperationState {
    #[default]
    Idle,
    CountingDown {
        remaining_seconds: u32,
    },
    Dispatching,
    Completed,
    Cancelled,
}

impl OperationState {
    pub fn is_counting_down(&self) -> bool {
        matches!(self, OperationState::CountingDown { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Completed | OperationState::Cancelled)
    }
}

/// Where an alert intent came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Sensor,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Sensor => "sensor",
        }
    }
}

/// Reason a pre-flight check refused to start a countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum Rejection {
    /// Classification forbids alert use
    Ineligible { classification: Classification },
    /// Classification neither cached nor fetchable
    ClassificationUnavailable { message: String },
    /// No primary contact configured (or none could be loaded)
    NoContacts,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Ineligible { .. } => "ineligible",
            Rejection::ClassificationUnavailable { .. } => "classification_unavailable",
            Rejection::NoContacts => "no_contacts",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Ineligible { classification } => write!(
                f,
                "alerts are not available for {classification:?} accounts"
            ),
            Rejection::ClassificationUnavailable { message } => {
                write!(f, "could not verify account type: {message}")
            }
            Rejection::NoContacts => write!(
                f,
                "at least one primary emergency contact is required to send alerts"
            ),
        }
    }
}

/// Outcome surfaced to the UI through [`FeedbackHooks::on_outcome`]
///
/// Cancelled operations produce no outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum AlertOutcome {
    /// Pre-flight refused; no countdown was started
    Rejected(Rejection),
    /// Delivery channel accepted the alert; `errors` lists partial failures
    Delivered {
        operation_id: OperationId,
        sent_to: usize,
        errors: Vec<String>,
    },
    /// Dispatch was attempted and failed
    Failed {
        operation_id: OperationId,
        message: String,
    },
}

impl AlertOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, AlertOutcome::Delivered { .. })
    }
}

/// Immediate result of `begin()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Countdown started for a new operation
    Started(OperationId),
    /// The call cancelled the operation that was counting down
    Cancelled(OperationId),
    /// Pre-flight refused
    Rejected(Rejection),
    /// Another intent is being prepared or dispatched; call ignored
    Busy,
}

/// UI feedback hooks
///
/// Purely observational; the engine never reads anything back.
pub trait FeedbackHooks: Send + Sync {
    fn on_countdown_tick(&self, _operation_id: OperationId, _remaining_seconds: u32) {}

    fn on_state_change(&self, _state: OperationState) {}

    fn on_outcome(&self, _outcome: &AlertOutcome) {}
}

/// Hooks that ignore every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl FeedbackHooks for NoopHooks {}
