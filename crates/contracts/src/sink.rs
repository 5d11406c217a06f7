//! Delivery traits - where assembled alerts and report records go
//!
//! Both are produced-to boundaries; the engine owns neither channel.

use crate::{AlertPayload, Contact, ContractError, DispatchReport, EmergencyReport};

/// Alert delivery channel
///
/// Called at most once per completed countdown.
#[trait_variant::make(AlertDispatcher: Send)]
pub trait LocalAlertDispatcher {
    /// Channel name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver `payload` to every contact in `contacts`
    ///
    /// # Errors
    /// Returns an error only when the channel could not be reached at all;
    /// per-contact failures are reported inside [`DispatchReport::errors`].
    async fn dispatch(
        &self,
        contacts: &[Contact],
        payload: &AlertPayload,
    ) -> Result<DispatchReport, ContractError>;
}

/// Emergency report sink
///
/// Submissions are fire-and-forget: failures are logged and never block or
/// fail the alert dispatch.
#[trait_variant::make(ReportSink: Send)]
pub trait LocalReportSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Persist one report record
    async fn submit_report(&self, report: &EmergencyReport) -> Result<(), ContractError>;
}
