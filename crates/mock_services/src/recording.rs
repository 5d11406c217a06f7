//! Delivery channel and report sink that keep what they receive

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{
    AlertDispatcher, AlertPayload, Contact, ContractError, DispatchReport, EmergencyReport,
    ReportSink,
};
use tokio::time::sleep;
use tracing::{info, instrument};

/// How the delivery channel answers
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DispatchBehavior {
    /// Every contact reached
    #[default]
    Deliver,
    /// Contacts whose name is listed are not reached; success if any was
    Partial { unreachable: Vec<String> },
    /// Channel unreachable
    Unreachable(String),
}

/// One call to [`RecordingDispatcher::dispatch`]
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub contacts: Vec<Contact>,
    pub payload: AlertPayload,
}

/// Delivery channel that records every alert
#[derive(Default)]
pub struct RecordingDispatcher {
    behavior: Mutex<DispatchBehavior>,
    latency: Duration,
    sent: Mutex<Vec<DispatchRecord>>,
}

impl RecordingDispatcher {
    pub fn new(behavior: DispatchBehavior, latency: Duration) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            latency,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: DispatchBehavior) {
        *lock(&self.behavior) = behavior;
    }

    /// Every alert received so far
    pub fn dispatched(&self) -> Vec<DispatchRecord> {
        lock(&self.sent).clone()
    }

    pub fn dispatch_count(&self) -> usize {
        lock(&self.sent).len()
    }
}

impl AlertDispatcher for RecordingDispatcher {
    fn name(&self) -> &str {
        "recording"
    }

    #[instrument(
        name = "recording_dispatcher_dispatch",
        skip(self, contacts, payload),
        fields(operation_id = %payload.operation_id, contacts = contacts.len())
    )]
    async fn dispatch(
        &self,
        contacts: &[Contact],
        payload: &AlertPayload,
    ) -> Result<DispatchReport, ContractError> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        lock(&self.sent).push(DispatchRecord {
            contacts: contacts.to_vec(),
            payload: payload.clone(),
        });

        let behavior = lock(&self.behavior).clone();
        let report = match behavior {
            DispatchBehavior::Deliver => DispatchReport {
                success: true,
                sent_to: contacts.len(),
                errors: Vec::new(),
            },
            DispatchBehavior::Partial { unreachable } => {
                let errors: Vec<_> = contacts
                    .iter()
                    .filter(|c| unreachable.contains(&c.name))
                    .map(|c| format!("failed to notify {}: no push token", c.name))
                    .collect();
                let sent_to = contacts.len() - errors.len();
                DispatchReport {
                    success: sent_to > 0,
                    sent_to,
                    errors,
                }
            }
            DispatchBehavior::Unreachable(message) => {
                return Err(ContractError::dispatch(message));
            }
        };

        info!(sent_to = report.sent_to, errors = report.errors.len(), "alert recorded");
        Ok(report)
    }
}

/// Report sink that records every report
#[derive(Default)]
pub struct RecordingReportSink {
    fail: AtomicBool,
    reports: Mutex<Vec<EmergencyReport>>,
}

impl RecordingReportSink {
    /// Sink whose every submission fails
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Reports accepted so far
    pub fn reports(&self) -> Vec<EmergencyReport> {
        lock(&self.reports).clone()
    }
}

impl ReportSink for RecordingReportSink {
    fn name(&self) -> &str {
        "recording"
    }

    #[instrument(name = "recording_report_sink_submit", skip(self, report))]
    async fn submit_report(&self, report: &EmergencyReport) -> Result<(), ContractError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ContractError::report_write(
                "recording",
                "report store unavailable",
            ));
        }
        lock(&self.reports).push(report.clone());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{OperationId, ResolvedLocation};

    fn payload() -> AlertPayload {
        AlertPayload {
            operation_id: OperationId(1),
            reporter_id: "civ-1".into(),
            reporter_name: "Ana Cruz".into(),
            location: ResolvedLocation::fallback(),
            message: "Emergency SOS alert from Ana Cruz".into(),
            triggered_at: Utc::now(),
        }
    }

    fn contact(name: &str) -> Contact {
        Contact {
            id: name.to_lowercase(),
            name: name.into(),
            phone_number: "911".into(),
            relationship: String::new(),
            is_primary: true,
        }
    }

    #[tokio::test]
    async fn test_partial_delivery() {
        let dispatcher = RecordingDispatcher::new(
            DispatchBehavior::Partial {
                unreachable: vec!["Jose".into()],
            },
            Duration::ZERO,
        );
        let report = dispatcher
            .dispatch(&[contact("Maria"), contact("Jose")], &payload())
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.sent_to, 1);
        assert_eq!(report.errors, vec!["failed to notify Jose: no push token"]);
        assert_eq!(dispatcher.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_channel_still_recorded() {
        let dispatcher = RecordingDispatcher::new(
            DispatchBehavior::Unreachable("gateway timeout".into()),
            Duration::ZERO,
        );
        assert!(dispatcher.dispatch(&[contact("Maria")], &payload()).await.is_err());
        assert_eq!(dispatcher.dispatched()[0].payload.reporter_name, "Ana Cruz");
    }

    #[tokio::test]
    async fn test_report_sink_failure_toggle() {
        let sink = RecordingReportSink::failing();
        let report = EmergencyReport::for_alert(&payload());
        assert!(sink.submit_report(&report).await.is_err());

        sink.set_failing(false);
        sink.submit_report(&report).await.unwrap();
        assert_eq!(sink.reports().len(), 1);
    }
}
