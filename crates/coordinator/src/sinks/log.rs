//! Log sinks - alerts and report records logged via tracing

use contracts::{
    AlertDispatcher, AlertPayload, Contact, ContractError, DispatchReport, EmergencyReport,
    ReportSink,
};
use tracing::{info, instrument};

/// Delivery channel that logs the alert once per contact
///
/// Every contact counts as reached.
pub struct LogAlertDispatcher {
    name: String,
}

impl LogAlertDispatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl AlertDispatcher for LogAlertDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_dispatcher_dispatch",
        skip(self, contacts, payload),
        fields(dispatcher = %self.name, operation_id = %payload.operation_id)
    )]
    async fn dispatch(
        &self,
        contacts: &[Contact],
        payload: &AlertPayload,
    ) -> Result<DispatchReport, ContractError> {
        for contact in contacts {
            info!(
                contact = %contact.name,
                phone = %contact.phone_number,
                reporter = %payload.reporter_name,
                address = %payload.location.address,
                lat = payload.location.latitude,
                lon = payload.location.longitude,
                message = %payload.message,
                "SOS alert sent"
            );
        }

        Ok(DispatchReport {
            success: !contacts.is_empty(),
            sent_to: contacts.len(),
            errors: Vec::new(),
        })
    }
}

/// Report sink that logs each record
pub struct LogReportSink {
    name: String,
}

impl LogReportSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ReportSink for LogReportSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_report_sink_submit", skip(self, report), fields(sink = %self.name))]
    async fn submit_report(&self, report: &EmergencyReport) -> Result<(), ContractError> {
        info!(
            kind = %report.kind,
            reporter = %report.reporter_name,
            reporter_id = %report.reporter_id,
            address = %report.location.address,
            severity = ?report.severity,
            created_at = %report.created_at,
            "emergency report filed"
        );
        Ok(())
    }
}
