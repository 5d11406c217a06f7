//! Session feedback hooks and statistics.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{AlertOutcome, FeedbackHooks, OperationId, OperationState, TriggerSource};
use coordinator::Delivery;
use observability::AlertMetricsAggregator;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::info;

/// Engine notification forwarded to the session loop
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    CountdownStarted(OperationId),
    Tick(OperationId, u32),
    Cancelled,
    Outcome(AlertOutcome),
}

/// Feedback hooks for a CLI session
///
/// Aggregates what the engine reports and forwards it to the session loop.
pub struct SessionHooks {
    events: mpsc::UnboundedSender<SessionEvent>,
    metrics: Mutex<AlertMetricsAggregator>,
    countdown: Mutex<Option<(OperationId, Instant)>>,
}

impl SessionHooks {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            events,
            metrics: Mutex::new(AlertMetricsAggregator::new()),
            countdown: Mutex::new(None),
        }
    }

    pub fn record_trigger(&self, source: TriggerSource) {
        self.metrics().record_trigger(source);
    }

    /// Snapshot of the aggregated metrics
    pub fn metrics_snapshot(&self) -> AlertMetricsAggregator {
        self.metrics().clone()
    }

    fn metrics(&self) -> MutexGuard<'_, AlertMetricsAggregator> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn countdown(&self) -> MutexGuard<'_, Option<(OperationId, Instant)>> {
        self.countdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // the loop may already be gone after a timeout
        let _ = self.events.send(event);
    }
}

impl FeedbackHooks for SessionHooks {
    fn on_countdown_tick(&self, operation_id: OperationId, remaining_seconds: u32) {
        let first = {
            let mut countdown = self.countdown();
            match *countdown {
                Some((id, _)) if id == operation_id => false,
                _ => {
                    *countdown = Some((operation_id, Instant::now()));
                    true
                }
            }
        };

        if first {
            self.metrics().record_countdown_started();
            self.emit(SessionEvent::CountdownStarted(operation_id));
        } else {
            self.metrics().record_tick();
        }
        info!(operation_id = %operation_id, remaining = remaining_seconds, "SOS countdown");
        self.emit(SessionEvent::Tick(operation_id, remaining_seconds));
    }

    fn on_state_change(&self, state: OperationState) {
        if state == OperationState::Cancelled {
            self.metrics().record_cancellation();
            self.emit(SessionEvent::Cancelled);
        }
    }

    fn on_outcome(&self, outcome: &AlertOutcome) {
        let countdown = *self.countdown();
        let latency_ms = match (outcome, countdown) {
            (
                AlertOutcome::Delivered { operation_id, .. }
                | AlertOutcome::Failed { operation_id, .. },
                Some((id, started)),
            ) if id == *operation_id => Some(started.elapsed().as_secs_f64() * 1000.0),
            _ => None,
        };
        self.metrics().record_outcome(outcome, latency_ms);
        self.emit(SessionEvent::Outcome(outcome.clone()));
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    Outcome(AlertOutcome),
    Cancelled,
    /// Motion stream finished or the trigger was ignored
    NoAlert,
    TimedOut,
    Interrupted,
}

/// Statistics from one session
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub user_id: String,
    pub trigger: &'static str,
    pub end: SessionEnd,
    pub operation_id: Option<OperationId>,
    pub ticks: Vec<u32>,
    pub duration: Duration,
    pub metrics: AlertMetricsAggregator,
}

impl SessionStats {
    /// Delivered alert, if any
    pub fn delivery(&self) -> Option<Delivery> {
        match &self.end {
            SessionEnd::Outcome(outcome) => Delivery::try_from(outcome.clone()).ok(),
            _ => None,
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                       SOS Session                            ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ User: {}", self.user_id);
        println!("   ├─ Trigger: {}", self.trigger);
        match self.operation_id {
            Some(id) => println!("   ├─ Operation: {id}"),
            None => println!("   ├─ Operation: (none)"),
        }
        println!("   ├─ Countdown: {:?}", self.ticks);
        println!("   └─ Duration: {:.2}s", self.duration.as_secs_f64());

        println!("\n🚨 Result");
        match &self.end {
            SessionEnd::Outcome(outcome) => match Delivery::try_from(outcome.clone()) {
                Ok(delivery) => {
                    println!("   ├─ Alert sent to {} contact(s)", delivery.sent_to);
                    if delivery.errors.is_empty() {
                        println!("   └─ No delivery errors");
                    } else {
                        println!("   └─ Errors: {}", delivery.errors.join("; "));
                    }
                }
                Err(e) => println!("   └─ {e}"),
            },
            SessionEnd::Cancelled => println!("   └─ Countdown cancelled, no alert sent"),
            SessionEnd::NoAlert => println!("   └─ No alert was triggered"),
            SessionEnd::TimedOut => println!("   └─ Session timed out"),
            SessionEnd::Interrupted => println!("   └─ Interrupted"),
        }

        let summary = self.metrics.summary();
        println!("\n📈 Engine Metrics");
        println!("   ├─ Triggers: {}", summary.total_triggers);
        println!("   ├─ Countdowns started: {}", summary.countdowns_started);
        println!("   ├─ Cancellations: {}", summary.cancellations);
        println!(
            "   ├─ Delivered / failed / rejected: {} / {} / {}",
            summary.delivered, summary.failed, summary.rejected
        );
        println!("   ├─ Contacts reached: {}", summary.contacts_reached);
        println!(
            "   └─ Countdown to outcome (ms): {:.0}",
            summary.dispatch_latency_ms.mean
        );

        if !summary.rejection_counts.is_empty() {
            println!("\n⚠️  Rejections");
            for (reason, count) in &summary.rejection_counts {
                println!("   ├─ {}: {}", reason, count);
            }
        }

        println!();
    }
}
