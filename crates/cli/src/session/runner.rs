//! Session runner - wires the engine to its collaborators and a trigger.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use contracts::{
    BeginOutcome, EngineConfig, MotionSample, MotionSource, OperationId, TriggerSource, UserId,
};
use coordinator::OperationCoordinator;
use mock_services::{MockMotionSensor, PlaybackConfig, ReplayMotionSensor};
use shake_detector::{MotionSignalProcessor, TriggerCallback};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::services::{build_services, CliServices, ServiceOptions};
use super::stats::{SessionEnd, SessionEvent, SessionHooks, SessionStats};
use crate::error::CliError;

/// Extra time after the motion stream ends for a late trigger to be checked
const STREAM_GRACE: Duration = Duration::from_secs(2);

/// What starts the alert
#[derive(Debug, Clone)]
pub enum TriggerPlan {
    /// One press of the SOS button
    Manual,
    /// Scripted triple shake from the mock accelerometer
    Synthetic,
    /// Recorded accelerometer trace
    Replay {
        path: PathBuf,
        playback: PlaybackConfig,
    },
}

impl TriggerPlan {
    fn label(&self) -> &'static str {
        match self {
            TriggerPlan::Manual => "manual",
            TriggerPlan::Synthetic => "synthetic shake",
            TriggerPlan::Replay { .. } => "replayed shake",
        }
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    pub user_id: UserId,
    pub trigger: TriggerPlan,
    pub services: ServiceOptions,
    /// Cancel the countdown this long after it starts
    pub cancel_after: Option<Duration>,
    /// Give up waiting for an outcome (None = wait forever)
    pub timeout: Option<Duration>,
    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Trigger-side notifications
enum TriggerEvent {
    Fired(TriggerSource),
    Begun(BeginOutcome),
}

enum Step {
    Trigger(TriggerEvent),
    Engine(SessionEvent),
    Interrupted,
    Closed,
}

/// One alert session
pub struct Session {
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Run until the alert is delivered, rejected or cancelled, the motion
    /// stream ends without a trigger, the timeout passes, or `shutdown`
    /// resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<SessionStats> {
        let started = Instant::now();
        let config = self.config;

        if let Some(port) = config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let services = build_services(&config.services)?;
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let hooks = Arc::new(SessionHooks::new(event_tx));
        let coordinator = OperationCoordinator::<CliServices>::new(
            config.user_id.clone(),
            config.engine.clone(),
            services,
            hooks.clone(),
        );

        let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel();
        let (processor, mut idle_deadline) = match &config.trigger {
            TriggerPlan::Manual => {
                info!("Pressing the SOS button");
                let _ = trigger_tx.send(TriggerEvent::Fired(TriggerSource::Manual));
                let outcome = coordinator.on_manual_trigger().await;
                let _ = trigger_tx.send(TriggerEvent::Begun(outcome));
                (None, None)
            }
            TriggerPlan::Synthetic => {
                let sensor = MockMotionSensor::with_defaults("synthetic");
                let bound = stream_end(started, sensor.samples(), PlaybackConfig::default());
                let processor = listen(
                    Arc::new(sensor),
                    &config.engine,
                    &coordinator,
                    trigger_tx.clone(),
                );
                (Some(processor), bound)
            }
            TriggerPlan::Replay { path, playback } => {
                let sensor = ReplayMotionSensor::load(path, *playback).map_err(|e| {
                    CliError::Recording {
                        path: path.clone(),
                        message: e.to_string(),
                    }
                })?;
                info!(path = %path.display(), samples = sensor.samples().len(), "Replaying motion recording");
                let bound = stream_end(started, sensor.samples(), *playback);
                let processor = listen(
                    Arc::new(sensor),
                    &config.engine,
                    &coordinator,
                    trigger_tx.clone(),
                );
                (Some(processor), bound)
            }
        };

        let deadline = config.timeout.map(|timeout| started + timeout);
        let mut operation_id: Option<OperationId> = None;
        let mut ticks = Vec::new();
        tokio::pin!(shutdown);

        let end = loop {
            let next = async {
                tokio::select! {
                    Some(event) = trigger_rx.recv() => Step::Trigger(event),
                    Some(event) = event_rx.recv() => Step::Engine(event),
                    _ = &mut shutdown => Step::Interrupted,
                    else => Step::Closed,
                }
            };

            let wake = [deadline, idle_deadline].into_iter().flatten().min();
            let step = match wake {
                Some(at) => match timeout_at(at, next).await {
                    Ok(step) => step,
                    Err(_) if deadline.is_some_and(|d| Instant::now() >= d) => {
                        warn!("Session timed out before an outcome");
                        break SessionEnd::TimedOut;
                    }
                    Err(_) => {
                        info!("Motion stream ended without a trigger");
                        break SessionEnd::NoAlert;
                    }
                },
                None => next.await,
            };

            match step {
                Step::Trigger(TriggerEvent::Fired(source)) => {
                    hooks.record_trigger(source);
                    idle_deadline = None;
                }
                Step::Trigger(TriggerEvent::Begun(outcome)) => match outcome {
                    BeginOutcome::Started(id) => {
                        if let Some(after) = config.cancel_after {
                            schedule_cancel(coordinator.clone(), id, after);
                        }
                    }
                    BeginOutcome::Cancelled(id) => {
                        info!(operation_id = %id, "Trigger cancelled the countdown");
                    }
                    // the outcome hook carries the rejection
                    BeginOutcome::Rejected(_) => {}
                    BeginOutcome::Busy => debug!("Trigger ignored, alert in progress"),
                },
                Step::Engine(SessionEvent::CountdownStarted(id)) => {
                    operation_id = Some(id);
                    ticks.clear();
                }
                Step::Engine(SessionEvent::Tick(id, remaining)) => {
                    if operation_id == Some(id) {
                        ticks.push(remaining);
                    }
                }
                Step::Engine(SessionEvent::Cancelled) => break SessionEnd::Cancelled,
                Step::Engine(SessionEvent::Outcome(outcome)) => break SessionEnd::Outcome(outcome),
                Step::Interrupted => {
                    warn!("Received shutdown signal, stopping session...");
                    coordinator.cancel();
                    break SessionEnd::Interrupted;
                }
                Step::Closed => break SessionEnd::NoAlert,
            }
        };

        if let Some(processor) = processor {
            processor.stop();
        }

        Ok(SessionStats {
            user_id: config.user_id.to_string(),
            trigger: config.trigger.label(),
            end,
            operation_id,
            ticks,
            duration: started.elapsed(),
            metrics: hooks.metrics_snapshot(),
        })
    }
}

/// Attach a motion processor whose triggers drive `coordinator`
fn listen(
    source: Arc<dyn MotionSource>,
    engine: &EngineConfig,
    coordinator: &OperationCoordinator<CliServices>,
    trigger_tx: mpsc::UnboundedSender<TriggerEvent>,
) -> MotionSignalProcessor {
    let processor = MotionSignalProcessor::new(source, engine.shake);
    let runtime = Handle::current();
    let coordinator = coordinator.clone();

    // runs on the sensor thread
    let on_trigger: TriggerCallback = Arc::new(move || {
        let _ = trigger_tx.send(TriggerEvent::Fired(TriggerSource::Sensor));
        let coordinator = coordinator.clone();
        let trigger_tx = trigger_tx.clone();
        runtime.spawn(async move {
            let outcome = coordinator.on_sensor_trigger().await;
            let _ = trigger_tx.send(TriggerEvent::Begun(outcome));
        });
    });
    processor.start(on_trigger);
    processor
}

fn schedule_cancel(
    coordinator: OperationCoordinator<CliServices>,
    id: OperationId,
    after: Duration,
) {
    tokio::spawn(async move {
        sleep(after).await;
        if coordinator.active_operation() == Some(id) && coordinator.cancel().is_some() {
            info!(operation_id = %id, "Countdown cancelled by user");
        }
    });
}

/// When a non-looping stream has been fully delivered
fn stream_end(
    started: Instant,
    samples: &[MotionSample],
    playback: PlaybackConfig,
) -> Option<Instant> {
    if playback.loop_playback {
        return None;
    }
    let span = stream_span(samples, playback.speed_multiplier);
    Some(started + span + STREAM_GRACE)
}

fn stream_span(samples: &[MotionSample], speed_multiplier: f64) -> Duration {
    let first = samples.iter().map(|s| s.timestamp_ms).min().unwrap_or(0);
    let last = samples.iter().map(|s| s.timestamp_ms).max().unwrap_or(0);
    let speed = if speed_multiplier > 0.0 {
        speed_multiplier
    } else {
        1.0
    };
    Duration::from_secs_f64((last - first) as f64 / 1000.0 / speed)
}
