//! `run` command implementation.

use anyhow::{Context, Result};
use mock_services::PlaybackConfig;
use std::time::Duration;
use tracing::{info, warn};

use super::load_config;
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::session::{ServiceOptions, Session, SessionConfig, SessionEnd, TriggerPlan};

/// Execute the `run` command
pub async fn run_session(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let engine = load_config(&args.config)?;

    info!(
        countdown_secs = engine.countdown.seconds,
        shake_threshold = engine.shake.threshold,
        required_shakes = engine.shake.required_shakes,
        location_timeout_ms = engine.location.timeout_ms,
        "Configuration loaded"
    );

    let session_config = SessionConfig {
        engine,
        user_id: args.user.as_str().into(),
        trigger: trigger_plan(args)?,
        services: ServiceOptions {
            directory: args.directory.clone(),
            reports: args.reports.clone(),
            no_fix: args.no_fix,
        },
        cancel_after: cancel_after(args.cancel_after)?,
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    info!("Starting session...");

    let stats = Session::new(session_config)
        .run(shutdown_signal())
        .await
        .context("Session failed")?;

    stats.print_summary();

    match stats.end {
        SessionEnd::Outcome(outcome) => {
            let delivery = coordinator::Delivery::try_from(outcome)
                .context("Alert was not delivered")?;
            info!(
                operation_id = %delivery.operation_id,
                sent_to = delivery.sent_to,
                errors = delivery.errors.len(),
                "Alert delivered"
            );
        }
        SessionEnd::TimedOut => anyhow::bail!("Session timed out after {}s", args.timeout),
        end => info!(?end, "Session finished without an alert"),
    }

    info!("SOS engine finished");
    Ok(())
}

fn trigger_plan(args: &RunArgs) -> Result<TriggerPlan, CliError> {
    if args.manual {
        return Ok(TriggerPlan::Manual);
    }
    match &args.replay {
        Some(path) => {
            if !args.replay_speed.is_finite() || args.replay_speed <= 0.0 {
                return Err(CliError::invalid_option("--replay-speed must be positive"));
            }
            Ok(TriggerPlan::Replay {
                path: path.clone(),
                playback: PlaybackConfig {
                    speed_multiplier: args.replay_speed,
                    loop_playback: false,
                },
            })
        }
        None => Ok(TriggerPlan::Synthetic),
    }
}

fn cancel_after(seconds: Option<f64>) -> Result<Option<Duration>, CliError> {
    match seconds {
        None => Ok(None),
        Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
        Some(_) => Err(CliError::invalid_option(
            "--cancel-after must be a non-negative number of seconds",
        )),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
