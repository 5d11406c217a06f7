//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::EngineConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Standard gravity; a device at rest reads about this magnitude
const GRAVITY: f64 = 9.81;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    shake_threshold: f64,
    required_shakes: u32,
    countdown_secs: u32,
    location_timeout_ms: u64,
    fallback_identity: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    shake_threshold: config.shake.threshold,
                    required_shakes: config.shake.required_shakes,
                    countdown_secs: config.countdown.seconds,
                    location_timeout_ms: config.location.timeout_ms,
                    fallback_identity: config.fallback_identity,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &EngineConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.shake.threshold <= GRAVITY {
        warnings.push(format!(
            "shake.threshold ({}) is not above gravity - a device at rest will count as shaking",
            config.shake.threshold
        ));
    }

    if config.countdown.tick_ms != 1000 {
        warnings.push(format!(
            "countdown.tick_ms is {} - displayed seconds will not match wall-clock seconds",
            config.countdown.tick_ms
        ));
    }

    if config.location.max_age_ms == 0 {
        warnings.push(
            "location.max_age_ms is 0 - every alert waits for a fresh position fix".to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Shake threshold: {} m/s²", summary.shake_threshold);
            println!("  Required shakes: {}", summary.required_shakes);
            println!("  Countdown: {}s", summary.countdown_secs);
            println!("  Location timeout: {}ms", summary.location_timeout_ms);
            println!("  Fallback identity: {}", summary.fallback_identity);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
