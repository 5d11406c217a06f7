//! Configuration validation
//!
//! Rules:
//! - per-field bounds declared on the config types (`validator` derive)
//! - inter_shake_min_gap_ms < reset_timeout_ms
//! - geocode_timeout_ms <= location.timeout_ms
//! - fallback_identity is not blank

use contracts::{ContractError, EngineConfig};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// Validate an EngineConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &EngineConfig) -> Result<(), ContractError> {
    validate_field_bounds(config)?;
    validate_shake_windows(config)?;
    validate_location_budget(config)?;
    validate_identity(config)?;
    Ok(())
}

/// Declared per-field bounds
fn validate_field_bounds(config: &EngineConfig) -> Result<(), ContractError> {
    match config.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let (field, message) = first_violation(&errors, "")
                .unwrap_or_else(|| ("<config>".to_string(), errors.to_string()));
            Err(ContractError::config_validation(field, message))
        }
    }
}

/// The min gap must fit inside the reset window, otherwise no sequence can trigger
fn validate_shake_windows(config: &EngineConfig) -> Result<(), ContractError> {
    let shake = &config.shake;
    if shake.inter_shake_min_gap_ms >= shake.reset_timeout_ms {
        return Err(ContractError::config_validation(
            "shake.inter_shake_min_gap_ms / shake.reset_timeout_ms",
            format!(
                "inter_shake_min_gap_ms ({}) must be < reset_timeout_ms ({})",
                shake.inter_shake_min_gap_ms, shake.reset_timeout_ms
            ),
        ));
    }
    Ok(())
}

fn validate_location_budget(config: &EngineConfig) -> Result<(), ContractError> {
    let location = &config.location;
    if location.geocode_timeout_ms > location.timeout_ms {
        return Err(ContractError::config_validation(
            "location.geocode_timeout_ms",
            format!(
                "geocode_timeout_ms ({}) must be <= timeout_ms ({})",
                location.geocode_timeout_ms, location.timeout_ms
            ),
        ));
    }
    Ok(())
}

fn validate_identity(config: &EngineConfig) -> Result<(), ContractError> {
    if config.fallback_identity.trim().is_empty() {
        return Err(ContractError::config_validation(
            "fallback_identity",
            "fallback_identity cannot be empty",
        ));
    }
    Ok(())
}

/// Flatten nested validator errors into the first `(dotted.path, message)`
///
/// Fields are visited in name order so the reported error is deterministic.
fn first_violation(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in entries {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                if let Some(error) = field_errors.first() {
                    return Some((path, describe(error)));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_violation(inner, &path) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_violation(inner, &format!("{path}[{idx}]")) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }

    let mut bounds: Vec<_> = error
        .params
        .iter()
        .filter(|(name, _)| name.as_ref() != "value")
        .map(|(name, value)| format!("{name} = {value}"))
        .collect();
    bounds.sort();

    match error.params.get("value") {
        Some(value) => format!(
            "{} constraint violated ({}), got {}",
            error.code,
            bounds.join(", "),
            value
        ),
        None => format!("{} constraint violated ({})", error.code, bounds.join(", ")),
    }
}
