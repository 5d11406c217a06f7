//! Alert data model
//!
//! Records exchanged with the directory, location and delivery collaborators,
//! plus the payload assembled at dispatch time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OperationId, UserId};

/// Address used when no position fix could be obtained
pub const FALLBACK_ADDRESS: &str = "Location not available";

/// Caller classification as reported by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Regular account holder, allowed to raise alerts
    Civilian,
    /// Responder account (police); alerts are reserved for civilians
    Responder,
}

impl Classification {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Classification::Civilian)
    }
}

/// Emergency contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub relationship: String,
    /// Only primary contacts receive alerts
    #[serde(default)]
    pub is_primary: bool,
}

/// Reporter profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
}

impl Profile {
    /// "First Last", trimmed; `None` when both parts are blank
    pub fn display_name(&self) -> Option<String> {
        let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// Raw position fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Options passed to the position service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOptions {
    pub timeout_ms: u64,
    /// Accept a cached fix at most this old
    pub max_age_ms: u64,
    pub high_accuracy: bool,
}

/// Best-effort location attached to an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

impl ResolvedLocation {
    /// `0,0,"Location not available"`
    pub fn fallback() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            address: FALLBACK_ADDRESS.to_string(),
        }
    }

    /// Location whose address is the formatted coordinates
    pub fn from_coordinates(coords: Coordinates) -> Self {
        Self {
            latitude: coords.latitude,
            longitude: coords.longitude,
            address: format_coordinates(coords),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0 && self.address == FALLBACK_ADDRESS
    }
}

/// `"{lat:.6}, {lon:.6}"`
pub fn format_coordinates(coords: Coordinates) -> String {
    format!("{:.6}, {:.6}", coords.latitude, coords.longitude)
}

/// Alert handed to the delivery channel
///
/// Built fresh for each dispatch and not retained afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub operation_id: OperationId,
    pub reporter_id: UserId,
    pub reporter_name: String,
    pub location: ResolvedLocation,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
}

/// Result reported by the delivery channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub success: bool,
    /// Number of contacts the alert reached
    pub sent_to: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Report status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
}

/// Report severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Immediate,
}

/// Emergency report record submitted alongside every dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyReport {
    pub kind: String,
    pub description: String,
    pub location: ResolvedLocation,
    pub anonymous: bool,
    pub reporter_name: String,
    pub reporter_id: UserId,
    pub status: ReportStatus,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl EmergencyReport {
    /// Report record matching an assembled alert
    pub fn for_alert(payload: &AlertPayload) -> Self {
        Self {
            kind: "Emergency SOS".to_string(),
            description: "SOS Alert triggered - Immediate assistance required".to_string(),
            location: payload.location.clone(),
            anonymous: false,
            reporter_name: payload.reporter_name.clone(),
            reporter_id: payload.reporter_id.clone(),
            status: ReportStatus::Pending,
            severity: Severity::Immediate,
            created_at: payload.triggered_at,
        }
    }
}
