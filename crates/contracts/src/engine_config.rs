//! Engine configuration contracts shared across crates.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::PositionOptions;

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Reporter name used when no profile name is available
    #[serde(default = "default_fallback_identity")]
    #[validate(length(min = 1))]
    pub fallback_identity: String,

    /// Shake detection
    #[serde(default)]
    #[validate(nested)]
    pub shake: ShakeConfig,

    /// Countdown before dispatch
    #[serde(default)]
    #[validate(nested)]
    pub countdown: CountdownConfig,

    /// Directory cache TTLs
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Location resolution
    #[serde(default)]
    #[validate(nested)]
    pub location: LocationConfig,
}

fn default_fallback_identity() -> String {
    "Unknown User".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_identity: default_fallback_identity(),
            shake: ShakeConfig::default(),
            countdown: CountdownConfig::default(),
            cache: CacheConfig::default(),
            location: LocationConfig::default(),
        }
    }
}

/// Triple-shake detector configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ShakeConfig {
    /// Minimum acceleration magnitude (m/s²) of a qualifying impulse
    #[validate(range(exclusive_min = 0.0))]
    pub threshold: f64,
    /// Impulses needed to emit a trigger
    #[validate(range(min = 1))]
    pub required_shakes: u32,
    /// Impulses closer than this to the previous one are ignored
    pub inter_shake_min_gap_ms: u64,
    /// Count resets when no impulse arrives for longer than this
    #[validate(range(min = 1))]
    pub reset_timeout_ms: u64,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            threshold: 15.0,
            required_shakes: 3,
            inter_shake_min_gap_ms: 200,
            reset_timeout_ms: 1000,
        }
    }
}

/// Partial shake configuration merged by `update_config`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ShakeConfigPatch {
    pub threshold: Option<f64>,
    pub required_shakes: Option<u32>,
    pub inter_shake_min_gap_ms: Option<u64>,
    pub reset_timeout_ms: Option<u64>,
}

impl ShakeConfigPatch {
    /// Overwrite the fields that are set, leave the rest untouched
    pub fn apply_to(&self, config: &mut ShakeConfig) {
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(required) = self.required_shakes {
            config.required_shakes = required;
        }
        if let Some(gap) = self.inter_shake_min_gap_ms {
            config.inter_shake_min_gap_ms = gap;
        }
        if let Some(timeout) = self.reset_timeout_ms {
            config.reset_timeout_ms = timeout;
        }
    }
}

/// Countdown configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CountdownConfig {
    /// Seconds shown to the user before dispatch
    #[validate(range(min = 1))]
    pub seconds: u32,
    /// Tick period in milliseconds
    #[validate(range(min = 1))]
    pub tick_ms: u64,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            seconds: 5,
            tick_ms: 1000,
        }
    }
}

impl CountdownConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Freshness cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    #[validate(range(min = 1))]
    pub classification_ttl_secs: u64,
    #[validate(range(min = 1))]
    pub contacts_ttl_secs: u64,
    #[validate(range(min = 1))]
    pub profile_ttl_secs: u64,
    /// Maximum entries per cache
    #[validate(range(min = 1))]
    pub capacity: usize,
    /// Bound on a single directory call; a stalled call counts as failed
    #[validate(range(min = 1))]
    pub lookup_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            classification_ttl_secs: 300,
            contacts_ttl_secs: 30,
            profile_ttl_secs: 300,
            capacity: 100,
            lookup_timeout_ms: 8000,
        }
    }
}

impl CacheConfig {
    pub fn classification_ttl(&self) -> Duration {
        Duration::from_secs(self.classification_ttl_secs)
    }

    pub fn contacts_ttl(&self) -> Duration {
        Duration::from_secs(self.contacts_ttl_secs)
    }

    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Location resolver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LocationConfig {
    /// Hard deadline for the whole resolution (fix + geocode)
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
    /// Accept a cached fix at most this old
    pub max_age_ms: u64,
    pub high_accuracy: bool,
    /// Per-attempt geocode timeout
    #[validate(range(min = 1))]
    pub geocode_timeout_ms: u64,
    /// Geocode attempts before degrading to coordinates
    #[validate(range(min = 1))]
    pub geocode_retries: u32,
    /// Back-off before the second attempt; doubles afterwards
    pub geocode_backoff_ms: u64,
    #[validate(range(min = 1))]
    pub geocode_cache_ttl_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_age_ms: 30_000,
            high_accuracy: false,
            geocode_timeout_ms: 8_000,
            geocode_retries: 3,
            geocode_backoff_ms: 1_000,
            geocode_cache_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl LocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn geocode_timeout(&self) -> Duration {
        Duration::from_millis(self.geocode_timeout_ms)
    }

    pub fn geocode_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.geocode_cache_ttl_secs)
    }

    /// Back-off before attempt `attempt` (1-based; no wait before the first)
    pub fn geocode_backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempt - 2).min(16);
        Duration::from_millis(self.geocode_backoff_ms.saturating_mul(factor))
    }

    pub fn position_options(&self) -> PositionOptions {
        PositionOptions {
            timeout_ms: self.timeout_ms,
            max_age_ms: self.max_age_ms,
            high_accuracy: self.high_accuracy,
        }
    }
}
