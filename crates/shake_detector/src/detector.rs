//! Triple-shake state machine.

use contracts::{MotionSample, ShakeConfig, ShakeConfigPatch};
use tracing::instrument;

/// What a single sample did to the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Below threshold
    Quiet,
    /// Above threshold but inside the minimum gap of the previous shake
    Debounced,
    /// Counted as shake number `n` of the current sequence
    Counted(u32),
    /// Completed the sequence; the count is back to zero
    Triggered,
}

/// Shake counter driven by sample timestamps
///
/// Single-writer: samples must be fed in arrival order. The sample's own
/// `timestamp_ms` is the only clock read.
#[derive(Debug, Clone)]
pub struct ShakeDetector {
    config: ShakeConfig,
    shake_count: u32,
    last_shake_at: Option<u64>,
}

impl ShakeDetector {
    pub fn new(config: ShakeConfig) -> Self {
        Self {
            config,
            shake_count: 0,
            last_shake_at: None,
        }
    }

    /// Feed one sample
    ///
    /// The reset window is checked first on every sample, so a qualifying
    /// impulse after a long pause starts a new sequence instead of extending
    /// the old one.
    #[instrument(
        level = "trace",
        name = "shake_detector_on_sample",
        skip(self, sample),
        fields(t_ms = sample.timestamp_ms)
    )]
    pub fn on_sample(&mut self, sample: &MotionSample) -> SampleOutcome {
        let now = sample.timestamp_ms;

        if let Some(last) = self.last_shake_at {
            if now.saturating_sub(last) > self.config.reset_timeout_ms {
                self.reset();
            }
        }

        if sample.magnitude() <= self.config.threshold {
            return SampleOutcome::Quiet;
        }

        let gap_ok = self
            .last_shake_at
            .map_or(true, |last| now.saturating_sub(last) >= self.config.inter_shake_min_gap_ms);
        if !gap_ok {
            return SampleOutcome::Debounced;
        }

        self.shake_count += 1;
        self.last_shake_at = Some(now);

        if self.shake_count >= self.config.required_shakes {
            self.shake_count = 0;
            return SampleOutcome::Triggered;
        }
        SampleOutcome::Counted(self.shake_count)
    }

    /// Forget any partial sequence
    pub fn reset(&mut self) {
        self.shake_count = 0;
        self.last_shake_at = None;
    }

    /// Merge `patch` into the config; the in-progress count is kept
    pub fn update_config(&mut self, patch: &ShakeConfigPatch) {
        patch.apply_to(&mut self.config);
    }

    pub fn config(&self) -> &ShakeConfig {
        &self.config
    }

    pub fn shake_count(&self) -> u32 {
        self.shake_count
    }

    pub fn last_shake_at(&self) -> Option<u64> {
        self.last_shake_at
    }
}
