//! Replay sensor - plays back a recorded accelerometer trace
//!
//! Reads a JSON-lines recording, one sample per line:
//!
//! ```text
//! {"t_ms": 0, "x": 0.1, "y": -0.2, "z": 9.8}
//! {"t_ms": 20, "x": 0.0, "y": -0.1, "z": 9.8}
//! ```
//!
//! Samples are sorted by timestamp and replayed at their recorded pace.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use contracts::{MotionCallback, MotionSample, MotionSource, SubscriptionHandle};
use tracing::info;

use crate::error::{MockServiceError, Result};
use crate::playback::{PlaybackConfig, SamplePlayer};

/// Accelerometer replayed from a recording
pub struct ReplayMotionSensor {
    player: SamplePlayer,
}

impl ReplayMotionSensor {
    /// Load a JSON-lines recording
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn load(path: &Path, playback: PlaybackConfig) -> Result<Self> {
        let path_display = path.display().to_string();
        let file = File::open(path).map_err(|source| MockServiceError::Io {
            path: path_display.clone(),
            source,
        })?;

        let mut samples = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| MockServiceError::Io {
                path: path_display.clone(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let sample: MotionSample =
                serde_json::from_str(line).map_err(|e| MockServiceError::InvalidData {
                    path: path_display.clone(),
                    line: index + 1,
                    message: e.to_string(),
                })?;
            samples.push(sample);
        }

        info!(path = %path_display, samples = samples.len(), "loaded motion recording");

        let name = path
            .file_stem()
            .map(|stem| format!("replay:{}", stem.to_string_lossy()))
            .unwrap_or_else(|| "replay".to_string());
        Ok(Self {
            player: SamplePlayer::new(name, samples, playback),
        })
    }

    /// Recorded samples, sorted by timestamp
    pub fn samples(&self) -> &[MotionSample] {
        self.player.samples()
    }
}

impl MotionSource for ReplayMotionSensor {
    fn name(&self) -> &str {
        self.player.name()
    }

    fn subscribe(&self, callback: MotionCallback) -> SubscriptionHandle {
        self.player.subscribe(callback)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.player.unsubscribe(handle);
    }

    fn is_subscribed(&self) -> bool {
        self.player.is_subscribed()
    }
}
