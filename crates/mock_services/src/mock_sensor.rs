//! Mock motion sensor
//!
//! Implements `MotionSource` with a generated accelerometer trace: the device
//! at rest, plus sharp impulses at configured instants. Samples are emitted
//! from a background thread at their timestamps, like a real sensor driver.

use contracts::{MotionCallback, MotionSample, MotionSource, SubscriptionHandle};

use crate::playback::{PlaybackConfig, SamplePlayer};

/// Gravity on the z axis of a phone lying flat (m/s²)
const GRAVITY: f64 = 9.81;

/// Mock sensor configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MockMotionConfig {
    /// Resting sample rate (Hz)
    pub frequency_hz: f64,
    /// Trace length (ms)
    pub duration_ms: u64,
    /// Instants (ms from start) of the impulses
    pub shakes_at_ms: Vec<u64>,
    /// Impulse magnitude on the x axis (m/s²)
    pub shake_magnitude: f64,
    pub playback: PlaybackConfig,
}

impl Default for MockMotionConfig {
    /// One triple shake, 300-400 ms apart, after half a second at rest
    fn default() -> Self {
        Self {
            frequency_hz: 50.0,
            duration_ms: 2_000,
            shakes_at_ms: vec![500, 800, 1200],
            shake_magnitude: 20.0,
            playback: PlaybackConfig::default(),
        }
    }
}

impl MockMotionConfig {
    /// Generate the trace described by this config
    pub fn samples(&self) -> Vec<MotionSample> {
        let step_ms = (1000.0 / self.frequency_hz.max(1.0)).round().max(1.0) as u64;

        let mut samples: Vec<_> = (0..=self.duration_ms)
            .step_by(step_ms as usize)
            .filter(|t| !self.shakes_at_ms.contains(t))
            .map(|t| MotionSample::new(0.0, 0.0, GRAVITY, t))
            .collect();
        samples.extend(
            self.shakes_at_ms
                .iter()
                .map(|&t| MotionSample::new(self.shake_magnitude, 0.0, GRAVITY, t)),
        );
        samples.sort_by_key(|s| s.timestamp_ms);
        samples
    }
}

/// Scripted accelerometer
pub struct MockMotionSensor {
    player: SamplePlayer,
}

impl MockMotionSensor {
    pub fn new(name: impl Into<String>, config: MockMotionConfig) -> Self {
        let samples = config.samples();
        Self::with_samples(name, samples, config.playback)
    }

    /// Mock sensor with the default triple-shake trace
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, MockMotionConfig::default())
    }

    /// Play an explicit sample list
    pub fn with_samples(
        name: impl Into<String>,
        samples: Vec<MotionSample>,
        playback: PlaybackConfig,
    ) -> Self {
        Self {
            player: SamplePlayer::new(name.into(), samples, playback),
        }
    }

    pub fn samples(&self) -> &[MotionSample] {
        self.player.samples()
    }
}

impl MotionSource for MockMotionSensor {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    fn fast() -> PlaybackConfig {
        PlaybackConfig {
            speed_multiplier: 10.0,
            loop_playback: false,
        }
    }

    #[test]
    fn test_default_trace_has_three_impulses() {
        let samples = MockMotionConfig::default().samples();
        let impulses: Vec<_> = samples
            .iter()
            .filter(|s| s.magnitude() > 15.0)
            .map(|s| s.timestamp_ms)
            .collect();
        assert_eq!(impulses, vec![500, 800, 1200]);
        assert!(samples.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
        assert_eq!(samples.first().unwrap().timestamp_ms, 0);
        assert_eq!(samples.last().unwrap().timestamp_ms, 2_000);
    }

    #[test]
    fn test_emits_every_sample_in_order() {
        let sensor = MockMotionSensor::new(
            "mock",
            MockMotionConfig {
                duration_ms: 500,
                shakes_at_ms: vec![100],
                playback: fast(),
                ..Default::default()
            },
        );
        let expected = sensor.samples().len();

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        sensor.subscribe(Arc::new(move |sample| sink.lock().unwrap().push(sample.timestamp_ms)));

        thread::sleep(Duration::from_millis(300));
        assert!(!sensor.is_subscribed());

        let received = received.lock().unwrap();
        assert_eq!(received.len(), expected);
        assert!(received.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_idempotent_subscribe() {
        let sensor = MockMotionSensor::new(
            "mock",
            MockMotionConfig {
                duration_ms: 10_000,
                ..Default::default()
            },
        );

        let count = Arc::new(AtomicU64::new(0));
        let first = {
            let count = count.clone();
            sensor.subscribe(Arc::new(move |_| {
                count.fetch_add(1, Ordering::Relaxed);
            }))
        };
        let second = {
            let count = count.clone();
            sensor.subscribe(Arc::new(move |_| {
                count.fetch_add(1_000, Ordering::Relaxed);
            }))
        };
        assert_eq!(first, second);

        thread::sleep(Duration::from_millis(100));
        sensor.unsubscribe(first);
        assert!(!sensor.is_subscribed());

        let final_count = count.load(Ordering::Relaxed);
        assert!(final_count > 0);
        assert!(final_count < 1_000);
    }

    #[test]
    fn test_stale_handle_ignored() {
        let sensor = MockMotionSensor::new(
            "mock",
            MockMotionConfig {
                duration_ms: 10_000,
                ..Default::default()
            },
        );
        let handle = sensor.subscribe(Arc::new(|_| {}));
        sensor.unsubscribe(SubscriptionHandle(handle.0 + 1));
        assert!(sensor.is_subscribed());
        sensor.unsubscribe(handle);
        assert!(!sensor.is_subscribed());
    }
}
