//! MotionSource trait - accelerometer stream abstraction
//!
//! Decouples the shake detector from the concrete sensor driver, so the same
//! processor runs against the device sensor, a scripted mock or a replayed
//! recording.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One 3-axis acceleration reading (m/s²)
///
/// Lives only for the processing step that consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// Sensor timestamp (milliseconds, monotonic per source)
    #[serde(rename = "t_ms")]
    pub timestamp_ms: u64,
}

impl MotionSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp_ms: u64) -> Self {
        Self {
            x,
            y,
            z,
            timestamp_ms,
        }
    }

    /// Euclidean norm of the acceleration vector
    #[inline]
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Sample delivery callback type
///
/// Invoked by the source for every sample, in arrival order.
pub type MotionCallback = Arc<dyn Fn(MotionSample) + Send + Sync>;

/// Opaque token returned by [`MotionSource::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Accelerometer stream
///
/// The subscription is a process-wide resource: implementations hold at most
/// one active callback, and a second `subscribe` while one is active replaces
/// nothing and returns the existing handle.
pub trait MotionSource: Send + Sync {
    /// Human-readable source name (used for logging)
    fn name(&self) -> &str;

    /// Start delivering samples to `callback`
    fn subscribe(&self, callback: MotionCallback) -> SubscriptionHandle;

    /// Stop delivering samples for `handle`
    ///
    /// Unknown or stale handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Check if a subscription is currently active
    fn is_subscribed(&self) -> bool;
}
