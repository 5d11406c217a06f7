//! MotionSignalProcessor - sensor subscription + trigger emission

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{MotionSample, MotionSource, ShakeConfig, ShakeConfigPatch, SubscriptionHandle};
use observability::record_shake_counted;
use tracing::{debug, info};

use crate::detector::{SampleOutcome, ShakeDetector};

/// Trigger callback type
///
/// Invoked on the sensor's delivery thread, once per completed sequence.
pub type TriggerCallback = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    detector: Mutex<ShakeDetector>,
    /// Samples are processed only while set
    enabled: AtomicBool,
    on_trigger: Mutex<Option<TriggerCallback>>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl Inner {
    fn detector(&self) -> MutexGuard<'_, ShakeDetector> {
        self.detector.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_trigger(&self) -> MutexGuard<'_, Option<TriggerCallback>> {
        self.on_trigger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription(&self) -> MutexGuard<'_, Option<SubscriptionHandle>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn on_sample(&self, sample: &MotionSample) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }

        let outcome = self.detector().on_sample(sample);
        match outcome {
            SampleOutcome::Counted(count) => {
                record_shake_counted(count);
                debug!(t_ms = sample.timestamp_ms, count, "shake counted");
            }
            SampleOutcome::Triggered => {
                record_shake_counted(0);
                info!(t_ms = sample.timestamp_ms, "shake sequence complete");
                let callback = self.on_trigger().clone();
                if let Some(callback) = callback {
                    callback();
                }
            }
            SampleOutcome::Quiet | SampleOutcome::Debounced => {}
        }
    }
}

/// Accelerometer-driven trigger source
///
/// Holds at most one subscription on its [`MotionSource`]. `stop` and
/// `set_enabled(false)` both detach; only `stop` forgets the trigger
/// callback.
pub struct MotionSignalProcessor {
    source: Arc<dyn MotionSource>,
    inner: Arc<Inner>,
}

impl MotionSignalProcessor {
    pub fn new(source: Arc<dyn MotionSource>, config: ShakeConfig) -> Self {
        Self {
            source,
            inner: Arc::new(Inner {
                detector: Mutex::new(ShakeDetector::new(config)),
                enabled: AtomicBool::new(false),
                on_trigger: Mutex::new(None),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Register `on_trigger` and attach to the sensor stream
    ///
    /// No-op on the subscription if already listening; the callback is
    /// replaced either way.
    pub fn start(&self, on_trigger: TriggerCallback) {
        *self.inner.on_trigger() = Some(on_trigger);
        self.attach();
    }

    /// Detach and forget the trigger callback
    pub fn stop(&self) {
        self.detach();
        *self.inner.on_trigger() = None;
    }

    /// Pause or resume detection without re-registering the callback
    pub fn set_enabled(&self, enabled: bool) {
        if enabled {
            if self.inner.on_trigger().is_some() {
                self.attach();
            } else {
                debug!("set_enabled(true) before start, nothing to resume");
            }
        } else {
            self.detach();
        }
    }

    /// Merge a partial config; in-progress counts survive
    pub fn update_config(&self, patch: ShakeConfigPatch) {
        let mut detector = self.inner.detector();
        detector.update_config(&patch);
        info!(config = ?detector.config(), "shake config updated");
    }

    /// Feed a sample directly (same path as sensor delivery)
    pub fn on_sample(&self, sample: MotionSample) {
        self.inner.on_sample(&sample);
    }

    pub fn is_listening(&self) -> bool {
        self.inner.subscription().is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    pub fn config(&self) -> ShakeConfig {
        *self.inner.detector().config()
    }

    pub fn shake_count(&self) -> u32 {
        self.inner.detector().shake_count()
    }

    fn attach(&self) {
        let mut subscription = self.inner.subscription();
        if subscription.is_some() {
            return;
        }

        self.inner.detector().reset();
        self.inner.enabled.store(true, Ordering::Release);

        let inner = Arc::clone(&self.inner);
        let handle = self
            .source
            .subscribe(Arc::new(move |sample| inner.on_sample(&sample)));
        *subscription = Some(handle);

        info!(source = self.source.name(), "motion processor listening");
    }

    fn detach(&self) {
        self.inner.enabled.store(false, Ordering::Release);

        let handle = self.inner.subscription().take();
        if let Some(handle) = handle {
            self.source.unsubscribe(handle);
            info!(source = self.source.name(), "motion processor detached");
        }
        self.inner.detector().reset();
    }
}

impl Drop for MotionSignalProcessor {
    fn drop(&mut self) {
        self.detach();
    }
}
