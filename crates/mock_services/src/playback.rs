//! Background-thread sample playback shared by the mock and replay sensors

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{MotionCallback, MotionSample, SubscriptionHandle};
use tracing::{debug, info, warn};

/// Longest uninterrupted sleep, so `unsubscribe` never waits long on the
/// playback thread
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Playback configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    /// Playback speed (1.0 = real time)
    pub speed_multiplier: f64,
    /// Restart from the first sample when the end is reached
    pub loop_playback: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            loop_playback: false,
        }
    }
}

struct Active {
    handle: SubscriptionHandle,
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Emits a fixed sample list on a background thread, paced by the samples'
/// own timestamps
pub(crate) struct SamplePlayer {
    name: String,
    samples: Arc<[MotionSample]>,
    config: PlaybackConfig,
    next_handle: AtomicU64,
    active: Mutex<Option<Active>>,
}

impl SamplePlayer {
    pub(crate) fn new(
        name: String,
        mut samples: Vec<MotionSample>,
        config: PlaybackConfig,
    ) -> Self {
        samples.sort_by_key(|s| s.timestamp_ms);
        Self {
            name,
            samples: samples.into(),
            config,
            next_handle: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn samples(&self) -> &[MotionSample] {
        &self.samples
    }

    pub(crate) fn subscribe(&self, callback: MotionCallback) -> SubscriptionHandle {
        let mut active = self.active();

        // Idempotent: an active subscription keeps its handle
        if let Some(current) = active.as_ref() {
            if current.running.load(Ordering::SeqCst) {
                return current.handle;
            }
        }
        if let Some(finished) = active.take() {
            Self::join(finished.thread);
        }

        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let name = self.name.clone();
            let samples = Arc::clone(&self.samples);
            let running = Arc::clone(&running);
            let config = self.config;
            thread::spawn(move || play(&name, &samples, config, &running, &callback))
        };

        *active = Some(Active {
            handle,
            running,
            thread,
        });
        handle
    }

    pub(crate) fn unsubscribe(&self, handle: SubscriptionHandle) {
        let stopped = {
            let mut active = self.active();
            match active.as_ref() {
                Some(current) if current.handle == handle => active.take(),
                _ => None,
            }
        };

        if let Some(stopped) = stopped {
            stopped.running.store(false, Ordering::SeqCst);
            Self::join(stopped.thread);
            debug!(source = %self.name, "playback unsubscribed");
        }
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.active()
            .as_ref()
            .is_some_and(|current| current.running.load(Ordering::SeqCst))
    }

    fn join(thread: JoinHandle<()>) {
        // unsubscribe may be called from a callback on the playback thread
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!("playback thread panicked");
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SamplePlayer {
    fn drop(&mut self) {
        let active = self.active().take();
        if let Some(active) = active {
            active.running.store(false, Ordering::SeqCst);
            Self::join(active.thread);
        }
    }
}

fn play(
    name: &str,
    samples: &[MotionSample],
    config: PlaybackConfig,
    running: &AtomicBool,
    callback: &MotionCallback,
) {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        warn!(source = %name, "no samples to play");
        running.store(false, Ordering::SeqCst);
        return;
    };
    let first_t = first.timestamp_ms;
    let span = last.timestamp_ms - first_t + 1;
    let speed = config.speed_multiplier.max(0.1);
    let mut offset = 0;

    debug!(source = %name, samples = samples.len(), speed, "playback started");

    loop {
        let start_time = Instant::now();

        for sample in samples {
            let offset_secs = (sample.timestamp_ms - first_t) as f64 / 1000.0;
            let target = Duration::from_secs_f64(offset_secs / speed);
            if !sleep_until(start_time + target, running) {
                debug!(source = %name, "playback stopped");
                return;
            }

            callback(MotionSample {
                timestamp_ms: sample.timestamp_ms + offset,
                ..*sample
            });
        }

        if !config.loop_playback {
            info!(source = %name, "playback completed");
            break;
        }
        offset += span;
        debug!(source = %name, offset, "looping playback");
    }

    running.store(false, Ordering::SeqCst);
}

/// Sleep until `deadline`; false if `running` was cleared meanwhile
fn sleep_until(deadline: Instant, running: &AtomicBool) -> bool {
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
