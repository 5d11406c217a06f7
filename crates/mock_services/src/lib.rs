//! # Mock Services
//!
//! In-process stand-ins for every collaborator of the alert engine.
//!
//! Responsibilities:
//! - Motion streams: scripted (`MockMotionSensor`) and replayed from a
//!   JSON-lines recording (`ReplayMotionSensor`)
//! - Directory, position and geocode services with failure injection
//! - Delivery channel and report sink that record what they were given
//!
//! Used by the CLI and by the end-to-end tests; no network access.

pub mod directory;
pub mod error;
pub mod location;
pub mod mock_sensor;
mod playback;
pub mod recording;
pub mod replay_sensor;

use std::sync::Arc;

use contracts::AlertServices;

pub use directory::{DirectoryData, DirectoryFailures, InMemoryDirectory};
pub use error::{MockServiceError, Result};
pub use location::{
    GeocodeBehavior, MockGeocoder, MockPositionService, PositionBehavior, DEFAULT_FIX,
};
pub use mock_sensor::{MockMotionConfig, MockMotionSensor};
pub use playback::PlaybackConfig;
pub use recording::{DispatchBehavior, DispatchRecord, RecordingDispatcher, RecordingReportSink};
pub use replay_sensor::ReplayMotionSensor;

/// Collaborator set made entirely of mocks
pub struct MockServices;

impl AlertServices for MockServices {
    type Directory = InMemoryDirectory;
    type Position = MockPositionService;
    type Geocoder = MockGeocoder;
    type Dispatcher = RecordingDispatcher;
    type Reports = RecordingReportSink;
}

/// Shared handles to one instance of each mock
///
/// Tests keep the bundle to inspect calls after handing clones of the
/// `Arc`s to the engine.
#[derive(Clone)]
pub struct MockBundle {
    pub directory: Arc<InMemoryDirectory>,
    pub position: Arc<MockPositionService>,
    pub geocoder: Arc<MockGeocoder>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub reports: Arc<RecordingReportSink>,
}

impl MockBundle {
    /// Civilian with two primary contacts, an instant fix and a working
    /// geocoder
    pub fn healthy() -> Self {
        Self {
            directory: Arc::new(InMemoryDirectory::new(DirectoryData::sample())),
            position: Arc::new(MockPositionService::default()),
            geocoder: Arc::new(MockGeocoder::default()),
            dispatcher: Arc::new(RecordingDispatcher::default()),
            reports: Arc::new(RecordingReportSink::default()),
        }
    }
}
