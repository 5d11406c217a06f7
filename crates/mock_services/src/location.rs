//! Position and reverse-geocode mocks

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{ContractError, Coordinates, PositionOptions, PositionService, ReverseGeocoder};
use tokio::time::sleep;
use tracing::instrument;

/// Rizal Park, Manila
pub const DEFAULT_FIX: Coordinates = Coordinates {
    latitude: 14.5826,
    longitude: 120.9787,
};

/// How the position service answers
#[derive(Debug, Clone, PartialEq)]
pub enum PositionBehavior {
    /// Answer with `coords` after `delay`
    Fix { coords: Coordinates, delay: Duration },
    /// Fail immediately (permission denied, service off)
    Fail(String),
    /// Never answer
    Hang,
}

impl Default for PositionBehavior {
    fn default() -> Self {
        PositionBehavior::Fix {
            coords: DEFAULT_FIX,
            delay: Duration::from_millis(300),
        }
    }
}

/// Position service with scripted behavior
#[derive(Default)]
pub struct MockPositionService {
    behavior: Mutex<PositionBehavior>,
    calls: AtomicU32,
    last_options: Mutex<Option<PositionOptions>>,
}

impl MockPositionService {
    pub fn new(behavior: PositionBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            ..Default::default()
        }
    }

    pub fn set_behavior(&self, behavior: PositionBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Options passed with the most recent request
    pub fn last_options(&self) -> Option<PositionOptions> {
        *lock(&self.last_options)
    }
}

impl PositionService for MockPositionService {
    #[instrument(name = "mock_position_current", skip(self, options))]
    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> Result<Coordinates, ContractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_options) = Some(options);

        let behavior = lock(&self.behavior).clone();
        match behavior {
            PositionBehavior::Fix { coords, delay } => {
                sleep(delay).await;
                Ok(coords)
            }
            PositionBehavior::Fail(message) => Err(ContractError::position(message)),
            PositionBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(ContractError::position("position request abandoned"))
            }
        }
    }
}

/// How the geocoder answers
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeBehavior {
    /// Fail the first `failures` calls, then answer `address`
    Address { address: String, failures: u32 },
    /// Never answer
    Hang,
}

impl Default for GeocodeBehavior {
    fn default() -> Self {
        GeocodeBehavior::Address {
            address: "Rizal Park, Ermita, Manila".to_string(),
            failures: 0,
        }
    }
}

/// Reverse geocoder with scripted behavior
#[derive(Default)]
pub struct MockGeocoder {
    behavior: Mutex<GeocodeBehavior>,
    latency: Duration,
    calls: AtomicU32,
}

impl MockGeocoder {
    pub fn new(behavior: GeocodeBehavior, latency: Duration) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            latency,
            calls: AtomicU32::new(0),
        }
    }

    /// Geocoder whose every call fails
    pub fn unavailable() -> Self {
        Self::new(
            GeocodeBehavior::Address {
                address: String::new(),
                failures: u32::MAX,
            },
            Duration::ZERO,
        )
    }

    pub fn set_behavior(&self, behavior: GeocodeBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReverseGeocoder for MockGeocoder {
    #[instrument(name = "mock_geocoder_lookup", skip(self))]
    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<String, ContractError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        let behavior = lock(&self.behavior).clone();
        match behavior {
            GeocodeBehavior::Address { failures, .. } if call <= failures => Err(
                ContractError::geocode(latitude, longitude, "geocoding service unavailable"),
            ),
            GeocodeBehavior::Address { address, .. } => Ok(address),
            GeocodeBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(ContractError::geocode(latitude, longitude, "lookup abandoned"))
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
