//! Reverse geocode with retry, back-off and address caching

use std::sync::Arc;

use contracts::{format_coordinates, ContractError, Coordinates, LocationConfig, ReverseGeocoder};
use freshness_cache::FreshnessCache;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, instrument, warn};

/// Coordinates rounded to 4 decimals (~11 m)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CoordKey(i64, i64);

impl From<Coordinates> for CoordKey {
    fn from(coords: Coordinates) -> Self {
        Self(
            (coords.latitude * 10_000.0).round() as i64,
            (coords.longitude * 10_000.0).round() as i64,
        )
    }
}

pub(crate) struct AddressLookup<G> {
    geocoder: Arc<G>,
    config: LocationConfig,
    cache: FreshnessCache<CoordKey, String>,
}

impl<G: ReverseGeocoder + Sync> AddressLookup<G> {
    pub(crate) fn new(geocoder: Arc<G>, config: LocationConfig, cache_capacity: usize) -> Self {
        Self {
            geocoder,
            config,
            cache: FreshnessCache::new("geocode", cache_capacity),
        }
    }

    /// Address for `coords`, or the formatted coordinates if none can be had
    /// before `deadline`
    pub(crate) async fn address(&self, coords: Coordinates, deadline: Instant) -> String {
        let lookup = self
            .cache
            .ensure(
                CoordKey::from(coords),
                self.config.geocode_cache_ttl(),
                || self.lookup_with_retry(coords, deadline),
            )
            .await;

        match lookup {
            Ok(address) => address.into_value(),
            Err(e) => {
                warn!(error = %e, "reverse geocode unavailable, using coordinates");
                format_coordinates(coords)
            }
        }
    }

    #[instrument(
        name = "location_geocode",
        skip(self, coords, deadline),
        fields(lat = coords.latitude, lon = coords.longitude)
    )]
    async fn lookup_with_retry(
        &self,
        coords: Coordinates,
        deadline: Instant,
    ) -> Result<String, ContractError> {
        let Coordinates {
            latitude,
            longitude,
        } = coords;
        let mut last_error = None;

        for attempt in 1..=self.config.geocode_retries {
            let backoff = self.config.geocode_backoff(attempt);
            if !backoff.is_zero() {
                if Instant::now() + backoff >= deadline {
                    debug!(attempt, "no time left for another geocode attempt");
                    break;
                }
                sleep(backoff).await;
            }

            let attempt_deadline = (Instant::now() + self.config.geocode_timeout()).min(deadline);
            let error = match timeout_at(attempt_deadline, self.geocoder.lookup(latitude, longitude))
                .await
            {
                Ok(Ok(address)) if !address.trim().is_empty() => return Ok(address),
                Ok(Ok(_)) => ContractError::geocode(latitude, longitude, "empty address"),
                Ok(Err(e)) => e,
                Err(_) => ContractError::geocode(latitude, longitude, "lookup timed out"),
            };

            debug!(attempt, error = %error, "geocode attempt failed");
            last_error = Some(error);

            if Instant::now() >= deadline {
                break;
            }
        }

        Err(last_error
            .unwrap_or_else(|| ContractError::geocode(latitude, longitude, "deadline exhausted")))
    }
}
