//! LocationResolver - bounded, never-failing position + address lookup

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{LocationConfig, OperationId, PositionService, ResolvedLocation, ReverseGeocoder};
use observability::record_location_resolved;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::geocode::AddressLookup;

const GEOCODE_CACHE_CAPACITY: usize = 64;

/// Handle to a resolution that may still be running
///
/// Clones observe the same resolution.
#[derive(Debug, Clone)]
pub struct PendingLocation {
    operation_id: OperationId,
    rx: watch::Receiver<Option<ResolvedLocation>>,
}

impl PendingLocation {
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Result if already settled
    pub fn try_get(&self) -> Option<ResolvedLocation> {
        self.rx.borrow().clone()
    }

    /// Wait for the resolution to settle
    ///
    /// Falls back if the resolving task went away without a result.
    pub async fn wait(mut self) -> ResolvedLocation {
        match self.rx.wait_for(Option::is_some).await {
            Ok(settled) => (*settled).clone().unwrap_or_else(ResolvedLocation::fallback),
            Err(_) => {
                warn!(operation_id = %self.operation_id, "location task dropped, using fallback");
                ResolvedLocation::fallback()
            }
        }
    }
}

struct ResolverCore<P, G> {
    position: Arc<P>,
    addresses: AddressLookup<G>,
    config: LocationConfig,
}

impl<P, G> ResolverCore<P, G>
where
    P: PositionService + Sync,
    G: ReverseGeocoder + Sync,
{
    #[instrument(name = "location_resolve", skip(self))]
    async fn resolve(&self) -> ResolvedLocation {
        let started = Instant::now();
        let deadline = started + self.config.timeout();

        let fix = timeout_at(
            deadline,
            self.position
                .current_position(self.config.position_options()),
        )
        .await;

        let location = match fix {
            Ok(Ok(coords)) => {
                let address = self.addresses.address(coords, deadline).await;
                ResolvedLocation {
                    latitude: coords.latitude,
                    longitude: coords.longitude,
                    address,
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "position fix failed, using fallback location");
                ResolvedLocation::fallback()
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.timeout_ms,
                    "position fix timed out, using fallback location"
                );
                ResolvedLocation::fallback()
            }
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        record_location_resolved(location.is_fallback(), latency_ms);
        debug!(latency_ms, fallback = location.is_fallback(), "location settled");
        location
    }
}

struct InFlight {
    operation_id: OperationId,
    rx: watch::Receiver<Option<ResolvedLocation>>,
}

/// Location resolver with per-operation in-flight reuse
pub struct LocationResolver<P, G> {
    core: Arc<ResolverCore<P, G>>,
    in_flight: Mutex<Option<InFlight>>,
}

impl<P, G> LocationResolver<P, G>
where
    P: PositionService + Sync + 'static,
    G: ReverseGeocoder + Sync + 'static,
{
    pub fn new(position: Arc<P>, geocoder: Arc<G>, config: LocationConfig) -> Self {
        Self {
            core: Arc::new(ResolverCore {
                position,
                addresses: AddressLookup::new(geocoder, config, GEOCODE_CACHE_CAPACITY),
                config,
            }),
            in_flight: Mutex::new(None),
        }
    }

    /// Start resolving for `operation_id`, or join the resolution already
    /// running for it
    ///
    /// A different id replaces the tracked resolution; the old one keeps
    /// running in the background and its result reaches only the handles
    /// already issued for it.
    pub fn resolve(&self, operation_id: OperationId) -> PendingLocation {
        let mut in_flight = self.in_flight();
        if let Some(current) = in_flight.as_ref() {
            if current.operation_id == operation_id {
                debug!(operation_id = %operation_id, "joining in-flight location request");
                return PendingLocation {
                    operation_id,
                    rx: current.rx.clone(),
                };
            }
        }

        // Reuse is keyed on the operation id. A restart after cancel gets a
        // fresh fix even while the abandoned request is still running.
        let (tx, rx) = watch::channel(None);
        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            let location = core.resolve().await;
            // receivers may all be gone after a cancel
            let _ = tx.send(Some(location));
        });

        info!(operation_id = %operation_id, "location request started");
        *in_flight = Some(InFlight {
            operation_id,
            rx: rx.clone(),
        });
        PendingLocation { operation_id, rx }
    }

    /// Resolve inline without in-flight tracking
    pub async fn resolve_now(&self) -> ResolvedLocation {
        self.core.resolve().await
    }

    /// Stop tracking the resolution for `operation_id`
    pub fn release(&self, operation_id: OperationId) {
        let mut in_flight = self.in_flight();
        if in_flight
            .as_ref()
            .is_some_and(|current| current.operation_id == operation_id)
        {
            *in_flight = None;
        }
    }

    /// Operation whose resolution is currently tracked
    pub fn in_flight_operation(&self) -> Option<OperationId> {
        self.in_flight().as_ref().map(|current| current.operation_id)
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
