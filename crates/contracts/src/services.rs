//! Consumed collaborator traits
//!
//! The remote user directory and the device location services. Every call may
//! fail or stall; the engine bounds and degrades them, the traits do not.

use crate::{
    AlertDispatcher, Classification, Contact, ContractError, Coordinates, PositionOptions,
    Profile, ReportSink, UserId,
};

/// Remote user directory (classification, contacts, profile)
#[trait_variant::make(UserDirectory: Send)]
pub trait LocalUserDirectory {
    /// Account classification of `user_id`
    async fn caller_classification(&self, user_id: &UserId)
        -> Result<Classification, ContractError>;

    /// Emergency contacts flagged as primary
    async fn primary_contacts(&self, user_id: &UserId) -> Result<Vec<Contact>, ContractError>;

    /// Reporter profile, `None` when the account has none
    async fn profile(&self, user_id: &UserId) -> Result<Option<Profile>, ContractError>;
}

/// Device position service
#[trait_variant::make(PositionService: Send)]
pub trait LocalPositionService {
    /// Request a single position fix
    ///
    /// Implementations may ignore `options.timeout_ms`; callers enforce their
    /// own deadline.
    async fn current_position(&self, options: PositionOptions)
        -> Result<Coordinates, ContractError>;
}

/// Reverse geocode service (best-effort)
#[trait_variant::make(ReverseGeocoder: Send)]
pub trait LocalReverseGeocoder {
    /// Human-readable address for a coordinate pair
    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<String, ContractError>;
}

/// Bundle of every collaborator the coordinator talks to
///
/// Lets the engine stay generic over one type parameter instead of five.
pub trait AlertServices: Send + Sync + 'static {
    type Directory: UserDirectory + Sync + 'static;
    type Position: PositionService + Sync + 'static;
    type Geocoder: ReverseGeocoder + Sync + 'static;
    type Dispatcher: AlertDispatcher + Sync + 'static;
    type Reports: ReportSink + Sync + 'static;
}
