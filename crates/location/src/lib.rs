//! # Location
//!
//! Best-effort location for an alert.
//!
//! `LocationResolver::resolve` never fails: a position fix is raced against
//! the configured deadline, the reverse geocode is retried inside whatever
//! time is left, and every failure degrades rather than propagates:
//!
//! | failure                       | result                                 |
//! |-------------------------------|----------------------------------------|
//! | fix error / deadline exceeded | `ResolvedLocation::fallback()`         |
//! | geocode exhausted             | coordinates formatted as the address   |
//!
//! One resolution runs per operation id; repeated calls share it.

mod geocode;
mod resolver;

pub use contracts::{LocationConfig, ResolvedLocation};
pub use resolver::{LocationResolver, PendingLocation};
