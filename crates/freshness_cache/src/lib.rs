//! # Freshness Cache
//!
//! Key/value store with per-entry time-to-live.
//!
//! - `ensure` serves fresh entries, refetches expired ones, and falls back to
//!   the last known value when the fetch fails
//! - concurrent `ensure` calls on one key share a single fetch
//! - entries live on the tokio clock, so paused-time tests drive expiry
//!
//! ```ignore
//! let contacts = FreshnessCache::new("contacts", 100);
//! match contacts.ensure(user_id.clone(), ttl, || directory.primary_contacts(&user_id)).await {
//!     Ok(Cached::Fresh(list)) => { /* ... */ }
//!     Ok(Cached::Stale { value, error }) => { /* usable, but refresh failed */ }
//!     Err(e) => { /* no data at all */ }
//! }
//! ```

mod cache;

pub use cache::{Cached, FreshnessCache};
