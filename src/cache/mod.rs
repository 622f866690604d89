//! In-process caches with lazy TTL expiry and a size cap.
//!
//! Every cache is an explicit object owned by the service that uses it, so
//! tests build isolated instances. Nothing is persisted.

mod entry;
mod keys;
mod layer;

pub use entry::CacheStats;
pub use keys::QueryKey;
pub use layer::CacheLayer;
