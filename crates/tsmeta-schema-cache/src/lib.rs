//! tsmeta Schema Cache - weighted schema and last-value cache
//!
//! A bounded view of measurement schemas layered above the metadata
//! store. The cache is never authoritative: callers populate it from the
//! store and invalidate it after schema mutations.

pub mod cache;
pub mod computation;
pub mod entry;
pub mod stats;

pub use cache::SchemaCache;
pub use computation::SchemaComputation;
pub use entry::SchemaCacheEntry;
pub use stats::{CacheStats, CacheStatsSnapshot};
