//! Kiln Tasks - memoized task execution
//!
//! Provides:
//! - Input fingerprinting with hash short-circuits and order-insensitive structs
//! - A content-addressable local cache of task outputs
//! - A task executor that consults the cache around local and remote runs

pub mod cache;
pub mod executor;
pub mod fingerprint;
pub mod task;

pub use cache::{CacheEntry, CacheError, CacheStats, PruneStats, TaskCache};
pub use executor::{OutputSource, TaskError, TaskExecutor, TaskOutcome};
pub use fingerprint::{canonicalize, fingerprint, literal_digest, Canonical, CacheKey};
pub use task::{LocalFn, TaskSpec};
