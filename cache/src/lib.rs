//! Validation Cache.
//!
//! Maps (phase, ticket, watched-file digest) to a passing validation result
//! for a bounded time. A miss is always safe: callers re-run the validator.

mod key;
mod store;

pub use key::{CacheKey, KeyInputs};
pub use store::{
    CACHE_VERSION, CacheEntry, CacheStats, CacheWriteError, PutOutcome, ValidationCache,
};
