//! # Cache Module
//!
//! Content-addressable result caching for provider calls.
//!
//! - [`ResultCache`]: TTL + byte-budget LRU memory tier, write-through to an
//!   optional [`KeyValueStore`]
//! - [`hashing`]: cheap content hash and deterministic key composition
//! - [`store`]: the persistent key-value collaborator trait and in-process
//!   implementations
//!
//! The cache is an optimization layer only. Backend failures surface as
//! misses and are never returned to the caller.

pub mod errors;
pub mod hashing;
pub mod result_cache;
pub mod store;

pub use errors::{StoreError, StoreResult};
pub use hashing::{generate_content_hash, generate_key, ContentHasher};
pub use result_cache::{CacheEntry, CacheStats, ResultCache};
pub use store::{InMemoryStore, KeyValueStore, NoOpStore};
