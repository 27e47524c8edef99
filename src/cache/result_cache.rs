//! # Result Cache
//!
//! Content-addressable cache of provider results with TTL expiry and a byte
//! budget enforced by least-recently-used eviction.
//!
//! ## Tiers
//!
//! ```text
//! get ──▶ memory tier (moka) ──miss──▶ KeyValueStore ──hit──▶ promote to memory
//! set ──▶ memory tier (evict LRU until under budget) ──▶ KeyValueStore
//! ```
//!
//! The memory tier is a `moka` cache weighed in bytes with plain LRU
//! eviction and a per-entry expiry. Recency is refreshed on every read and
//! every write. Expired entries are also checked on read against the tokio
//! clock, so a read never returns a value past its TTL. Every store failure
//! is logged and treated as a miss: caching never fails the operation it
//! accelerates.

use super::hashing::{key_for_input, ContentHasher};
use super::store::KeyValueStore;
use crate::config::CacheConfig;
use crate::logging::log_cache_operation;
use crate::types::TaskInput;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One stored result in the memory tier
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }

    /// Lifetime left at `now`
    pub fn remaining(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.stored_at))
    }

    /// Bytes charged against the memory budget
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// Serialized form written to the persistent store
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEnvelope {
    value: String,
    stored_at: DateTime<Utc>,
    ttl_ms: u64,
}

impl StoredEnvelope {
    /// Remaining lifetime, or `None` once expired
    fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let age = now
            .signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Duration::from_millis(self.ttl_ms).checked_sub(age).filter(|d| !d.is_zero())
    }
}

/// Counters exposed for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub store_errors: u64,
    pub entries: usize,
    pub bytes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    store_errors: AtomicU64,
}

type MemoryTier = Cache<String, Arc<CacheEntry>>;

/// Each entry lives for whatever is left of its own TTL
struct EntryExpiry;

impl Expiry<String, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Arc<CacheEntry>,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(entry.remaining(Instant::now()))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Arc<CacheEntry>,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.remaining(Instant::now()))
    }
}

fn build_memory_tier(max_bytes: usize, counters: &Arc<Counters>) -> MemoryTier {
    let listener_counters = Arc::clone(counters);
    Cache::builder()
        .max_capacity(u64::try_from(max_bytes).unwrap_or(u64::MAX))
        .weigher(|_key: &String, entry: &Arc<CacheEntry>| {
            u32::try_from(entry.size()).unwrap_or(u32::MAX)
        })
        .eviction_policy(EvictionPolicy::lru())
        .expire_after(EntryExpiry)
        .eviction_listener(move |key, _entry, cause| match cause {
            RemovalCause::Size => {
                listener_counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Evicted least-recently-used cache entry");
            }
            RemovalCause::Expired => {
                listener_counters.expirations.fetch_add(1, Ordering::Relaxed);
            }
            RemovalCause::Explicit | RemovalCause::Replaced => {}
        })
        .build()
}

/// Content-addressable result cache
pub struct ResultCache {
    config: CacheConfig,
    hasher: ContentHasher,
    memory: MemoryTier,
    store: Option<Arc<dyn KeyValueStore>>,
    counters: Arc<Counters>,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("config", &self.config)
            .field("store", &self.store.as_ref().map(|s| s.store_name()))
            .field("stats", &self.stats())
            .finish()
    }
}

impl ResultCache {
    /// Memory-only cache
    pub fn new(config: CacheConfig) -> Self {
        let hasher = ContentHasher::new(config.full_scan_threshold, config.sample_points);
        let counters = Arc::new(Counters::default());
        Self {
            memory: build_memory_tier(config.max_bytes, &counters),
            config,
            hasher,
            store: None,
            counters,
        }
    }

    /// Cache that writes through to a persistent store
    pub fn with_store(config: CacheConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(config)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.ttl()
    }

    pub fn hasher(&self) -> &ContentHasher {
        &self.hasher
    }

    /// Cache key for a task input
    pub fn key_for(&self, input: &TaskInput) -> String {
        key_for_input(&self.hasher, input)
    }

    /// Look up `key`; `None` on miss, expiry, undecodable value or store error
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }

        let memory_lookup = match self.memory.get(key).await {
            Some(entry) if entry.is_expired(Instant::now()) => {
                self.memory.invalidate(key).await;
                Lookup::Expired
            }
            Some(entry) => Lookup::Hit(entry.value.clone()),
            None => Lookup::Miss,
        };

        let raw = match memory_lookup {
            Lookup::Hit(value) => Some(value),
            Lookup::Expired => {
                self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                log_cache_operation("get", key, "expired", None);
                self.remove_from_store(key).await;
                None
            }
            Lookup::Miss => self.load_from_store(key).await,
        };

        let Some(raw) = raw else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                log_cache_operation("get", key, "hit", None);
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                self.memory.invalidate(key).await;
                self.remove_from_store(key).await;
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key` with the default TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.config.ttl()).await;
    }

    /// Store `value` under `key` with an explicit TTL
    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if !self.config.enabled || ttl.is_zero() {
            return;
        }

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping cache write for unserializable value");
                return;
            }
        };

        self.insert_memory(key, raw.clone(), Instant::now(), ttl).await;

        if let Some(store) = &self.store {
            let envelope = StoredEnvelope {
                value: raw,
                stored_at: Utc::now(),
                ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            };
            match serde_json::to_string(&envelope) {
                Ok(serialized) => {
                    if let Err(e) = store.set(key, serialized).await {
                        self.record_store_error("set", key, &e.to_string());
                    }
                }
                Err(e) => self.record_store_error("set", key, &e.to_string()),
            }
        }

        log_cache_operation("set", key, "stored", None);
    }

    /// Delete one entry from both tiers
    pub async fn remove(&self, key: &str) {
        self.memory.invalidate(key).await;
        self.memory.run_pending_tasks().await;
        self.remove_from_store(key).await;
    }

    /// Delete every entry from both tiers
    pub async fn clear(&self) {
        let keys: Vec<Arc<String>> = self.memory.iter().map(|(key, _)| key).collect();
        for key in &keys {
            self.memory.invalidate(key.as_str()).await;
        }
        self.memory.run_pending_tasks().await;
        if let Some(store) = &self.store {
            if let Err(e) = store.clear().await {
                self.record_store_error("clear", "*", &e.to_string());
            }
        }
        debug!("🧹 Result cache cleared");
    }

    /// Eagerly drop expired memory entries; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Arc<String>> = self
            .memory
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key)
            .collect();
        for key in &expired {
            self.memory.invalidate(key.as_str()).await;
        }
        self.memory.run_pending_tasks().await;
        self.counters
            .expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    pub fn len(&self) -> usize {
        usize::try_from(self.memory.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.memory.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
            entries: self.len(),
            bytes: usize::try_from(self.memory.weighted_size()).unwrap_or(usize::MAX),
        }
    }

    /// Insert into the memory tier and settle eviction before returning, so
    /// the byte budget holds whenever a write completes
    async fn insert_memory(&self, key: &str, raw: String, stored_at: Instant, ttl: Duration) {
        let entry = CacheEntry {
            key: key.to_string(),
            value: raw,
            stored_at,
            ttl,
        };

        if entry.size() > self.config.max_bytes {
            // Never fits; keep only the persistent copy
            debug!(key = %key, size = entry.size(), "Entry exceeds memory budget, not cached in memory");
            self.memory.invalidate(key).await;
        } else {
            self.memory.insert(key.to_string(), Arc::new(entry)).await;
        }
        self.memory.run_pending_tasks().await;
    }

    async fn load_from_store(&self, key: &str) -> Option<String> {
        let store = self.store.as_ref()?;

        let serialized = match store.get(key).await {
            Ok(Some(serialized)) => serialized,
            Ok(None) => return None,
            Err(e) => {
                self.record_store_error("get", key, &e.to_string());
                return None;
            }
        };

        let envelope: StoredEnvelope = match serde_json::from_str(&serialized) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.record_store_error("decode", key, &e.to_string());
                self.remove_from_store(key).await;
                return None;
            }
        };

        match envelope.remaining(Utc::now()) {
            Some(remaining) => {
                // Promote with the remaining lifetime so the entry still expires on schedule
                let now = Instant::now();
                let ttl = Duration::from_millis(envelope.ttl_ms);
                let stored_at = now.checked_sub(ttl - remaining).unwrap_or(now);
                self.insert_memory(key, envelope.value.clone(), stored_at, ttl)
                    .await;
                Some(envelope.value)
            }
            None => {
                self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                self.remove_from_store(key).await;
                None
            }
        }
    }

    async fn remove_from_store(&self, key: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(key).await {
                self.record_store_error("remove", key, &e.to_string());
            }
        }
    }

    fn record_store_error(&self, operation: &str, key: &str, error: &str) {
        self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
        log_cache_operation(operation, key, "store_error", Some(error));
    }
}

enum Lookup {
    Hit(String),
    Expired,
    Miss,
}
