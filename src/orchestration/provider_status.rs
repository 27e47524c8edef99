//! # Provider Status Registry
//!
//! Cached availability per provider. A check result is trusted for the
//! configured staleness window (60s by default); a forced refresh always
//! checks. Statuses are written through to the key-value store so that a
//! restarted orchestrator can reuse a recent check. Store failures are
//! logged and ignored.

use super::provider::Provider;
use crate::cache::KeyValueStore;
use crate::constants::PROVIDER_STATUS_KEY_PREFIX;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cached availability of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider_id: String,
    pub available: bool,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StatusRecord {
    status: ProviderStatus,
    checked_at: Instant,
}

/// Registry of provider availability with a bounded staleness window
pub struct ProviderStatusRegistry {
    ttl: Duration,
    statuses: DashMap<String, StatusRecord>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl std::fmt::Debug for ProviderStatusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderStatusRegistry")
            .field("ttl", &self.ttl)
            .field("tracked", &self.statuses.len())
            .field("store", &self.store.as_ref().map(|s| s.store_name()))
            .finish()
    }
}

impl ProviderStatusRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            statuses: DashMap::new(),
            store: None,
        }
    }

    pub fn with_store(ttl: Duration, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(ttl)
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether `provider` is usable, probing only if the cached status is stale
    pub async fn is_available(&self, provider: &dyn Provider) -> bool {
        self.refresh(provider, false).await.available
    }

    /// Current status of `provider`. With `force`, the cache is bypassed.
    pub async fn refresh(&self, provider: &dyn Provider, force: bool) -> ProviderStatus {
        let provider_id = provider.id();

        if !force {
            if let Some(status) = self.fresh_status(provider_id) {
                return status;
            }
            if let Some(status) = self.load_persisted(provider_id).await {
                return status;
            }
        }

        let available = provider.check_availability().await;
        debug!(
            provider_id = %provider_id,
            available = available,
            forced = force,
            "🔍 Checked provider availability"
        );

        let status = ProviderStatus {
            provider_id: provider_id.to_string(),
            available,
            last_checked: Utc::now(),
        };
        self.record(status.clone()).await;
        status
    }

    /// Check every provider concurrently
    pub async fn refresh_all(
        &self,
        providers: &[Arc<dyn Provider>],
        force: bool,
    ) -> Vec<ProviderStatus> {
        futures::future::join_all(
            providers
                .iter()
                .map(|provider| self.refresh(provider.as_ref(), force)),
        )
        .await
    }

    /// Record `provider_id` as unavailable until the status goes stale
    pub async fn mark_unavailable(&self, provider_id: &str) {
        info!(provider_id = %provider_id, "⛔ Marking provider unavailable");
        self.record(ProviderStatus {
            provider_id: provider_id.to_string(),
            available: false,
            last_checked: Utc::now(),
        })
        .await;
    }

    /// Every tracked status, ordered by provider id
    pub fn snapshot(&self) -> Vec<ProviderStatus> {
        let mut statuses: Vec<ProviderStatus> = self
            .statuses
            .iter()
            .map(|entry| entry.value().status.clone())
            .collect();
        statuses.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        statuses
    }

    /// Forget every cached status; persisted copies are removed best-effort
    pub async fn clear(&self) {
        let ids: Vec<String> = self.statuses.iter().map(|e| e.key().clone()).collect();
        self.statuses.clear();
        if let Some(store) = &self.store {
            for id in ids {
                if let Err(e) = store.remove(&status_key(&id)).await {
                    warn!(provider_id = %id, error = %e, "Failed to remove persisted provider status");
                }
            }
        }
    }

    fn fresh_status(&self, provider_id: &str) -> Option<ProviderStatus> {
        let record = self.statuses.get(provider_id)?;
        (record.checked_at.elapsed() < self.ttl).then(|| record.status.clone())
    }

    async fn load_persisted(&self, provider_id: &str) -> Option<ProviderStatus> {
        let store = self.store.as_ref()?;
        let raw = match store.get(&status_key(provider_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(provider_id = %provider_id, error = %e, "Failed to read persisted provider status");
                return None;
            }
        };
        let status: ProviderStatus = serde_json::from_str(&raw).ok()?;

        let age = Utc::now()
            .signed_duration_since(status.last_checked)
            .to_std()
            .ok()?;
        let remaining = self.ttl.checked_sub(age).filter(|d| !d.is_zero())?;

        // Keep the original check time so the entry goes stale on schedule
        let now = Instant::now();
        let checked_at = now.checked_sub(self.ttl - remaining).unwrap_or(now);
        self.statuses.insert(
            provider_id.to_string(),
            StatusRecord {
                status: status.clone(),
                checked_at,
            },
        );
        Some(status)
    }

    async fn record(&self, status: ProviderStatus) {
        let key = status_key(&status.provider_id);
        let serialized = serde_json::to_string(&status);
        self.statuses.insert(
            status.provider_id.clone(),
            StatusRecord {
                status,
                checked_at: Instant::now(),
            },
        );

        if let Some(store) = &self.store {
            let result = match serialized {
                Ok(serialized) => store.set(&key, serialized).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = result {
                warn!(key = %key, error = %e, "Failed to persist provider status");
            }
        }
    }
}

fn status_key(provider_id: &str) -> String {
    format!("{PROVIDER_STATUS_KEY_PREFIX}{provider_id}")
}
