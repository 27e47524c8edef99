//! Result cache tiers, expiry and eviction

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use textflow_core::cache::{generate_content_hash, InMemoryStore, KeyValueStore, ResultCache};
use textflow_core::config::CacheConfig;
use textflow_core::types::{TaskInput, TaskOutput};

fn small_cache(max_bytes: usize) -> ResultCache {
    ResultCache::new(CacheConfig {
        max_bytes,
        ..CacheConfig::default()
    })
}

#[tokio::test(start_paused = true)]
async fn test_entry_survives_until_ttl_elapses() {
    let cache = ResultCache::new(CacheConfig::default());
    cache
        .set_with_ttl("key", &rewrite_output("value"), Duration::from_secs(5))
        .await;

    tokio::time::advance(Duration::from_secs(4)).await;
    let fresh: Option<TaskOutput> = cache.get("key").await;
    assert_eq!(fresh, Some(rewrite_output("value")));

    tokio::time::advance(Duration::from_secs(2)).await;
    let stale: Option<TaskOutput> = cache.get("key").await;
    assert_eq!(stale, None);
    assert!(!cache.contains_key("key"));
    assert_eq!(cache.stats().expirations, 1);
}

#[tokio::test]
async fn test_least_recently_used_entry_is_evicted_first() {
    // Each entry is one key byte plus a ten byte JSON string.
    let cache = small_cache(25);
    cache.set("a", &"xxxxxxxx").await;
    cache.set("b", &"yyyyyyyy").await;

    let touched: Option<String> = cache.get("a").await;
    assert!(touched.is_some());

    cache.set("c", &"zzzzzzzz").await;

    assert!(cache.contains_key("a"));
    assert!(!cache.contains_key("b"));
    assert!(cache.contains_key("c"));

    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert!(stats.bytes <= 25);
}

#[tokio::test]
async fn test_overwriting_a_key_keeps_byte_accounting_exact() {
    let cache = small_cache(1_000);
    cache.set("k", &"short").await;
    let first = cache.stats().bytes;
    cache.set("k", &"a much longer value than before").await;
    cache.set("k", &"short").await;

    assert_eq!(cache.stats().bytes, first);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_shared_store_promotes_into_second_cache() {
    let store = Arc::new(InMemoryStore::new());
    let writer = ResultCache::with_store(CacheConfig::default(), store.clone());
    let reader = ResultCache::with_store(CacheConfig::default(), store.clone());

    let input = rewrite_input("Shared across processes.");
    let key = writer.key_for(&input);
    writer.set(&key, &rewrite_output("SHARED")).await;
    assert!(store.contains_key(&key));

    assert!(!reader.contains_key(&key));
    let promoted: Option<TaskOutput> = reader.get(&key).await;
    assert_eq!(promoted, Some(rewrite_output("SHARED")));
    assert!(reader.contains_key(&key));
}

#[tokio::test]
async fn test_clear_empties_both_tiers() {
    let store = Arc::new(InMemoryStore::new());
    let cache = ResultCache::with_store(CacheConfig::default(), store.clone());
    cache.set("one", &1u32).await;
    cache.set("two", &2u32).await;

    cache.clear().await;

    assert!(cache.is_empty());
    assert!(store.is_empty());
    assert_eq!(store.get("one").await.unwrap(), None);
}

#[tokio::test]
async fn test_store_failures_degrade_to_memory_only() {
    let cache = ResultCache::with_store(CacheConfig::default(), Arc::new(FailingStore));

    cache.set("key", &rewrite_output("kept")).await;
    let hit: Option<TaskOutput> = cache.get("key").await;
    let miss: Option<TaskOutput> = cache.get("absent").await;

    assert_eq!(hit, Some(rewrite_output("kept")));
    assert_eq!(miss, None);
    let stats = cache.stats();
    assert_eq!(stats.store_errors, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_keys_separate_kind_and_parameters() {
    let cache = ResultCache::new(CacheConfig::default());
    let to_french = TaskInput::Translation {
        text: "Good morning.".to_string(),
        source_language: None,
        target_language: "fr".to_string(),
    };
    let to_german = to_french.clone();
    let to_german = match to_german {
        TaskInput::Translation {
            text,
            source_language,
            ..
        } => TaskInput::Translation {
            text,
            source_language,
            target_language: "de".to_string(),
        },
        other => other,
    };
    let summary = TaskInput::Summarization {
        text: "Good morning.".to_string(),
        max_sentences: None,
    };

    let keys = [
        cache.key_for(&to_french),
        cache.key_for(&to_german),
        cache.key_for(&summary),
    ];
    assert_ne!(keys[0], keys[1]);
    assert_ne!(keys[0], keys[2]);
    assert_eq!(keys[0], cache.key_for(&to_french.clone()));
}

#[test]
fn test_empty_text_has_a_defined_hash() {
    let hash = generate_content_hash("");
    assert_eq!(hash, generate_content_hash(""));
    assert!(hash.ends_with(":0"));
    assert_ne!(hash, generate_content_hash(" "));
}

#[tokio::test]
async fn test_disabled_cache_never_stores() {
    let cache = ResultCache::new(CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    });
    cache.set("key", &"value").await;
    let value: Option<String> = cache.get("key").await;
    assert_eq!(value, None);
    assert!(cache.is_empty());
}
