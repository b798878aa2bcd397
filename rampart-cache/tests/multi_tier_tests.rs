//! End-to-end behaviour of the multi-tier cache.

use rampart_cache::{CacheConfig, InMemoryBackend, MultiTierCache, RemoteBackend, RemoteState, Ttl};
use rampart_test_utils::assertions::{assert_cache_invariants, assert_keys, assert_reads_accounted};
use rampart_test_utils::fixtures::{manual_cache, profile, small_config, Profile};
use rampart_test_utils::{BrokenAfterConnectBackend, FailingBackend, FlakyConnectBackend, SlowBackend};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_ttl_expires_in_real_time() {
    let cache: MultiTierCache<String> = MultiTierCache::new(&small_config(8)).expect("cache");

    cache.set("a", "x".to_string(), Duration::from_millis(100)).await;
    assert_eq!(cache.get("a").await.as_deref(), Some("x"));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.get("a").await, None);
    assert_eq!(cache.get_stats().l1_expirations, 1);
}

#[tokio::test]
async fn test_lru_evicts_least_recently_used() {
    let (cache, _clock) = manual_cache::<u32>(2, None);
    cache.set("a", 1, Ttl::Default).await;
    cache.set("b", 2, Ttl::Default).await;
    cache.set("c", 3, Ttl::Default).await;
    assert_keys(cache.local(), &["b", "c"]);

    let (cache, _clock) = manual_cache::<u32>(2, None);
    cache.set("a", 1, Ttl::Default).await;
    cache.set("b", 2, Ttl::Default).await;
    assert_eq!(cache.get("a").await, Some(1));
    cache.set("c", 3, Ttl::Default).await;
    assert_keys(cache.local(), &["a", "c"]);
}

#[tokio::test]
async fn test_promotion_survives_remote_outage() {
    let backend = Arc::new(InMemoryBackend::new());
    let (cache, _clock) = manual_cache::<Profile>(8, Some(backend.clone()));
    assert!(cache.connect().await);

    cache.set("p", profile(4), Ttl::Default).await;
    cache.local().clear();

    // First read comes from L2 and is promoted.
    assert_eq!(cache.get("p").await, Some(profile(4)));
    assert_eq!(cache.get_stats().l2_hits, 1);

    backend.set_online(false);
    assert_eq!(cache.get("p").await, Some(profile(4)));

    let stats = cache.get_stats();
    assert_eq!(stats.l1_hits, 1);
    assert_eq!(stats.l2_errors, 0);
    assert_reads_accounted(&stats, 2);
}

#[tokio::test]
async fn test_failing_backend_degrades_to_local() {
    let backend = Arc::new(FailingBackend::new());
    let (cache, _clock) = manual_cache::<u32>(4, Some(backend.clone()));

    assert!(!cache.connect().await);
    cache.set("k", 1, Ttl::Default).await;
    assert_eq!(cache.get("k").await, Some(1));
    assert_eq!(cache.get("missing").await, None);
    assert!(cache.delete("k").await);
    cache.clear().await;

    let stats = cache.get_stats();
    assert!(!stats.l2_available);
    assert_eq!(stats.sets, 1);
    // Only the connect attempt reached the backend.
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_broken_backend_errors_never_escape() {
    let backend = Arc::new(BrokenAfterConnectBackend::new());
    let (cache, _clock) = manual_cache::<u32>(4, Some(backend.clone()));
    assert!(cache.connect().await);

    cache.set("k", 1, Ttl::Default).await;
    assert_eq!(cache.get("k").await, Some(1));
    assert_eq!(cache.get("other").await, None);
    assert!(cache.delete("k").await);
    cache.clear().await;

    let stats = cache.get_stats();
    assert!(stats.l2_available);
    assert_eq!(stats.sets, 1);
    assert_eq!(stats.l2_errors, 4);
    assert_eq!(backend.calls(), 4);
}

#[tokio::test]
async fn test_slow_backend_is_bounded_by_timeout() {
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(500)));
    let (cache, _clock) = manual_cache::<u32>(4, Some(backend.clone()));
    assert!(cache.connect().await);

    let started = std::time::Instant::now();
    cache.set("k", 1, Ttl::Default).await;
    assert_eq!(cache.get("absent").await, None);
    assert!(started.elapsed() < Duration::from_millis(450));

    assert_eq!(cache.get("k").await, Some(1));
    assert_eq!(cache.get_stats().l2_errors, 2);
}

#[tokio::test]
async fn test_connect_can_be_retried() {
    let backend = Arc::new(FlakyConnectBackend::new(1));
    let cache: MultiTierCache<u32> =
        MultiTierCache::with_remote(&small_config(4), backend.clone()).expect("cache");

    assert!(!cache.connect().await);
    cache.set("skipped", 1, Ttl::Default).await;
    assert!(backend.inner().is_empty());

    assert!(cache.connect().await);
    assert!(cache.connect().await);
    assert_eq!(backend.attempts(), 2);

    cache.set("stored", 2, Ttl::Default).await;
    assert!(backend.inner().contains("test:stored"));

    cache.shutdown().await;
    assert!(!cache.get_stats().l2_available);
}

#[tokio::test]
async fn test_clear_only_touches_own_namespace() {
    let backend = Arc::new(InMemoryBackend::new());
    backend
        .set("other:kept", vec![1, 2, 3], None)
        .await
        .expect("seed");

    let cache: MultiTierCache<u32> = MultiTierCache::with_remote(
        &CacheConfig::new().with_namespace("mine"),
        backend.clone(),
    )
    .expect("cache");
    cache.connect().await;

    cache.set("a", 1, Ttl::Never).await;
    cache.set("b", 2, Ttl::Never).await;
    cache.clear().await;

    assert!(cache.local().is_empty());
    assert_eq!(backend.len(), 1);
    assert!(backend.contains("other:kept"));
}

#[tokio::test]
async fn test_remote_expiry_follows_write_ttl() {
    let clock = Arc::new(rampart_test_utils::ManualClock::new());
    let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
    let cache: MultiTierCache<u32> =
        MultiTierCache::build(&small_config(4), Some(backend.clone()), clock.clone())
            .expect("cache");
    cache.connect().await;

    cache.set("short", 1, Duration::from_secs(5)).await;
    cache.set("forever", 2, Ttl::Never).await;

    clock.advance(Duration::from_secs(6));
    cache.local().clear();

    assert_eq!(cache.get("short").await, None);
    assert_eq!(cache.get("forever").await, Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_access_keeps_invariants() {
    let backend = Arc::new(InMemoryBackend::new());
    let cache: Arc<MultiTierCache<u64>> = Arc::new(
        MultiTierCache::with_remote(&small_config(16), backend).expect("cache"),
    );
    cache.connect().await;

    let tasks: Vec<_> = (0..8u64)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for i in 0..500u64 {
                    let key = format!("k{}", (i * 7 + worker) % 40);
                    match i % 4 {
                        0 | 1 => cache.set(key, i, Ttl::Default).await,
                        2 => {
                            cache.get(&key).await;
                        }
                        _ => {
                            cache.delete(&key).await;
                        }
                    }
                    if i % 50 == 0 {
                        assert!(cache.local().check_invariants().is_ok());
                    }
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.expect("task");
    }

    assert_cache_invariants(cache.local());
    assert!(cache.local().len() <= 16);
    assert_eq!(cache.get_stats().sets, 8 * 250);
}

#[tokio::test]
async fn test_adapter_state_reflects_lifecycle() {
    use rampart_cache::RemoteCacheAdapter;

    let backend: Arc<dyn RemoteBackend> = Arc::new(InMemoryBackend::new());
    let adapter: RemoteCacheAdapter<u32> =
        RemoteCacheAdapter::new(backend, "ns", Duration::from_millis(50));

    assert_eq!(adapter.state(), RemoteState::Disconnected);
    assert!(adapter.connect().await);
    assert_eq!(adapter.state(), RemoteState::Connected);
    adapter.disconnect().await;
    adapter.disconnect().await;
    assert_eq!(adapter.state(), RemoteState::Disconnected);
}
