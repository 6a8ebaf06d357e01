use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::{CacheEntry, CacheTtlPolicy};

use crate::DEFAULT_STORE_TIMEOUT;
use crate::lock_service::DistributedLockService;
use crate::resilience_ports::Clock;
use crate::test_support::{FakeCoordinationStore, ManualClock, RecordingMetrics};

use super::{CacheOptions, LockLossPolicy, StampedeSafeCache, StoreFailurePolicy};

const KEY: &str = "quotes:600519";
const CACHE_KEY: &str = "cache:quotes:600519";
const LOCK_KEY: &str = "cache:quotes:600519:lock";

fn ttl_policy() -> CacheTtlPolicy {
    let policy = CacheTtlPolicy::new(
        Duration::from_secs(10),
        Duration::from_secs(60),
        Duration::ZERO,
    );
    assert!(policy.is_ok());
    policy.unwrap_or_else(|_| unreachable!())
}

fn cache_with(
    store: Arc<FakeCoordinationStore>,
    clock: Arc<ManualClock>,
    options: CacheOptions,
) -> StampedeSafeCache {
    let metrics = Arc::new(RecordingMetrics::default());
    let locks = DistributedLockService::new(store.clone(), metrics.clone(), DEFAULT_STORE_TIMEOUT);
    let cache = StampedeSafeCache::new(store, locks, metrics, clock, options);
    assert!(cache.is_ok());
    cache.unwrap_or_else(|_| unreachable!())
}

fn loaded(value: &str) -> AppResult<String> {
    Ok(value.to_owned())
}

async fn read(cache: &StampedeSafeCache, value: &'static str) -> AppResult<Option<String>> {
    cache
        .get_or_compute(KEY, ttl_policy(), move |_context| async move { loaded(value) })
        .await
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_run_the_loader_once() {
    let store = Arc::new(FakeCoordinationStore::default());
    let cache = cache_with(store, Arc::new(ManualClock::new()), CacheOptions::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(KEY, ttl_policy(), move |_context| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    loaded("v1")
                })
                .await
        }));
    }

    for handle in handles {
        let result = handle.await;
        assert!(matches!(result, Ok(Ok(Some(ref value))) if value == "v1"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fresh_entries_are_served_without_the_loader() {
    let store = Arc::new(FakeCoordinationStore::default());
    let clock = Arc::new(ManualClock::new());
    let cache = cache_with(store.clone(), clock.clone(), CacheOptions::default());

    assert!(matches!(read(&cache, "v1").await, Ok(Some(ref value)) if value == "v1"));
    assert!(store.stored_value(CACHE_KEY).is_some());
    assert!(store.lock_holder(LOCK_KEY).is_none());

    clock.advance(Duration::from_secs(9));
    assert!(matches!(read(&cache, "v2").await, Ok(Some(ref value)) if value == "v1"));
}

#[tokio::test]
async fn stale_entry_is_served_while_one_refresh_runs() {
    let store = Arc::new(FakeCoordinationStore::default());
    let clock = Arc::new(ManualClock::new());
    let cache = cache_with(store.clone(), clock.clone(), CacheOptions::default());
    assert!(matches!(read(&cache, "v1").await, Ok(Some(_))));

    clock.advance(Duration::from_secs(15));
    let refreshes = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());

    for _ in 0..3 {
        let refreshes = refreshes.clone();
        let release = release.clone();
        let value = cache
            .get_or_compute(KEY, ttl_policy(), move |_context| async move {
                refreshes.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                loaded("v2")
            })
            .await;
        assert!(matches!(value, Ok(Some(ref value)) if value == "v1"));
    }

    assert!(eventually(|| refreshes.load(Ordering::SeqCst) == 1).await);
    release.notify_one();
    assert!(
        eventually(|| {
            store
                .stored_value(CACHE_KEY)
                .is_some_and(|encoded| encoded.contains("v2"))
        })
        .await
    );
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert!(eventually(|| store.lock_holder(LOCK_KEY).is_none()).await);
    assert!(matches!(read(&cache, "v3").await, Ok(Some(ref value)) if value == "v2"));
}

#[tokio::test]
async fn expired_entry_is_recomputed_synchronously() {
    let store = Arc::new(FakeCoordinationStore::default());
    let clock = Arc::new(ManualClock::new());
    let cache = cache_with(store, clock.clone(), CacheOptions::default());
    assert!(matches!(read(&cache, "v1").await, Ok(Some(_))));

    clock.advance(Duration::from_secs(65));

    assert!(matches!(read(&cache, "v2").await, Ok(Some(ref value)) if value == "v2"));
}

#[tokio::test]
async fn contender_waits_for_the_holders_publication() {
    let store = Arc::new(FakeCoordinationStore::default());
    let clock = Arc::new(ManualClock::new());
    let cache = cache_with(store.clone(), clock.clone(), CacheOptions::default());
    store.steal_lock(LOCK_KEY);

    let peer_entry = CacheEntry::new(
        "from-peer".to_owned(),
        clock.epoch_millis(),
        &ttl_policy(),
        Duration::ZERO,
    );
    let encoded = serde_json::to_string(&peer_entry);
    assert!(encoded.is_ok());
    let encoded = encoded.unwrap_or_default();

    let peer = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        peer.put_value(CACHE_KEY, &encoded);
    });

    let calls = Arc::new(AtomicUsize::new(0));
    let loader_calls = calls.clone();
    let value = cache
        .get_or_compute(KEY, ttl_policy(), move |_context| async move {
            loader_calls.fetch_add(1, Ordering::SeqCst);
            loaded("local")
        })
        .await;

    assert!(matches!(value, Ok(Some(ref value)) if value == "from-peer"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn contender_gives_up_after_the_contention_wait() {
    let store = Arc::new(FakeCoordinationStore::default());
    let options = CacheOptions {
        contention_wait: Duration::from_millis(60),
        ..CacheOptions::default()
    };
    let cache = cache_with(store.clone(), Arc::new(ManualClock::new()), options);
    store.steal_lock(LOCK_KEY);

    let started_at = std::time::Instant::now();
    let value = read(&cache, "local").await;

    assert!(matches!(value, Ok(None)));
    assert!(started_at.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn lost_lease_discards_the_value() {
    let store = Arc::new(FakeCoordinationStore::default());
    let options = CacheOptions {
        lock_ttl: Duration::from_millis(30),
        ..CacheOptions::default()
    };
    let cache = cache_with(store.clone(), Arc::new(ManualClock::new()), options);

    let intruder = store.clone();
    let value = cache
        .get_or_compute(KEY, ttl_policy(), move |context| async move {
            intruder.steal_lock(LOCK_KEY);
            tokio::time::sleep(Duration::from_millis(80)).await;
            assert!(context.lease_lost());
            loaded("late")
        })
        .await;

    assert!(matches!(value, Err(AppError::LockLost(_))));
    assert!(store.stored_value(CACHE_KEY).is_none());
    assert_eq!(store.lock_holder(LOCK_KEY), Some("intruder".to_owned()));
}

#[tokio::test]
async fn loader_can_stop_once_the_lease_is_lost() {
    let store = Arc::new(FakeCoordinationStore::default());
    let options = CacheOptions {
        lock_ttl: Duration::from_millis(30),
        ..CacheOptions::default()
    };
    let cache = cache_with(store.clone(), Arc::new(ManualClock::new()), options);

    let intruder = store.clone();
    let value: AppResult<Option<String>> = cache
        .get_or_compute(KEY, ttl_policy(), move |context| async move {
            intruder.steal_lock(LOCK_KEY);
            tokio::time::sleep(Duration::from_millis(80)).await;
            context.ensure_lease_held()?;
            loaded("unreachable")
        })
        .await;

    assert!(matches!(value, Err(AppError::LockLost(_))));
}

#[tokio::test]
async fn lost_lease_may_publish_if_absent() {
    let store = Arc::new(FakeCoordinationStore::default());
    let options = CacheOptions {
        lock_ttl: Duration::from_millis(30),
        lock_loss_policy: LockLossPolicy::PublishIfAbsent,
        ..CacheOptions::default()
    };
    let cache = cache_with(store.clone(), Arc::new(ManualClock::new()), options);

    let intruder = store.clone();
    let value = cache
        .get_or_compute(KEY, ttl_policy(), move |_context| async move {
            intruder.steal_lock(LOCK_KEY);
            tokio::time::sleep(Duration::from_millis(80)).await;
            loaded("late")
        })
        .await;

    assert!(matches!(value, Ok(Some(ref value)) if value == "late"));
    assert!(
        store
            .stored_value(CACHE_KEY)
            .is_some_and(|encoded| encoded.contains("late"))
    );
}

#[tokio::test]
async fn store_outage_skips_recompute_by_default() {
    let store = Arc::new(FakeCoordinationStore::default());
    store.set_offline(true);
    let cache = cache_with(store, Arc::new(ManualClock::new()), CacheOptions::default());

    let calls = Arc::new(AtomicUsize::new(0));
    let loader_calls = calls.clone();
    let value = cache
        .get_or_compute(KEY, ttl_policy(), move |_context| async move {
            loader_calls.fetch_add(1, Ordering::SeqCst);
            loaded("v1")
        })
        .await;

    assert!(matches!(value, Ok(None)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn store_outage_may_recompute_without_the_lock() {
    let store = Arc::new(FakeCoordinationStore::default());
    store.set_offline(true);
    let options = CacheOptions {
        store_failure_policy: StoreFailurePolicy::ProceedWithoutLock,
        ..CacheOptions::default()
    };
    let cache = cache_with(store.clone(), Arc::new(ManualClock::new()), options);

    assert!(matches!(read(&cache, "v1").await, Ok(Some(ref value)) if value == "v1"));
    assert!(matches!(read(&cache, "v2").await, Ok(Some(ref value)) if value == "v1"));
}

#[tokio::test]
async fn slow_loaders_time_out() {
    let store = Arc::new(FakeCoordinationStore::default());
    let options = CacheOptions {
        loader_timeout: Duration::from_millis(50),
        ..CacheOptions::default()
    };
    let cache = cache_with(store.clone(), Arc::new(ManualClock::new()), options);

    let value = cache
        .get_or_compute(KEY, ttl_policy(), |_context| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            loaded("never")
        })
        .await;

    assert!(matches!(value, Err(AppError::Timeout(_))));
    assert!(store.lock_holder(LOCK_KEY).is_none());
}

#[tokio::test]
async fn loader_errors_are_not_cached() {
    let store = Arc::new(FakeCoordinationStore::default());
    let cache = cache_with(store, Arc::new(ManualClock::new()), CacheOptions::default());

    let failed: AppResult<Option<String>> = cache
        .get_or_compute(KEY, ttl_policy(), |_context| async {
            Err(AppError::Internal("quote feed unavailable".to_owned()))
        })
        .await;
    assert!(matches!(failed, Err(AppError::Internal(_))));

    assert!(matches!(read(&cache, "v1").await, Ok(Some(ref value)) if value == "v1"));
}

#[tokio::test]
async fn invalidate_clears_both_tiers() {
    let store = Arc::new(FakeCoordinationStore::default());
    let cache = cache_with(store.clone(), Arc::new(ManualClock::new()), CacheOptions::default());
    assert!(matches!(read(&cache, "v1").await, Ok(Some(_))));

    assert!(cache.invalidate(KEY).await.is_ok());
    assert!(store.stored_value(CACHE_KEY).is_none());

    assert!(matches!(read(&cache, "v2").await, Ok(Some(ref value)) if value == "v2"));
}

#[tokio::test]
async fn blank_keys_are_rejected() {
    let cache = cache_with(
        Arc::new(FakeCoordinationStore::default()),
        Arc::new(ManualClock::new()),
        CacheOptions::default(),
    );

    let value = cache
        .get_or_compute(" ", ttl_policy(), |_context| async { loaded("v") })
        .await;
    assert!(matches!(value, Err(AppError::ConfigInvalid(_))));
}
