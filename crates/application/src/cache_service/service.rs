use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::{CacheEntry, CacheTtlPolicy, Freshness, LockLease};

use crate::lock_service::DistributedLockService;
use crate::resilience_ports::{Clock, ResilienceMetrics, SharedCacheStore};
use crate::store_call::bounded_store_call;

use super::load_context::LoadContext;
use super::local_tier::LocalTier;
use super::options::{CacheOptions, LockLossPolicy, StoreFailurePolicy};

/// Stampede-safe two-tier cache.
///
/// Cloning is cheap; clones share both tiers, gates and refresh tracking.
#[derive(Clone)]
pub struct StampedeSafeCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    shared: Arc<dyn SharedCacheStore>,
    locks: DistributedLockService,
    metrics: Arc<dyn ResilienceMetrics>,
    clock: Arc<dyn Clock>,
    options: CacheOptions,
    local: LocalTier,
    gates: DashMap<String, Arc<Mutex<()>>>,
    refreshing: DashSet<String>,
}

#[derive(Debug, Clone, Copy)]
enum Publication {
    Replace,
    IfAbsent,
}

struct EncodedEntry {
    encoded: String,
    ttl: Duration,
    hard_expiry_ms: i64,
    now_ms: i64,
}

#[derive(Debug, Clone, Copy)]
enum Wanted {
    Servable,
    Fresh,
}

impl Wanted {
    fn accepts(self, freshness: Freshness) -> bool {
        match self {
            Self::Servable => freshness != Freshness::Expired,
            Self::Fresh => freshness == Freshness::Fresh,
        }
    }
}

impl StampedeSafeCache {
    /// Creates a cache over a shared store and lock service.
    pub fn new(
        shared: Arc<dyn SharedCacheStore>,
        locks: DistributedLockService,
        metrics: Arc<dyn ResilienceMetrics>,
        clock: Arc<dyn Clock>,
        options: CacheOptions,
    ) -> AppResult<Self> {
        options.validate()?;

        Ok(Self {
            inner: Arc::new(CacheInner {
                shared,
                locks,
                metrics,
                clock,
                local: LocalTier::new(options.local_max_entries),
                options,
                gates: DashMap::new(),
                refreshing: DashSet::new(),
            }),
        })
    }

    /// Returns the cache tuning.
    #[must_use]
    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    /// Returns the cached value for `key`, computing it with `loader` on a
    /// miss.
    ///
    /// - Fresh entries are returned as is.
    /// - Stale entries are returned and one background refresh is started
    ///   per key; `loader` is used for that refresh or dropped.
    /// - Missing or hard-expired entries are computed by one caller per key
    ///   across the cluster while the others wait for its result.
    ///
    /// `Ok(None)` means no value could be produced in time: the lock holder
    /// did not publish within the contention wait, or the coordination store
    /// was unavailable under [`StoreFailurePolicy::FailRecompute`]. Loader
    /// errors are returned and never cached.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        policy: CacheTtlPolicy,
        loader: F,
    ) -> AppResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(LoadContext) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let cache_key = self.cache_key(key)?;

        if let Some((entry, freshness)) = self.lookup::<T>(&cache_key).await {
            if freshness == Freshness::Stale {
                self.schedule_refresh(cache_key, policy, loader);
            }
            return Ok(Some(entry.into_payload()));
        }

        let gate = self.gate(&cache_key);
        let gate_wait = self.inner.options.loader_timeout + self.inner.options.contention_wait;
        let outcome = match tokio::time::timeout(gate_wait, gate.lock()).await {
            Ok(_permit) => self.compute_on_miss(&cache_key, policy, loader).await,
            Err(_) => {
                tracing::debug!(key = %cache_key, "gave up waiting for in-process recompute");
                Ok(self
                    .lookup::<T>(&cache_key)
                    .await
                    .map(|(entry, _)| entry.into_payload()))
            }
        };

        drop(gate);
        self.inner
            .gates
            .remove_if(&cache_key, |_, gate| Arc::strong_count(gate) == 1);

        outcome
    }

    /// Removes `key` from both tiers.
    pub async fn invalidate(&self, key: &str) -> AppResult<()> {
        let cache_key = self.cache_key(key)?;
        self.inner.local.remove(&cache_key);

        bounded_store_call(
            self.inner.metrics.as_ref(),
            "cache.delete",
            self.inner.options.store_timeout,
            self.inner.shared.delete(&cache_key),
        )
        .await
    }

    async fn compute_on_miss<T, F, Fut>(
        &self,
        cache_key: &str,
        policy: CacheTtlPolicy,
        loader: F,
    ) -> AppResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(LoadContext) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        // Another caller of this instance may have finished while we waited.
        let now_ms = self.inner.clock.epoch_millis();
        if let Some((entry, _)) = self.lookup_local::<T>(cache_key, now_ms) {
            return Ok(Some(entry.into_payload()));
        }

        let options = &self.inner.options;
        match self
            .inner
            .locks
            .acquire(&lock_key(cache_key), options.lock_ttl)
            .await
        {
            Ok(Some(lease)) => self
                .load_under_lease(cache_key, lease, policy, loader, Wanted::Servable)
                .await
                .map(Some),
            Ok(None) => Ok(self.await_publication::<T>(cache_key).await),
            Err(error) => match options.store_failure_policy {
                StoreFailurePolicy::FailRecompute => {
                    tracing::warn!(
                        key = %cache_key,
                        error = %error,
                        "recompute lock unavailable, skipping recompute"
                    );
                    Ok(None)
                }
                StoreFailurePolicy::ProceedWithoutLock => {
                    tracing::warn!(
                        key = %cache_key,
                        error = %error,
                        "recompute lock unavailable, recomputing without exclusivity"
                    );
                    let payload = self
                        .run_loader(cache_key, loader, LoadContext::unguarded(cache_key))
                        .await?;
                    let entry = self.encode(cache_key, &payload, policy);
                    self.publish(cache_key, entry, Publication::IfAbsent).await;
                    Ok(Some(payload))
                }
            },
        }
    }

    async fn load_under_lease<T, F, Fut>(
        &self,
        cache_key: &str,
        lease: LockLease,
        policy: CacheTtlPolicy,
        loader: F,
        wanted: Wanted,
    ) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(LoadContext) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        // The previous holder may have published between our miss and our
        // acquisition.
        if let Some((entry, freshness)) = self.lookup::<T>(cache_key).await
            && wanted.accepts(freshness)
        {
            self.release_quietly(&lease).await;
            return Ok(entry.into_payload());
        }

        let heartbeat = self.inner.locks.start_heartbeat(&lease);
        let context = LoadContext::exclusive(cache_key, heartbeat.lost_flag());
        let loaded = self.run_loader(cache_key, loader, context).await;
        let held = heartbeat.stop().await;

        let result = match loaded {
            Ok(payload) if held => {
                let entry = self.encode(cache_key, &payload, policy);
                self.publish(cache_key, entry, Publication::Replace).await;
                Ok(payload)
            }
            Ok(payload) => match self.inner.options.lock_loss_policy {
                LockLossPolicy::Abort => {
                    tracing::warn!(key = %cache_key, "lease lost during recompute, discarding value");
                    Err(AppError::LockLost(format!(
                        "lease on '{cache_key}' was lost before the value was published"
                    )))
                }
                LockLossPolicy::PublishIfAbsent => {
                    tracing::warn!(
                        key = %cache_key,
                        "lease lost during recompute, publishing only if absent"
                    );
                    let entry = self.encode(cache_key, &payload, policy);
                    self.publish(cache_key, entry, Publication::IfAbsent).await;
                    Ok(payload)
                }
            },
            Err(error) => Err(error),
        };

        self.release_quietly(&lease).await;
        result
    }

    async fn run_loader<T, F, Fut>(
        &self,
        cache_key: &str,
        loader: F,
        context: LoadContext,
    ) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(LoadContext) -> Fut,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let timeout = self.inner.options.loader_timeout;
        let mut task = tokio::spawn(loader(context));

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => Err(AppError::Internal(format!(
                "cache loader for '{cache_key}' did not complete: {error}"
            ))),
            Err(_) => {
                task.abort();
                // Wait for the cancelled loader to be dropped so its guards
                // have run before the caller sees the timeout.
                let _ = task.await;
                Err(AppError::Timeout(format!(
                    "cache loader for '{cache_key}' exceeded {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    async fn await_publication<T>(&self, cache_key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let options = &self.inner.options;
        let deadline = tokio::time::Instant::now() + options.contention_wait;

        loop {
            if let Some((entry, _)) = self.lookup::<T>(cache_key).await {
                return Some(entry.into_payload());
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::debug!(key = %cache_key, "lock holder did not publish in time");
                return None;
            }

            tokio::time::sleep(options.contention_poll_interval.min(deadline - now)).await;
        }
    }

    fn schedule_refresh<T, F, Fut>(&self, cache_key: String, policy: CacheTtlPolicy, loader: F)
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(LoadContext) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        if !self.inner.refreshing.insert(cache_key.clone()) {
            return;
        }

        let cache = self.clone();
        tokio::spawn(async move {
            cache.refresh(&cache_key, policy, loader).await;
            cache.inner.refreshing.remove(&cache_key);
        });
    }

    async fn refresh<T, F, Fut>(&self, cache_key: &str, policy: CacheTtlPolicy, loader: F)
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(LoadContext) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let lease = match self
            .inner
            .locks
            .acquire(&lock_key(cache_key), self.inner.options.lock_ttl)
            .await
        {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tracing::debug!(key = %cache_key, "refresh already running elsewhere");
                return;
            }
            Err(error) => {
                tracing::warn!(key = %cache_key, error = %error, "skipping background refresh");
                return;
            }
        };

        match self
            .load_under_lease(cache_key, lease, policy, loader, Wanted::Fresh)
            .await
        {
            Ok(_) => tracing::debug!(key = %cache_key, "background refresh completed"),
            Err(error) => {
                tracing::warn!(key = %cache_key, error = %error, "background refresh failed");
            }
        }
    }

    async fn lookup<T>(&self, cache_key: &str) -> Option<(CacheEntry<T>, Freshness)>
    where
        T: DeserializeOwned,
    {
        let now_ms = self.inner.clock.epoch_millis();
        if let Some(found) = self.lookup_local(cache_key, now_ms) {
            return Some(found);
        }

        let encoded = match bounded_store_call(
            self.inner.metrics.as_ref(),
            "cache.get",
            self.inner.options.store_timeout,
            self.inner.shared.get(cache_key),
        )
        .await
        {
            Ok(Some(encoded)) => encoded,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(
                    key = %cache_key,
                    error = %error,
                    "shared cache read failed, treating as miss"
                );
                return None;
            }
        };

        let entry = decode_entry::<T>(cache_key, &encoded)?;
        let freshness = entry.freshness(now_ms);
        if freshness == Freshness::Expired {
            return None;
        }

        self.inner
            .local
            .insert(cache_key, encoded, entry.hard_expiry_ms(), now_ms);
        Some((entry, freshness))
    }

    fn lookup_local<T>(&self, cache_key: &str, now_ms: i64) -> Option<(CacheEntry<T>, Freshness)>
    where
        T: DeserializeOwned,
    {
        let encoded = self.inner.local.get(cache_key, now_ms)?;
        let Some(entry) = decode_entry::<T>(cache_key, &encoded) else {
            self.inner.local.remove(cache_key);
            return None;
        };

        let freshness = entry.freshness(now_ms);
        (freshness != Freshness::Expired).then_some((entry, freshness))
    }

    fn encode<T>(
        &self,
        cache_key: &str,
        payload: &T,
        policy: CacheTtlPolicy,
    ) -> Option<EncodedEntry>
    where
        T: Serialize,
    {
        let now_ms = self.inner.clock.epoch_millis();
        let jitter = policy.jitter_from_sample(jitter_sample());
        let entry = CacheEntry::new(payload, now_ms, &policy, jitter);

        match serde_json::to_string(&entry) {
            Ok(encoded) => Some(EncodedEntry {
                encoded,
                ttl: entry.remaining_hard_ttl(now_ms),
                hard_expiry_ms: entry.hard_expiry_ms(),
                now_ms,
            }),
            Err(error) => {
                tracing::warn!(key = %cache_key, error = %error, "failed to encode cache entry");
                None
            }
        }
    }

    async fn publish(
        &self,
        cache_key: &str,
        entry: Option<EncodedEntry>,
        publication: Publication,
    ) {
        let Some(entry) = entry else {
            return;
        };

        let options = &self.inner.options;
        let result = match publication {
            Publication::Replace => {
                self.inner.local.insert(
                    cache_key,
                    entry.encoded.clone(),
                    entry.hard_expiry_ms,
                    entry.now_ms,
                );
                bounded_store_call(
                    self.inner.metrics.as_ref(),
                    "cache.set",
                    options.store_timeout,
                    self.inner.shared.set(cache_key, &entry.encoded, entry.ttl),
                )
                .await
            }
            Publication::IfAbsent => {
                self.inner.local.insert_if_vacant(
                    cache_key,
                    entry.encoded.clone(),
                    entry.hard_expiry_ms,
                    entry.now_ms,
                );
                bounded_store_call(
                    self.inner.metrics.as_ref(),
                    "cache.set_if_absent",
                    options.store_timeout,
                    self.inner
                        .shared
                        .set_if_absent(cache_key, &entry.encoded, entry.ttl),
                )
                .await
                .map(|_| ())
            }
        };

        if let Err(error) = result {
            tracing::warn!(
                key = %cache_key,
                error = %error,
                "failed to publish cache entry to shared tier"
            );
        }
    }

    async fn release_quietly(&self, lease: &LockLease) {
        if let Err(error) = self.inner.locks.release(lease).await {
            tracing::warn!(key = lease.key(), error = %error, "failed to release recompute lock");
        }
    }

    fn gate(&self, cache_key: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.inner
                .gates
                .entry(cache_key.to_owned())
                .or_default()
                .value(),
        )
    }

    fn cache_key(&self, key: &str) -> AppResult<String> {
        if key.trim().is_empty() {
            return Err(AppError::ConfigInvalid(
                "cache key must not be empty".to_owned(),
            ));
        }

        Ok(format!("{}:{key}", self.inner.options.key_prefix))
    }
}

fn lock_key(cache_key: &str) -> String {
    format!("{cache_key}:lock")
}

fn decode_entry<T>(cache_key: &str, encoded: &str) -> Option<CacheEntry<T>>
where
    T: DeserializeOwned,
{
    match serde_json::from_str(encoded) {
        Ok(entry) => Some(entry),
        Err(error) => {
            tracing::warn!(key = %cache_key, error = %error, "discarding undecodable cache entry");
            None
        }
    }
}

fn jitter_sample() -> u64 {
    rand::random::<u64>()
}
