use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::{LockToken, RateLimitPolicy};

use crate::resilience_ports::{
    BloomBitStore, Clock, LockCoordinator, ResilienceMetrics, SharedCacheStore,
    SlidingWindowStore,
};

const EPOCH_BASE_MS: i64 = 1_700_000_000_000;

pub(crate) struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    fn epoch_millis(&self) -> i64 {
        let offset = i64::try_from(self.offset.lock().as_millis()).unwrap_or(i64::MAX);
        EPOCH_BASE_MS + offset
    }
}

#[derive(Default)]
pub(crate) struct RecordingMetrics {
    rejections: Mutex<Vec<(String, String)>>,
    latencies: Mutex<Vec<String>>,
}

impl RecordingMetrics {
    pub(crate) fn rejections(&self) -> Vec<(String, String)> {
        self.rejections.lock().clone()
    }

    pub(crate) fn latency_operations(&self) -> Vec<String> {
        self.latencies.lock().clone()
    }
}

impl ResilienceMetrics for RecordingMetrics {
    fn record_rejection(&self, limit_type: &str, dimension: &str) {
        self.rejections
            .lock()
            .push((limit_type.to_owned(), dimension.to_owned()));
    }

    fn record_latency(&self, operation: &str, _elapsed: Duration) {
        self.latencies.lock().push(operation.to_owned());
    }
}

/// Single-process stand-in for the shared store; every call is atomic under
/// its own mutex. Expiry is not modelled.
#[derive(Default)]
pub(crate) struct FakeCoordinationStore {
    windows: Mutex<HashMap<String, Vec<i64>>>,
    locks: Mutex<HashMap<String, String>>,
    values: Mutex<HashMap<String, String>>,
    bits: Mutex<HashMap<String, HashSet<u64>>>,
    offline: AtomicBool,
    stalled: AtomicBool,
    window_calls: AtomicUsize,
    bit_reads: AtomicUsize,
}

impl FakeCoordinationStore {
    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub(crate) fn window_calls(&self) -> usize {
        self.window_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn bit_reads(&self) -> usize {
        self.bit_reads.load(Ordering::SeqCst)
    }

    pub(crate) fn steal_lock(&self, key: &str) {
        self.locks
            .lock()
            .insert(key.to_owned(), "intruder".to_owned());
    }

    pub(crate) fn lock_holder(&self, key: &str) -> Option<String> {
        self.locks.lock().get(key).cloned()
    }

    pub(crate) fn stored_value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub(crate) fn put_value(&self, key: &str, value: &str) {
        self.values
            .lock()
            .insert(key.to_owned(), value.to_owned());
    }

    async fn reachable(&self) -> AppResult<()> {
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("fake store offline".to_owned()));
        }

        Ok(())
    }
}

#[async_trait]
impl SlidingWindowStore for FakeCoordinationStore {
    async fn try_admit(
        &self,
        key: &str,
        permits: u32,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> AppResult<bool> {
        self.window_calls.fetch_add(1, Ordering::SeqCst);
        self.reachable().await?;

        let window_ms = i64::try_from(policy.window().as_millis()).unwrap_or(i64::MAX);
        let mut windows = self.windows.lock();
        let timestamps = windows.entry(key.to_owned()).or_default();
        timestamps.retain(|timestamp| *timestamp > now_ms - window_ms);

        let count = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
        if count.saturating_add(permits) > policy.limit() {
            return Ok(false);
        }

        timestamps.extend(std::iter::repeat_n(now_ms, permits as usize));
        Ok(true)
    }
}

#[async_trait]
impl LockCoordinator for FakeCoordinationStore {
    async fn try_acquire(&self, key: &str, token: &LockToken, _ttl: Duration) -> AppResult<bool> {
        self.reachable().await?;

        let mut locks = self.locks.lock();
        if locks.contains_key(key) {
            return Ok(false);
        }

        locks.insert(key.to_owned(), token.as_str().to_owned());
        Ok(true)
    }

    async fn renew(&self, key: &str, token: &LockToken, _ttl: Duration) -> AppResult<bool> {
        self.reachable().await?;

        Ok(self
            .locks
            .lock()
            .get(key)
            .is_some_and(|holder| holder == token.as_str()))
    }

    async fn release(&self, key: &str, token: &LockToken) -> AppResult<bool> {
        self.reachable().await?;

        let mut locks = self.locks.lock();
        if locks.get(key).is_some_and(|holder| holder == token.as_str()) {
            locks.remove(key);
            return Ok(true);
        }

        Ok(false)
    }
}

#[async_trait]
impl SharedCacheStore for FakeCoordinationStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.reachable().await?;
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl: Duration) -> AppResult<()> {
        self.reachable().await?;
        self.values
            .lock()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, _ttl: Duration) -> AppResult<bool> {
        self.reachable().await?;

        let mut values = self.values.lock();
        if values.contains_key(key) {
            return Ok(false);
        }

        values.insert(key.to_owned(), value.to_owned());
        Ok(true)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.reachable().await?;
        self.values.lock().remove(key);
        Ok(())
    }
}

#[async_trait]
impl BloomBitStore for FakeCoordinationStore {
    async fn get_bit(&self, key: &str, offset: u64) -> AppResult<bool> {
        self.bit_reads.fetch_add(1, Ordering::SeqCst);
        self.reachable().await?;

        Ok(self
            .bits
            .lock()
            .get(key)
            .is_some_and(|bits| bits.contains(&offset)))
    }

    async fn set_bits(&self, key: &str, offsets: &[u64]) -> AppResult<()> {
        self.reachable().await?;
        self.bits
            .lock()
            .entry(key.to_owned())
            .or_default()
            .extend(offsets.iter().copied());
        Ok(())
    }
}
