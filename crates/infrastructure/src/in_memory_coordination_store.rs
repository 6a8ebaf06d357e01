//! Single-process coordination store.
//!
//! Implements every coordination port against local maps so the resilience
//! core can run without Redis. State is not shared with other instances.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tradeguard_application::{BloomBitStore, LockCoordinator, SharedCacheStore, SlidingWindowStore};
use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::{LockToken, RateLimitPolicy};

#[derive(Debug)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            expires_at: now.checked_add(ttl).unwrap_or(now),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at > Instant::now()
    }

    fn extend(&mut self, ttl: Duration) {
        let now = Instant::now();
        self.expires_at = now.checked_add(ttl).unwrap_or(now);
    }
}

/// Expired windows, locks and values are swept from their map once every
/// this many writes to it.
const SWEEP_EVERY_WRITES: usize = 256;

fn sweep_if_due<T>(writes: &AtomicUsize, entries: &mut HashMap<String, Expiring<T>>) {
    if writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY_WRITES == SWEEP_EVERY_WRITES - 1 {
        entries.retain(|_, entry| entry.is_live());
    }
}

/// In-memory implementation of all coordination ports.
#[derive(Debug)]
pub struct InMemoryCoordinationStore {
    windows: RwLock<HashMap<String, Expiring<BTreeMap<i64, u32>>>>,
    locks: RwLock<HashMap<String, Expiring<String>>>,
    values: RwLock<HashMap<String, Expiring<String>>>,
    bits: RwLock<HashMap<String, HashSet<u64>>>,
    window_writes: AtomicUsize,
    lock_writes: AtomicUsize,
    value_writes: AtomicUsize,
    available: AtomicBool,
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self {
            windows: RwLock::default(),
            locks: RwLock::default(),
            values: RwLock::default(),
            bits: RwLock::default(),
            window_writes: AtomicUsize::new(0),
            lock_writes: AtomicUsize::new(0),
            value_writes: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryCoordinationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage; every call fails with `StoreUnavailable` while
    /// unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> (usize, usize, usize) {
        (
            self.windows.read().await.len(),
            self.locks.read().await.len(),
            self.values.read().await.len(),
        )
    }

    fn ensure_available(&self) -> AppResult<()> {
        if self.available.load(Ordering::SeqCst) {
            return Ok(());
        }

        Err(AppError::StoreUnavailable(
            "in-memory coordination store is marked unavailable".to_owned(),
        ))
    }
}

#[async_trait]
impl SlidingWindowStore for InMemoryCoordinationStore {
    async fn try_admit(
        &self,
        key: &str,
        permits: u32,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> AppResult<bool> {
        self.ensure_available()?;

        let window_ms = i64::try_from(policy.window().as_millis()).unwrap_or(i64::MAX);
        let mut windows = self.windows.write().await;
        sweep_if_due(&self.window_writes, &mut windows);
        let window = windows
            .entry(key.to_owned())
            .and_modify(|window| {
                if !window.is_live() {
                    window.value.clear();
                }
            })
            .or_insert_with(|| Expiring::new(BTreeMap::new(), policy.store_expiry()));

        let cutoff = now_ms.saturating_sub(window_ms);
        window.value.retain(|timestamp, _| *timestamp > cutoff);

        let count: u32 = window.value.values().sum();
        if count.saturating_add(permits) > policy.limit() {
            return Ok(false);
        }

        *window.value.entry(now_ms).or_default() += permits;
        window.extend(policy.store_expiry());
        Ok(true)
    }
}

#[async_trait]
impl LockCoordinator for InMemoryCoordinationStore {
    async fn try_acquire(&self, key: &str, token: &LockToken, ttl: Duration) -> AppResult<bool> {
        self.ensure_available()?;

        let mut locks = self.locks.write().await;
        sweep_if_due(&self.lock_writes, &mut locks);
        if locks.get(key).is_some_and(Expiring::is_live) {
            return Ok(false);
        }

        locks.insert(
            key.to_owned(),
            Expiring::new(token.as_str().to_owned(), ttl),
        );
        Ok(true)
    }

    async fn renew(&self, key: &str, token: &LockToken, ttl: Duration) -> AppResult<bool> {
        self.ensure_available()?;

        let mut locks = self.locks.write().await;
        match locks.get_mut(key) {
            Some(lock) if lock.is_live() && lock.value == token.as_str() => {
                lock.extend(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, token: &LockToken) -> AppResult<bool> {
        self.ensure_available()?;

        let mut locks = self.locks.write().await;
        if locks
            .get(key)
            .is_some_and(|lock| lock.is_live() && lock.value == token.as_str())
        {
            locks.remove(key);
            return Ok(true);
        }

        Ok(false)
    }
}

#[async_trait]
impl SharedCacheStore for InMemoryCoordinationStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.ensure_available()?;

        {
            let values = self.values.read().await;
            match values.get(key) {
                Some(entry) if entry.is_live() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut values = self.values.write().await;
        if values.get(key).is_some_and(|entry| !entry.is_live()) {
            values.remove(key);
        }

        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.ensure_available()?;

        let mut values = self.values.write().await;
        sweep_if_due(&self.value_writes, &mut values);
        values.insert(key.to_owned(), Expiring::new(value.to_owned(), ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        self.ensure_available()?;

        let mut values = self.values.write().await;
        sweep_if_due(&self.value_writes, &mut values);
        if values.get(key).is_some_and(Expiring::is_live) {
            return Ok(false);
        }

        values.insert(key.to_owned(), Expiring::new(value.to_owned(), ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.ensure_available()?;

        self.values.write().await.remove(key);
        Ok(())
    }
}

#[async_trait]
impl BloomBitStore for InMemoryCoordinationStore {
    async fn get_bit(&self, key: &str, offset: u64) -> AppResult<bool> {
        self.ensure_available()?;

        Ok(self
            .bits
            .read()
            .await
            .get(key)
            .is_some_and(|bits| bits.contains(&offset)))
    }

    async fn set_bits(&self, key: &str, offsets: &[u64]) -> AppResult<()> {
        self.ensure_available()?;

        self.bits
            .write()
            .await
            .entry(key.to_owned())
            .or_default()
            .extend(offsets.iter().copied());
        Ok(())
    }
}
