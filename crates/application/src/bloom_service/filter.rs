use std::sync::Arc;
use std::time::Duration;

use tradeguard_core::{AppError, AppResult, NonEmptyString};
use tradeguard_domain::BloomConfig;

use crate::resilience_ports::{BloomBitStore, ResilienceMetrics};
use crate::store_call::bounded_store_call;

/// Probabilistic pre-filter over a shared bit array.
///
/// `might_contain` never yields a false negative for a value that was added,
/// and fails open when the store cannot be read.
#[derive(Clone)]
pub struct BloomPreFilter {
    store: Arc<dyn BloomBitStore>,
    metrics: Arc<dyn ResilienceMetrics>,
    filter_key: NonEmptyString,
    config: BloomConfig,
    store_timeout: Duration,
}

impl BloomPreFilter {
    /// Creates a filter stored under `filter_key`.
    pub fn new(
        store: Arc<dyn BloomBitStore>,
        metrics: Arc<dyn ResilienceMetrics>,
        filter_key: impl Into<String>,
        config: BloomConfig,
        store_timeout: Duration,
    ) -> AppResult<Self> {
        let filter_key = NonEmptyString::new(filter_key).map_err(|_| {
            AppError::ConfigInvalid("bloom filter key must not be empty".to_owned())
        })?;

        Ok(Self {
            store,
            metrics,
            filter_key,
            config,
            store_timeout,
        })
    }

    /// Returns the filter geometry.
    #[must_use]
    pub fn config(&self) -> &BloomConfig {
        &self.config
    }

    /// Returns false only when `value` was certainly never added.
    ///
    /// Bits are read one at a time and the check stops at the first unset
    /// bit. Any store failure answers true so callers fall through to the
    /// authoritative lookup.
    pub async fn might_contain(&self, value: &str) -> bool {
        for offset in self.config.bit_offsets(value) {
            let bit = bounded_store_call(
                self.metrics.as_ref(),
                "bloom.get_bit",
                self.store_timeout,
                self.store.get_bit(self.filter_key.as_str(), offset),
            )
            .await;

            match bit {
                Ok(true) => continue,
                Ok(false) => return false,
                Err(error) => {
                    tracing::warn!(
                        filter = %self.filter_key,
                        error = %error,
                        "bloom filter unreadable, failing open"
                    );
                    return true;
                }
            }
        }

        true
    }

    /// Sets every bit for `value`.
    ///
    /// Store failures are returned; a value whose bits were not written may
    /// later be reported as absent.
    pub async fn add(&self, value: &str) -> AppResult<()> {
        let offsets: Vec<u64> = self.config.bit_offsets(value).collect();

        bounded_store_call(
            self.metrics.as_ref(),
            "bloom.set_bits",
            self.store_timeout,
            self.store.set_bits(self.filter_key.as_str(), &offsets),
        )
        .await
    }

    /// Adds every value and returns how many were written.
    pub async fn add_all<I, S>(&self, values: I) -> AppResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for value in values {
            self.add(value.as_ref()).await?;
            added += 1;
        }

        Ok(added)
    }
}
