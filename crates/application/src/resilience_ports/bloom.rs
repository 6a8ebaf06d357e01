use async_trait::async_trait;
use tradeguard_core::AppResult;

/// Shared bit array backing a bloom filter.
#[async_trait]
pub trait BloomBitStore: Send + Sync {
    /// Reads one bit; unset bits and missing keys read as false.
    async fn get_bit(&self, key: &str, offset: u64) -> AppResult<bool>;

    /// Sets every listed bit.
    async fn set_bits(&self, key: &str, offsets: &[u64]) -> AppResult<()>;
}
