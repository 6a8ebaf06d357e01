//! Tradeguard probe: wires the resilience core from the environment and
//! drives guarded reads against a simulated quote feed.

#![forbid(unsafe_code)]

mod probe_config;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tradeguard_application::{
    CoordinationPorts, GuardedRead, LoadContext, ReadOutcome, ResilienceCore, SystemClock,
};
use tradeguard_core::{AppError, AppResult};
use tradeguard_infrastructure::{
    InMemoryCoordinationStore, RedisBloomBitStore, RedisLockCoordinator, RedisSharedCacheStore,
    RedisSlidingWindowStore, TracingMetricsSink, connect_redis,
};

use crate::probe_config::ProbeConfig;

const QUOTE_FEED: &str = "quote-feed";
const FEED_FAILURE_EVERY: u64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Quote {
    symbol: String,
    price_cents: u64,
    sequence: u64,
}

/// Stand-in upstream that fails on a fixed cadence so breakers trip.
#[derive(Debug, Default)]
struct SimulatedQuoteFeed {
    calls: AtomicU64,
}

impl SimulatedQuoteFeed {
    async fn fetch(&self, symbol: &str, context: &LoadContext) -> AppResult<Quote> {
        let sequence = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if sequence.is_multiple_of(FEED_FAILURE_EVERY) {
            return Err(AppError::Internal(format!(
                "quote feed failed for {symbol} on call {sequence}"
            )));
        }

        context.ensure_lease_held()?;
        let checksum = symbol.bytes().map(u64::from).sum::<u64>();

        Ok(Quote {
            symbol: symbol.to_owned(),
            price_cents: 10_000 + (checksum * 37 + sequence) % 5_000,
            sequence,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ProbeConfig::load()?;
    let metrics = Arc::new(TracingMetricsSink::new());
    let ports = build_ports(&config, metrics.clone()).await?;
    let core = ResilienceCore::new(ports, config.settings.clone())?;

    if let Some(bloom) = core.bloom() {
        let seeded = bloom.add_all(&config.known_keys).await?;
        info!(seeded, "seeded bloom pre-filter with known symbols");
    }

    info!(
        backend = if config.redis_url.is_some() { "redis" } else { "in_memory" },
        key_prefix = %config.key_prefix,
        known_keys = config.known_keys.len(),
        interval_ms = u64::try_from(config.interval.as_millis()).unwrap_or(u64::MAX),
        "tradeguard-probe started"
    );

    let feed = Arc::new(SimulatedQuoteFeed::default());
    let mut candidates = config.known_keys.clone();
    candidates.push("UNLISTED".to_owned());
    let mut tick = 0_usize;

    loop {
        let Some(symbol) = candidates.get(tick % candidates.len()).cloned() else {
            break Ok(());
        };
        tick = tick.wrapping_add(1);

        let cache_key = format!("quotes:{symbol}");
        let request = GuardedRead::new(cache_key.as_str(), QUOTE_FEED, config.cache_ttl)
            .with_bloom_value(symbol.as_str())
            .for_user("probe")
            .in_category("quotes");

        let loader_feed = feed.clone();
        let loader_symbol = symbol.clone();
        let outcome = core
            .guarded_read(request, move |context: LoadContext| async move {
                loader_feed.fetch(&loader_symbol, &context).await
            })
            .await;

        match outcome {
            Ok(ReadOutcome::Served(quote)) => {
                info!(
                    symbol = %quote.symbol,
                    price_cents = quote.price_cents,
                    sequence = quote.sequence,
                    "quote served"
                );
            }
            Ok(ReadOutcome::KnownAbsent) => {
                info!(symbol = %symbol, "symbol rejected by bloom pre-filter");
            }
            Ok(ReadOutcome::Rejected(reason)) => {
                let reason = serde_json::to_string(&reason)
                    .unwrap_or_else(|_| "<unserializable>".to_owned());
                warn!(symbol = %symbol, reason = %reason, "read rejected");
            }
            Ok(ReadOutcome::Unavailable) => {
                warn!(symbol = %symbol, "quote unavailable");
            }
            Err(error) => {
                warn!(symbol = %symbol, error = %error, "guarded read failed");
            }
        }

        if tick % candidates.len() == 0 {
            for snapshot in core.breakers().snapshots() {
                info!(
                    breaker = %snapshot.name,
                    state = snapshot.state.as_str(),
                    consecutive_failures = snapshot.consecutive_failures,
                    "circuit breaker status"
                );
            }

            for (limit_type, dimension, total) in metrics.rejection_counts() {
                info!(limit_type = %limit_type, dimension = %dimension, total, "rejection totals");
            }
        }

        tokio::time::sleep(config.interval).await;
    }
}

async fn build_ports(
    config: &ProbeConfig,
    metrics: Arc<TracingMetricsSink>,
) -> AppResult<CoordinationPorts> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        warn!("REDIS_URL is not set; coordination state is local to this process");
        let store = Arc::new(InMemoryCoordinationStore::new());
        return Ok(CoordinationPorts {
            sliding_windows: store.clone(),
            locks: store.clone(),
            shared_cache: store.clone(),
            bloom_bits: store,
            metrics,
            clock: Arc::new(SystemClock),
        });
    };

    let connection = connect_redis(redis_url).await?;
    let prefix = config.key_prefix.as_str();

    Ok(CoordinationPorts {
        sliding_windows: Arc::new(RedisSlidingWindowStore::new(connection.clone(), prefix)),
        locks: Arc::new(RedisLockCoordinator::new(connection.clone(), prefix)),
        shared_cache: Arc::new(RedisSharedCacheStore::new(connection.clone(), prefix)),
        bloom_bits: Arc::new(RedisBloomBitStore::new(connection, prefix)),
        metrics,
        clock: Arc::new(SystemClock),
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
