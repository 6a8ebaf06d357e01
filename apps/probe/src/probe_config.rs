use std::env;
use std::time::Duration;

use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::{
    BloomConfig, CacheTtlPolicy, CircuitBreakerConfig, RateLimitPolicy, RateLimitScope,
};

use tradeguard_application::{
    BloomSettings, CacheOptions, RateLimitRules, ResilienceSettings,
};

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub settings: ResilienceSettings,
    pub cache_ttl: CacheTtlPolicy,
    pub known_keys: Vec<String>,
    pub interval: Duration,
}

impl ProbeConfig {
    pub fn load() -> AppResult<Self> {
        let redis_url = env::var("REDIS_URL")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let key_prefix = env::var("TRADEGUARD_KEY_PREFIX")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "tradeguard".to_owned());

        let store_timeout_ms = positive("STORE_TIMEOUT_MS", parse_env_u64("STORE_TIMEOUT_MS", 150)?)?;
        let window_ms = positive("RATE_LIMIT_WINDOW_MS", parse_env_u64("RATE_LIMIT_WINDOW_MS", 60_000)?)?;
        let window = Duration::from_millis(window_ms);

        let mut rate_limit_rules = RateLimitRules::default();
        for (scope, name, default) in [
            (RateLimitScope::Global, "RATE_LIMIT_GLOBAL_LIMIT", 1_000),
            (RateLimitScope::User, "RATE_LIMIT_USER_LIMIT", 100),
            (RateLimitScope::Category, "RATE_LIMIT_CATEGORY_LIMIT", 300),
        ] {
            let limit = positive(name, parse_env_u32(name, default)?)?;
            rate_limit_rules.set_rule(scope, Some(RateLimitPolicy::new(limit, window)?));
        }

        let breaker_defaults = CircuitBreakerConfig::new(
            positive(
                "BREAKER_FAILURE_THRESHOLD",
                parse_env_u32("BREAKER_FAILURE_THRESHOLD", 5)?,
            )?,
            Duration::from_millis(positive(
                "BREAKER_OPEN_MS",
                parse_env_u64("BREAKER_OPEN_MS", 30_000)?,
            )?),
            positive(
                "BREAKER_HALF_OPEN_SUCCESSES",
                parse_env_u32("BREAKER_HALF_OPEN_SUCCESSES", 3)?,
            )?,
        )?;

        let cache_ttl = CacheTtlPolicy::new(
            Duration::from_secs(positive(
                "CACHE_SOFT_TTL_SECONDS",
                parse_env_u64("CACHE_SOFT_TTL_SECONDS", 10)?,
            )?),
            Duration::from_secs(positive(
                "CACHE_HARD_TTL_SECONDS",
                parse_env_u64("CACHE_HARD_TTL_SECONDS", 60)?,
            )?),
            Duration::from_secs(parse_env_u64("CACHE_JITTER_SECONDS", 5)?),
        )?;

        let bloom_config = BloomConfig::for_capacity(
            positive(
                "BLOOM_EXPECTED_ITEMS",
                parse_env_u64("BLOOM_EXPECTED_ITEMS", 100_000)?,
            )?,
            parse_env_f64("BLOOM_FALSE_POSITIVE_RATE", 0.01)?,
        )?;

        let cache = cache_options(
            Duration::from_millis(positive(
                "LOCK_TTL_MS",
                parse_env_u64("LOCK_TTL_MS", 10_000)?,
            )?),
            Duration::from_millis(store_timeout_ms),
        );

        let known_keys: Vec<String> = env::var("PROBE_KNOWN_KEYS")
            .unwrap_or_else(|_| "600519,000001,300750".to_owned())
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
            .collect();
        if known_keys.is_empty() {
            return Err(AppError::ConfigInvalid(
                "PROBE_KNOWN_KEYS must name at least one key".to_owned(),
            ));
        }

        let interval_ms = positive("PROBE_INTERVAL_MS", parse_env_u64("PROBE_INTERVAL_MS", 1_000)?)?;

        Ok(Self {
            redis_url,
            settings: ResilienceSettings {
                store_timeout: Duration::from_millis(store_timeout_ms),
                rate_limit_rules,
                breaker_defaults,
                cache,
                bloom: Some(bloom_settings(bloom_config)),
                ..ResilienceSettings::default()
            },
            key_prefix,
            cache_ttl,
            known_keys,
            interval: Duration::from_millis(interval_ms),
        })
    }
}

// Store adapters namespace every key with the deployment prefix, so the
// keys handed to the core stay unprefixed.
const CACHE_NAMESPACE: &str = "cache";
const BLOOM_FILTER_KEY: &str = "bloom:symbols";

fn cache_options(lock_ttl: Duration, store_timeout: Duration) -> CacheOptions {
    CacheOptions {
        key_prefix: CACHE_NAMESPACE.to_owned(),
        lock_ttl,
        store_timeout,
        ..CacheOptions::default()
    }
}

fn bloom_settings(config: BloomConfig) -> BloomSettings {
    BloomSettings {
        filter_key: BLOOM_FILTER_KEY.to_owned(),
        config,
    }
}

fn positive<T>(name: &str, value: T) -> AppResult<T>
where
    T: PartialOrd + Default,
{
    if value <= T::default() {
        return Err(AppError::ConfigInvalid(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(value)
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::ConfigInvalid(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::ConfigInvalid(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_f64(name: &str, default: f64) -> AppResult<f64> {
    match env::var(name) {
        Ok(value) => value.parse::<f64>().map_err(|error| {
            AppError::ConfigInvalid(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
