//! Application configuration with layered loading.
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: hardcoded in the struct `Default` implementations
//! 2. **Config file**: YAML file named by the `ARCHWAY_CONFIG` env var
//!    (default `config/archway.yaml`)
//! 3. **Environment variables**: `ARCHWAY_*` with `__` as the section
//!    separator (e.g. `ARCHWAY_SERVER__PORT=8080`)
//!
//! Configuration is validated at load time; invalid configurations (no
//! networks, malformed URLs, zero TTLs) fail startup with a descriptive
//! error rather than misbehaving later.
//!
//! # Example
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 3000
//! rpc:
//!   networks:
//!     mainnet:
//!       url: https://eth.example.com
//!       fallback_url: https://archive.example.com
//!       timeout: 30000
//!       retries: 3
//!       retry_delay: 1000
//! cache:
//!   max_age: 30
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind. Defaults to `0.0.0.0`.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on. Defaults to `3000`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent items processed inside one batch. Defaults to `10`.
    #[serde(default = "default_batch_concurrency_limit")]
    pub batch_concurrency_limit: usize,

    /// Maximum concurrent upstream calls per network. Defaults to `50`.
    #[serde(default = "default_queue_concurrency")]
    pub queue_concurrency: usize,

    /// How long a submission may wait for queue admission, in milliseconds.
    /// Defaults to `5000`.
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,

    /// Optional cap on queue admissions per second per network.
    #[serde(default)]
    pub queue_max_per_second: Option<u32>,

    /// Maximum accepted request body size in bytes. Defaults to 2 MiB.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Server-wide concurrent request limit. Defaults to `1024`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_batch_concurrency_limit() -> usize {
    10
}

fn default_queue_concurrency() -> usize {
    50
}

fn default_queue_timeout_ms() -> u64 {
    5_000
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_max_concurrent_requests() -> usize {
    1024
}

/// A single network's upstream pair.
///
/// `timeout` and `retry_delay` are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Primary upstream URL.
    pub url: String,

    /// Optional archive-capable fallback URL. Networks without one inherit
    /// the global `rpc.upstreams.fallback` when configured.
    #[serde(default)]
    pub fallback_url: Option<String>,

    /// Per-attempt upstream timeout in milliseconds. Defaults to `30000`.
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout: u64,

    /// Retry attempts for transport failures. Defaults to `3`.
    #[serde(default = "default_upstream_retries")]
    pub retries: u32,

    /// Base retry delay in milliseconds (exponential backoff). Defaults to `1000`.
    #[serde(default = "default_upstream_retry_delay_ms")]
    pub retry_delay: u64,

    /// Metric-only ordering hint; primary defaults to 1, fallback to 2.
    #[serde(default)]
    pub priority: Option<u32>,
}

fn default_upstream_timeout_ms() -> u64 {
    30_000
}

fn default_upstream_retries() -> u32 {
    3
}

fn default_upstream_retry_delay_ms() -> u64 {
    1_000
}

/// A standalone upstream entry inside `rpc.upstreams`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub url: String,
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout: u64,
    #[serde(default = "default_upstream_retries")]
    pub retries: u32,
    #[serde(default = "default_upstream_retry_delay_ms")]
    pub retry_delay: u64,
    #[serde(default)]
    pub priority: Option<u32>,
}

/// Global primary/fallback pair used when a network has no fallback of its
/// own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamPair {
    #[serde(default)]
    pub primary: Option<UpstreamConfig>,
    #[serde(default)]
    pub fallback: Option<UpstreamConfig>,
}

/// The `rpc` section: named networks plus the optional global pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default)]
    pub networks: HashMap<String, NetworkConfig>,

    #[serde(default)]
    pub upstreams: Option<UpstreamPair>,

    /// Which network serves the root endpoint. Defaults to the
    /// lexicographically first key when unset.
    #[serde(default)]
    pub default_network: Option<String>,
}

/// Cache store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL in seconds for time-cacheable methods. Defaults to `30`.
    #[serde(default = "default_cache_max_age")]
    pub max_age: u64,

    /// Upper bound on live cache entries. Defaults to `100_000`.
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// Accepted for config compatibility; only the in-memory store ships.
    #[serde(default)]
    pub enable_db: bool,

    /// Accepted for config compatibility; unused by the in-memory store.
    #[serde(default)]
    pub db_file: Option<String>,
}

fn default_cache_max_age() -> u64 {
    30
}

fn default_cache_max_size() -> usize {
    100_000
}

/// CORS settings applied by the server layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allowed origins; empty means any.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Security-header settings applied by the server layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelmetConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Circuit breaker tuning, shared by every network's breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens. Defaults to `5`.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Milliseconds the circuit stays open before probing. Defaults to `60000`.
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// Statistical window for the counters exposed in `/stats`, in
    /// milliseconds. Defaults to `300000`.
    #[serde(default = "default_monitoring_period_ms")]
    pub monitoring_period_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_ms() -> u64 {
    60_000
}

fn default_monitoring_period_ms() -> u64 {
    300_000
}

/// Block-number cache warmer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmerConfig {
    /// Whether the warmer task runs. Defaults to `false`; when disabled,
    /// block-tag normalization is a no-op.
    #[serde(default)]
    pub enabled: bool,

    /// Refresh interval in seconds. Defaults to `15`.
    #[serde(default = "default_warmer_interval")]
    pub interval_seconds: u64,
}

fn default_warmer_interval() -> u64 {
    15
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter. Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub helmet: HelmetConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub warmer: WarmerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            batch_concurrency_limit: default_batch_concurrency_limit(),
            queue_concurrency: default_queue_concurrency(),
            queue_timeout_ms: default_queue_timeout_ms(),
            queue_max_per_second: None,
            max_body_bytes: default_max_body_bytes(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: default_cache_max_age(),
            max_size: default_cache_max_size(),
            enable_db: false,
            db_file: None,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { enabled: true, allowed_origins: Vec::new() }
    }
}

impl Default for HelmetConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            monitoring_period_ms: default_monitoring_period_ms(),
        }
    }
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self { enabled: false, interval_seconds: default_warmer_interval() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rpc: RpcConfig::default(),
            cache: CacheConfig::default(),
            cors: CorsConfig::default(),
            helmet: HelmetConfig::default(),
            breaker: BreakerConfig::default(),
            warmer: WarmerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a YAML file with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("ARCHWAY").separator("__"))
            .build()?;

        builder.try_deserialize()
    }

    /// Loads configuration from the path named by `ARCHWAY_CONFIG`, falling
    /// back to `config/archway.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("ARCHWAY_CONFIG").unwrap_or_else(|_| "config/archway.yaml".to_string());
        Self::from_file(path)
    }

    /// Validates the configuration for correctness.
    ///
    /// # Errors
    ///
    /// Returns a descriptive message for the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.rpc.networks.is_empty() {
            return Err("no RPC networks configured".to_string());
        }

        for (key, net) in &self.rpc.networks {
            if !net.url.starts_with("http") {
                return Err(format!("invalid upstream URL for network {key}: {}", net.url));
            }
            if let Some(fallback) = &net.fallback_url {
                if !fallback.starts_with("http") {
                    return Err(format!("invalid fallback URL for network {key}: {fallback}"));
                }
            }
            if net.timeout == 0 {
                return Err(format!("upstream timeout must be nonzero for network {key}"));
            }
        }

        if let Some(default) = &self.rpc.default_network {
            if !self.rpc.networks.contains_key(default) {
                return Err(format!("default_network {default} is not a configured network"));
            }
        }

        if self.cache.max_age == 0 {
            return Err("cache.max_age must be greater than 0".to_string());
        }
        if self.cache.max_size == 0 {
            return Err("cache.max_size must be greater than 0".to_string());
        }

        if self.server.port == 0 {
            return Err("server.port must be greater than 0".to_string());
        }
        if self.server.batch_concurrency_limit == 0 {
            return Err("server.batch_concurrency_limit must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("logging.format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    #[must_use]
    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache.max_age)
    }

    #[must_use]
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.server.queue_timeout_ms)
    }

    #[must_use]
    pub fn breaker_recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.breaker.recovery_timeout_ms)
    }

    #[must_use]
    pub fn breaker_monitoring_period(&self) -> Duration {
        Duration::from_millis(self.breaker.monitoring_period_ms)
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string when host/port do not form a valid address.
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| format!("invalid socket address: {}:{}", self.server.host, self.server.port))
    }
}
