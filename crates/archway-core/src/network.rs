//! Network and upstream descriptors.
//!
//! A network is an ordered primary/fallback upstream pair addressed by a
//! stable key. The registry is built once from configuration and is immutable
//! for the process lifetime.

use crate::config::{AppConfig, UpstreamConfig};
use std::{collections::HashMap, sync::Arc, time::Duration};

/// A single upstream RPC endpoint.
#[derive(Debug, Clone)]
pub struct UpstreamDescriptor {
    pub url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Distinguishes primary (lower) from fallback (higher) in metrics.
    pub priority: u32,
}

impl UpstreamDescriptor {
    fn from_config(cfg: &UpstreamConfig, default_priority: u32) -> Self {
        Self {
            url: cfg.url.clone(),
            timeout: Duration::from_millis(cfg.timeout),
            max_retries: cfg.retries,
            retry_delay: Duration::from_millis(cfg.retry_delay),
            priority: cfg.priority.unwrap_or(default_priority),
        }
    }
}

/// Which upstream of the pair served a call; metric label `upstream_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    Primary,
    Fallback,
}

impl UpstreamKind {
    #[must_use]
    pub fn as_label(self) -> &'static str {
        match self {
            UpstreamKind::Primary => "primary",
            UpstreamKind::Fallback => "fallback",
        }
    }
}

/// A configured network: key plus its upstream pair.
#[derive(Debug, Clone)]
pub struct Network {
    pub key: Arc<str>,
    pub primary: UpstreamDescriptor,
    pub fallback: Option<UpstreamDescriptor>,
}

/// Immutable map of network key → [`Network`], resolved at startup.
///
/// Networks without their own `fallback_url` inherit the globally configured
/// fallback upstream when one exists. The default network is the first
/// configured key (or the only one), serving requests to the root endpoint.
pub struct NetworkRegistry {
    networks: HashMap<Arc<str>, Network>,
    default_key: Arc<str>,
}

impl NetworkRegistry {
    /// Builds the registry from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when no networks are configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, String> {
        let global_fallback = config
            .rpc
            .upstreams
            .as_ref()
            .and_then(|pair| pair.fallback.as_ref())
            .map(|cfg| UpstreamDescriptor::from_config(cfg, 2));

        let mut networks = HashMap::new();

        for (key, net_cfg) in &config.rpc.networks {
            let key: Arc<str> = Arc::from(key.as_str());

            let primary = UpstreamDescriptor {
                url: net_cfg.url.clone(),
                timeout: Duration::from_millis(net_cfg.timeout),
                max_retries: net_cfg.retries,
                retry_delay: Duration::from_millis(net_cfg.retry_delay),
                priority: net_cfg.priority.unwrap_or(1),
            };

            let fallback = net_cfg
                .fallback_url
                .as_ref()
                .map(|url| UpstreamDescriptor {
                    url: url.clone(),
                    timeout: Duration::from_millis(net_cfg.timeout),
                    max_retries: net_cfg.retries,
                    retry_delay: Duration::from_millis(net_cfg.retry_delay),
                    priority: net_cfg.priority.map_or(2, |p| p + 1),
                })
                .or_else(|| global_fallback.clone());

            networks.insert(
                Arc::clone(&key),
                Network { key, primary, fallback },
            );
        }

        // Serving the root endpoint: an explicitly configured default, else
        // the lexicographically first key for determinism.
        let default_key = config
            .rpc
            .default_network
            .as_deref()
            .map(Arc::from)
            .or_else(|| {
                let mut keys: Vec<&Arc<str>> = networks.keys().collect();
                keys.sort_unstable();
                keys.first().map(|k| Arc::clone(k))
            })
            .ok_or_else(|| "no networks configured".to_string())?;

        if !networks.contains_key(&default_key) {
            return Err(format!("default network {default_key} is not configured"));
        }

        Ok(Self { networks, default_key })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Network> {
        self.networks.get(key)
    }

    #[must_use]
    pub fn default_network(&self) -> &Network {
        // default_key always names a registry entry; from_config inserts it
        self.networks
            .get(&self.default_key)
            .unwrap_or_else(|| unreachable!("default network missing from registry"))
    }

    #[must_use]
    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    pub fn keys(&self) -> impl Iterator<Item = &Arc<str>> {
        self.networks.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
