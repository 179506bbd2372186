//! Block-number cache warmer.
//!
//! Background task refreshing each network's cached chain tip via
//! `eth_blockNumber` against the primary upstream. The pipeline only reads
//! the block-number cache; this task is its sole writer, keeping the
//! `eth_call` "latest" rewrite inside its 30-second consistency window.

use archway_core::{
    cache::BlockNumberCache,
    network::NetworkRegistry,
    types::JsonRpcRequest,
    upstream::UpstreamClient,
    utils::block_param,
};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;

pub struct BlockWarmer {
    registry: Arc<NetworkRegistry>,
    client: Arc<UpstreamClient>,
    block_numbers: Arc<BlockNumberCache>,
    interval: Duration,
}

impl BlockWarmer {
    #[must_use]
    pub fn new(
        registry: Arc<NetworkRegistry>,
        client: Arc<UpstreamClient>,
        block_numbers: Arc<BlockNumberCache>,
        interval: Duration,
    ) -> Self {
        Self { registry, client, block_numbers, interval }
    }

    /// Runs until the shutdown channel fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "block warmer started");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_all().await,
                _ = shutdown.recv() => {
                    tracing::info!("block warmer stopping");
                    return;
                }
            }
        }
    }

    async fn refresh_all(&self) {
        for network in self.registry.iter() {
            let request = JsonRpcRequest::new("eth_blockNumber", None, json!(1));
            match self.client.call(&network.primary, &request).await {
                Ok(reply) => {
                    let block = reply
                        .response
                        .result
                        .as_ref()
                        .and_then(serde_json::Value::as_str)
                        .and_then(block_param::parse_hex);

                    if let Some(block) = block {
                        self.block_numbers.record(&network.key, block);
                        tracing::debug!(network = %network.key, block, "chain tip refreshed");
                    } else {
                        tracing::warn!(network = %network.key, "malformed eth_blockNumber result");
                    }
                }
                Err(e) => {
                    tracing::warn!(network = %network.key, error = %e, "chain tip refresh failed");
                }
            }
        }
    }
}
