use anyhow::{Context, Result};
use archway_core::{
    cache::{BlockNumberCache, MemoryStore},
    config::AppConfig,
    metrics,
    network::NetworkRegistry,
    pipeline::{dispatcher::Dispatcher, RequestPipeline},
    stats::ProxyStats,
    upstream::UpstreamClient,
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Instant};
use tokio::{signal, sync::broadcast};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod router;
mod warmer;

use router::AppState;

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,archway_core={0},archway={0}", config.logging.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

fn build_app(state: AppState, config: &AppConfig) -> Router {
    let mut app = Router::new()
        .route("/", post(router::handle_rpc_default))
        .route("/health", get(router::handle_health))
        .route("/stats", get(router::handle_stats))
        .route("/metrics", get(router::handle_metrics))
        .route("/cache/clear", post(router::handle_cache_clear))
        .route("/:network", post(router::handle_rpc_network))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests));

    if config.cors.enabled {
        let origins = if config.cors.allowed_origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(
                config
                    .cors
                    .allowed_origins
                    .iter()
                    .filter_map(|origin| origin.parse::<HeaderValue>().ok()),
            )
        };
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        );
    }

    if config.helmet.enabled {
        app = app
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("DENY"),
            ));
    }

    app
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("configuration loading failed")?;
    config.validate().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    init_logging(&config);
    metrics::install_recorder();

    info!(
        networks = config.rpc.networks.len(),
        port = config.server.port,
        "starting archway"
    );

    let registry = Arc::new(
        NetworkRegistry::from_config(&config)
            .map_err(|e| anyhow::anyhow!("network registry: {e}"))?,
    );
    let client = Arc::new(UpstreamClient::new().context("http client initialization failed")?);
    let cache: Arc<dyn archway_core::cache::CacheStore> =
        Arc::new(MemoryStore::new(config.cache.max_size));
    let block_numbers = Arc::new(BlockNumberCache::new());
    let stats = Arc::new(ProxyStats::new());

    let pipeline = Arc::new(RequestPipeline::new(
        &config,
        Arc::clone(&registry),
        cache,
        Arc::clone(&client),
        Arc::clone(&block_numbers),
        stats,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&pipeline),
        config.server.batch_concurrency_limit,
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    if config.warmer.enabled {
        let warmer = warmer::BlockWarmer::new(
            Arc::clone(&registry),
            Arc::clone(&client),
            Arc::clone(&block_numbers),
            std::time::Duration::from_secs(config.warmer.interval_seconds),
        );
        let warmer_shutdown = shutdown_tx.subscribe();
        tokio::spawn(warmer.run(warmer_shutdown));
    }

    let state = AppState { dispatcher, pipeline, client, started: Instant::now() };
    let app = build_app(state, &config);

    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "archway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    info!("archway stopped");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(());
}
