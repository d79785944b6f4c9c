use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watch_hub::{
    api::{build_router, AppState},
    config::Config,
    hub::{heartbeat_task, HttpWatchSource, Hub},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using embedded defaults");
        default_config()
    });

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.observability.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting watch-hub v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Upstream watch API: {}", config.upstream.api_base);

    // Construct the hub once; it is injected into request handling and
    // shut down on termination.
    let source = Arc::new(HttpWatchSource::new(config.upstream.api_base.clone()));
    let hub = Hub::new(config.hub.clone(), source);
    tracing::info!("Hub initialized");

    // Spawn the heartbeat/prune task
    let heartbeat_hub = hub.clone();
    tokio::spawn(async move {
        heartbeat_task(heartbeat_hub).await;
    });
    tracing::info!("Heartbeat task started");

    // Build HTTP router
    let app = build_router(AppState::new(hub.clone()));

    // Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("HTTP server listening on http://{}", addr);
    tracing::info!("   Health check: http://{}/health", addr);
    tracing::info!("   Stats: http://{}/v1/stats", addr);
    tracing::info!("   Metrics: http://{}/metrics", addr);
    tracing::info!("   Push channel: ws://{}/ws", addr);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = server => {
            tracing::warn!("HTTP server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shutting down gracefully...");
    hub.shutdown();
    Ok(())
}

fn default_config() -> Config {
    use watch_hub::config::*;
    use watch_hub::hub::HubConfig;

    Config {
        server: ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        },
        upstream: UpstreamConfig {
            api_base: "https://127.0.0.1:6443".to_string(),
        },
        observability: ObservabilityConfig {
            log_filter: "watch_hub=info,tower_http=info".to_string(),
        },
        hub: HubConfig::default(),
    }
}
