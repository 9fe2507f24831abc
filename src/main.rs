use std::sync::Arc;

use tracing::{error, info};

use hlscache::{EventRecorder, HttpOriginClient, ProxyConfig, ProxyServer, SegmentCache};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ProxyConfig::from_env();
    info!(
        "Starting hlscache: port {}, cache dir {:?}, capacity {} bytes",
        config.port, config.cache_dir, config.cache_capacity_bytes
    );

    let cache = match SegmentCache::open(&config.cache_dir, config.cache_capacity_bytes).await {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to open segment cache at {:?}: {}", config.cache_dir, e);
            std::process::exit(1);
        }
    };

    let server = ProxyServer::new(
        config,
        cache,
        Arc::new(HttpOriginClient::new()),
        EventRecorder::new(),
    );

    if let Err(e) = server.start().await {
        error!("Failed to start proxy: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down");
    server.stop().await;
}
