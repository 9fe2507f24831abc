pub mod handlers;
pub mod state;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::SegmentCache;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::events::EventRecorder;
use crate::origin::OriginClient;
use state::AppState;

/// Path extensions dispatched to the segment handler.
const SEGMENT_EXTENSIONS: [&str; 5] = ["ts", "mp4", "m4s", "m4a", "m4v"];

/// Build the proxy router around shared handler state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/{*path}", get(dispatch))
        .fallback(fallback_bad_request)
        .with_state(state)
}

/// Route a request by the extension of its path.
///
/// `.m3u8` goes to the manifest handler, known segment extensions go to
/// the segment handler, anything else is rejected before any origin
/// traffic.
async fn dispatch(
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Response> {
    match path_extension(&path).as_deref() {
        Some("m3u8") => handlers::manifest::serve_manifest(Query(params), State(state)).await,
        Some(ext) if SEGMENT_EXTENSIONS.contains(&ext) => {
            handlers::segment::serve_segment(Query(params), State(state)).await
        }
        _ => Err(ProxyError::MalformedRequest(format!(
            "unsupported resource path: /{path}"
        ))),
    }
}

/// Extension of the last path component, lowercased.
fn path_extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Requests the wildcard route does not match, like `/`.
async fn fallback_bad_request() -> ProxyError {
    ProxyError::MalformedRequest("unsupported resource path".to_string())
}

/// Handle to a started listener.
struct RunningServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// The proxy server.
///
/// Owns the cache, the origin client and the event recorder, and manages
/// the lifecycle of the loopback listener. `start` and `stop` are
/// idempotent, so an embedding player can call them on every playback
/// transition without tracking state itself.
pub struct ProxyServer {
    config: ProxyConfig,
    cache: SegmentCache,
    origin: Arc<dyn OriginClient>,
    events: EventRecorder,
    running: tokio::sync::Mutex<Option<RunningServer>>,
}

impl ProxyServer {
    pub fn new(
        config: ProxyConfig,
        cache: SegmentCache,
        origin: Arc<dyn OriginClient>,
        events: EventRecorder,
    ) -> Self {
        Self {
            config,
            cache,
            origin,
            events,
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Start listening on the configured loopback port and return the
    /// bound address.
    ///
    /// With port `0` the OS picks a free port; the returned address says
    /// which. Calling `start` while already running returns the existing
    /// address without binding again.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(server) = running.as_ref() {
            debug!("Proxy already running on {}", server.addr);
            return Ok(server.addr);
        }

        let listener = TcpListener::bind(("127.0.0.1", self.config.port)).await?;
        let addr = listener.local_addr()?;

        // State is built after bind so rewritten URIs carry the port the
        // listener actually got.
        let state = AppState::new(
            addr.port(),
            self.cache.clone(),
            self.origin.clone(),
            self.events.clone(),
        );
        let app = build_router(state);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await });
            if let Err(e) = serve.await {
                error!("Proxy server error: {}", e);
            }
        });

        info!("Proxy listening on http://{}", addr);
        *running = Some(RunningServer {
            addr,
            shutdown,
            task,
        });
        Ok(addr)
    }

    /// Stop the listener and wait for in-flight requests to drain.
    ///
    /// Stopping a server that is not running does nothing. The cache
    /// stays on disk; a later `start` serves from it again.
    pub async fn stop(&self) {
        let server = { self.running.lock().await.take() };
        let Some(server) = server else {
            debug!("Proxy not running, nothing to stop");
            return;
        };

        server.shutdown.cancel();
        if let Err(e) = server.task.await {
            error!("Proxy server task failed: {}", e);
        }
        info!("Proxy stopped on {}", server.addr);
    }

    /// Bound address, if the server is running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|s| s.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_of_last_component() {
        assert_eq!(
            path_extension("vod/asset/seg-001.ts").as_deref(),
            Some("ts")
        );
        assert_eq!(path_extension("media.m3u8").as_deref(), Some("m3u8"));
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(path_extension("SEG.TS").as_deref(), Some("ts"));
        assert_eq!(path_extension("Master.M3U8").as_deref(), Some("m3u8"));
    }

    #[test]
    fn dots_in_directories_do_not_count() {
        assert_eq!(path_extension("v1.2/seg"), None);
        assert_eq!(path_extension("v1.2/init.mp4").as_deref(), Some("mp4"));
    }

    #[test]
    fn missing_or_empty_extension() {
        assert_eq!(path_extension("playlist"), None);
        assert_eq!(path_extension("trailing."), None);
        assert_eq!(path_extension(""), None);
    }
}
