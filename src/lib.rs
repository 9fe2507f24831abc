//! HLS playback acceleration proxy.
//!
//! A loopback HTTP server that sits between a player and an HLS origin.
//! Manifest requests are fetched fresh on every request and every URI in
//! them is rewritten to route back through the proxy, with the original
//! URL carried in the `__hls_origin_url` query parameter. Segment
//! requests are served from a disk-backed, capacity-bounded cache; misses
//! are fetched from the origin, returned to the player immediately and
//! written to the cache off the request path.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hlscache::{
//!     EventRecorder, HttpOriginClient, ProxyConfig, ProxyServer, SegmentCache,
//! };
//!
//! # async fn run() -> hlscache::Result<()> {
//! let config = ProxyConfig::default();
//! let cache = SegmentCache::open(&config.cache_dir, config.cache_capacity_bytes).await?;
//! let server = ProxyServer::new(
//!     config,
//!     cache,
//!     Arc::new(HttpOriginClient::new()),
//!     EventRecorder::new(),
//! );
//! let addr = server.start().await?;
//! // Point the player at http://{addr}/<name>.m3u8?__hls_origin_url=<origin URL>
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod origin;
pub mod rewrite;
pub mod server;

pub use cache::{CacheKey, SegmentCache};
pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use events::{EventRecorder, ProxyEvent};
pub use origin::{HttpOriginClient, OriginClient, OriginResponse};
pub use rewrite::{ManifestRewriter, ORIGIN_URL_PARAM};
pub use server::ProxyServer;
