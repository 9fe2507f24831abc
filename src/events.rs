//! Diagnostic event stream.
//!
//! Handlers report what happened to each request (manifest or segment seen,
//! cache hit/miss, segment persisted) as [`ProxyEvent`]s. The recorder fans
//! them out on a broadcast channel for whatever the embedding application
//! wants to do with them and mirrors each one into the tracing log. Purely
//! observational: recording never blocks, never fails, and has no effect on
//! how the request is served.

use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::CacheKey;

/// Buffered events per subscriber before old ones are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Observable milestones in the life of a proxy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    /// A manifest request reached the manifest handler.
    ManifestRequestReceived,
    /// A segment request reached the segment handler.
    SegmentRequestReceived,
    /// The requested segment was served from the cache.
    SegmentCacheHit { key: CacheKey },
    /// The requested segment was not cached and will be fetched from origin.
    SegmentCacheMiss { key: CacheKey },
    /// A fetched segment finished persisting to the cache.
    SegmentCacheStored {
        key: CacheKey,
        /// Total cache disk usage after the store, in bytes.
        disk_usage: u64,
        /// Size of the stored segment, in bytes.
        segment_size: u64,
    },
}

/// Fan-out recorder for [`ProxyEvent`]s.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    tx: broadcast::Sender<ProxyEvent>,
}

impl EventRecorder {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Record an event. Never blocks; with no subscribers the event is
    /// dropped after logging.
    pub fn record(&self, event: ProxyEvent) {
        debug!("proxy event: {:?}", event);
        let _ = self.tx.send(event);
    }

    /// Subscribe to events recorded from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}
