use std::sync::Arc;

use crate::cache::SegmentCache;
use crate::events::EventRecorder;
use crate::origin::OriginClient;
use crate::rewrite::ManifestRewriter;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub rewriter: Arc<ManifestRewriter>,
    pub cache: SegmentCache,
    pub origin: Arc<dyn OriginClient>,
    pub events: EventRecorder,
}

impl AppState {
    /// Build handler state for a proxy bound to `port`.
    ///
    /// The port must be the one the listener actually bound, not the
    /// configured one, so rewritten URIs resolve when the OS picked the
    /// port.
    pub fn new(
        port: u16,
        cache: SegmentCache,
        origin: Arc<dyn OriginClient>,
        events: EventRecorder,
    ) -> Self {
        Self {
            rewriter: Arc::new(ManifestRewriter::new(port)),
            cache,
            origin,
            events,
        }
    }
}
