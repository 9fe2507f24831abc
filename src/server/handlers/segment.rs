use std::collections::HashMap;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::cache::CacheKey;
use crate::error::Result;
use crate::events::ProxyEvent;
use crate::metrics;
use crate::server::state::AppState;

/// Content type for segments when neither the cache nor the origin says.
const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";

/// Serve a segment request.
///
/// Cache hits are answered straight from disk. On a miss the segment is
/// fetched from the origin, returned to the player immediately, and
/// written to the cache off the request path.
pub async fn serve_segment(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Response> {
    let start = Instant::now();
    state.events.record(ProxyEvent::SegmentRequestReceived);

    let origin_url = super::origin_url_from_query(&params)?;
    let key = CacheKey::from_origin(&origin_url);

    if let Some(segment) = state.cache.lookup(&key).await {
        debug!("Cache hit for {}", key);
        state.events.record(ProxyEvent::SegmentCacheHit { key });
        metrics::record_cache_hit();
        metrics::record_request("segment", 200);
        metrics::record_duration("segment", start);

        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, segment.content_type)],
            Body::from(segment.bytes),
        )
            .into_response());
    }

    debug!("Cache miss for {}, fetching {}", key, origin_url);
    state
        .events
        .record(ProxyEvent::SegmentCacheMiss { key: key.clone() });
    metrics::record_cache_miss();

    let response = match state
        .origin
        .fetch(&origin_url)
        .await
        .and_then(|r| r.ensure_success())
    {
        Ok(response) => response,
        Err(e) => {
            metrics::record_origin_error();
            metrics::record_request("segment", e.status_code().as_u16());
            metrics::record_duration("segment", start);
            return Err(e);
        }
    };

    let content_type = response
        .content_type
        .clone()
        .unwrap_or_else(|| SEGMENT_CONTENT_TYPE.to_string());

    // Store off the request path; the player gets its bytes without
    // waiting on disk.
    let segment_size = response.body.len() as u64;
    let cache = state.cache.clone();
    let events = state.events.clone();
    let body = response.body.clone();
    let stored_content_type = content_type.clone();
    tokio::spawn(async move {
        match cache.store(&key, body, &stored_content_type).await {
            Ok(Some(disk_usage)) => {
                metrics::record_cache_stored(segment_size);
                events.record(ProxyEvent::SegmentCacheStored {
                    key,
                    disk_usage,
                    segment_size,
                });
            }
            // Refused: the segment is larger than the whole cache capacity
            Ok(None) => metrics::record_cache_store_failed(),
            Err(e) => {
                warn!("Failed to cache segment {}: {}", key, e);
                metrics::record_cache_store_failed();
            }
        }
    });

    metrics::record_request("segment", 200);
    metrics::record_duration("segment", start);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(response.body),
    )
        .into_response())
}
