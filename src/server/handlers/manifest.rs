use std::collections::HashMap;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::info;

use crate::error::Result;
use crate::events::ProxyEvent;
use crate::metrics;
use crate::server::state::AppState;

/// Content type for rewritten playlists when the origin does not send one.
const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Serve a manifest request.
///
/// Fetches the playlist named by `__hls_origin_url` from the origin,
/// rewrites every URI in it to route back through this proxy, and returns
/// the rewritten text. Manifests are never cached; the origin is hit on
/// every request so live playlists stay fresh.
pub async fn serve_manifest(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Response> {
    let start = Instant::now();
    state.events.record(ProxyEvent::ManifestRequestReceived);

    let origin_url = super::origin_url_from_query(&params)?;
    info!("Manifest request for {}", origin_url);

    let response = match state
        .origin
        .fetch(&origin_url)
        .await
        .and_then(|r| r.ensure_success())
    {
        Ok(response) => response,
        Err(e) => {
            metrics::record_origin_error();
            metrics::record_request("manifest", e.status_code().as_u16());
            metrics::record_duration("manifest", start);
            return Err(e);
        }
    };

    let rewritten = match state.rewriter.rewrite(&response.body, &origin_url) {
        Ok(rewritten) => rewritten,
        Err(e) => {
            metrics::record_request("manifest", 500);
            metrics::record_duration("manifest", start);
            return Err(e.into());
        }
    };

    let content_type = response
        .content_type
        .as_deref()
        .unwrap_or(MANIFEST_CONTENT_TYPE)
        .to_string();

    metrics::record_request("manifest", 200);
    metrics::record_duration("manifest", start);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        rewritten,
    )
        .into_response())
}
