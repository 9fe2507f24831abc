//! Error taxonomy for the proxy request path.
//!
//! Every failure is terminal for its request: the handler maps it to a
//! status code and the player retries on its own schedule. Nothing in here
//! is retried internally.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::rewrite::RewriteError;

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Failures surfaced while serving a proxy request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request is not something the proxy serves: unsupported path or
    /// a missing/invalid origin parameter. Rejected before any origin
    /// traffic.
    #[error("invalid proxy request: {0}")]
    MalformedRequest(String),

    /// The origin fetch failed at the transport level (DNS, connect, TLS,
    /// disconnect mid-body).
    #[error("origin fetch failed: {0}")]
    OriginFetch(#[from] reqwest::Error),

    /// The origin answered with a non-success status.
    #[error("origin returned status {0}")]
    OriginStatus(u16),

    /// The origin answered 2xx but with an empty body.
    #[error("origin returned an empty body")]
    OriginEmptyBody,

    /// The origin manifest could not be rewritten.
    #[error("manifest rewrite failed: {0}")]
    ManifestRewrite(#[from] RewriteError),

    /// Disk or socket I/O failed outside an origin fetch.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// HTTP status this error maps to on the proxy surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::OriginFetch(_)
            | ProxyError::OriginStatus(_)
            | ProxyError::OriginEmptyBody
            | ProxyError::ManifestRewrite(_)
            | ProxyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::BAD_REQUEST {
            warn!("Rejected request: {}", self);
        } else {
            error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}
