pub mod manifest;
pub mod segment;

use std::collections::HashMap;

use url::Url;

use crate::error::{ProxyError, Result};
use crate::rewrite::ORIGIN_URL_PARAM;

/// Pull the origin URL out of the request query parameters.
///
/// Every proxied resource carries the absolute origin URL in the
/// `__hls_origin_url` parameter; a request without one, or with one that
/// is not an http(s) URL, is malformed.
pub(crate) fn origin_url_from_query(params: &HashMap<String, String>) -> Result<Url> {
    let raw = params.get(ORIGIN_URL_PARAM).ok_or_else(|| {
        ProxyError::MalformedRequest(format!("missing {ORIGIN_URL_PARAM} query parameter"))
    })?;

    let url = Url::parse(raw)
        .map_err(|e| ProxyError::MalformedRequest(format!("invalid origin URL {raw:?}: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProxyError::MalformedRequest(format!(
            "unsupported origin scheme {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn extracts_the_origin_url() {
        let params = query_map(&[(ORIGIN_URL_PARAM, "https://cdn.example.com/seg.ts?token=a")]);
        let url = origin_url_from_query(&params).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/seg.ts?token=a");
    }

    #[test]
    fn missing_parameter_is_malformed() {
        let err = origin_url_from_query(&query_map(&[("other", "x")])).unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));
    }

    #[test]
    fn unparseable_url_is_malformed() {
        let err =
            origin_url_from_query(&query_map(&[(ORIGIN_URL_PARAM, "not a url")])).unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = origin_url_from_query(&query_map(&[(
            ORIGIN_URL_PARAM,
            "ftp://cdn.example.com/seg.ts",
        )]))
        .unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));
    }
}
