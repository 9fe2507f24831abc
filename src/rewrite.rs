//! Manifest rewriting.
//!
//! A playlist reaches the player through the proxy only if every URI in it
//! points back at the proxy. This module does that as a pure line-by-line
//! pass over the playlist text:
//!
//! 1. **Bare URI lines** (variant streams in a multivariant playlist, media
//!    segments in a media playlist) are replaced with a loopback URL.
//! 2. **Tags carrying a quoted `URI` attribute** (`EXT-X-MAP`, `EXT-X-KEY`,
//!    `EXT-X-MEDIA`, the LL-HLS tags) have the attribute value spliced out
//!    and replaced; every byte outside the quotes is preserved.
//! 3. Everything else passes through untouched, line endings included.
//!
//! Each rewritten URI carries the resolved absolute origin URL in the
//! `__hls_origin_url` query parameter, which is how the manifest and segment
//! handlers later learn where to fetch from.

use thiserror::Error;
use tracing::debug;
use url::Url;

/// Query parameter carrying the absolute origin URL in rewritten URIs.
pub const ORIGIN_URL_PARAM: &str = "__hls_origin_url";

/// Tags whose quoted `URI` attribute references another playlist resource.
///
/// `EXT-X-STREAM-INF` is deliberately absent: its URI is the following line,
/// which the bare-URI branch handles.
const URI_ATTRIBUTE_TAGS: [&str; 8] = [
    "#EXT-X-MAP:",
    "#EXT-X-KEY:",
    "#EXT-X-SESSION-KEY:",
    "#EXT-X-MEDIA:",
    "#EXT-X-I-FRAME-STREAM-INF:",
    "#EXT-X-PART:",
    "#EXT-X-PRELOAD-HINT:",
    "#EXT-X-RENDITION-REPORT:",
];

/// Failure to rewrite an origin manifest.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The manifest body is not valid UTF-8 text.
    #[error("manifest is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// Rewrites playlist URIs to route through a loopback proxy port.
#[derive(Debug, Clone)]
pub struct ManifestRewriter {
    /// `http://127.0.0.1:<port>/`, cloned per rewritten URI.
    base: Url,
}

impl ManifestRewriter {
    /// Build a rewriter that routes playlist references through
    /// `http://127.0.0.1:<port>`.
    pub fn new(port: u16) -> Self {
        let base = Url::parse(&format!("http://127.0.0.1:{}/", port))
            .expect("loopback base URL must parse");
        Self { base }
    }

    /// Rewrite every URI in `manifest`, resolving references against
    /// `origin` (the absolute URL the manifest was fetched from).
    ///
    /// The output has the same line count, line order, and line endings as
    /// the input; only URI spans differ. A reference that does not resolve
    /// leaves its line untouched. Input that is not UTF-8 fails the whole
    /// pass — serving a half-rewritten manifest would send the player
    /// straight to the origin.
    pub fn rewrite(&self, manifest: &[u8], origin: &Url) -> Result<String, RewriteError> {
        let text = std::str::from_utf8(manifest)?;

        let mut result = String::with_capacity(text.len() * 2);
        for (idx, raw_line) in text.split('\n').enumerate() {
            if idx > 0 {
                result.push('\n');
            }
            // Carriage returns belong to the line ending, not the URI.
            let (line, had_cr) = match raw_line.strip_suffix('\r') {
                Some(stripped) => (stripped, true),
                None => (raw_line, false),
            };
            result.push_str(&self.rewrite_line(line, origin));
            if had_cr {
                result.push('\r');
            }
        }

        Ok(result)
    }

    /// Rewrite a single playlist line.
    fn rewrite_line(&self, line: &str, origin: &Url) -> String {
        if line.trim().is_empty() {
            return line.to_string();
        }

        if line.starts_with('#') {
            if URI_ATTRIBUTE_TAGS.iter().any(|tag| line.starts_with(tag)) {
                return self.rewrite_tag_uri(line, origin);
            }
            // Unknown tags and comments pass through verbatim.
            return line.to_string();
        }

        // Anything else is a URI reference occupying the whole line.
        match self.proxy_url(line, origin) {
            Some(proxied) => proxied,
            None => {
                debug!("Leaving unresolvable reference untouched: {}", line);
                line.to_string()
            }
        }
    }

    /// Splice a rewritten value into the quoted `URI="..."` attribute.
    ///
    /// Lines with a missing or unterminated attribute are returned unchanged.
    fn rewrite_tag_uri(&self, line: &str, origin: &Url) -> String {
        let (uri_value, quote_start, quote_end) = match extract_quoted_uri(line) {
            Some(v) => v,
            None => return line.to_string(),
        };

        let proxied = match self.proxy_url(&uri_value, origin) {
            Some(proxied) => proxied,
            None => {
                debug!("Leaving unresolvable URI attribute untouched: {}", line);
                return line.to_string();
            }
        };

        let new_uri = format!("\"{}\"", proxied);
        let mut result = String::with_capacity(line.len() + new_uri.len());
        result.push_str(&line[..quote_start]);
        result.push_str(&new_uri);
        result.push_str(&line[quote_end..]);
        result
    }

    /// Build the loopback URL for a playlist reference.
    ///
    /// The reference is resolved against `origin` per RFC 3986 (absolute
    /// references pass through, `/`-rooted ones take the origin's authority,
    /// relative ones resolve against the origin's directory). The loopback
    /// URL keeps the resolved path and query and appends the resolved
    /// absolute URL as the origin parameter.
    fn proxy_url(&self, reference: &str, origin: &Url) -> Option<String> {
        let absolute = origin.join(reference).ok()?;

        let mut proxied = self.base.clone();
        proxied.set_path(absolute.path());
        proxied.set_query(absolute.query());
        proxied
            .query_pairs_mut()
            .append_pair(ORIGIN_URL_PARAM, absolute.as_str());

        Some(proxied.to_string())
    }
}

/// Extract the quoted URI value from a tag line.
///
/// Searches for `URI="` in the line and returns:
/// - The URI value (without quotes)
/// - The byte offset of the opening quote
/// - The byte offset one past the closing quote
///
/// Returns `None` if no complete `URI="..."` is found.
fn extract_quoted_uri(line: &str) -> Option<(String, usize, usize)> {
    let uri_marker = "URI=\"";
    let marker_pos = line.find(uri_marker)?;
    let value_start = marker_pos + uri_marker.len();
    let rest = &line[value_start..];
    let closing_quote = rest.find('"')?;
    let value = rest[..closing_quote].to_string();

    // quote_start is the position of the opening quote character
    let quote_start = value_start - 1;
    // quote_end is one past the closing quote character
    let quote_end = value_start + closing_quote + 1;

    Some((value, quote_start, quote_end))
}

// -- Tests -------------------------------------------------------------------
