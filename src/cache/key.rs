//! Cache key canonicalization.

use std::fmt;

use sha2::{Digest, Sha256};
use url::Url;

/// Host substituted into every canonical key.
///
/// Multi-CDN setups rotate hostnames for the same asset path; folding the
/// host means a segment cached via one edge is a hit via any other.
const CANONICAL_HOST: &str = "hls.cache.internal";

/// Canonical identity of a cached segment.
///
/// Derived from the origin URL by dropping everything that varies between
/// deliveries of the same bytes: query and fragment (signing, analytics),
/// the CDN hostname, the port, and the scheme. What remains is the path,
/// which is what actually names the segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Canonicalize an origin URL into a cache key.
    pub fn from_origin(origin: &Url) -> Self {
        let mut canonical = origin.clone();
        canonical.set_query(None);
        canonical.set_fragment(None);
        let _ = canonical.set_host(Some(CANONICAL_HOST));
        let _ = canonical.set_port(None);
        let _ = canonical.set_scheme("https");
        Self(canonical.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem for this key's cache files on disk.
    pub(crate) fn storage_stem(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
