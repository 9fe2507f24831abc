use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::cache::DEFAULT_CAPACITY_BYTES;

/// Default loopback port the proxy listens on.
pub const DEFAULT_PORT: u16 = 1234;

/// Default directory backing the segment cache.
const DEFAULT_CACHE_DIR: &str = "hlscache";

/// Runtime configuration for the proxy.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Loopback port to listen on. `0` asks the OS for a free port; the
    /// actual address comes back from `ProxyServer::start`.
    pub port: u16,
    /// Directory backing the segment cache. Created on open if missing.
    pub cache_dir: PathBuf,
    /// Capacity bound for the segment cache in bytes.
    pub cache_capacity_bytes: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_capacity_bytes: DEFAULT_CAPACITY_BYTES,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    ///
    /// Recognized variables: `HLSCACHE_PORT`, `HLSCACHE_CACHE_DIR`,
    /// `HLSCACHE_CACHE_CAPACITY_BYTES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parse_var("HLSCACHE_PORT", defaults.port),
            cache_dir: env::var("HLSCACHE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_capacity_bytes: parse_var(
                "HLSCACHE_CACHE_CAPACITY_BYTES",
                defaults.cache_capacity_bytes,
            ),
        }
    }
}

/// Parse an env var, warning and falling back to `default` on bad input.
fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialize all env-var tests to prevent races between parallel test threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Set env vars, run `f`, then restore original state.
    ///
    /// `set` — vars to set; `unset` — vars to remove before running `f`.
    fn with_env(set: &[(&str, &str)], unset: &[&str], f: impl FnOnce()) {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());

        // Save state for all touched vars
        let save_set: Vec<(&str, Option<String>)> = set
            .iter()
            .map(|(k, _)| (*k, std::env::var(k).ok()))
            .collect();
        let save_unset: Vec<(&str, Option<String>)> =
            unset.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        for (k, v) in set {
            // SAFETY: serialized by ENV_LOCK — no other thread modifies env vars concurrently.
            unsafe { std::env::set_var(k, v) };
        }
        for k in unset {
            unsafe { std::env::remove_var(k) };
        }

        f();

        // Restore
        for (k, old) in save_set.into_iter().chain(save_unset) {
            match old {
                Some(v) => unsafe { std::env::set_var(k, v) },
                None => unsafe { std::env::remove_var(k) },
            }
        }
    }

    const ALL_VARS: &[&str] = &[
        "HLSCACHE_PORT",
        "HLSCACHE_CACHE_DIR",
        "HLSCACHE_CACHE_CAPACITY_BYTES",
    ];

    #[test]
    fn defaults_when_nothing_is_set() {
        with_env(&[], ALL_VARS, || {
            let config = ProxyConfig::from_env();
            assert_eq!(config.port, DEFAULT_PORT);
            assert_eq!(config.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
            assert_eq!(config.cache_capacity_bytes, DEFAULT_CAPACITY_BYTES);
        });
    }

    #[test]
    fn env_overrides_are_parsed() {
        with_env(
            &[
                ("HLSCACHE_PORT", "8088"),
                ("HLSCACHE_CACHE_DIR", "/var/tmp/segments"),
                ("HLSCACHE_CACHE_CAPACITY_BYTES", "1048576"),
            ],
            &[],
            || {
                let config = ProxyConfig::from_env();
                assert_eq!(config.port, 8088);
                assert_eq!(config.cache_dir, PathBuf::from("/var/tmp/segments"));
                assert_eq!(config.cache_capacity_bytes, 1_048_576);
            },
        );
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        with_env(
            &[
                ("HLSCACHE_PORT", "not-a-port"),
                ("HLSCACHE_CACHE_CAPACITY_BYTES", "lots"),
            ],
            &["HLSCACHE_CACHE_DIR"],
            || {
                let config = ProxyConfig::from_env();
                assert_eq!(config.port, DEFAULT_PORT);
                assert_eq!(config.cache_capacity_bytes, DEFAULT_CAPACITY_BYTES);
            },
        );
    }

    #[test]
    fn port_zero_is_accepted() {
        with_env(&[("HLSCACHE_PORT", "0")], &[], || {
            let config = ProxyConfig::from_env();
            assert_eq!(config.port, 0);
        });
    }
}
