//! Disk-backed segment cache.
//!
//! Each entry lives on disk as a `<stem>.data` file (the raw segment bytes)
//! plus a `<stem>.meta` JSON sidecar, where the stem is a digest of the
//! canonical key. An in-memory index over the sidecars carries usage
//! accounting and recency; it is rebuilt from the sidecars on open, so
//! cached segments survive process restarts.
//!
//! Writes go through a uniquely named temp file and a rename, so a crash
//! mid-write leaves either the old entry or loose temp files that the next
//! open sweeps up — never a torn entry. Concurrent stores for one key are
//! last-write-wins; entries are never mutated in place.

mod key;

pub use key::CacheKey;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::metrics;

/// Default capacity bound for the segment cache.
pub const DEFAULT_CAPACITY_BYTES: u64 = 256 * 1024 * 1024;

const DATA_EXT: &str = "data";
const META_EXT: &str = "meta";
const TMP_EXT: &str = "tmp";

/// Sidecar metadata persisted next to each cached segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    canonical_url: String,
    size: u64,
    content_type: String,
    created_at: u64,
    /// Epoch millis of the last lookup hit. Only flushed to disk at store
    /// time; recency refreshes stay in memory.
    last_accessed: u64,
}

/// A segment served from the cache.
#[derive(Debug, Clone)]
pub struct CachedSegment {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Disk-backed, capacity-bounded segment store.
///
/// Cheap to clone; all clones share the same index and directory.
#[derive(Debug, Clone)]
pub struct SegmentCache {
    inner: Arc<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    dir: PathBuf,
    capacity: u64,
    /// Storage stem -> sidecar metadata for every entry on disk.
    index: DashMap<String, EntryMeta>,
    usage: AtomicU64,
    tmp_counter: AtomicU64,
}

impl SegmentCache {
    /// Open (or create) a cache directory and rebuild the index from the
    /// sidecars found there.
    ///
    /// Orphaned data files, unreadable sidecars, and temp files left by
    /// interrupted writes are deleted. If the recovered contents exceed
    /// `capacity` (it may have shrunk between runs), least-recently-used
    /// entries are evicted immediately.
    pub async fn open(dir: impl Into<PathBuf>, capacity: u64) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let cache = Self {
            inner: Arc::new(CacheInner {
                dir,
                capacity,
                index: DashMap::new(),
                usage: AtomicU64::new(0),
                tmp_counter: AtomicU64::new(0),
            }),
        };

        cache.recover_index().await?;
        cache.evict_to_capacity().await;
        metrics::record_cache_disk_usage(cache.disk_usage());
        Ok(cache)
    }

    /// Look up a segment, refreshing its recency on a hit.
    ///
    /// An indexed entry whose data file cannot be read is dropped and
    /// reported as a miss.
    pub async fn lookup(&self, key: &CacheKey) -> Option<CachedSegment> {
        let stem = key.storage_stem();

        let content_type = {
            let mut entry = self.inner.index.get_mut(&stem)?;
            entry.last_accessed = epoch_millis();
            entry.content_type.clone()
        };

        match fs::read(self.data_path(&stem)).await {
            Ok(bytes) => Some(CachedSegment {
                bytes: Bytes::from(bytes),
                content_type,
            }),
            Err(e) => {
                warn!("Dropping unreadable cache entry for {}: {}", key, e);
                self.remove_entry(&stem).await;
                None
            }
        }
    }

    /// Store a segment, then trim the cache back under its capacity bound.
    ///
    /// Entries larger than the whole capacity are refused: nothing is
    /// written and the call returns `None`. Otherwise returns the total
    /// disk usage after the store and any evictions.
    pub async fn store(
        &self,
        key: &CacheKey,
        bytes: Bytes,
        content_type: &str,
    ) -> io::Result<Option<u64>> {
        let size = bytes.len() as u64;
        if size > self.inner.capacity {
            warn!(
                "Not caching {}: {} bytes exceeds the {} byte capacity",
                key, size, self.inner.capacity
            );
            return Ok(None);
        }

        let stem = key.storage_stem();
        let now = epoch_millis();
        let meta = EntryMeta {
            canonical_url: key.as_str().to_string(),
            size,
            content_type: content_type.to_string(),
            created_at: now,
            last_accessed: now,
        };

        self.write_entry_files(&stem, &bytes, &meta).await?;

        if let Some(previous) = self.inner.index.insert(stem, meta) {
            self.inner.usage.fetch_sub(previous.size, Ordering::SeqCst);
        }
        self.inner.usage.fetch_add(size, Ordering::SeqCst);

        self.evict_to_capacity().await;

        let usage = self.disk_usage();
        metrics::record_cache_disk_usage(usage);
        debug!("Stored {} ({} bytes, {} bytes on disk)", key, size, usage);
        Ok(Some(usage))
    }

    /// Total bytes of cached segment data on disk.
    pub fn disk_usage(&self) -> u64 {
        self.inner.usage.load(Ordering::SeqCst)
    }

    /// Number of cached segments.
    pub fn entry_count(&self) -> usize {
        self.inner.index.len()
    }

    /// Remove every cached segment.
    pub async fn clear(&self) {
        let stems: Vec<String> = self.inner.index.iter().map(|e| e.key().clone()).collect();
        for stem in stems {
            self.remove_entry(&stem).await;
        }
        info!("Cache cleared");
    }

    /// Rebuild the index from `.meta` sidecars left by a previous run.
    async fn recover_index(&self) -> io::Result<()> {
        let mut meta_paths = Vec::new();
        let mut data_files: HashMap<String, PathBuf> = HashMap::new();

        let mut entries = fs::read_dir(&self.inner.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(META_EXT) => meta_paths.push(path),
                Some(DATA_EXT) => {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        data_files.insert(stem.to_string(), path.clone());
                    }
                }
                Some(TMP_EXT) => {
                    debug!("Removing interrupted write {}", path.display());
                    let _ = fs::remove_file(&path).await;
                }
                _ => {}
            }
        }

        let mut recovered = 0usize;
        for meta_path in meta_paths {
            let Some(stem) = meta_path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
            else {
                continue;
            };

            let meta = fs::read(&meta_path)
                .await
                .ok()
                .and_then(|raw| serde_json::from_slice::<EntryMeta>(&raw).ok());

            let Some(meta) = meta else {
                warn!("Removing unreadable sidecar {}", meta_path.display());
                let _ = fs::remove_file(&meta_path).await;
                if let Some(data) = data_files.remove(&stem) {
                    let _ = fs::remove_file(&data).await;
                }
                continue;
            };

            if data_files.remove(&stem).is_none() {
                warn!("Removing sidecar without data file {}", meta_path.display());
                let _ = fs::remove_file(&meta_path).await;
                continue;
            }

            self.inner.usage.fetch_add(meta.size, Ordering::SeqCst);
            self.inner.index.insert(stem, meta);
            recovered += 1;
        }

        // Whatever is left has no sidecar
        for (_, data) in data_files {
            warn!("Removing data file without sidecar {}", data.display());
            let _ = fs::remove_file(&data).await;
        }

        if recovered > 0 {
            info!(
                "Recovered {} cached segments ({} bytes) from {}",
                recovered,
                self.disk_usage(),
                self.inner.dir.display()
            );
        }
        Ok(())
    }

    /// Remove least-recently-used entries until usage fits the capacity.
    async fn evict_to_capacity(&self) {
        while self.disk_usage() > self.inner.capacity {
            let victim = self
                .inner
                .index
                .iter()
                .min_by_key(|entry| entry.value().last_accessed)
                .map(|entry| (entry.key().clone(), entry.value().canonical_url.clone()));

            let Some((stem, url)) = victim else { break };
            debug!("Evicting {} to reclaim capacity", url);
            metrics::record_cache_evicted();
            self.remove_entry(&stem).await;
        }
    }

    /// Drop an entry from the index and delete its files. Idempotent.
    async fn remove_entry(&self, stem: &str) {
        if let Some((_, meta)) = self.inner.index.remove(stem) {
            self.inner.usage.fetch_sub(meta.size, Ordering::SeqCst);
            metrics::record_cache_disk_usage(self.disk_usage());
        }
        let _ = fs::remove_file(self.data_path(stem)).await;
        let _ = fs::remove_file(self.meta_path(stem)).await;
    }

    /// Write the data file and sidecar through uniquely named temp files.
    async fn write_entry_files(&self, stem: &str, bytes: &[u8], meta: &EntryMeta) -> io::Result<()> {
        let tmp_id = self.inner.tmp_counter.fetch_add(1, Ordering::Relaxed);

        let data_tmp = self
            .inner
            .dir
            .join(format!("{}.{}.{}", stem, tmp_id, TMP_EXT));
        fs::write(&data_tmp, bytes).await?;
        fs::rename(&data_tmp, self.data_path(stem)).await?;

        let meta_tmp = self
            .inner
            .dir
            .join(format!("{}.{}.m.{}", stem, tmp_id, TMP_EXT));
        fs::write(&meta_tmp, serde_json::to_vec(meta)?).await?;
        fs::rename(&meta_tmp, self.meta_path(stem)).await?;

        Ok(())
    }

    fn data_path(&self, stem: &str) -> PathBuf {
        self.inner.dir.join(format!("{}.{}", stem, DATA_EXT))
    }

    fn meta_path(&self, stem: &str) -> PathBuf {
        self.inner.dir.join(format!("{}.{}", stem, META_EXT))
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
