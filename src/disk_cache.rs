//! A bounded index of files on disk.
//!
//! [DiskIndexCache] keeps an [EvictionCache] from key to path in memory, and deletes the file whenever its entry is
//! evicted, replaced by a different path, or removed.  Files it doesn't know about yet are picked up either all at once
//! with [DiskIndexCache::initialize], or one at a time as `get` finds them at their canonical location.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use crate::*;

#[derive(Clone, Debug, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct DiskCacheConfig {
    /// Directory holding the shard directories.
    #[builder(setter(into))]
    pub cache_dir: PathBuf,
    /// Maximum total size, in whatever unit the size function counts.  With the default that's a number of files.
    pub max_size: u64,
}

impl DiskCacheConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.max_size == Some(0) {
            return Err("max_size must be greater than zero".into());
        }
        Ok(())
    }
}

/// Deletes the file behind every entry which leaves the index, unless it was replaced by the same path.
struct FileRemover;

impl RemovalListener<String, PathBuf> for FileRemover {
    fn on_entry_removed(
        &mut self,
        cause: RemovalCause,
        key: &String,
        old_value: &PathBuf,
        new_value: Option<&PathBuf>,
    ) {
        if new_value == Some(old_value) {
            return;
        }

        if delete_file(old_value) {
            log::debug!(
                "Deleted cache file {} for {} ({:?})",
                old_value.display(),
                key,
                cause
            );
        }
    }
}

pub struct DiskIndexCache<S = UnitSize> {
    cache_dir: PathBuf,
    entries: SynchronizedEvictionCache<String, PathBuf, S, FileRemover>,
    initialized: AtomicBool,
}

impl DiskIndexCache {
    /// An index bounded by a number of files.
    pub fn new(config: DiskCacheConfig) -> Result<DiskIndexCache> {
        DiskIndexCache::with_sizer(config, UnitSize)
    }
}

impl<S> DiskIndexCache<S> {
    /// An index whose entries cost whatever `sizer` says; [FileLength] bounds the cache by bytes.
    pub fn with_sizer(config: DiskCacheConfig, sizer: S) -> Result<DiskIndexCache<S>> {
        Ok(DiskIndexCache {
            entries: SynchronizedEvictionCache::with_parts(config.max_size, sizer, FileRemover)?,
            cache_dir: config.cache_dir,
            initialized: AtomicBool::new(false),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn size(&self) -> u64 {
        self.entries.size()
    }

    pub fn max_size(&self) -> u64 {
        self.entries.max_size()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_string())
    }

    /// Forget every entry.  The files stay where they are and will be found again.
    pub fn clear(&self) {
        self.entries.clear()
    }

    /// Total bytes of the files in the shard directories, indexed or not.
    pub fn disk_usage(&self) -> u64 {
        disk_usage(&self.cache_dir)
    }

    /// Forget every entry and delete everything under the cache directory.
    pub fn purge(&self) -> Result<()> {
        self.entries.clear();
        delete_contents(&self.cache_dir)?;
        log::debug!("Purged file cache {}", self.cache_dir.display());
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<(String, PathBuf)> {
        self.entries.snapshot()
    }
}

impl<S: SizeOf<String, PathBuf>> DiskIndexCache<S> {
    /// The path for `key`.
    ///
    /// If the key is indexed, that's the path it was put with.  Otherwise it's the canonical location, which is
    /// indexed on the spot if a file is already there, and whose shard directory is created so that the caller can
    /// write to it.
    pub fn get(&self, key: &str) -> Result<PathBuf> {
        let canonical = shard_path(&self.cache_dir, key)?;
        let key = key.to_string();

        self.entries.with_lock(|entries| -> Result<PathBuf> {
            if let Some(path) = entries.get(&key) {
                return Ok(path);
            }

            if canonical.is_file() {
                log::debug!("Indexing cache file {} found on disk", canonical.display());
                entries.put(key, canonical.clone())?;
            } else {
                ensure_parent(&canonical);
            }
            Ok(canonical)
        })
    }

    pub fn put(&self, key: &str, path: PathBuf) -> Result<Option<PathBuf>> {
        validate_key(key)?;
        self.entries.put(key.to_string(), path)
    }

    /// Remove `key`, deleting its file.  A key which isn't indexed still has its canonical file deleted.
    pub fn remove(&self, key: &str) -> Result<Option<PathBuf>> {
        let canonical = shard_path(&self.cache_dir, key)?;
        let key = key.to_string();

        Ok(self.entries.with_lock(|entries| {
            entries
                .remove(&key)
                .or_else(|| delete_file(&canonical).then(|| canonical))
        }))
    }

    /// Index the files already in the cache directory, oldest first, so that the most recently modified are the last
    /// to be evicted.
    ///
    /// Only the first call on an instance scans anything; the rest return 0.  Files which aren't where their name says
    /// they should be are left alone.  Returns how many files were indexed.
    pub fn initialize(&self) -> usize {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let mut found = vec![];
        scan_shards(&self.cache_dir, |file| {
            let path = file.path();
            let key = match file.file_name().into_string() {
                Ok(k) => k,
                Err(_) => {
                    log::debug!("Skipping cache file with a non-UTF-8 name: {}", path.display());
                    return;
                }
            };
            match shard_path(&self.cache_dir, &key) {
                Ok(expected) if expected == path => {}
                _ => {
                    log::debug!("Skipping stray file {}", path.display());
                    return;
                }
            }

            let modified = file
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, key, path));
        });

        found.sort();
        let mut indexed = 0;
        for (_, key, path) in found {
            match self.entries.put(key, path) {
                Ok(_) => indexed += 1,
                Err(e) => log::warn!("Unable to index cache file: {}", e),
            }
        }

        log::debug!(
            "Indexed {} files under {}",
            indexed,
            self.cache_dir.display()
        );
        indexed
    }

    pub fn trim_to_size(&self, max_size: u64) {
        self.entries.trim_to_size(max_size)
    }

    /// Evict every entry, deleting every indexed file.
    pub fn evict_all(&self) {
        self.entries.evict_all()
    }

    pub fn trim_memory(&self, level: TrimLevel) {
        self.entries.trim_memory(level)
    }
}

impl<S: SizeOf<String, PathBuf>> FileCache for DiskIndexCache<S> {
    fn cache_dir(&self) -> &Path {
        DiskIndexCache::cache_dir(self)
    }

    fn get(&self, key: &str) -> Result<PathBuf> {
        DiskIndexCache::get(self, key)
    }

    fn put(&self, key: &str, path: PathBuf) -> Result<Option<PathBuf>> {
        DiskIndexCache::put(self, key, path)
    }

    fn remove(&self, key: &str) -> Result<Option<PathBuf>> {
        DiskIndexCache::remove(self, key)
    }

    fn clear(&self) {
        DiskIndexCache::clear(self)
    }
}

/// Invalid keys read as misses through this interface.
impl<S: SizeOf<String, PathBuf>> Cache<String, PathBuf> for DiskIndexCache<S> {
    fn get(&mut self, key: &String) -> Option<PathBuf> {
        DiskIndexCache::get(self, key).ok()
    }

    fn put(&mut self, key: String, value: PathBuf) -> Result<Option<PathBuf>> {
        DiskIndexCache::put(self, &key, value)
    }

    fn remove(&mut self, key: &String) -> Option<PathBuf> {
        DiskIndexCache::remove(self, key).ok().flatten()
    }

    fn contains_key(&self, key: &String) -> bool {
        DiskIndexCache::contains_key(self, key)
    }

    fn clear(&mut self) {
        DiskIndexCache::clear(self)
    }

    fn snapshot(&self) -> Vec<(String, PathBuf)> {
        DiskIndexCache::snapshot(self)
    }

    fn trim_memory(&mut self, level: TrimLevel) {
        DiskIndexCache::trim_memory(self, level)
    }
}

impl<S: SizeOf<String, PathBuf>> SizedCache<String, PathBuf> for DiskIndexCache<S> {
    fn size(&self) -> u64 {
        DiskIndexCache::size(self)
    }

    fn max_size(&self) -> u64 {
        DiskIndexCache::max_size(self)
    }

    fn trim_to_size(&mut self, max_size: u64) {
        DiskIndexCache::trim_to_size(self, max_size)
    }

    fn evict_all(&mut self) {
        DiskIndexCache::evict_all(self)
    }

    fn size_of(&self, key: &String, value: &PathBuf) -> i64 {
        self.entries.size_of(key, value)
    }
}
