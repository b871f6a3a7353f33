//! Laying cache files out on disk.
//!
//! Every file cache in this crate stores the file for a key at `<cache dir>/<first character of key>/<key>`, so that
//! no single directory ends up with all of the files.  Keys have to be a single plain path component; anything that
//! could climb out of the cache directory or land somewhere other than its shard is rejected, primarily as a measure
//! to detect bugs.
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use relative_path::{Component, RelativePath, RelativePathBuf};

use crate::*;

/// Check that `key` can be used as a file name inside a shard.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    // `RelativePath` ignores leading and trailing separators, so compare the one component against the whole key.
    // A leading dot would make the shard `.`, which is the cache directory itself.
    let mut components = RelativePath::new(key).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None)
            if name == key && !key.starts_with('.') && !key.contains('\\') =>
        {
            Ok(())
        }
        _ => {
            log::error!("Rejecting file cache key {:?}", key);
            Err(CacheError::InvalidArgument(format!(
                "{:?} is not a valid file cache key",
                key
            )))
        }
    }
}

/// The canonical location of the file for `key` under `cache_dir`.
pub fn shard_path(cache_dir: &Path, key: &str) -> Result<PathBuf> {
    validate_key(key)?;
    let first = key
        .chars()
        .next()
        .ok_or_else(|| CacheError::InvalidArgument("empty file cache key".into()))?;
    let relative = RelativePathBuf::from(format!("{}/{}", first, key));
    Ok(relative.to_logical_path(cache_dir))
}

/// Delete a file, reporting whether there was one.  Failures other than the file being gone already are logged.
pub(crate) fn delete_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("Unable to delete cache file {}: {}", path.display(), e);
            false
        }
    }
}

/// Make sure the shard directory for a file exists, so the caller can write to the path they got back.
pub(crate) fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            log::warn!("Unable to create cache directory {}: {}", parent.display(), e);
        }
    }
}

/// Visit every regular file one level down from `cache_dir`, which is where the shards keep them.
///
/// Errors are logged and skipped: a scan which can't see everything still returns what it could.
pub(crate) fn scan_shards(cache_dir: &Path, mut visit: impl FnMut(fs::DirEntry)) {
    let shards = match fs::read_dir(cache_dir) {
        Ok(x) => x,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("Cache directory {} doesn't exist yet", cache_dir.display());
            return;
        }
        Err(e) => {
            log::warn!("Unable to scan cache directory {}: {}", cache_dir.display(), e);
            return;
        }
    };

    for shard in shards {
        let shard = match shard {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Error while scanning {}: {}", cache_dir.display(), e);
                continue;
            }
        };
        if !shard.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }

        let files = match fs::read_dir(shard.path()) {
            Ok(x) => x,
            Err(e) => {
                log::warn!("Unable to scan cache shard {}: {}", shard.path().display(), e);
                continue;
            }
        };
        for file in files {
            match file {
                Ok(f) if f.file_type().map(|t| t.is_file()).unwrap_or(false) => visit(f),
                Ok(_) => {}
                Err(e) => log::warn!("Error while scanning {}: {}", shard.path().display(), e),
            }
        }
    }
}

/// Total bytes of the files in the shards under `cache_dir`.
pub fn disk_usage(cache_dir: &Path) -> u64 {
    let mut total = 0;
    scan_shards(cache_dir, |f| {
        total += f.metadata().map(|m| m.len()).unwrap_or(0);
    });
    total
}

/// Delete everything under `cache_dir`, leaving the directory itself.
pub(crate) fn delete_contents(cache_dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(cache_dir) {
        Ok(x) => x,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// A [FileCache] without an index or a bound: it only knows where each key's file goes.
#[derive(Clone, Debug)]
pub struct SimpleFileCache {
    cache_dir: PathBuf,
}

impl SimpleFileCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> SimpleFileCache {
        SimpleFileCache {
            cache_dir: cache_dir.into(),
        }
    }
}

impl FileCache for SimpleFileCache {
    fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn get(&self, key: &str) -> Result<PathBuf> {
        let path = shard_path(&self.cache_dir, key)?;
        ensure_parent(&path);
        Ok(path)
    }

    /// There's nothing to record; the file is wherever `get` said it would be.
    fn put(&self, key: &str, _path: PathBuf) -> Result<Option<PathBuf>> {
        validate_key(key)?;
        Ok(None)
    }

    fn remove(&self, key: &str) -> Result<Option<PathBuf>> {
        let path = shard_path(&self.cache_dir, key)?;
        Ok(if delete_file(&path) { Some(path) } else { None })
    }

    fn clear(&self) {}
}

/// Build the file cache for a directory: an unbounded [SimpleFileCache] when `max_size` is 0, otherwise a
/// [DiskIndexCache] holding at most `max_size` files.
pub fn create_file_cache(
    cache_dir: impl Into<PathBuf>,
    max_size: u64,
) -> Result<Box<dyn FileCache + Send + Sync>> {
    let cache_dir = cache_dir.into();
    if max_size == 0 {
        return Ok(Box::new(SimpleFileCache::new(cache_dir)));
    }

    let config = DiskCacheConfig { cache_dir, max_size };
    Ok(Box::new(DiskIndexCache::new(config)?))
}
