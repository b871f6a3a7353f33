//! The interfaces the caches in this crate expose and consume.
//!
//! [Cache] is the basic key-value surface.  [SizedCache] adds the capacity and trimming half, which is what the
//! memory pressure machinery drives.  [RemovalListener] is how a cache tells the outside world that an entry left, and
//! is the hook used to return buffers to a [ResourcePool] or to delete files from disk.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::*;

/// A key-value cache.
pub trait Cache<K, V> {
    /// Return the value for `key`, marking it as the most recently used entry.
    fn get(&mut self, key: &K) -> Option<V>;

    /// Map `key` to `value`, returning the previous value if there was one.
    fn put(&mut self, key: K, value: V) -> Result<Option<V>>;

    /// Remove the entry for `key`, returning its value if there was one.
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Whether `key` has an entry, without touching it.
    fn contains_key(&self, key: &K) -> bool;

    /// Drop every entry without notifying anyone.
    fn clear(&mut self);

    /// Copy out the current contents, least recently used first.
    fn snapshot(&self) -> Vec<(K, V)>;

    /// React to memory pressure.  Caches without a notion of size ignore this.
    fn trim_memory(&mut self, _level: TrimLevel) {}
}

/// A cache bounded by the sum of the costs of its entries.
pub trait SizedCache<K, V>: Cache<K, V> {
    /// Sum of the costs of all entries currently in the cache.
    fn size(&self) -> u64;

    /// The most cost this cache will hold once a `put` returns.
    fn max_size(&self) -> u64;

    /// Evict least recently used entries until the size is at most `max_size`.
    fn trim_to_size(&mut self, max_size: u64);

    /// Evict every entry, notifying for each one.
    fn evict_all(&mut self);

    /// The cost this cache assigns to an entry.
    fn size_of(&self, key: &K, value: &V) -> i64;
}

impl<K, V, C: Cache<K, V> + ?Sized> Cache<K, V> for Box<C> {
    fn get(&mut self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        (**self).put(key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        (**self).remove(key)
    }

    fn contains_key(&self, key: &K) -> bool {
        (**self).contains_key(key)
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn snapshot(&self) -> Vec<(K, V)> {
        (**self).snapshot()
    }

    fn trim_memory(&mut self, level: TrimLevel) {
        (**self).trim_memory(level)
    }
}

impl<K, V, C: SizedCache<K, V> + ?Sized> SizedCache<K, V> for Box<C> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn max_size(&self) -> u64 {
        (**self).max_size()
    }

    fn trim_to_size(&mut self, max_size: u64) {
        (**self).trim_to_size(max_size)
    }

    fn evict_all(&mut self) {
        (**self).evict_all()
    }

    fn size_of(&self, key: &K, value: &V) -> i64 {
        (**self).size_of(key, value)
    }
}

/// A cache which holds nothing: every `put` is dropped and every `get` misses.
///
/// Stands in for a side of a [CompositeCache] configured with no capacity.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyCache;

impl<K, V> Cache<K, V> for EmptyCache {
    fn get(&mut self, _key: &K) -> Option<V> {
        None
    }

    fn put(&mut self, _key: K, _value: V) -> Result<Option<V>> {
        Ok(None)
    }

    fn remove(&mut self, _key: &K) -> Option<V> {
        None
    }

    fn contains_key(&self, _key: &K) -> bool {
        false
    }

    fn clear(&mut self) {}

    fn snapshot(&self) -> Vec<(K, V)> {
        vec![]
    }
}

impl<K, V> SizedCache<K, V> for EmptyCache {
    fn size(&self) -> u64 {
        0
    }

    fn max_size(&self) -> u64 {
        0
    }

    fn trim_to_size(&mut self, _max_size: u64) {}

    fn evict_all(&mut self) {}

    fn size_of(&self, _key: &K, _value: &V) -> i64 {
        0
    }
}

/// A cache of files keyed by string, laid out under one directory.
pub trait FileCache {
    fn cache_dir(&self) -> &Path;

    /// Return the file for `key`.  This always produces a path, which may not exist yet.
    fn get(&self, key: &str) -> Result<PathBuf>;

    /// Record `path` as the file for `key`, returning the previous path.
    fn put(&self, key: &str, path: PathBuf) -> Result<Option<PathBuf>>;

    /// Forget `key` and delete its file.
    fn remove(&self, key: &str) -> Result<Option<PathBuf>>;

    fn clear(&self);
}

/// Why an entry left a cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// Removed by the trim loop to make space.
    Evicted,
    /// Overwritten by a `put` of the same key.
    Replaced,
    /// Removed by an explicit `remove`.
    Removed,
}

impl RemovalCause {
    /// Only evictions happen because of space pressure; the other causes come from the caller.
    pub fn is_evicted(self) -> bool {
        matches!(self, RemovalCause::Evicted)
    }
}

/// Notified exactly once for every entry leaving a cache, except through `clear`.
///
/// `new_value` is only present for [RemovalCause::Replaced].
///
/// Listeners of a [SynchronizedEvictionCache] run with the cache's lock held.  They must not call back into the same
/// cache, which would deadlock, and they should not block for long.
pub trait RemovalListener<K, V> {
    fn on_entry_removed(
        &mut self,
        cause: RemovalCause,
        key: &K,
        old_value: &V,
        new_value: Option<&V>,
    );
}

/// The listener used when nobody cares.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl<K, V> RemovalListener<K, V> for NoopListener {
    fn on_entry_removed(
        &mut self,
        _cause: RemovalCause,
        _key: &K,
        _old_value: &V,
        _new_value: Option<&V>,
    ) {
    }
}

/// An optional listener, for wiring which only sometimes has someone to notify.
impl<K, V, L: RemovalListener<K, V>> RemovalListener<K, V> for Option<L> {
    fn on_entry_removed(
        &mut self,
        cause: RemovalCause,
        key: &K,
        old_value: &V,
        new_value: Option<&V>,
    ) {
        if let Some(l) = self {
            l.on_entry_removed(cause, key, old_value, new_value);
        }
    }
}

/// A [RemovalListener] backed by a closure.
pub struct FnListener<F>(pub F);

impl<K, V, F> RemovalListener<K, V> for FnListener<F>
where
    F: FnMut(RemovalCause, &K, &V, Option<&V>),
{
    fn on_entry_removed(
        &mut self,
        cause: RemovalCause,
        key: &K,
        old_value: &V,
        new_value: Option<&V>,
    ) {
        (self.0)(cause, key, old_value, new_value)
    }
}

/// A thread-safe collector of large reusable objects.
///
/// The pool is its own synchronization domain.  Caches only ever call [ResourcePool::release], from their removal
/// listeners; acquiring is left to whoever is about to build a new large value.
pub trait ResourcePool<R>: Send + Sync {
    /// Take a resource whose allocation is at least `min_cost`, if the pool has one nobody else is using.
    fn acquire(&self, min_cost: u64) -> Option<R>;

    /// Offer a resource for reuse.  Unusable resources are dropped quietly.
    fn release(&self, resource: Arc<R>);

    fn clear(&self);
}
