//! A [SynchronizedEvictionCache] is an [EvictionCache] behind one mutex.
//!
//! Every operation holds the lock from start to finish, including while the removal listener runs.  That is what makes
//! the cause and the old/new values a listener sees agree with what the cache actually did even when another thread
//! is writing the same key, and it is also why a listener must never call back into the cache that invoked it: the
//! lock isn't reentrant, so doing so deadlocks.
use std::hash::Hash;

use parking_lot::Mutex;

use crate::*;

pub struct SynchronizedEvictionCache<K: Hash + Eq, V, S = UnitSize, L = NoopListener> {
    inner: Mutex<EvictionCache<K, V, S, L>>,
}

impl<K: Hash + Eq, V> SynchronizedEvictionCache<K, V> {
    pub fn new(max_size: u64) -> Result<SynchronizedEvictionCache<K, V>> {
        Ok(EvictionCache::new(max_size)?.into())
    }
}

impl<K: Hash + Eq, V, S, L> From<EvictionCache<K, V, S, L>>
    for SynchronizedEvictionCache<K, V, S, L>
{
    fn from(cache: EvictionCache<K, V, S, L>) -> Self {
        SynchronizedEvictionCache {
            inner: Mutex::new(cache),
        }
    }
}

impl<K: Hash + Eq, V, S, L> SynchronizedEvictionCache<K, V, S, L> {
    pub fn with_parts(
        max_size: u64,
        sizer: S,
        listener: L,
    ) -> Result<SynchronizedEvictionCache<K, V, S, L>> {
        Ok(EvictionCache::with_parts(max_size, sizer, listener)?.into())
    }

    /// Run `f` against the underlying cache with the lock held, for compound operations that must not interleave with
    /// other threads.
    pub fn with_lock<T>(&self, f: impl FnOnce(&mut EvictionCache<K, V, S, L>) -> T) -> T {
        f(&mut self.inner.lock())
    }

    pub fn into_inner(self) -> EvictionCache<K, V, S, L> {
        self.inner.into_inner()
    }

    pub fn size(&self) -> u64 {
        self.inner.lock().size()
    }

    pub fn max_size(&self) -> u64 {
        self.inner.lock().max_size()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn clear(&self) {
        self.inner.lock().clear()
    }
}

impl<K, V, S, L> SynchronizedEvictionCache<K, V, S, L>
where
    K: Hash + Eq,
    S: SizeOf<K, V>,
    L: RemovalListener<K, V>,
{
    pub fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.inner.lock().put(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().remove(key)
    }

    pub fn trim_to_size(&self, max_size: u64) {
        self.inner.lock().trim_to_size(max_size)
    }

    pub fn evict_all(&self) {
        self.inner.lock().evict_all()
    }

    pub fn size_of(&self, key: &K, value: &V) -> i64 {
        self.inner.lock().size_of(key, value)
    }
}

impl<K, V, S, L> SynchronizedEvictionCache<K, V, S, L>
where
    K: Hash + Eq,
    V: Clone,
{
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key)
    }
}

impl<K, V, S, L> SynchronizedEvictionCache<K, V, S, L>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.inner.lock().snapshot()
    }
}

impl<K, V, S, L> SynchronizedEvictionCache<K, V, S, L>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: SizeOf<K, V>,
    L: RemovalListener<K, V>,
{
    pub fn trim_memory(&self, level: TrimLevel) {
        MemoryPressureController::on_trim::<K, V, _>(&mut *self.inner.lock(), level)
    }
}

impl<K, V, S, L> Cache<K, V> for SynchronizedEvictionCache<K, V, S, L>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: SizeOf<K, V>,
    L: RemovalListener<K, V>,
{
    fn get(&mut self, key: &K) -> Option<V> {
        SynchronizedEvictionCache::get(self, key)
    }

    fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        SynchronizedEvictionCache::put(self, key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        SynchronizedEvictionCache::remove(self, key)
    }

    fn contains_key(&self, key: &K) -> bool {
        SynchronizedEvictionCache::contains_key(self, key)
    }

    fn clear(&mut self) {
        SynchronizedEvictionCache::clear(self)
    }

    fn snapshot(&self) -> Vec<(K, V)> {
        SynchronizedEvictionCache::snapshot(self)
    }

    fn trim_memory(&mut self, level: TrimLevel) {
        SynchronizedEvictionCache::trim_memory(self, level)
    }
}

impl<K, V, S, L> SizedCache<K, V> for SynchronizedEvictionCache<K, V, S, L>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: SizeOf<K, V>,
    L: RemovalListener<K, V>,
{
    fn size(&self) -> u64 {
        SynchronizedEvictionCache::size(self)
    }

    fn max_size(&self) -> u64 {
        SynchronizedEvictionCache::max_size(self)
    }

    fn trim_to_size(&mut self, max_size: u64) {
        SynchronizedEvictionCache::trim_to_size(self, max_size)
    }

    fn evict_all(&mut self) {
        SynchronizedEvictionCache::evict_all(self)
    }

    fn size_of(&self, key: &K, value: &V) -> i64 {
        SynchronizedEvictionCache::size_of(self, key, value)
    }
}
