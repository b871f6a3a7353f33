//! Recycling large values, such as decoded image buffers, instead of freeing them.
//!
//! A cache hands evicted and replaced values to a [ResourcePool] through a [PoolReleaser] listener.  The pool keeps
//! them as `Arc`s, since readers may still be holding on to a value the cache has let go of, and only gives one out
//! again once the pool's reference is the last.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::*;

/// Something worth recycling.
pub trait Recyclable {
    /// Bytes this resource can hold, which is what pool requests are matched against.
    fn allocation_size(&self) -> u64;

    /// Whether this resource can still be reused at all.
    fn is_reusable(&self) -> bool {
        true
    }
}

impl<T> Recyclable for Vec<T> {
    fn allocation_size(&self) -> u64 {
        (self.capacity() * std::mem::size_of::<T>()) as u64
    }
}

/// A bounded pool which keeps its resources sorted by allocation size, smallest first.
///
/// When over capacity, the smallest resources are dropped first; they're the cheapest to recreate.
pub struct LinkedResourcePool<R> {
    max_resources: usize,
    resources: Mutex<Vec<Arc<R>>>,
}

impl<R: Recyclable> LinkedResourcePool<R> {
    pub fn new(max_resources: usize) -> Result<LinkedResourcePool<R>> {
        if max_resources == 0 {
            return Err(CacheError::InvalidCapacity(0));
        }

        Ok(LinkedResourcePool {
            max_resources,
            resources: Mutex::new(Vec::with_capacity(max_resources)),
        })
    }

    pub fn max_resources(&self) -> usize {
        self.max_resources
    }

    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.lock().is_empty()
    }
}

impl<R: Recyclable + Send + Sync> ResourcePool<R> for LinkedResourcePool<R> {
    fn acquire(&self, min_cost: u64) -> Option<R> {
        let mut guard = self.resources.lock();
        // Skip anything a reader still shares: it can't be handed out for writing yet.
        let pos = guard
            .iter()
            .position(|r| r.allocation_size() >= min_cost && Arc::strong_count(r) == 1)?;
        Arc::try_unwrap(guard.remove(pos)).ok()
    }

    fn release(&self, resource: Arc<R>) {
        if !resource.is_reusable() {
            log::debug!("Dropping a resource which can't be reused");
            return;
        }

        let mut guard = self.resources.lock();
        if guard.iter().any(|r| Arc::ptr_eq(r, &resource)) {
            debug_assert!(false, "Resource released to the pool twice");
            log::warn!("Ignoring a resource which is already in the pool");
            return;
        }

        let size = resource.allocation_size();
        let pos = guard.partition_point(|r| r.allocation_size() <= size);
        guard.insert(pos, resource);

        let excess = guard.len().saturating_sub(self.max_resources);
        guard.drain(..excess);
    }

    fn clear(&self) {
        self.resources.lock().clear();
    }
}

/// A [RemovalListener] giving values which left a cache to a [ResourcePool].
///
/// Evicted values always go to the pool, and replaced ones do unless the replacement is the very same object.
/// Explicitly removed values are returned to whoever removed them, so those stay out of the pool.
pub struct PoolReleaser<R> {
    pool: Arc<dyn ResourcePool<R>>,
}

impl<R> PoolReleaser<R> {
    pub fn new(pool: Arc<dyn ResourcePool<R>>) -> PoolReleaser<R> {
        PoolReleaser { pool }
    }

    pub fn pool(&self) -> &Arc<dyn ResourcePool<R>> {
        &self.pool
    }
}

impl<K, R> RemovalListener<K, Arc<R>> for PoolReleaser<R> {
    fn on_entry_removed(
        &mut self,
        cause: RemovalCause,
        _key: &K,
        old_value: &Arc<R>,
        new_value: Option<&Arc<R>>,
    ) {
        let release = match cause {
            RemovalCause::Evicted => true,
            RemovalCause::Replaced => !new_value.map_or(false, |n| Arc::ptr_eq(old_value, n)),
            RemovalCause::Removed => false,
        };

        if release {
            self.pool.release(old_value.clone());
        }
    }
}
