//! The [CompositeCache] keeps large recyclable values and everything else in two separate caches.
//!
//! Typically, the pooled side holds decoded buffers bounded by bytes and wired to a [ResourcePool], while the other
//! side holds small values bounded by count.  Splitting them gives each its own eviction budget, and means only the
//! values which are worth recycling ever reach the pool.
//!
//! A key lives in at most one of the two caches.  Putting a value into one side removes the key from the other.
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::*;

/// A value stored in a [CompositeCache].  The variant decides which backing cache it goes to.
#[derive(Debug, PartialEq)]
pub enum CachedValue<R, O> {
    /// A large resource which should be recycled once the cache is done with it.
    Pooled(Arc<R>),
    Other(O),
}

impl<R, O: Clone> Clone for CachedValue<R, O> {
    fn clone(&self) -> Self {
        match self {
            CachedValue::Pooled(r) => CachedValue::Pooled(r.clone()),
            CachedValue::Other(o) => CachedValue::Other(o.clone()),
        }
    }
}

impl<R, O> CachedValue<R, O> {
    pub fn as_pooled(&self) -> Option<&Arc<R>> {
        match self {
            CachedValue::Pooled(r) => Some(r),
            CachedValue::Other(_) => None,
        }
    }

    pub fn as_other(&self) -> Option<&O> {
        match self {
            CachedValue::Other(o) => Some(o),
            CachedValue::Pooled(_) => None,
        }
    }
}

#[derive(Clone, Debug, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct CompositeCacheConfig {
    /// Maximum total allocation size of the pooled cache, in bytes.  0 means pooled values aren't cached.
    pub max_pooled_size: u64,
    /// Maximum number of entries in the other cache.  0 means other values aren't cached.
    pub max_other_count: u64,
    /// How many released resources the pool keeps around.  0 means no pool at all.
    #[builder(default)]
    pub max_pool_resources: usize,
}

impl CompositeCacheConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.max_pooled_size == Some(0) && self.max_pool_resources.unwrap_or(0) > 0 {
            return Err("a resource pool needs a pooled cache to feed it".into());
        }
        Ok(())
    }
}

pub struct CompositeCache<K, R, O, A, B> {
    pooled: A,
    other: B,
    /// Cleared along with the caches.
    pool: Option<Arc<dyn ResourcePool<R>>>,
    _marker: PhantomData<fn() -> (K, O)>,
}

/// The pooled side of the standard wiring: sized by allocation, releasing into the pool if there is one.
pub type PooledCache<K, R> = EvictionCache<K, Arc<R>, AllocationSize, Option<PoolReleaser<R>>>;

/// One side of the standard wiring: a bounded cache, or an [EmptyCache] when configured with no capacity.
pub type BackingCache<K, V> = Box<dyn SizedCache<K, V> + Send>;

/// The standard wiring built by [CompositeCache::with_config].
pub type PooledCompositeCache<K, R, O> =
    CompositeCache<K, R, O, BackingCache<K, Arc<R>>, BackingCache<K, O>>;

impl<K, R, O, A, B> CompositeCache<K, R, O, A, B> {
    pub fn new(pooled: A, other: B) -> CompositeCache<K, R, O, A, B> {
        CompositeCache {
            pooled,
            other,
            pool: None,
            _marker: PhantomData,
        }
    }

    /// Attach the pool the pooled cache releases into, so that [Cache::clear] empties it as well.
    pub fn with_pool(mut self, pool: Arc<dyn ResourcePool<R>>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// The pool for the decode path to acquire buffers from, if any.
    pub fn resource_pool(&self) -> Option<&Arc<dyn ResourcePool<R>>> {
        self.pool.as_ref()
    }

    pub fn pooled_cache(&self) -> &A {
        &self.pooled
    }

    pub fn other_cache(&self) -> &B {
        &self.other
    }
}

impl<K, R, O> PooledCompositeCache<K, R, O>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Recyclable + Send + Sync + 'static,
    O: Clone + Send + 'static,
{
    pub fn with_config(config: CompositeCacheConfig) -> Result<PooledCompositeCache<K, R, O>> {
        let pool = if config.max_pooled_size > 0 && config.max_pool_resources > 0 {
            let pool: Arc<dyn ResourcePool<R>> =
                Arc::new(LinkedResourcePool::new(config.max_pool_resources)?);
            Some(pool)
        } else {
            None
        };

        let pooled: BackingCache<K, Arc<R>> = if config.max_pooled_size > 0 {
            Box::new(EvictionCache::<K, Arc<R>, _, _>::with_parts(
                config.max_pooled_size,
                AllocationSize,
                pool.clone().map(PoolReleaser::new),
            )?)
        } else {
            log::debug!("Composite cache configured without a pooled cache");
            Box::new(EmptyCache)
        };
        let other: BackingCache<K, O> = if config.max_other_count > 0 {
            Box::new(EvictionCache::<K, O>::new(config.max_other_count)?)
        } else {
            log::debug!("Composite cache configured without an other cache");
            Box::new(EmptyCache)
        };

        let mut ret = CompositeCache::new(pooled, other);
        ret.pool = pool;
        Ok(ret)
    }
}

impl<K, R, O, A, B> Cache<K, CachedValue<R, O>> for CompositeCache<K, R, O, A, B>
where
    K: Clone,
    A: Cache<K, Arc<R>>,
    B: Cache<K, O>,
{
    fn get(&mut self, key: &K) -> Option<CachedValue<R, O>> {
        if let Some(x) = self.pooled.get(key) {
            return Some(CachedValue::Pooled(x));
        }
        self.other.get(key).map(CachedValue::Other)
    }

    fn put(&mut self, key: K, value: CachedValue<R, O>) -> Result<Option<CachedValue<R, O>>> {
        // Put first, so that a rejected value leaves both caches alone.
        let (previous, displaced) = match value {
            CachedValue::Pooled(v) => {
                let previous = self.pooled.put(key.clone(), v)?.map(CachedValue::Pooled);
                (previous, self.other.remove(&key).map(CachedValue::Other))
            }
            CachedValue::Other(v) => {
                let previous = self.other.put(key.clone(), v)?.map(CachedValue::Other);
                (previous, self.pooled.remove(&key).map(CachedValue::Pooled))
            }
        };
        Ok(previous.or(displaced))
    }

    fn remove(&mut self, key: &K) -> Option<CachedValue<R, O>> {
        if let Some(x) = self.pooled.remove(key) {
            return Some(CachedValue::Pooled(x));
        }
        self.other.remove(key).map(CachedValue::Other)
    }

    fn contains_key(&self, key: &K) -> bool {
        self.pooled.contains_key(key) || self.other.contains_key(key)
    }

    fn clear(&mut self) {
        self.pooled.clear();
        self.other.clear();
        if let Some(pool) = self.pool.as_ref() {
            pool.clear();
        }
    }

    fn snapshot(&self) -> Vec<(K, CachedValue<R, O>)> {
        let pooled = self
            .pooled
            .snapshot()
            .into_iter()
            .map(|(k, v)| (k, CachedValue::Pooled(v)));
        let other = self
            .other
            .snapshot()
            .into_iter()
            .map(|(k, v)| (k, CachedValue::Other(v)));
        pooled.chain(other).collect()
    }

    fn trim_memory(&mut self, level: TrimLevel) {
        self.pooled.trim_memory(level);
        self.other.trim_memory(level);

        // Whatever the trim evicted is sitting in the pool now, still allocated.
        if level > TrimLevel::Mild {
            if let Some(pool) = self.pool.as_ref() {
                pool.clear();
            }
        }
    }
}
