//! An [EvictionCache] is an LRU cache which uses the cost of its entries to decide when to evict.
//!
//! What an entry costs is up to a [SizeOf] implementation, and who hears about entries leaving is up to a
//! [RemovalListener].  Both are plain type parameters, so a byte-bounded image cache which recycles its buffers and a
//! count-bounded file index are the same type with different parts plugged in.
//!
//! This type is single-threaded; see [SynchronizedEvictionCache] for the shared version.
use std::hash::Hash;
use std::sync::Arc;

use crate::*;

pub struct EvictionCache<K: Hash + Eq, V, S = UnitSize, L = NoopListener> {
    index: AccessOrderedIndex<K, V>,
    /// At what cost do we start evicting?
    max_size: u64,
    sizer: S,
    listener: L,
}

impl<K: Hash + Eq, V> EvictionCache<K, V> {
    /// A cache holding at most `max_size` entries, which tells nobody about evictions.
    pub fn new(max_size: u64) -> Result<EvictionCache<K, V>> {
        EvictionCache::with_parts(max_size, UnitSize, NoopListener)
    }
}

impl<K: Hash + Eq, V, S, L> EvictionCache<K, V, S, L> {
    pub fn with_parts(max_size: u64, sizer: S, listener: L) -> Result<EvictionCache<K, V, S, L>> {
        if max_size == 0 {
            log::error!("Refusing to build a cache with a max_size of 0");
            return Err(CacheError::InvalidCapacity(max_size));
        }

        Ok(EvictionCache {
            index: AccessOrderedIndex::new(),
            max_size,
            sizer,
            listener,
        })
    }

    /// Swap the size function.  Entries already present keep the cost they were inserted with.
    pub fn with_sizer<S2>(self, sizer: S2) -> EvictionCache<K, V, S2, L> {
        EvictionCache {
            index: self.index,
            max_size: self.max_size,
            sizer,
            listener: self.listener,
        }
    }

    /// Swap the removal listener.
    pub fn with_listener<L2>(self, listener: L2) -> EvictionCache<K, V, S, L2> {
        EvictionCache {
            index: self.index,
            max_size: self.max_size,
            sizer: self.sizer,
            listener,
        }
    }

    pub fn size(&self) -> u64 {
        self.index.total_cost()
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Number of entries, regardless of their cost.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Look at a value without making it more recent.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.index.peek(key)
    }

    /// Drop every entry and reset the size, without calling the listener.
    ///
    /// This is the cheap way out.  Use [EvictionCache::evict_all] when the listener has to see the values, for example
    /// to hand buffers back to a pool.
    pub fn clear(&mut self) {
        self.index.clear();
    }

    /// Iterator visiting entries in least-recently-used order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.index.iter()
    }
}

impl<K, V, S, L> EvictionCache<K, V, S, L>
where
    K: Hash + Eq,
    S: SizeOf<K, V>,
    L: RemovalListener<K, V>,
{
    /// Compute and validate the cost of an entry before anything is mutated.
    ///
    /// The running size after the insert must still fit, counting the cost a replaced entry gives back.
    fn cost_of(&self, key: &K, value: &V) -> Result<u64> {
        let size = self.sizer.size_of(key, value);
        let cost = u64::try_from(size).map_err(|_| {
            log::error!("Size function returned {} for a cache entry; rejecting it", size);
            CacheError::NegativeSize { size }
        })?;

        let current = self.index.total_cost() - self.index.cost_of(key).unwrap_or(0);
        match current.checked_add(cost) {
            Some(_) => Ok(cost),
            None => {
                log::error!(
                    "Cache entry of cost {} would overflow a cache of size {}; rejecting it",
                    cost,
                    current
                );
                Err(CacheError::SizeOverflow {
                    size: current,
                    cost,
                })
            }
        }
    }

    pub fn size_of(&self, key: &K, value: &V) -> i64 {
        self.sizer.size_of(key, value)
    }

    /// Add an entry to the cache, returning the previous value if this key was already present.
    ///
    /// The replaced value is reported to the listener before the cache trims itself back down to `max_size`.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        let cost = self.cost_of(&key, &value)?;
        let key = Arc::new(key);
        let previous = self.index.insert(key.clone(), value, cost);

        if let Some(old) = previous.as_ref() {
            let new = self.index.peek(&key);
            self.listener
                .on_entry_removed(RemovalCause::Replaced, &key, old, new);
        }

        self.trim_to_size(self.max_size);
        Ok(previous)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (key, old) = self.index.remove(key)?;
        self.listener
            .on_entry_removed(RemovalCause::Removed, &key, &old, None);
        Some(old)
    }

    /// Evict least recently used entries until the size is at most `max_size`.
    pub fn trim_to_size(&mut self, max_size: u64) {
        while self.index.total_cost() > max_size {
            let (key, old) = match self.index.pop_least_recent() {
                Some(x) => x,
                None => panic!("Not enough entries to explain cost"),
            };
            self.listener
                .on_entry_removed(RemovalCause::Evicted, &key, &old, None);
        }
    }

    /// Evict everything, zero-cost entries included, telling the listener about each one.
    pub fn evict_all(&mut self) {
        while let Some((key, old)) = self.index.pop_least_recent() {
            self.listener
                .on_entry_removed(RemovalCause::Evicted, &key, &old, None);
        }
    }
}

impl<K, V, S, L> EvictionCache<K, V, S, L>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Look up a value, making it the most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.index.get(key).cloned()
    }
}

impl<K, V, S, L> EvictionCache<K, V, S, L>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Copy out the current contents, least recently used first.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.index
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K, V, S, L> Cache<K, V> for EvictionCache<K, V, S, L>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: SizeOf<K, V>,
    L: RemovalListener<K, V>,
{
    fn get(&mut self, key: &K) -> Option<V> {
        EvictionCache::get(self, key)
    }

    fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        EvictionCache::put(self, key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        EvictionCache::remove(self, key)
    }

    fn contains_key(&self, key: &K) -> bool {
        EvictionCache::contains_key(self, key)
    }

    fn clear(&mut self) {
        EvictionCache::clear(self)
    }

    fn snapshot(&self) -> Vec<(K, V)> {
        EvictionCache::snapshot(self)
    }

    fn trim_memory(&mut self, level: TrimLevel) {
        MemoryPressureController::on_trim::<K, V, _>(self, level)
    }
}

impl<K, V, S, L> SizedCache<K, V> for EvictionCache<K, V, S, L>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: SizeOf<K, V>,
    L: RemovalListener<K, V>,
{
    fn size(&self) -> u64 {
        EvictionCache::size(self)
    }

    fn max_size(&self) -> u64 {
        EvictionCache::max_size(self)
    }

    fn trim_to_size(&mut self, max_size: u64) {
        EvictionCache::trim_to_size(self, max_size)
    }

    fn evict_all(&mut self) {
        EvictionCache::evict_all(self)
    }

    fn size_of(&self, key: &K, value: &V) -> i64 {
        EvictionCache::size_of(self, key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lru::LruCache;
    use proptest::prelude::*;

    type Log = Vec<(RemovalCause, u64, u64, Option<u64>)>;

    /// A listener recording every call it gets.
    #[derive(Default)]
    struct Recorder(Log);

    impl RemovalListener<u64, u64> for Recorder {
        fn on_entry_removed(
            &mut self,
            cause: RemovalCause,
            key: &u64,
            old: &u64,
            new: Option<&u64>,
        ) {
            self.0.push((cause, *key, *old, new.copied()));
        }
    }

    fn recording_cache(max_size: u64) -> EvictionCache<u64, u64, UnitSize, Recorder> {
        EvictionCache::with_parts(max_size, UnitSize, Recorder::default()).unwrap()
    }

    fn keys<S, L>(cache: &EvictionCache<u64, u64, S, L>) -> Vec<u64> {
        cache.iter().map(|(k, _)| *k).collect()
    }

    /// Simple helper to build proptest strategies so that we can test the one-based base case against [LruCache].
    #[derive(Copy, Clone, Debug, Ord, Eq, PartialOrd, PartialEq)]
    enum CacheCommand {
        Put(u64, u64),
        Get(u64),
        Delete(u64),
        Trim(u64),
    }

    fn cache_command_strat(
        max_key: std::ops::Range<u64>,
        max_value: std::ops::Range<u64>,
    ) -> prop::strategy::BoxedStrategy<CacheCommand> {
        proptest::prop_oneof![
            max_key.clone().prop_map(CacheCommand::Get),
            (max_key.clone(), max_value).prop_map(|(x, y)| CacheCommand::Put(x, y)),
            max_key.prop_map(CacheCommand::Delete),
        ]
        .boxed()
    }

    fn weighted_command_strat() -> prop::strategy::BoxedStrategy<CacheCommand> {
        proptest::prop_oneof![
            4 => cache_command_strat(0..50, 0..20),
            1 => (0..40u64).prop_map(CacheCommand::Trim),
        ]
        .boxed()
    }

    // Run some tests against bounded lru caches.  When we set max_size to the capacity and the cost of
    // all inputted keys as 1, we get something exactly equivalent to `[LruCache].
    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 500,
            max_shrink_iters: 100000,
            ..Default::default()
        })]
        #[test]
        fn test_against_lru_cache_bounded(
            bound in 1..200u64,
            commands in prop::collection::vec(cache_command_strat(0..100, 0..10000), 0..2000)
        ) {
            let mut known_good = LruCache::<u64, u64>::new(bound as usize);
            let mut ours = EvictionCache::<u64, u64>::new(bound).unwrap();

            for c in commands {
                use CacheCommand::*;

                match c {
                    Get(k) => prop_assert_eq!(known_good.get(&k).cloned(), ours.get(&k)),
                    Put(k, v) => prop_assert_eq!(known_good.put(k, v), ours.put(k, v).unwrap()),
                    Delete(k) => prop_assert_eq!(known_good.pop(&k), ours.remove(&k)),
                    Trim(_) => unreachable!(),
                }

                let good_state = known_good.iter().rev().map(|(k, v)| (*k, *v)).collect::<Vec<_>>();
                prop_assert_eq!(&good_state, &ours.snapshot());
            }
        }

        // With costs taken from the values, the running size must always match a recount, stay within capacity after
        // every put, and every entry that left must have been reported exactly once.
        #[test]
        fn test_size_invariant(
            bound in 1..60u64,
            commands in prop::collection::vec(weighted_command_strat(), 0..1000)
        ) {
            let mut ours = EvictionCache::with_parts(
                bound,
                FnSize(|_k: &u64, v: &u64| *v as i64),
                Recorder::default(),
            ).unwrap();
            let mut inserted = 0usize;

            for c in commands {
                use CacheCommand::*;

                match c {
                    Get(k) => { ours.get(&k); },
                    Put(k, v) => {
                        ours.put(k, v).unwrap();
                        inserted += 1;
                        prop_assert!(ours.size() <= ours.max_size());
                    },
                    Delete(k) => { ours.remove(&k); },
                    Trim(t) => {
                        ours.trim_to_size(t);
                        prop_assert!(ours.size() <= t);
                    },
                }

                let recount: u64 = ours.iter().map(|(_, v)| *v).sum();
                prop_assert_eq!(recount, ours.size());
                prop_assert_eq!(inserted, ours.len() + ours.listener().0.len());
            }
        }
    }

    // We know everything else works, including complex linked lists for eviction, but let's still check what happens
    // with costs other than one.
    #[test]
    fn test_eviction() {
        let mut cache = EvictionCache::<u64, u64>::new(10)
            .unwrap()
            .with_sizer(FnSize(|k: &u64, _v: &u64| *k as i64));
        for i in 1..=5 {
            cache.put(i, i).unwrap();
        }

        assert_eq!(cache.snapshot(), vec![(4, 4), (5, 5)]);
        assert_eq!(cache.size(), 9);
    }

    #[test]
    fn test_lru_order() {
        let mut cache = recording_cache(2);
        cache.put(1, 10).unwrap();
        cache.put(2, 20).unwrap();
        cache.put(3, 30).unwrap();
        assert_eq!(keys(&cache), vec![2, 3]);

        cache.get(&2);
        cache.put(4, 40).unwrap();
        assert_eq!(keys(&cache), vec![2, 4]);

        let evicted = cache.listener().0.iter().map(|x| x.1).collect::<Vec<_>>();
        assert_eq!(evicted, vec![1, 3]);
    }

    #[test]
    fn test_end_to_end() {
        let mut cache = EvictionCache::<u64, &str>::new(3).unwrap();
        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.put(3, "c").unwrap();
        assert_eq!(cache.get(&1), Some("a"));
        cache.put(4, "d").unwrap();

        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.size(), 3);
        let mut present = cache.snapshot().into_iter().map(|x| x.0).collect::<Vec<_>>();
        present.sort_unstable();
        assert_eq!(present, vec![1, 3, 4]);
    }

    #[test]
    fn test_removal_causes() {
        let mut cache = recording_cache(2);
        assert_eq!(cache.put(1, 10).unwrap(), None);
        assert_eq!(cache.put(1, 11).unwrap(), Some(10));
        assert_eq!(cache.remove(&1), Some(11));
        assert_eq!(cache.remove(&1), None);
        cache.put(2, 20).unwrap();
        cache.put(3, 30).unwrap();
        cache.put(4, 40).unwrap();

        assert_eq!(
            cache.listener().0,
            vec![
                (RemovalCause::Replaced, 1, 10, Some(11)),
                (RemovalCause::Removed, 1, 11, None),
                (RemovalCause::Evicted, 2, 20, None),
            ]
        );
        assert!(cache.listener().0[2].0.is_evicted());
        assert!(!cache.listener().0[0].0.is_evicted());
    }

    #[test]
    fn test_replacement_reported_before_trim() {
        let mut cache = EvictionCache::with_parts(
            4,
            FnSize(|_k: &u64, v: &u64| *v as i64),
            Recorder::default(),
        )
        .unwrap();
        cache.put(1, 2).unwrap();
        cache.put(2, 2).unwrap();
        // Growing key 2 pushes the cache over capacity.
        cache.put(2, 3).unwrap();

        assert_eq!(
            cache.listener().0,
            vec![
                (RemovalCause::Replaced, 2, 2, Some(3)),
                (RemovalCause::Evicted, 1, 2, None),
            ]
        );
        assert_eq!(cache.size(), 3);
    }

    #[test]
    fn test_clear_is_silent_but_evict_all_is_not() {
        let mut cache = recording_cache(5);
        for i in 0..3 {
            cache.put(i, i).unwrap();
        }
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
        assert!(cache.listener().0.is_empty());

        for i in 0..3 {
            cache.put(i, i).unwrap();
        }
        cache.evict_all();
        assert!(cache.is_empty());
        assert_eq!(cache.listener().0.len(), 3);
        assert!(cache.listener().0.iter().all(|x| x.0 == RemovalCause::Evicted));
    }

    #[test]
    fn test_zero_cost_entries() {
        let mut cache = EvictionCache::<u64, u64>::new(2)
            .unwrap()
            .with_sizer(FnSize(|_k: &u64, v: &u64| *v as i64));
        cache.put(1, 0).unwrap();
        cache.put(2, 1).unwrap();
        cache.put(3, 1).unwrap();
        cache.put(4, 0).unwrap();

        // Free entries don't push anything out, and nothing needs to push them out either.
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.size(), 2);

        // Trimming walks in recency order, so an old free entry goes as well.
        cache.trim_to_size(0);
        assert_eq!(keys(&cache), vec![4]);
        assert_eq!(cache.size(), 0);

        cache.evict_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_size_overflow_rejected() {
        let mut cache = EvictionCache::with_parts(
            u64::MAX,
            FnSize(|_k: &u64, _v: &u64| i64::MAX),
            Recorder::default(),
        )
        .unwrap();
        cache.put(1, 1).unwrap();
        cache.put(2, 2).unwrap();
        let full = cache.size();
        assert_eq!(full, 2 * i64::MAX as u64);

        assert!(matches!(
            cache.put(3, 3),
            Err(CacheError::SizeOverflow { .. })
        ));
        assert_eq!(cache.size(), full);
        assert_eq!(keys(&cache), vec![1, 2]);
        assert!(cache.listener().0.is_empty());

        // Replacing an entry gives its cost back first, so this still fits.
        assert_eq!(cache.put(2, 4).unwrap(), Some(2));
        assert_eq!(cache.size(), full);
    }

    #[test]
    fn test_oversized_entry() {
        let mut cache = EvictionCache::<u64, u64>::new(5)
            .unwrap()
            .with_sizer(FnSize(|_k: &u64, v: &u64| *v as i64));
        cache.put(1, 2).unwrap();
        cache.put(2, 9).unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            EvictionCache::<u64, u64>::new(0),
            Err(CacheError::InvalidCapacity(0))
        ));

        let mut cache = recording_cache(3).with_sizer(FnSize(|k: &u64, _v: &u64| 1 - *k as i64));
        cache.put(0, 0).unwrap();
        assert!(matches!(
            cache.put(5, 5),
            Err(CacheError::NegativeSize { size: -4 })
        ));
        // Nothing about the cache changed.
        assert_eq!(keys(&cache), vec![0]);
        assert_eq!(cache.size(), 1);
        assert!(cache.listener().0.is_empty());
    }

    #[test]
    fn test_closure_listener() {
        let mut seen = vec![];
        {
            let record = |cause: RemovalCause, k: &u64, _old: &u64, _new: Option<&u64>| {
                seen.push((cause, *k))
            };
            let mut cache = EvictionCache::<u64, u64>::new(1)
                .unwrap()
                .with_listener(FnListener(record));
            cache.put(1, 1).unwrap();
            cache.put(2, 2).unwrap();
        }
        assert_eq!(seen, vec![(RemovalCause::Evicted, 1)]);
    }
}
