//! A set of size-bounded LRU caches, for holding decoded resources in memory and downloaded files on disk.
//!
//! Decoding something like an image is expensive, and so is fetching it, but a map from keys to values just grows
//! forever.  This crate bounds its caches by a cost assigned to each entry, and tells the outside world about every
//! entry which leaves so that large buffers can be recycled and files can be deleted.  The pieces are:
//!
//! [EvictionCache] is an LRU cache where each entry has a cost, computed by a [SizeOf] implementation.  When the total
//! cost goes over the maximum, the least recently used entries are evicted and reported to a [RemovalListener].  This
//! is the basic building block, and [SynchronizedEvictionCache] is the same thing behind a mutex.
//!
//! [LinkedResourcePool] collects large values which left a cache, via a [PoolReleaser] listener, and hands them out
//! again once nothing else references them.  [CompositeCache] wires this together: pooled values go to one cache bounded
//! by bytes, everything else to a second cache bounded by count, and each key lives in only one of them.
//!
//! [DiskIndexCache] keeps files in a sharded directory and an LRU index of them in memory, deleting files as their
//! entries are evicted.  [create_file_cache] picks between it and the unbounded [SimpleFileCache].
//!
//! Finally, [MemoryPressureController] translates platform trim notifications into trims of any [SizedCache].
mod access_index;
mod composite;
mod disk_cache;
mod error;
mod eviction_cache;
mod file_cache;
mod memory_pressure;
mod resource_pool;
mod size;
mod synchronized;
mod traits;

pub use access_index::*;
pub use composite::*;
pub use disk_cache::*;
pub use error::*;
pub use eviction_cache::*;
pub use file_cache::*;
pub use memory_pressure::*;
pub use resource_pool::*;
pub use size::*;
pub use synchronized::*;
pub use traits::*;
