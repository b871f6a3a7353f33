//! Size functions, which assign each entry its cost.
//!
//! A cache's capacity and its running size are both expressed in whatever unit the size function uses: entries,
//! bytes, files.  Costs are computed once when an entry goes in and remembered, so a size function which answers
//! differently later (a file growing on disk, say) can't skew the cache's bookkeeping.
use std::path::PathBuf;
use std::sync::Arc;

use crate::*;

/// Compute the cost of an entry.  Must not be negative; caches reject entries that are.
pub trait SizeOf<K, V> {
    fn size_of(&self, key: &K, value: &V) -> i64;
}

/// Every entry costs 1, so the capacity is an entry count.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnitSize;

impl<K, V> SizeOf<K, V> for UnitSize {
    fn size_of(&self, _key: &K, _value: &V) -> i64 {
        1
    }
}

/// A size function backed by a closure.
pub struct FnSize<F>(pub F);

impl<K, V, F> SizeOf<K, V> for FnSize<F>
where
    F: Fn(&K, &V) -> i64,
{
    fn size_of(&self, key: &K, value: &V) -> i64 {
        (self.0)(key, value)
    }
}

/// Estimate how many bytes a value holds on to, for [ByteSize].
pub trait EstimateCost {
    fn estimate_cost(&self) -> usize;
}

impl EstimateCost for String {
    fn estimate_cost(&self) -> usize {
        self.len()
    }
}

impl<T> EstimateCost for Vec<T> {
    fn estimate_cost(&self) -> usize {
        self.capacity() * std::mem::size_of::<T>()
    }
}

impl<T: EstimateCost + ?Sized> EstimateCost for Arc<T> {
    fn estimate_cost(&self) -> usize {
        (**self).estimate_cost()
    }
}

/// Size entries by [EstimateCost] on the value.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByteSize;

impl<K, V: EstimateCost> SizeOf<K, V> for ByteSize {
    fn size_of(&self, _key: &K, value: &V) -> i64 {
        i64::try_from(value.estimate_cost()).unwrap_or(i64::MAX)
    }
}

/// Size pooled resources by their allocation, which is what a [ResourcePool] matches requests against.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllocationSize;

impl<K, R: Recyclable> SizeOf<K, Arc<R>> for AllocationSize {
    fn size_of(&self, _key: &K, value: &Arc<R>) -> i64 {
        i64::try_from(value.allocation_size()).unwrap_or(i64::MAX)
    }
}

/// Size file entries by their length on disk.  A file which can't be inspected costs nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileLength;

impl<K> SizeOf<K, PathBuf> for FileLength {
    fn size_of(&self, _key: &K, value: &PathBuf) -> i64 {
        match std::fs::metadata(value) {
            Ok(meta) => i64::try_from(meta.len()).unwrap_or(i64::MAX),
            Err(e) => {
                log::debug!("Unable to read the length of {}: {}", value.display(), e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sizes() {
        assert_eq!(SizeOf::<u32, &str>::size_of(&UnitSize, &1, &"abc"), 1);
        assert_eq!(ByteSize.size_of(&1u32, &"hello".to_string()), 5);
        assert_eq!(ByteSize.size_of(&1u32, &Arc::new(Vec::<u32>::with_capacity(4))), 16);

        let doubled = FnSize(|k: &u64, _v: &()| (*k as i64) * 2);
        assert_eq!(doubled.size_of(&21, &()), 42);
    }

    #[test]
    fn test_file_length() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("f");
        std::fs::write(&path, "abcdef").unwrap();
        assert_eq!(FileLength.size_of(&"f", &path), 6);
        assert_eq!(FileLength.size_of(&"g", &tmp_dir.path().join("g")), 0);
    }
}
