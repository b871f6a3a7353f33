//! The error type shared by every cache in this crate.
//!
//! Misses are never errors.  What ends up here is either a caller mistake which we reject before touching any state,
//! or an I/O failure from one of the operations which reports them instead of logging.
use std::io::Error as IoError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A key or path the cache cannot work with, such as an empty key for a file cache.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Caches must be able to hold something.
    #[error("invalid capacity {0}: max_size must be greater than zero")]
    InvalidCapacity(u64),
    /// A size function returned a negative cost.
    #[error("negative size {size} computed for a cache entry")]
    NegativeSize { size: i64 },
    /// Adding an entry would take the running size past `u64::MAX`.
    #[error("adding an entry of cost {cost} to a cache of size {size} overflows")]
    SizeOverflow { size: u64, cost: u64 },
    #[error(transparent)]
    Io(#[from] IoError),
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
