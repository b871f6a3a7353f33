//! Mapping external memory pressure signals onto cache trims.
//!
//! Nothing in this crate listens for memory pressure on its own.  The embedding application forwards whatever its
//! platform tells it to [MemoryPressureController::on_trim] or [Cache::trim_memory], and the mapping here decides how
//! much of the cache to give up.
use crate::*;

/// How hard the system is asking us to give memory back, from least to most urgent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrimLevel {
    Mild,
    /// The UI went away, or memory is critically low while we're still in the foreground.
    Moderate,
    /// We're in the background and a candidate for being killed.
    Severe,
}

/// Component trim levels as delivered by the platform's memory callbacks.
pub mod component_level {
    pub const RUNNING_MODERATE: i32 = 5;
    pub const RUNNING_LOW: i32 = 10;
    pub const RUNNING_CRITICAL: i32 = 15;
    pub const UI_HIDDEN: i32 = 20;
    pub const BACKGROUND: i32 = 40;
    pub const MODERATE: i32 = 60;
    pub const COMPLETE: i32 = 80;
}

impl TrimLevel {
    /// Classify a raw platform trim level.
    pub fn from_component_level(level: i32) -> TrimLevel {
        use component_level::*;

        if level >= BACKGROUND {
            TrimLevel::Severe
        } else if level >= UI_HIDDEN || level == RUNNING_CRITICAL {
            TrimLevel::Moderate
        } else {
            TrimLevel::Mild
        }
    }
}

/// What to do to a cache at a given [TrimLevel].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimAction {
    Nothing,
    /// Evict the oldest entries until the cache is at most half its capacity.
    TrimToHalf,
    /// Drop everything, without notification.
    Clear,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryPressureController;

impl MemoryPressureController {
    pub fn action_for(level: TrimLevel) -> TrimAction {
        match level {
            TrimLevel::Mild => TrimAction::Nothing,
            TrimLevel::Moderate => TrimAction::TrimToHalf,
            TrimLevel::Severe => TrimAction::Clear,
        }
    }

    /// Apply the action for `level` to `cache`.
    pub fn on_trim<K, V, C: SizedCache<K, V> + ?Sized>(cache: &mut C, level: TrimLevel) {
        match Self::action_for(level) {
            TrimAction::Nothing => {}
            TrimAction::TrimToHalf => {
                let target = cache.max_size() / 2;
                log::debug!(
                    "Trimming cache from {} to {} under {:?} memory pressure",
                    cache.size(),
                    target,
                    level
                );
                cache.trim_to_size(target);
            }
            TrimAction::Clear => {
                log::debug!(
                    "Clearing cache of size {} under {:?} memory pressure",
                    cache.size(),
                    level
                );
                cache.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        use component_level::*;

        assert_eq!(TrimLevel::from_component_level(RUNNING_MODERATE), TrimLevel::Mild);
        assert_eq!(TrimLevel::from_component_level(RUNNING_LOW), TrimLevel::Mild);
        assert_eq!(TrimLevel::from_component_level(RUNNING_CRITICAL), TrimLevel::Moderate);
        assert_eq!(TrimLevel::from_component_level(UI_HIDDEN), TrimLevel::Moderate);
        assert_eq!(TrimLevel::from_component_level(BACKGROUND), TrimLevel::Severe);
        assert_eq!(TrimLevel::from_component_level(MODERATE), TrimLevel::Severe);
        assert_eq!(TrimLevel::from_component_level(COMPLETE), TrimLevel::Severe);
        assert!(TrimLevel::Mild < TrimLevel::Moderate && TrimLevel::Moderate < TrimLevel::Severe);
    }

    #[test]
    fn test_on_trim() {
        let mut evictions = 0;
        {
            let mut cache = EvictionCache::<u64, u64>::new(10).unwrap().with_listener(FnListener(
                |cause: RemovalCause, _k: &u64, _old: &u64, _new: Option<&u64>| {
                    assert!(cause.is_evicted());
                    evictions += 1;
                },
            ));
            for i in 0..10 {
                cache.put(i, i).unwrap();
            }

            cache.trim_memory(TrimLevel::Mild);
            assert_eq!(cache.size(), 10);

            cache.trim_memory(TrimLevel::Moderate);
            assert_eq!(cache.size(), 5);
            assert_eq!(cache.snapshot().first(), Some(&(5, 5)));

            cache.trim_memory(TrimLevel::Severe);
            assert!(cache.is_empty());
        }
        // Clearing doesn't notify, so only the five from the moderate trim were seen.
        assert_eq!(evictions, 5);
    }
}
