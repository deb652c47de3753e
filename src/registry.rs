//! A thread-safe in-memory registry of the currently active flag definitions. [`FlagRegistry`]
//! provides concurrent access for readers (flag evaluation) and a writer (the synchronizer).
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};

use crate::FlagDefinition;

/// An immutable set of flag definitions valid at a point in time.
#[derive(Debug)]
pub struct Snapshot {
    flags: HashMap<String, Arc<FlagDefinition>>,
    generation: u64,
    updated_at: DateTime<Utc>,
}

impl Snapshot {
    fn new(flags: HashMap<String, Arc<FlagDefinition>>, generation: u64) -> Snapshot {
        Snapshot {
            flags,
            generation,
            updated_at: Utc::now(),
        }
    }

    /// Definition of the given flag, if known.
    pub fn get(&self, flag_key: &str) -> Option<&FlagDefinition> {
        self.flags.get(flag_key).map(Arc::as_ref)
    }

    /// All definitions in this snapshot.
    pub fn flags(&self) -> &HashMap<String, Arc<FlagDefinition>> {
        &self.flags
    }

    /// Publication counter. Later snapshots have strictly greater generations.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When this snapshot was published.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Number of flags in the snapshot.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns `true` if the snapshot holds no flags.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// `FlagRegistry` provides a thread-safe (`Sync`) storage for flag definitions that allows
/// concurrent access for readers and writers.
///
/// Snapshots are immutable and can only be replaced completely. A reader that obtained a snapshot
/// keeps seeing the same definitions no matter how many updates are published afterwards.
#[derive(Debug)]
pub struct FlagRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl Default for FlagRegistry {
    fn default() -> Self {
        FlagRegistry {
            snapshot: RwLock::new(Arc::new(Snapshot::new(HashMap::new(), 0))),
        }
    }
}

impl FlagRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        FlagRegistry::default()
    }

    /// Create a registry pre-seeded with the given definitions.
    pub fn with_flags(flags: impl IntoIterator<Item = FlagDefinition>) -> Self {
        let registry = FlagRegistry::new();
        registry.replace_all(flags);
        registry
    }

    /// Currently active snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        // The lock is only held for an `Arc` clone or swap, and a writer cannot panic while
        // holding it, so recover the guard if the lock is somehow poisoned.
        let snapshot = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&snapshot)
    }

    /// Definition of the given flag in the current snapshot.
    pub fn get(&self, flag_key: &str) -> Option<Arc<FlagDefinition>> {
        self.snapshot().flags.get(flag_key).cloned()
    }

    /// Publish a new snapshot holding exactly `flags`.
    pub fn replace_all(&self, flags: impl IntoIterator<Item = FlagDefinition>) -> Arc<Snapshot> {
        let flags = flags
            .into_iter()
            .map(|flag| (flag.key.clone(), Arc::new(flag)))
            .collect();
        self.publish(flags)
    }

    /// Publish `flags` only if they differ from the current snapshot. Returns `true` if a new
    /// snapshot was published.
    pub fn replace_if_changed(&self, flags: HashMap<String, Arc<FlagDefinition>>) -> bool {
        if self.snapshot().flags == flags {
            return false;
        }
        self.publish(flags);
        true
    }

    pub(crate) fn publish(&self, flags: HashMap<String, Arc<FlagDefinition>>) -> Arc<Snapshot> {
        let mut slot = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Generation is derived under the write lock so concurrent writers can never publish out
        // of order.
        let snapshot = Arc::new(Snapshot::new(flags, slot.generation + 1));
        *slot = Arc::clone(&snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use super::FlagRegistry;
    use crate::{Feature, FlagDefinition};

    fn flags(keys: &[&str]) -> Vec<FlagDefinition> {
        keys.iter().map(|key| Feature::new(*key).build()).collect()
    }

    #[test]
    fn starts_empty() {
        let registry = FlagRegistry::new();
        assert!(registry.snapshot().is_empty());
        assert_eq!(registry.snapshot().generation(), 0);
        assert!(registry.get("anything").is_none());
    }

    #[test]
    fn can_replace_flags_from_another_thread() {
        let registry = Arc::new(FlagRegistry::new());

        {
            let registry = registry.clone();
            let _ = std::thread::spawn(move || {
                registry.replace_all(flags(&["feature-one", "feature-two"]));
            })
            .join();
        }

        assert_eq!(registry.snapshot().len(), 2);
        assert!(registry.get("feature-one").is_some());
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let registry = FlagRegistry::with_flags(flags(&["feature-one"]));
        let before = registry.snapshot();

        registry.replace_all(flags(&["feature-two"]));

        assert!(before.get("feature-one").is_some());
        assert!(before.get("feature-two").is_none());
        assert!(registry.get("feature-one").is_none());
        assert!(registry.snapshot().generation() > before.generation());
    }

    #[test]
    fn unchanged_flags_are_not_republished() {
        let registry = FlagRegistry::with_flags(flags(&["feature-one"]));
        let generation = registry.snapshot().generation();

        let same: HashMap<_, _> = flags(&["feature-one"])
            .into_iter()
            .map(|flag| (flag.key.clone(), Arc::new(flag)))
            .collect();
        assert!(!registry.replace_if_changed(same));
        assert_eq!(registry.snapshot().generation(), generation);

        let different: HashMap<_, _> = flags(&["feature-one", "feature-two"])
            .into_iter()
            .map(|flag| (flag.key.clone(), Arc::new(flag)))
            .collect();
        assert!(registry.replace_if_changed(different));
        assert_eq!(registry.snapshot().generation(), generation + 1);
    }
}
