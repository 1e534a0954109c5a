use crate::types::{CustomerId, CustomerScore};
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

/// An immutable, fully ordered view of every customer with a positive score.
///
/// Entries are sorted by score descending, ties broken by ascending id, and
/// every id appears at most once. A snapshot is never modified after it is
/// published; readers holding an [`Arc<Snapshot>`] keep a consistent view for
/// as long as they need it.
#[derive(Debug, Default)]
pub struct Snapshot {
    version: u64,
    entries: Vec<CustomerScore>,
    positions: HashMap<CustomerId, usize>,
}

impl Snapshot {
    /// Builds a snapshot from entries that are already in rank order.
    pub fn from_ordered(version: u64, entries: Vec<CustomerScore>) -> Self {
        let positions = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.customer_id, position))
            .collect();
        Self {
            version,
            entries,
            positions,
        }
    }

    /// Number of rebuild flushes that led to this snapshot. The initial empty
    /// snapshot has version 0.
    pub const fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[CustomerScore] {
        &self.entries
    }

    /// 0-indexed position of `id`, if it is ranked.
    pub fn position_of(&self, id: CustomerId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared slot holding the latest published [`Snapshot`].
///
/// Publication is a single pointer swap, so a reader observes either the old
/// or the new snapshot in full.
#[derive(Clone, Debug)]
pub struct SnapshotCell {
    current: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(Snapshot::default())),
        }
    }

    /// Returns the latest published snapshot.
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub(crate) fn publish(&self, snapshot: Snapshot) {
        self.current.store(Arc::new(snapshot));
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}
