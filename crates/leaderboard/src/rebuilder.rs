//! The leaderboard rebuilder: sole consumer of score updates and sole writer
//! of the published snapshot.

use crate::{
    error::RebuildError,
    index::{RankIndex, RankStore},
    pipeline::Handler,
    snapshot::{Snapshot, SnapshotCell},
    types::{Order, ScoreUpdate},
};

/// Applies score updates to a [`RankStore`] and publishes the resulting
/// order as an immutable [`Snapshot`].
///
/// The rebuilder owns its store outright. Running it as the handler of a
/// single pipeline serializes every write, so neither the store nor the
/// snapshot cell needs a lock; readers only ever see fully built snapshots.
#[derive(Debug)]
pub struct Rebuilder<S = RankIndex> {
    store: S,
    view: SnapshotCell,
    version: u64,
    dirty: bool,
}

impl Rebuilder<RankIndex> {
    pub fn new() -> Self {
        Self::with_store(RankIndex::new())
    }
}

impl Default for Rebuilder<RankIndex> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RankStore> Rebuilder<S> {
    /// Creates a rebuilder over `store`, publishing into a fresh, empty
    /// snapshot cell.
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            view: SnapshotCell::new(),
            version: 0,
            dirty: false,
        }
    }

    /// Handle readers use to load the latest snapshot.
    pub fn view(&self) -> SnapshotCell {
        self.view.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Applies one update to the store without publishing.
    ///
    /// A positive score inserts or moves the customer; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns [`RebuildError::InvalidScore`] for negative or non-finite
    /// scores. The store is left untouched.
    pub fn apply(&mut self, update: &ScoreUpdate) -> Result<(), RebuildError> {
        let ScoreUpdate { id, score } = *update;
        if !score.is_finite() || score < 0.0 {
            return Err(RebuildError::InvalidScore { id, score });
        }

        if score > 0.0 {
            self.store.set_score(id, score);
            self.dirty = true;
        } else if self.store.remove(id).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    /// Publishes the store's current order if anything changed since the
    /// last publication.
    pub fn publish(&mut self) {
        if !self.dirty {
            return;
        }

        let entries = self
            .store
            .range_by_rank(0, usize::MAX, Order::Descending);
        self.version += 1;

        tracing::debug!(
            version = self.version,
            customers = entries.len(),
            "Publishing leaderboard snapshot"
        );

        self.view.publish(Snapshot::from_ordered(self.version, entries));
        self.dirty = false;
    }
}

impl<S: RankStore> Handler<ScoreUpdate> for Rebuilder<S> {
    type Error = RebuildError;

    fn handle(&mut self, update: &ScoreUpdate) -> Result<(), RebuildError> {
        self.apply(update)
    }

    fn flush(&mut self) {
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CustomerId;

    fn update(id: CustomerId, score: f64) -> ScoreUpdate {
        ScoreUpdate { id, score }
    }

    fn order(rebuilder: &Rebuilder) -> Vec<CustomerId> {
        rebuilder
            .view()
            .load()
            .entries()
            .iter()
            .map(|e| e.customer_id)
            .collect()
    }

    #[test]
    fn ties_break_by_ascending_id() {
        let mut rebuilder = Rebuilder::new();
        let (a, b, c) = (30, 10, 20);
        rebuilder.apply(&update(a, 50.0)).unwrap();
        rebuilder.apply(&update(b, 70.0)).unwrap();
        rebuilder.apply(&update(c, 70.0)).unwrap();
        rebuilder.publish();

        assert_eq!(order(&rebuilder), vec![b, c, a]);
    }

    #[test]
    fn updates_replace_and_zero_removes() {
        let mut rebuilder = Rebuilder::new();
        rebuilder.apply(&update(1, 10.0)).unwrap();
        rebuilder.apply(&update(2, 20.0)).unwrap();
        rebuilder.publish();
        assert_eq!(order(&rebuilder), vec![2, 1]);

        rebuilder.apply(&update(1, 25.0)).unwrap();
        rebuilder.publish();
        assert_eq!(order(&rebuilder), vec![1, 2]);
        assert_eq!(rebuilder.view().load().entries()[0].score, 25.0);

        rebuilder.apply(&update(2, 0.0)).unwrap();
        rebuilder.publish();
        assert_eq!(order(&rebuilder), vec![1]);
        assert_eq!(rebuilder.store().get_score(2), None);
    }

    #[test]
    fn zero_for_unknown_customer_is_a_no_op() {
        let mut rebuilder = Rebuilder::new();
        rebuilder.apply(&update(7, 0.0)).unwrap();
        rebuilder.publish();

        let snapshot = rebuilder.view().load();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.version(), 0);
    }

    #[test]
    fn rejects_invalid_scores() {
        let mut rebuilder = Rebuilder::new();
        assert_eq!(
            rebuilder.apply(&update(1, -1.0)),
            Err(RebuildError::InvalidScore { id: 1, score: -1.0 })
        );
        assert!(rebuilder.apply(&update(1, f64::NAN)).is_err());
        assert!(rebuilder.apply(&update(1, f64::INFINITY)).is_err());
        assert!(rebuilder.store().is_empty());
    }

    #[test]
    fn published_snapshots_are_immutable() {
        let mut rebuilder = Rebuilder::new();
        rebuilder.apply(&update(1, 10.0)).unwrap();
        rebuilder.publish();
        let before = rebuilder.view().load();

        rebuilder.apply(&update(2, 20.0)).unwrap();
        rebuilder.publish();
        let after = rebuilder.view().load();

        assert_eq!(before.len(), 1);
        assert_eq!(before.version(), 1);
        assert_eq!(after.len(), 2);
        assert_eq!(after.version(), 2);
        assert_eq!(after.position_of(1), Some(1));
    }

    #[test]
    fn publish_skips_when_unchanged() {
        let mut rebuilder = Rebuilder::new();
        rebuilder.apply(&update(1, 10.0)).unwrap();
        rebuilder.publish();
        rebuilder.publish();
        assert_eq!(rebuilder.view().load().version(), 1);
    }
}
