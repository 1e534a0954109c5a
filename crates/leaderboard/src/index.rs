//! Order-maintaining rank index.
//!
//! [`RankStore`] is the minimal interface a ranking backend has to offer for
//! the rebuilder to drive it. [`RankIndex`] is the in-memory implementation:
//! a [`BTreeSet`] ordered by `(score desc, id asc)` next to an id lookup,
//! giving logarithmic upserts and removals and ordered range reads without a
//! full resort per update.

use crate::types::{CustomerId, CustomerScore, Order};
use core::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Backend interface for rank-ordered customer scores.
///
/// Ranks are 0-indexed positions in [`Order::Descending`] order. Range reads
/// take inclusive bounds and clip `end` to the last position.
pub trait RankStore: Send + 'static {
    /// Returns the stored score of `id`, if any.
    fn get_score(&self, id: CustomerId) -> Option<f64>;

    /// Inserts `id` or moves it to the position implied by `score`.
    fn set_score(&mut self, id: CustomerId, score: f64);

    /// Removes `id`, returning its previous score.
    fn remove(&mut self, id: CustomerId) -> Option<f64>;

    /// Returns the entries at positions `start..=end` in the given order.
    fn range_by_rank(&self, start: usize, end: usize, order: Order) -> Vec<CustomerScore>;

    /// Returns the 0-indexed descending position of `id`.
    ///
    /// Implementations may be linear in the returned rank. Hot read paths
    /// should look positions up in a published
    /// [`Snapshot`](crate::Snapshot) with
    /// [`position_of`](crate::Snapshot::position_of) instead.
    fn rank_of(&self, id: CustomerId) -> Option<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sort key: higher scores first, ties broken by ascending id.
#[derive(Clone, Copy, Debug)]
struct RankKey {
    score: f64,
    id: CustomerId,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

/// In-memory [`RankStore`].
#[derive(Debug, Default)]
pub struct RankIndex {
    ranked: BTreeSet<RankKey>,
    scores: HashMap<CustomerId, f64>,
}

impl RankIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates every entry from the highest rank down.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = CustomerScore> + '_ {
        self.ranked
            .iter()
            .map(|key| CustomerScore::new(key.id, key.score))
    }
}

impl RankStore for RankIndex {
    fn get_score(&self, id: CustomerId) -> Option<f64> {
        self.scores.get(&id).copied()
    }

    fn set_score(&mut self, id: CustomerId, score: f64) {
        if let Some(previous) = self.scores.insert(id, score) {
            self.ranked.remove(&RankKey {
                score: previous,
                id,
            });
        }
        self.ranked.insert(RankKey { score, id });
    }

    fn remove(&mut self, id: CustomerId) -> Option<f64> {
        let previous = self.scores.remove(&id)?;
        self.ranked.remove(&RankKey {
            score: previous,
            id,
        });
        Some(previous)
    }

    fn range_by_rank(&self, start: usize, end: usize, order: Order) -> Vec<CustomerScore> {
        if start > end || start >= self.ranked.len() {
            return Vec::new();
        }
        let take = end.min(self.ranked.len() - 1) - start + 1;
        match order {
            Order::Descending => self.iter().skip(start).take(take).collect(),
            Order::Ascending => self.iter().rev().skip(start).take(take).collect(),
        }
    }

    /// O(rank): counts the keys ordered ahead of `id`.
    fn rank_of(&self, id: CustomerId) -> Option<usize> {
        let score = *self.scores.get(&id)?;
        Some(self.ranked.range(..RankKey { score, id }).count())
    }

    fn len(&self) -> usize {
        self.ranked.len()
    }
}
