use crate::types::CustomerId;
use core::convert::Infallible;
use dashmap::{DashMap, mapref::entry::Entry};

/// Fast-path mapping from customer id to its last known raw score.
///
/// Updates are answered synchronously and independently of the ranked view.
/// The map is sharded, and each read-modify-write runs under the lock of the
/// shard owning the id. Concurrent deltas for the same customer are therefore
/// serialized rather than racing, and deltas for different customers only
/// contend when they hash to the same shard.
///
/// A customer whose score is clamped to zero keeps a zero record here; only
/// the ranked view drops it.
#[derive(Debug, Default)]
pub struct ScoreStore {
    scores: DashMap<CustomerId, f64>,
}

impl ScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `delta` to the stored score of `id` and returns the new score.
    ///
    /// Absent customers start at zero. The result is clamped to zero after
    /// every step, so a large negative delta never leaves a debt behind.
    pub fn update_raw(&self, id: CustomerId, delta: f64) -> f64 {
        match self.update_raw_with(id, delta, |_| Ok::<(), Infallible>(())) {
            Ok(score) => score,
            Err(never) => match never {},
        }
    }

    /// Like [`ScoreStore::update_raw`], but runs `on_commit` with the new
    /// score while the customer's entry is still locked, and stores the score
    /// only if `on_commit` succeeds.
    ///
    /// Anything done inside `on_commit` (such as enqueueing the update) is
    /// ordered consistently with the stored score for that customer. When it
    /// fails, the error is returned and the store is left as it was; an
    /// absent customer stays absent. The callback must not touch this store,
    /// or it deadlocks on the shard.
    pub fn update_raw_with<F, E>(&self, id: CustomerId, delta: f64, on_commit: F) -> Result<f64, E>
    where
        F: FnOnce(f64) -> Result<(), E>,
    {
        match self.scores.entry(id) {
            Entry::Occupied(mut entry) => {
                let score = clamp(*entry.get() + delta);
                on_commit(score)?;
                *entry.get_mut() = score;
                Ok(score)
            }
            Entry::Vacant(entry) => {
                let score = clamp(delta);
                on_commit(score)?;
                entry.insert(score);
                Ok(score)
            }
        }
    }

    /// Returns the raw score of `id`, or `None` if it was never updated.
    pub fn get(&self, id: CustomerId) -> Option<f64> {
        self.scores.get(&id).map(|score| *score)
    }

    /// Number of customers with a record, including zero-score records.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[inline]
fn clamp(score: f64) -> f64 {
    if score > 0.0 { score } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn absent_customer_starts_at_zero() {
        let store = ScoreStore::new();
        assert_eq!(store.get(1), None);
        assert_eq!(store.update_raw(1, 12.5), 12.5);
        assert_eq!(store.update_raw(1, 7.5), 20.0);
        assert_eq!(store.get(1), Some(20.0));
    }

    #[test]
    fn clamps_every_step() {
        let store = ScoreStore::new();
        assert_eq!(store.update_raw(9, -10_000.0), 0.0);
        assert_eq!(store.update_raw(9, 5.0), 5.0);
    }

    #[test]
    fn zero_score_keeps_a_record() {
        let store = ScoreStore::new();
        assert_eq!(store.update_raw(7, -5.0), 0.0);
        assert_eq!(store.get(7), Some(0.0));
        assert_eq!(store.len(), 1);

        store.update_raw(8, 3.0);
        assert_eq!(store.update_raw(8, -3.0), 0.0);
        assert_eq!(store.get(8), Some(0.0));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn on_commit_sees_new_score() {
        let store = ScoreStore::new();
        store.update_raw(3, 10.0);

        let mut seen = None;
        let score = store.update_raw_with(3, -4.0, |s| {
            seen = Some(s);
            Ok::<_, Infallible>(())
        });
        assert_eq!(score, Ok(6.0));
        assert_eq!(seen, Some(6.0));
    }

    #[test]
    fn failed_commit_leaves_store_untouched() {
        let store = ScoreStore::new();
        store.update_raw(3, 10.0);

        assert_eq!(store.update_raw_with(3, 5.0, |_| Err("closed")), Err("closed"));
        assert_eq!(store.get(3), Some(10.0));

        assert_eq!(store.update_raw_with(4, 5.0, |_| Err("closed")), Err("closed"));
        assert_eq!(store.get(4), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn concurrent_same_id_updates_are_not_lost() {
        let store = Arc::new(ScoreStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        store.update_raw(42, 1.0);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(42), Some(8000.0));
    }
}
