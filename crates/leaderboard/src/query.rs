//! Rank and neighbor queries against the latest published snapshot.
//!
//! Every query loads the snapshot once and answers entirely from that
//! instance, so results never mix two rebuilds.

use crate::{
    error::{Error, Result},
    snapshot::{Snapshot, SnapshotCell},
    types::{CustomerId, CustomerScore, RankedCustomer},
};
use std::sync::Arc;

/// Stateless query engine reading from a [`SnapshotCell`].
#[derive(Clone, Debug)]
pub struct RankQuery {
    view: SnapshotCell,
}

impl RankQuery {
    pub const fn new(view: SnapshotCell) -> Self {
        Self { view }
    }

    /// The snapshot the next query would read.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.view.load()
    }

    /// Customers ranked `start..=end` (1-indexed), see [`range_in`].
    pub fn range(&self, start: usize, end: usize) -> Result<Vec<RankedCustomer>> {
        range_in(&self.view.load(), start, end)
    }

    /// Customer `id` with up to `high` better and `low` worse ranked
    /// neighbors, see [`neighbors_in`].
    pub fn neighbors(&self, id: CustomerId, high: usize, low: usize) -> Result<Vec<RankedCustomer>> {
        neighbors_in(&self.view.load(), id, high, low)
    }
}

/// Returns the customers ranked `start..=end` in `snapshot`.
///
/// `end` is clipped to the snapshot length.
///
/// # Errors
///
/// - [`Error::InvalidRange`] if `start` is 0 or greater than `end`.
/// - [`Error::NoData`] if `start` is past the last ranked customer.
pub fn range_in(snapshot: &Snapshot, start: usize, end: usize) -> Result<Vec<RankedCustomer>> {
    if start == 0 || start > end {
        return Err(Error::InvalidRange { start, end });
    }

    let len = snapshot.len();
    if start > len {
        return Err(Error::NoData { start, len });
    }

    let entries = &snapshot.entries()[start - 1..end.min(len)];
    Ok(annotate(entries, start))
}

/// Returns the window of customers around `id` in `snapshot`.
///
/// The window spans `high` positions above and `low` positions below the
/// customer, clipped to the snapshot bounds, so it holds `high + low + 1`
/// entries unless it touches either end. Ranks are the true ranks.
///
/// # Errors
///
/// - [`Error::NotFound`] if `id` is not ranked.
pub fn neighbors_in(
    snapshot: &Snapshot,
    id: CustomerId,
    high: usize,
    low: usize,
) -> Result<Vec<RankedCustomer>> {
    let index = snapshot.position_of(id).ok_or(Error::NotFound { id })?;

    let first = index.saturating_sub(high);
    let last = index.saturating_add(low).min(snapshot.len() - 1);

    Ok(annotate(&snapshot.entries()[first..=last], first + 1))
}

fn annotate(entries: &[CustomerScore], first_rank: usize) -> Vec<RankedCustomer> {
    entries
        .iter()
        .zip(first_rank..)
        .map(|(entry, rank)| RankedCustomer {
            customer_id: entry.customer_id,
            score: entry.score,
            rank,
        })
        .collect()
}
