use crate::{
    config::LeaderboardConfig,
    error::{Error, Result},
    pipeline::{DeadLetter, HealthReport, Pipeline, PipelineManager},
    query::RankQuery,
    rebuilder::Rebuilder,
    score_store::ScoreStore,
    snapshot::Snapshot,
    types::{CustomerId, RankedCustomer, ScoreUpdate},
};
use std::sync::Arc;

/// A live customer leaderboard.
///
/// Score updates are answered synchronously from the [`ScoreStore`] and then
/// handed to a dedicated rebuild pipeline. Rank queries read the latest
/// snapshot that pipeline published, so an accepted update becomes visible to
/// queries shortly after it is acknowledged rather than immediately. Use
/// [`Leaderboard::sync`] to wait for the view to catch up.
#[derive(Debug)]
pub struct Leaderboard {
    max_delta: f64,
    scores: ScoreStore,
    pipeline: Pipeline<ScoreUpdate>,
    query: RankQuery,
}

impl Leaderboard {
    /// Registers the rebuild pipeline `config.name` with `manager` and
    /// returns a leaderboard fed by it.
    ///
    /// # Errors
    ///
    /// Fails if the pipeline name is taken or the manager refuses new
    /// pipelines; see [`PipelineManager::spawn`].
    pub fn start(manager: &PipelineManager, config: &LeaderboardConfig) -> Result<Self> {
        let rebuilder = Rebuilder::new();
        let query = RankQuery::new(rebuilder.view());
        let pipeline = manager.spawn::<ScoreUpdate, _>(&config.name, rebuilder, &config.pipeline)?;

        Ok(Self {
            max_delta: config.max_delta,
            scores: ScoreStore::new(),
            pipeline,
            query,
        })
    }

    /// Adds `delta` to the score of `id`, clamping at zero, and returns the
    /// new score.
    ///
    /// The update is enqueued for the rebuilder while the customer's entry is
    /// locked, so updates to one customer reach the snapshot in the order
    /// their scores were stored.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDelta`] if `delta` is non-finite or outside
    ///   `[-max_delta, max_delta]`.
    /// - [`Error::ServiceShutdown`] once shutdown began.
    /// - [`Error::ChannelError`] if the rebuild worker is gone.
    ///
    /// The stored score is left untouched whenever an error is returned.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn update_score(&self, id: CustomerId, delta: f64) -> Result<f64> {
        if !delta.is_finite() || delta.abs() > self.max_delta {
            return Err(Error::InvalidDelta {
                delta,
                max: self.max_delta,
            });
        }
        if self.pipeline.is_shutting_down() {
            return Err(Error::ServiceShutdown);
        }

        self.scores
            .update_raw_with(id, delta, |score| self.pipeline.publish(ScoreUpdate { id, score }))
            .inspect_err(|e| tracing::warn!(customer_id = id, delta, "Score update not enqueued: {e}"))
    }

    /// Customers ranked `start..=end` (1-indexed) in the latest snapshot.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] or [`Error::NoData`], see
    /// [`range_in`](crate::range_in).
    pub fn range(&self, start: usize, end: usize) -> Result<Vec<RankedCustomer>> {
        self.query.range(start, end)
    }

    /// Customer `id` with up to `high` higher and `low` lower ranked
    /// neighbors in the latest snapshot.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if `id` is not ranked.
    pub fn neighbors(&self, id: CustomerId, high: usize, low: usize) -> Result<Vec<RankedCustomer>> {
        self.query.neighbors(id, high, low)
    }

    /// Raw stored score of `id`, including zero scores of customers that
    /// dropped off the leaderboard.
    pub fn score_of(&self, id: CustomerId) -> Option<f64> {
        self.scores.get(id)
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.query.snapshot()
    }

    /// Waits until every update accepted before this call is reflected in
    /// the published snapshot.
    pub async fn sync(&self) -> Result<()> {
        self.pipeline.sync().await
    }

    pub fn health(&self) -> HealthReport {
        self.pipeline.health()
    }

    /// Removes and returns updates the rebuilder rejected.
    pub fn drain_dead_letters(&self) -> Vec<DeadLetter<ScoreUpdate>> {
        self.pipeline.drain_dead_letters()
    }
}
