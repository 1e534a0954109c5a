//! Error types for the leaderboard core.
//!
//! [`Error`] covers every condition a caller of the leaderboard can observe:
//! rejected input, queries that find nothing, and pipeline lifecycle
//! failures. Failures inside the rebuild worker never reach callers; they are
//! reported through [`RebuildError`], logged, and dead-lettered by the
//! pipeline.
//!
//! ## Error Cases
//! - `InvalidRange`: a rank range that is empty or starts below rank 1.
//! - `NoData`: a rank range that starts past the last ranked customer.
//! - `NotFound`: the queried customer is not on the leaderboard.
//! - `InvalidDelta`: a score delta that is non-finite or out of bounds.
//! - `PipelineExists` / `PipelineMissing`: registry lookups by name.
//! - `WorkerSpawn`: the OS refused to start a worker thread.
//! - `ServiceShutdown`: a publish arrived after shutdown began.
//! - `ChannelError`: an internal queue or acknowledgement channel closed.

use crate::types::CustomerId;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for leaderboard operations.
#[derive(Clone, thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// The requested rank range is malformed.
    #[error("Invalid rank range: start {start} must be at least 1 and not greater than end {end}")]
    InvalidRange { start: usize, end: usize },

    /// The requested range begins after the last ranked customer.
    #[error("No customers ranked at {start} or below (leaderboard holds {len})")]
    NoData { start: usize, len: usize },

    /// The customer is not present on the published leaderboard.
    #[error("Customer {id} is not on the leaderboard")]
    NotFound { id: CustomerId },

    /// The score delta is non-finite or outside `[-max, max]`.
    #[error("Invalid score delta {delta}: must be a finite number in [-{max}, {max}]")]
    InvalidDelta { delta: f64, max: f64 },

    /// A pipeline with this name is already registered.
    #[error("Pipeline `{name}` already exists")]
    PipelineExists { name: String },

    /// No pipeline with this name (and message type) is registered.
    #[error("Pipeline `{name}` is not registered for this message type")]
    PipelineMissing { name: String },

    /// The dedicated worker thread could not be started.
    #[error("Failed to start worker for pipeline `{name}`: {reason}")]
    WorkerSpawn { name: String, reason: String },

    /// The pipeline manager is shutting down and refuses new work.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

impl Error {
    /// Returns `true` for errors caused by caller input rather than service
    /// state.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidRange { .. } | Self::InvalidDelta { .. })
    }
}

/// Failure raised by the rebuilder while applying a single update.
#[derive(Clone, thiserror::Error, Debug, PartialEq)]
pub enum RebuildError {
    /// Scores reaching the rebuilder must be finite and clamped to zero.
    #[error("Rejected score {score} for customer {id}: scores must be finite and non-negative")]
    InvalidScore { id: CustomerId, score: f64 },
}
