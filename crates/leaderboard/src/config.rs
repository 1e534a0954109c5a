/// Tuning knobs for a single pipeline worker.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Maximum number of queued messages handled before the handler is
    /// flushed. The worker also flushes whenever the queue runs empty.
    pub max_batch: usize,
    /// Number of failed messages retained for inspection. Older entries are
    /// evicted first.
    pub dead_letter_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch: 256,
            dead_letter_capacity: 1024,
        }
    }
}

/// Configuration for a [`Leaderboard`](crate::Leaderboard).
#[derive(Clone, Debug)]
pub struct LeaderboardConfig {
    /// Name of the rebuild pipeline registered with the manager.
    pub name: String,
    /// Largest accepted magnitude of a single score delta.
    pub max_delta: f64,
    pub pipeline: PipelineConfig,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            name: String::from("leaderboard"),
            max_delta: 1000.0,
            pipeline: PipelineConfig::default(),
        }
    }
}
