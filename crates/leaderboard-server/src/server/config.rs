use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use leaderboard::{LeaderboardConfig, PipelineConfig};

/// Runtime configuration for the `leaderboard-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first), with defaults suitable for a single-node
/// deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "leaderboard-server",
    version,
    about = "An HTTP service for a live customer leaderboard"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Largest accepted magnitude of a single score delta. Requests outside
    /// `[-MAX_DELTA, MAX_DELTA]` are rejected.
    ///
    /// Environment variable: `MAX_DELTA`
    #[arg(long, env = "MAX_DELTA", default_value_t = 1000.0)]
    pub max_delta: f64,

    /// Maximum number of score updates the rebuilder applies before it
    /// publishes a new snapshot. Lower values make updates visible sooner
    /// under sustained load; higher values rebuild less often.
    ///
    /// Environment variable: `REBUILD_BATCH_SIZE`
    #[arg(long, env = "REBUILD_BATCH_SIZE", default_value_t = 256)]
    pub rebuild_batch_size: usize,

    /// Number of rejected score updates kept for inspection.
    ///
    /// Environment variable: `DEAD_LETTER_CAPACITY`
    #[arg(long, env = "DEAD_LETTER_CAPACITY", default_value_t = 1024)]
    pub dead_letter_capacity: usize,

    /// Seconds to wait for the rebuilder to drain on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub leaderboard: LeaderboardConfig,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if !args.max_delta.is_finite() || args.max_delta <= 0.0 {
            bail!(
                "MAX_DELTA ({}) must be a positive, finite number",
                args.max_delta
            );
        }

        if args.rebuild_batch_size == 0 {
            bail!("REBUILD_BATCH_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            leaderboard: LeaderboardConfig {
                max_delta: args.max_delta,
                pipeline: PipelineConfig {
                    max_batch: args.rebuild_batch_size,
                    dead_letter_capacity: args.dead_letter_capacity,
                },
                ..LeaderboardConfig::default()
            },
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
