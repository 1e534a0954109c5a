#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::service::handler::{LeaderboardService, router};
use server::telemetry::init_telemetry;
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let service = LeaderboardService::new(&config)?;
    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&listener.local_addr()?.to_string(), &config);

    axum::serve(listener, router(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Connections are drained; let the rebuilder publish what it accepted.
    tracing::info!("HTTP server stopped, draining leaderboard pipeline");
    if let Err(e) = service.shutdown().await {
        tracing::error!("Error during service shutdown: {e}");
    }

    providers.shutdown();
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting leaderboard service on {} with full config: {:#?}",
            addr,
            config
        );
    } else {
        tracing::info!(
            "Starting leaderboard service on {} (max delta {}, rebuild batch {})",
            addr,
            config.leaderboard.max_delta,
            config.leaderboard.pipeline.max_batch
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
