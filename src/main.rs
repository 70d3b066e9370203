use album_cover_worker::{config, server};
use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Parses a level (`info`) or a full directive list (`album_cover_worker=debug,warn`).
fn parse_log_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| {
        anyhow::anyhow!(
            "Invalid log filter '{}': {}. Use a level such as info or directives like album_cover_worker=debug",
            directives,
            e
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match config::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the config file
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.server.logs.level.clone());
    let filter = match parse_log_filter(&log_level) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!("Starting album cover worker with log level: {}", log_level);
    info!(
        "Trainer: {}, inferer: {}, GPU acquire mode: {:?}",
        config.trainer.command.program, config.inferer.program, config.gpu.acquire_mode
    );

    server::run(config).await?;

    Ok(())
}
