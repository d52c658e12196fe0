pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod format;
pub mod models;
pub mod preview;
pub mod relay;
pub mod services;
pub mod types;
pub mod validate;

use clap::Parser;
use commands::AppState;
use config::AppConfig;
use relay::HttpRelay;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Log to stderr so command output on stdout stays machine-readable. `RUST_LOG` overrides the level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn build_state(config: AppConfig) -> Result<AppState, String> {
    let db = db::Db::new(config.db_path.clone()).map_err(|e| e.to_string())?;
    let relay = HttpRelay::new(&config.backend_url, config.timeout()).map_err(|e| e.to_string())?;
    info!(backend = %config.backend_url, db = %config.db_path.display(), "state ready");
    Ok(AppState::new(config, db, Arc::new(relay)))
}

pub fn run() -> Result<(), String> {
    let cli = cli::Cli::parse();
    let config = AppConfig::from_env();
    init_logging();
    let state = build_state(config)?;
    cli::execute(cli, &state)
}
