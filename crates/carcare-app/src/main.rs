//! CarCare server binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Open the SQLite record store
//! 3. Build the completion gateway and chat service
//! 4. Start the axum REST API server

mod cli;

use std::sync::Arc;

use clap::Parser;

use carcare_api::routes;
use carcare_api::state::AppState;
use carcare_chat::OpenAiGateway;
use carcare_core::config::CarCareConfig;
use carcare_storage::Database;

use crate::cli::{expand_home, CliArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = CarCareConfig::load_or_default(&config_file);
    args.apply(&mut config);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting CarCare v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("carcare.db");
    let database = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    // Completion gateway.
    let gateway = OpenAiGateway::new(&config.completion)?;
    if std::env::var(&config.completion.api_key_env).is_err() {
        tracing::warn!(
            env = %config.completion.api_key_env,
            "No completion API key set; chat replies will be degraded"
        );
    }
    tracing::info!(
        base_url = %config.completion.base_url,
        model = %config.completion.model,
        "Completion gateway configured"
    );

    let state = AppState::new(config, database, Arc::new(gateway));

    routes::start_server(state).await?;

    Ok(())
}
