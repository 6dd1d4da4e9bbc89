use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info};

use flow_prep::{Config, FlowPrepApp};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before tracing so the configured level can act
    // as the fallback filter
    let (config, config_path) = load_config().await?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    match config_path {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!("Starting flow-prep...");

    // Create the application
    let app = FlowPrepApp::new(config).await?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Handle shutdown signals
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, initiating graceful shutdown...");
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        }
    });

    // Run the application with shutdown handler
    app.run_with_shutdown(shutdown_rx).await?;

    info!("flow-prep stopped gracefully");
    Ok(())
}

/// Load configuration from the first file found in the standard locations
async fn load_config() -> Result<(Config, Option<PathBuf>)> {
    let config_paths = vec![
        PathBuf::from("./flow-prep.toml"),
        PathBuf::from("/etc/flow-prep/flow-prep.toml"),
        dirs::config_dir()
            .map(|d| d.join("flow-prep/flow-prep.toml"))
            .unwrap_or_default(),
    ];

    for path in config_paths {
        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let config: Config = toml::from_str(&content)?;
            return Ok((config, Some(path)));
        }
    }

    Ok((Config::default(), None))
}
