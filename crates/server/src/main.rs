//! picstore server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use picstore_core::config::AppConfig;
use picstore_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// picstore - a deduplicating image upload server
#[derive(Parser, Debug)]
#[command(name = "picstored")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (optional; defaults apply when missing)
    #[arg(
        short,
        long,
        env = "PICSTORE_CONFIG",
        default_value = "config/picstore.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("picstore v{}", env!("CARGO_PKG_VERSION"));

    let mut figment = Figment::new();
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::info!(
            config_path = %args.config,
            "No config file found, using defaults and environment"
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("PICSTORE_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let storage = picstore_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    let metadata = picstore_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize image index")?;
    let indexed = metadata
        .count_images(None)
        .await
        .context("failed to read image index")?;
    tracing::info!(images = indexed, "Image index initialized");

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, storage, metadata).context("invalid configuration")?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
