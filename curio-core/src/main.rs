//! curio-core - personalization store and discovery mixing service
//!
//! Serves the shopping assistant UI over HTTP on localhost.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use curio_common::config::{RootFolderResolver, TomlConfig};
use curio_common::db::init_database;
use curio_core::provider::{DisabledSearchProvider, HttpSearchProvider, SearchProvider};
use curio_core::{build_router, AppState, CurioService};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for curio-core
#[derive(Parser, Debug)]
#[command(name = "curio-core")]
#[command(about = "Personalization store and discovery mixing service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5810", env = "CURIO_PORT")]
    port: u16,

    /// Folder (or .db file) holding the database
    #[arg(short, long, env = "CURIO_ROOT")]
    root_folder: Option<PathBuf>,

    /// Config file (default: platform config dir/curio/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curio_core=info,curio_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any database delay
    info!(
        "Starting curio-core v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let config_path = args.config.clone().or_else(TomlConfig::default_path);
    let config = match &config_path {
        Some(path) => TomlConfig::load(path).context("Failed to load config file")?,
        None => {
            warn!("No config directory on this platform; using defaults");
            TomlConfig::default()
        }
    };

    // CURIO_ROOT is already folded into args.root_folder by clap
    let db_path = RootFolderResolver::new()
        .with_cli_arg(args.root_folder.clone())
        .with_config(&config)
        .resolve();
    info!("Database path: {}", db_path.display());

    let db = match init_database(&db_path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e).context("Database initialization failed");
        }
    };

    let provider: Arc<dyn SearchProvider> = match HttpSearchProvider::new(config.search.clone()) {
        Ok(provider) => {
            info!("Search provider: {}", provider.query_url());
            Arc::new(provider)
        }
        Err(e) => {
            warn!("Search disabled: {}", e);
            Arc::new(DisabledSearchProvider)
        }
    };

    let service = Arc::new(CurioService::new(db, provider, &config, config_path));
    let app = build_router(AppState::new(service.clone()));

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("curio-core listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    service.database().await.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
