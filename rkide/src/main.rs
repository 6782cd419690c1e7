use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rkide::api::{self, AppState};
use rkide::cli::Args;
use rkide::config::{default_config_path, load_config};
use rkide::server::CommandLauncher;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = load_config(&config_path)?;

    let state = Arc::new(AppState::new(config, Arc::new(CommandLauncher))?);
    let app = api::create_router(Arc::clone(&state));

    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("Failed to listen on {}", args.listen))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down...");
    state.cancel_startup().await;
}
