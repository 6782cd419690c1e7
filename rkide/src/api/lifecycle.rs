use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use super::state::AppState;
use crate::config::StorageBackend;
use crate::credential::Credential;
use crate::error::IdeError;
use crate::server::{IdeServer, LifecycleState};
use crate::storage;

pub const INIT_SUCCESS: &str = "init handler success";
pub const PRE_STOP_SUCCESS: &str = "pre-stop handler success";

/// GET|POST /initialize
pub async fn initialize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, IdeError> {
    let guard = state.lock_lifecycle().await;

    if let Some(server) = state.server().await {
        match server.state() {
            LifecycleState::Ready => {
                tracing::info!("Ide server is already running");
                return Ok((StatusCode::OK, INIT_SUCCESS));
            }
            LifecycleState::Failed => {
                tracing::info!("Previous startup failed, starting again");
            }
            actual => {
                return Err(IdeError::InvalidState {
                    expected: LifecycleState::Uninitialized,
                    actual,
                });
            }
        }
    }

    let config = &state.config;
    let credential = match config.storage.backend {
        StorageBackend::S3 => Some(Credential::resolve(config.credential_source, &headers)?),
        StorageBackend::Filesystem => None,
    };
    let store = storage::connect(config, credential.as_ref()).await?;

    let server = Arc::new(IdeServer::from_config(
        config,
        store,
        Arc::clone(&state.launcher),
    ));
    state.set_server(Arc::clone(&server)).await;

    // a client going away must not abort the startup half way
    tokio::spawn(async move {
        let _guard = guard;
        server.startup().await
    })
    .await??;

    Ok((StatusCode::OK, INIT_SUCCESS))
}

/// GET|POST /pre-stop
///
/// Always answers 200; the body lists what happened to each directory.
pub async fn pre_stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let guard = state.lock_lifecycle().await;

    let detail = match state.server().await {
        None => "ide server was not initialized, nothing to save".to_string(),
        Some(server) => {
            let shutdown = tokio::spawn(async move {
                let _guard = guard;
                server.shutdown().await
            });
            match shutdown.await {
                Ok(Ok(report)) => report.to_string(),
                Ok(Err(e)) => {
                    tracing::warn!("Skip saving ide server state: {e}");
                    e.to_string()
                }
                Err(e) => {
                    tracing::error!("Shutdown task failed: {e}");
                    e.to_string()
                }
            }
        }
    };

    (StatusCode::OK, format!("{PRE_STOP_SUCCESS}\n{detail}\n"))
}
