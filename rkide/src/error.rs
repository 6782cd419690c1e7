use std::{io, path::PathBuf, time::Duration};

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use libarchiver::ArchiveError;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinError;

use crate::server::LifecycleState;
use crate::storage::StorageError;

/// Why moving a directory to or from the object store failed.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("archive task failed: {0}")]
    Join(#[from] JoinError),
}

#[derive(Error, Debug)]
pub enum IdeError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("{0}")]
    Credential(String),

    #[error("restore {key} into {} failed: {source}", path.display())]
    Restore {
        key: String,
        path: PathBuf,
        #[source]
        source: TransferError,
    },

    #[error("archive {key} contains entry {name:?} escaping its destination")]
    PathSafety { key: String, name: String },

    #[error("launch `{command}` failed: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("ide server at {addr} not reachable after {waited:?}")]
    LaunchTimeout { addr: String, waited: Duration },

    #[error("startup cancelled")]
    Cancelled,

    #[error("save {} to {key} failed: {source}", path.display())]
    Save {
        key: String,
        path: PathBuf,
        #[source]
        source: TransferError,
    },

    #[error("ide server is {actual}, expected {expected}")]
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },

    #[error("background task failed: {0}")]
    Join(#[from] JoinError),
}

impl IdeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION",
            Self::Credential(_) => "CREDENTIAL",
            Self::Restore { .. } => "RESTORE",
            Self::PathSafety { .. } => "PATH_SAFETY",
            Self::Launch { .. } => "LAUNCH",
            Self::LaunchTimeout { .. } => "LAUNCH_TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Save { .. } => "SAVE",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Join(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Credential(_) => StatusCode::FORBIDDEN,
            Self::LaunchTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidState { .. } => StatusCode::CONFLICT,
            Self::Configuration(_)
            | Self::Restore { .. }
            | Self::PathSafety { .. }
            | Self::Launch { .. }
            | Self::Save { .. }
            | Self::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IdeError {
    fn into_response(self) -> Response {
        tracing::error!("Generating response for IdeError: {:?}", self);

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            IdeError::Credential("no key".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            IdeError::LaunchTimeout {
                addr: "127.0.0.1:9527".into(),
                waited: Duration::from_secs(1),
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            IdeError::PathSafety {
                key: "ws.tar.gz".into(),
                name: "../x".into(),
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
