//! Object store adapters
//!
//! Submodules:
//! - `s3`: S3 compatible backend based on `aws-sdk-s3`
//! - `localfs`: objects kept as files below a local directory
//!
//! Each backend is bound to a single bucket and moves whole archives; a missing
//! object is reported as [`StorageError::NotFound`] so callers can tell it
//! apart from transport or permission failures.

pub mod localfs;
pub mod s3;

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::config::{Config, StorageBackend};
use crate::credential::Credential;
use crate::error::IdeError;

pub use localfs::LocalFsBackend;
pub use s3::S3Backend;

/// Streaming body of a fetched object.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object {key} not found")]
    NotFound { key: String },

    #[error("request for object {key} failed: {source}")]
    Backend {
        key: String,
        #[source]
        source: BoxError,
    },
}

impl StorageError {
    pub fn backend(key: &str, source: impl Into<BoxError>) -> Self {
        StorageError::Backend {
            key: key.to_string(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, key: &str) -> Result<ObjectReader, StorageError>;
    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), StorageError>;
}

/// Build the backend selected in `config`.
///
/// The S3 backend needs `credential`; the filesystem backend ignores it.
pub async fn connect(
    config: &Config,
    credential: Option<&Credential>,
) -> Result<Arc<dyn ObjectStore>, IdeError> {
    match config.storage.backend {
        StorageBackend::S3 => {
            let credential = credential.ok_or_else(|| {
                IdeError::Credential("the s3 backend requires credentials".to_string())
            })?;
            let backend = S3Backend::new(&config.bucket, &config.storage, credential).await;
            Ok(Arc::new(backend))
        }
        StorageBackend::Filesystem => {
            let root = config.storage.root.as_ref().ok_or_else(|| {
                IdeError::Configuration(
                    "storage.root is required by the filesystem backend".to_string(),
                )
            })?;
            Ok(Arc::new(LocalFsBackend::new(root.join(&config.bucket))))
        }
    }
}
