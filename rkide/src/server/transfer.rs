//! Moving directory trees between the local disk and the object store.

use std::{fmt, path::Path};

use bytes::Bytes;
use libarchiver::ArchiveError;
use tokio::task;
use tokio_util::io::SyncIoBridge;

use crate::error::{IdeError, TransferError};
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The archive was found and extracted.
    Restored { entries: u64, bytes: u64 },
    /// No archive existed yet; an empty directory was created.
    Created,
}

impl fmt::Display for RestoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreOutcome::Restored { entries, bytes } => {
                write!(f, "restored {entries} entries ({bytes} bytes)")
            }
            RestoreOutcome::Created => write!(f, "created empty directory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub key: String,
    pub entries: u64,
    /// Size of the uploaded archive.
    pub bytes: u64,
}

impl fmt::Display for SaveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "saved {} entries to {} ({} bytes)",
            self.entries, self.key, self.bytes
        )
    }
}

/// Fetch `key` and extract it into `dir`.
pub async fn restore(
    store: &dyn ObjectStore,
    key: &str,
    dir: &Path,
) -> Result<RestoreOutcome, IdeError> {
    let fail = |source: TransferError| IdeError::Restore {
        key: key.to_string(),
        path: dir.to_path_buf(),
        source,
    };

    let reader = match store.get_object(key).await {
        Ok(reader) => reader,
        Err(e) if e.is_not_found() => {
            tracing::info!(
                "Object {key} does not exist, creating empty directory {}",
                dir.display()
            );
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| fail(e.into()))?;
            return Ok(RestoreOutcome::Created);
        }
        Err(e) => return Err(fail(e.into())),
    };

    let bridge = SyncIoBridge::new(reader);
    let destination = dir.to_path_buf();
    let unpacked = task::spawn_blocking(move || libarchiver::unpack(bridge, destination))
        .await
        .map_err(|e| fail(e.into()))?;

    match unpacked {
        Ok(summary) => {
            tracing::info!(
                "Restore {key} into {} succeeded. entries: {} bytes: {}",
                dir.display(),
                summary.entries,
                summary.bytes
            );
            Ok(RestoreOutcome::Restored {
                entries: summary.entries,
                bytes: summary.bytes,
            })
        }
        Err(ArchiveError::UnsafePath { name }) => {
            tracing::error!("Archive {key} contains unsafe entry {name:?}");
            Err(IdeError::PathSafety {
                key: key.to_string(),
                name,
            })
        }
        Err(e) => Err(fail(e.into())),
    }
}

/// Archive `dir` and upload it as `key`.
///
/// The archive is assembled in memory before the upload starts.
pub async fn save(store: &dyn ObjectStore, dir: &Path, key: &str) -> Result<SaveOutcome, IdeError> {
    let fail = |source: TransferError| IdeError::Save {
        key: key.to_string(),
        path: dir.to_path_buf(),
        source,
    };

    let source = dir.to_path_buf();
    let (archive, summary) = task::spawn_blocking(move || libarchiver::pack(source, Vec::new()))
        .await
        .map_err(|e| fail(e.into()))?
        .map_err(|e| fail(e.into()))?;

    let bytes = archive.len() as u64;
    store
        .put_object(key, Bytes::from(archive))
        .await
        .map_err(|e| fail(e.into()))?;

    tracing::info!(
        "Save {} to {key} succeeded. entries: {} bytes: {bytes}",
        dir.display(),
        summary.entries
    );
    Ok(SaveOutcome {
        key: key.to_string(),
        entries: summary.entries,
        bytes,
    })
}
