//! Local directory backend, one file per object.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};

use super::{ObjectReader, ObjectStore, StorageError};

pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for LocalFsBackend {
    async fn get_object(&self, key: &str) -> Result<ObjectReader, StorageError> {
        match fs::File::open(self.path_for(key)).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::backend(key, e)),
        }
    }

    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::backend(key, e))?;
        }

        // readers never observe a half written object
        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        async {
            let mut f = fs::File::create(&staging).await?;
            f.write_all(&body).await?;
            f.sync_all().await?;
            fs::rename(&staging, &path).await
        }
        .await
        .map_err(|e| StorageError::backend(key, e))
    }
}
