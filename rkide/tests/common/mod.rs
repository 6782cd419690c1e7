#![allow(dead_code)]

use std::collections::HashSet;
use std::net::TcpListener as StdTcpListener;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::http::HeaderMap;
use axum::routing::{any, get};
use bytes::Bytes;
use flate2::{Compression, write::GzEncoder};
use rkide::config::{Config, CredentialSource, StorageBackend};
use rkide::error::IdeError;
use rkide::server::{Launcher, ProcessHandle, ServerDescriptor};
use rkide::storage::{LocalFsBackend, ObjectReader, ObjectStore, StorageError};

pub const DATA_KEY: &str = "ide/data.tar.gz";
pub const WORKSPACE_KEY: &str = "ide/workspace.tar.gz";
pub const BUCKET: &str = "rkide-test";

/// A port nothing listens on.
pub fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Config for a filesystem backed store below `root`.
pub fn test_config(root: &Path, port: u16) -> Config {
    let mut config = Config::default();
    config.ide.host = "127.0.0.1".to_string();
    config.ide.port = port;
    config.ide.data_directory = root.join("data");
    config.ide.data_key = DATA_KEY.to_string();
    config.ide.poll_interval_ms = 10;
    config.ide.ready_timeout_secs = 5;
    config.workspace.directory = root.join("workspace");
    config.workspace.key = WORKSPACE_KEY.to_string();
    config.bucket = BUCKET.to_string();
    config.credential_source = CredentialSource::Env;
    config.storage.backend = StorageBackend::Filesystem;
    config.storage.root = Some(root.join("store"));
    config
}

/// Directory holding the objects of [`test_config`].
pub fn store_dir(root: &Path) -> PathBuf {
    root.join("store").join(BUCKET)
}

/// A tar.gz holding one regular entry, its name written into the header unchecked.
pub fn archive_with_entry(name: &str, data: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(data.len() as u64);
    header.set_cksum();
    builder.append(&header, data).unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

/// Routes served by the fake ide server.
pub fn ide_router() -> Router {
    Router::new()
        .route("/hello", get(|| async { "hello from ide" }))
        .route(
            "/echo",
            any(|headers: HeaderMap, body: Bytes| async move {
                let marker = headers
                    .get("x-test-marker")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                (
                    [("x-echo-marker", marker)],
                    body,
                )
            }),
        )
}

/// Stands in for the ide binary.
///
/// With a listener, the first launch serves [`ide_router`] on it. Without
/// one, launching succeeds but nothing ever listens.
pub struct StubLauncher {
    listener: Mutex<Option<StdTcpListener>>,
    launches: AtomicUsize,
}

impl StubLauncher {
    /// Reserve a port the stub ide server will listen on.
    pub fn serving() -> (Self, u16) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let launcher = Self {
            listener: Mutex::new(Some(listener)),
            launches: AtomicUsize::new(0),
        };
        (launcher, port)
    }

    pub fn silent() -> Self {
        Self {
            listener: Mutex::new(None),
            launches: AtomicUsize::new(0),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Launcher for StubLauncher {
    fn launch(&self, _descriptor: &ServerDescriptor) -> Result<ProcessHandle, IdeError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(listener) = self.listener.lock().unwrap().take() {
            listener.set_nonblocking(true).unwrap();
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            tokio::spawn(async move {
                axum::serve(listener, ide_router()).await.unwrap();
            });
        }
        Ok(ProcessHandle::detached())
    }
}

/// Object store with injectable failures in front of a [`LocalFsBackend`].
pub struct FlakyStore {
    inner: LocalFsBackend,
    failing_gets: HashSet<String>,
    failing_puts: HashSet<String>,
    get_delay: Duration,
}

impl FlakyStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            inner: LocalFsBackend::new(root),
            failing_gets: HashSet::new(),
            failing_puts: HashSet::new(),
            get_delay: Duration::ZERO,
        }
    }

    /// Fetching `key` fails after `delay`.
    pub fn fail_get(mut self, key: &str, delay: Duration) -> Self {
        self.failing_gets.insert(key.to_string());
        self.get_delay = delay;
        self
    }

    pub fn fail_put(mut self, key: &str) -> Self {
        self.failing_puts.insert(key.to_string());
        self
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn get_object(&self, key: &str) -> Result<ObjectReader, StorageError> {
        if self.failing_gets.contains(key) {
            tokio::time::sleep(self.get_delay).await;
            return Err(StorageError::backend(
                key,
                std::io::Error::other("injected get failure"),
            ));
        }
        self.inner.get_object(key).await
    }

    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        if self.failing_puts.contains(key) {
            return Err(StorageError::backend(
                key,
                std::io::Error::other("injected put failure"),
            ));
        }
        self.inner.put_object(key, body).await
    }
}
