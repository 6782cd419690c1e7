use std::{
    fs,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::IdeError;

/// Overrides `bucket` from the config file when set and non-empty.
pub const BUCKET_ENV: &str = "RKIDE_BUCKET_NAME";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ide: IdeConfig,
    pub workspace: WorkspaceConfig,
    pub bucket: String,
    pub credential_source: CredentialSource,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdeConfig {
    pub host: String,
    pub port: u16,
    /// Holds the user, server and extension data of the ide server.
    pub data_directory: PathBuf,
    /// Directory of the ide server binary, empty to look it up in `PATH`.
    pub binary_directory: PathBuf,
    pub binary_name: String,
    pub data_key: String,
    pub poll_interval_ms: u64,
    pub ready_timeout_secs: u64,
}

impl Default for IdeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9527,
            data_directory: PathBuf::from("~/.config/vscode-server"),
            binary_directory: PathBuf::new(),
            binary_name: "openvscode-server".to_string(),
            data_key: String::new(),
            poll_interval_ms: 30,
            ready_timeout_secs: 60,
        }
    }
}

impl IdeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub directory: PathBuf,
    pub key: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/workspace"),
            key: String::new(),
        }
    }
}

/// Where the object store credentials come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Headers injected by the function compute runtime into `/initialize`.
    #[default]
    Fc,
    /// Process environment, for VMs and containers.
    Env,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Filesystem,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Custom endpoint for S3 compatible services.
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    /// Root directory of the filesystem backend.
    pub root: Option<PathBuf>,
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse YAML config")
    }

    /// Apply the environment overrides and expand `~` in directories.
    pub fn resolve(mut self) -> Self {
        if let Ok(bucket) = std::env::var(BUCKET_ENV) {
            if !bucket.is_empty() {
                self.bucket = bucket;
            }
        }
        self.ide.data_directory = expand_home(&self.ide.data_directory);
        self.ide.binary_directory = expand_home(&self.ide.binary_directory);
        self.workspace.directory = expand_home(&self.workspace.directory);
        if let Some(root) = self.storage.root.take() {
            self.storage.root = Some(expand_home(&root));
        }
        self
    }

    pub fn validate(&self) -> Result<(), IdeError> {
        let mut validation_errors = Vec::new();

        if self.ide.host.is_empty() {
            validation_errors.push("ide.host must not be empty".to_string());
        }
        if self.ide.port == 0 {
            validation_errors.push("ide.port must not be 0".to_string());
        }
        if self.ide.binary_name.is_empty() {
            validation_errors.push("ide.binary_name must not be empty".to_string());
        }
        if self.ide.data_key.is_empty() {
            validation_errors.push("ide.data_key must not be empty".to_string());
        }
        if self.workspace.key.is_empty() {
            validation_errors.push("workspace.key must not be empty".to_string());
        }
        if self.ide.poll_interval_ms == 0 {
            validation_errors.push("ide.poll_interval_ms must be positive".to_string());
        }
        if self.ide.ready_timeout_secs == 0 {
            validation_errors.push("ide.ready_timeout_secs must be positive".to_string());
        }
        match self.storage.backend {
            StorageBackend::S3 if self.bucket.is_empty() => validation_errors.push(format!(
                "bucket must be set in the config file or through {BUCKET_ENV}"
            )),
            StorageBackend::Filesystem if self.storage.root.is_none() => validation_errors
                .push("storage.root is required by the filesystem backend".to_string()),
            _ => {}
        }

        if validation_errors.is_empty() {
            Ok(())
        } else {
            Err(IdeError::Configuration(validation_errors.join("; ")))
        }
    }
}

/// Read, resolve and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let cfg = Config::from_yaml(&content)?.resolve();
    cfg.validate()?;
    tracing::info!("Read ide server config succeeded. Config: {cfg:?}");
    Ok(cfg)
}

/// `config.yaml` next to the running executable.
pub fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .context("Failed to get the directory of current running process")?;
    let dir = exe
        .parent()
        .context("The running executable has no parent directory")?;
    Ok(dir.join("config.yaml"))
}

fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}
