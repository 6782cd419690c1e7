use std::path::PathBuf;

use crate::config::Config;

/// The resolved paths and keys of one ide server instance.
///
/// Built once from the config and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub host: String,
    pub port: u16,
    /// Root of the ide server's own state: user settings, extensions.
    pub data_dir: PathBuf,
    pub data_key: String,
    /// The user's project files.
    pub workspace_dir: PathBuf,
    pub workspace_key: String,
    pub bucket: String,
    pub binary: PathBuf,
}

impl ServerDescriptor {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.ide.host.clone(),
            port: config.ide.port,
            data_dir: config.ide.data_directory.clone(),
            data_key: config.ide.data_key.clone(),
            workspace_dir: config.workspace.directory.clone(),
            workspace_key: config.workspace.key.clone(),
            bucket: config.bucket.clone(),
            binary: config.ide.binary_directory.join(&config.ide.binary_name),
        }
    }

    /// `host:port`, with an IPv6 host put in brackets.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr())
    }

    pub fn user_data_dir(&self) -> PathBuf {
        self.data_dir.join("user-data")
    }

    pub fn server_data_dir(&self) -> PathBuf {
        self.data_dir.join("server-data")
    }

    pub fn extensions_dir(&self) -> PathBuf {
        self.data_dir.join("extensions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.ide.data_directory = PathBuf::from("/data/vscode");
        config.ide.binary_directory = PathBuf::from("/opt/openvscode/bin");
        config.ide.data_key = "ide/data.tar.gz".to_string();

        let descriptor = ServerDescriptor::from_config(&config);

        assert_eq!(descriptor.addr(), "127.0.0.1:9527");
        assert_eq!(descriptor.base_url(), "http://127.0.0.1:9527");
        assert_eq!(
            descriptor.binary,
            PathBuf::from("/opt/openvscode/bin/openvscode-server")
        );
        assert_eq!(
            descriptor.extensions_dir(),
            PathBuf::from("/data/vscode/extensions")
        );
        assert_eq!(descriptor.workspace_dir, PathBuf::from("/workspace"));
    }

    #[test]
    fn test_ipv6_addr() {
        let mut config = Config::default();
        config.ide.host = "::1".to_string();
        let descriptor = ServerDescriptor::from_config(&config);
        assert_eq!(descriptor.addr(), "[::1]:9527");
        assert_eq!(descriptor.base_url(), "http://[::1]:9527");
        assert!(descriptor.addr().parse::<std::net::SocketAddr>().is_ok());

        config.ide.host = "[::1]".to_string();
        let descriptor = ServerDescriptor::from_config(&config);
        assert_eq!(descriptor.addr(), "[::1]:9527");
    }

    #[test]
    fn test_binary_from_path_lookup() {
        let descriptor = ServerDescriptor::from_config(&Config::default());
        assert_eq!(descriptor.binary, PathBuf::from("openvscode-server"));
    }
}
