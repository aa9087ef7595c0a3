//! Connection configuration and tuning constants.
//!
//! A [`ClientConfig`] must be handed to the registry (see
//! [`crate::ChiaApi::initialize_config`]) before the first request; it names the
//! daemon URL, the client credentials and the connector used to open the socket.

use crate::transport::{Connector, WebSocketConnector};
use crate::{ChiaError, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Defaults shared by the client, the cache and the hooks.
pub struct ClientDefaults;

impl ClientDefaults {
    /// Service name this process registers with the daemon.
    pub const SERVICE_NAME: &'static str = "wallet_ui";
    pub const DAEMON_URL: &'static str = "wss://localhost:55400";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
    pub const CHANNEL_CAPACITY: usize = 256;
    /// How long an entry with no subscribers stays cached before removal.
    pub const KEEP_UNUSED_DATA_FOR: Duration = Duration::from_secs(60);
    pub const SERVICE_POLL_INTERVAL: Duration = Duration::from_secs(1);
}

/// Locations inside a Chia root directory.
pub struct ChiaRootPaths;

impl ChiaRootPaths {
    pub const ROOT_ENV: &'static str = "CHIA_ROOT";
    pub const DEFAULT_ROOT: &'static str = ".chia/mainnet";
    pub const CONFIG_FILE: &'static str = "config/config.yaml";
}

/// Everything needed to open the shared daemon connection.
#[derive(Clone)]
pub struct ClientConfig {
    pub url: String,
    /// PEM client certificate.
    pub cert: Option<PathBuf>,
    /// PEM private key matching `cert`.
    pub key: Option<PathBuf>,
    pub service_name: String,
    pub request_timeout: Duration,
    /// Transport constructor used to open the socket.
    pub connector: Arc<dyn Connector>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("cert", &self.cert)
            .field("key", &self.key)
            .field("service_name", &self.service_name)
            .field("request_timeout", &self.request_timeout)
            .field("connector", &self.connector)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(ClientDefaults::DAEMON_URL)
    }
}

impl ClientConfig {
    /// Create a config for `url` using the WebSocket connector and no credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cert: None,
            key: None,
            service_name: ClientDefaults::SERVICE_NAME.to_string(),
            request_timeout: ClientDefaults::REQUEST_TIMEOUT,
            connector: Arc::new(WebSocketConnector),
        }
    }

    /// Set the client certificate and key (both PEM).
    pub fn with_credentials(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.cert = Some(cert.into());
        self.key = Some(key.into());
        self
    }

    /// Replace the transport constructor.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Resolve the Chia root: `$CHIA_ROOT`, else `~/.chia/mainnet`.
    pub fn default_chia_root() -> Option<PathBuf> {
        if let Ok(root) = std::env::var(ChiaRootPaths::ROOT_ENV) {
            if !root.is_empty() {
                return Some(PathBuf::from(root));
            }
        }
        dirs::home_dir().map(|home| home.join(ChiaRootPaths::DEFAULT_ROOT))
    }

    /// Build a config from the daemon section of `<root>/config/config.yaml`.
    ///
    /// Credential paths in the file are relative to `root`.
    pub fn from_chia_root(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let config_path = root.join(ChiaRootPaths::CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path)
            .map_err(|e| ChiaError::io_with_path(e, &config_path))?;

        let parsed: ChiaRootConfig =
            serde_yaml::from_str(&contents).map_err(|e| ChiaError::Config {
                message: format!("Failed to parse {}: {}", config_path.display(), e),
            })?;

        let url = format!("wss://{}:{}", parsed.self_hostname, parsed.daemon_port);
        let config = Self::new(url).with_credentials(
            resolve_path(root, &parsed.daemon_ssl.private_crt),
            resolve_path(root, &parsed.daemon_ssl.private_key),
        );
        config.validate()?;
        Ok(config)
    }

    /// Check that the URL is a WebSocket URL and credentials come in pairs.
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.url).map_err(|e| ChiaError::Config {
            message: format!("Invalid daemon URL {}: {}", self.url, e),
        })?;

        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ChiaError::Config {
                message: format!("Daemon URL must use ws or wss, got {}", parsed.scheme()),
            });
        }

        if self.cert.is_some() != self.key.is_some() {
            return Err(ChiaError::Config {
                message: "Client certificate and key must be provided together".to_string(),
            });
        }

        Ok(())
    }
}

fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[derive(Debug, Deserialize)]
struct ChiaRootConfig {
    #[serde(default = "default_hostname")]
    self_hostname: String,
    daemon_port: u16,
    daemon_ssl: DaemonSsl,
}

#[derive(Debug, Deserialize)]
struct DaemonSsl {
    private_crt: String,
    private_key: String,
}

fn default_hostname() -> String {
    "localhost".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(root: &Path, contents: &str) {
        std::fs::create_dir_all(root.join("config")).unwrap();
        std::fs::write(root.join(ChiaRootPaths::CONFIG_FILE), contents).unwrap();
    }

    #[test]
    fn test_from_chia_root_reads_daemon_section() {
        let temp_dir = TempDir::new().unwrap();
        write_config(
            temp_dir.path(),
            "self_hostname: 127.0.0.1\n\
             daemon_port: 55401\n\
             daemon_ssl:\n  \
               private_crt: config/ssl/daemon/private_daemon.crt\n  \
               private_key: config/ssl/daemon/private_daemon.key\n\
             wallet:\n  rpc_port: 9256\n",
        );

        let config = ClientConfig::from_chia_root(temp_dir.path()).unwrap();
        assert_eq!(config.url, "wss://127.0.0.1:55401");
        assert_eq!(
            config.cert.unwrap(),
            temp_dir.path().join("config/ssl/daemon/private_daemon.crt")
        );
        assert_eq!(
            config.key.unwrap(),
            temp_dir.path().join("config/ssl/daemon/private_daemon.key")
        );
        assert_eq!(config.service_name, ClientDefaults::SERVICE_NAME);
    }

    #[test]
    fn test_from_chia_root_defaults_hostname() {
        let temp_dir = TempDir::new().unwrap();
        write_config(
            temp_dir.path(),
            "daemon_port: 55400\n\
             daemon_ssl:\n  private_crt: /abs/daemon.crt\n  private_key: /abs/daemon.key\n",
        );

        let config = ClientConfig::from_chia_root(temp_dir.path()).unwrap();
        assert_eq!(config.url, "wss://localhost:55400");
        assert_eq!(config.cert.unwrap(), PathBuf::from("/abs/daemon.crt"));
    }

    #[test]
    fn test_from_chia_root_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ClientConfig::from_chia_root(temp_dir.path());
        assert!(matches!(result, Err(ChiaError::Io { .. })));
    }

    #[test]
    fn test_from_chia_root_malformed_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_config(temp_dir.path(), "daemon_port: [not a port\n");
        let result = ClientConfig::from_chia_root(temp_dir.path());
        assert!(matches!(result, Err(ChiaError::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_http_scheme() {
        let config = ClientConfig::new("http://localhost:55400");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_cert_and_key_together() {
        let mut config = ClientConfig::new("wss://localhost:55400");
        config.cert = Some(PathBuf::from("daemon.crt"));
        assert!(config.validate().is_err());

        let config = ClientConfig::new("ws://localhost:55400");
        assert!(config.validate().is_ok());
    }
}
