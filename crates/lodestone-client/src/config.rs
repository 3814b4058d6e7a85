//! Client configuration.
//!
//! Sources, later ones winning: built-in defaults, a TOML file, `LODESTONE_*` environment
//! variables.

use lodestone_common::{LodestoneError, ProtocolVersion, Result};
use lodestone_logger::LogSeverity;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "lodestone.toml";

const MAX_USERNAME_LEN: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub protocol_version: ProtocolVersion,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 25565,
            protocol_version: ProtocolVersion::LATEST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub username: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: "Lodestone".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub connect_timeout_ms: u64,
    /// Size of the socket read buffer in bytes.
    pub read_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            read_buffer_size: 8 * 1024,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub severity: LogSeverity,
}

impl ClientConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| LodestoneError::Config(format!("failed to parse TOML: {e}")))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LodestoneError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Applies `LODESTONE_HOST`, `LODESTONE_PORT`, `LODESTONE_USERNAME` and `LODESTONE_LOG`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(host) = lookup("LODESTONE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("LODESTONE_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| LodestoneError::Config(format!("LODESTONE_PORT={port}: {e}")))?;
        }
        if let Some(username) = lookup("LODESTONE_USERNAME") {
            self.account.username = username;
        }
        if let Some(severity) = lookup("LODESTONE_LOG") {
            self.logging.severity = severity
                .parse()
                .map_err(|e| LodestoneError::Config(format!("LODESTONE_LOG: {e}")))?;
        }
        Ok(self)
    }

    /// Loads `path` when it exists, otherwise starts from defaults. Environment wins either way.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.with_env_overrides()
    }

    /// Every problem with this configuration. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_owned());
        }
        if self.server.port == 0 {
            errors.push("server.port must not be 0".to_owned());
        }
        let version = self.server.protocol_version;
        if version < ProtocolVersion::V1_12_2 || version > ProtocolVersion::LATEST {
            errors.push(format!(
                "server.protocol_version {version} is outside {}..={}",
                ProtocolVersion::V1_12_2,
                ProtocolVersion::LATEST
            ));
        }

        let username = &self.account.username;
        if username.is_empty() || username.len() > MAX_USERNAME_LEN {
            errors.push(format!(
                "account.username must be 1 to {MAX_USERNAME_LEN} characters"
            ));
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            errors.push("account.username may only contain letters, digits and '_'".to_owned());
        }

        if self.connection.connect_timeout_ms == 0 {
            errors.push("connection.connect_timeout_ms must be positive".to_owned());
        }
        if self.connection.read_buffer_size < 64 {
            errors.push("connection.read_buffer_size must be at least 64".to_owned());
        }

        errors
    }

    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(LodestoneError::Config(format!(
                "invalid configuration:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}
