//! Serve configuration
//!
//! How an extension reaches its host. Loaded from TOML:
//!
//! ```toml
//! [transport]
//! kind = "tcp"
//! addr = "127.0.0.1:0"
//!
//! [broker]
//! accept_timeout_ms = 2000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tether_broker::BrokerConfig;

use crate::error::ServeResult;

/// The byte stream a plugin is served over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Transport {
    /// The host's pipes on stdin and stdout.
    #[default]
    Stdio,
    /// Listen on `addr` and announce it with a handshake line.
    Tcp { addr: String },
    /// Host and plugin share this process. Skips the launch cookie.
    InProcess,
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Tcp { .. } => "tcp",
            Transport::InProcess => "in-process",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub transport: Transport,
    pub broker: BrokerConfig,
}

impl ServeConfig {
    /// Config for host and plugin living in one process.
    pub fn in_process() -> Self {
        Self {
            transport: Transport::InProcess,
            ..Default::default()
        }
    }

    /// Whether plugin and host share this process.
    pub fn is_in_process(&self) -> bool {
        self.transport == Transport::InProcess
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(content: &str) -> ServeResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ServeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServeError;

    #[test]
    fn test_load_toml() -> anyhow::Result<()> {
        let toml_content = r#"
[transport]
kind = "tcp"
addr = "127.0.0.1:0"

[broker]
accept_timeout_ms = 2000
"#;
        let dir = tempfile::tempdir()?;
        let file_path = dir.path().join("tether.toml");
        std::fs::write(&file_path, toml_content)?;

        let config = ServeConfig::load(&file_path)?;
        assert_eq!(
            config.transport,
            Transport::Tcp {
                addr: "127.0.0.1:0".into()
            }
        );
        assert_eq!(config.broker.accept_timeout_ms, 2000);
        assert_eq!(config.broker.dial_timeout_ms, 5000);
        assert!(!config.is_in_process());
        Ok(())
    }

    #[test]
    fn test_empty_config_is_stdio() -> anyhow::Result<()> {
        let config = ServeConfig::from_toml_str("")?;
        assert_eq!(config, ServeConfig::default());
        assert_eq!(config.transport.name(), "stdio");
        Ok(())
    }

    #[test]
    fn test_in_process_selected_by_value() -> anyhow::Result<()> {
        let config = ServeConfig::from_toml_str("[transport]\nkind = \"in-process\"\n")?;
        assert!(config.is_in_process());
        assert_eq!(config, ServeConfig::in_process());
        Ok(())
    }

    #[test]
    fn test_bad_config_errors() {
        let err = ServeConfig::from_toml_str("[transport]\nkind = \"pigeon\"\n").unwrap_err();
        assert!(matches!(err, ServeError::Config(_)));
        let err = ServeConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ServeError::Io(_)));
    }
}
