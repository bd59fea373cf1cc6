//! Errors of the serve and connect entry points

use thiserror::Error;

/// Result type for starting or connecting a plugin
pub type ServeResult<T> = std::result::Result<T, ServeError>;

#[derive(Debug, Error)]
pub enum ServeError {
    /// The process was not started by a tether host
    #[error("not launched by a tether host: TEMPEST_DYNAMIC_PLUGIN is missing or wrong")]
    NotLaunchedByHost,

    /// The transport in the config cannot be used by this entry point
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(&'static str),

    /// The extension's announcement line could not be parsed
    #[error("malformed handshake line: {0}")]
    Handshake(String),

    /// Incompatible protocol version announced by the peer
    #[error("protocol version {0} is not supported")]
    Version(u32),

    /// Config file content is not valid
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tether(#[from] tether_core::Error),
}
