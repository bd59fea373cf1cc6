//! Error types shared by every tether crate

use thiserror::Error;

/// Result type for tether operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on either side of a tether connection
///
/// Business errors raised by a module implementation cross the wire as
/// [`Error::Module`] carrying only their message, so a caller cannot tell a
/// local failure from a remote one.
#[derive(Debug, Error)]
pub enum Error {
    /// Error reported by a module implementation
    #[error("{0}")]
    Module(String),

    /// The virtual connection or the transport underneath it is gone
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer did not attach to a virtual connection in time
    #[error("timed out waiting for connection {0}")]
    AttachTimeout(u32),

    /// The peer refused to attach a virtual connection
    #[error("connection {0} rejected by peer")]
    Rejected(u32),

    /// Malformed frames, missing handles, unknown methods
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The call context deadline passed before the call completed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The call context was cancelled
    #[error("cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a business error from a message
    pub fn module(msg: impl Into<String>) -> Self {
        Error::Module(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Whether this error means the peer is unreachable
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Error::ConnectionClosed | Error::AttachTimeout(_) | Error::Rejected(_)
        )
    }
}
