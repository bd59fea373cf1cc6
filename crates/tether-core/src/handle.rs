//! Serializable references to remote objects and callbacks.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Identifier of a virtual connection; `0` means absent.
pub type ConnectionId = u32;

/// Opaque id minted by whichever side owns a listener registration.
pub type ListenerId = String;

/// A reference to an object the peer is serving on a virtual connection.
///
/// `exists = false` means the factory call produced nothing. A present handle
/// with connection id `0` is malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub connection_id: ConnectionId,
}

impl Handle {
    /// A handle for "no object".
    pub fn absent() -> Self {
        Self::default()
    }

    /// A present handle to the object served on `connection_id`.
    pub fn new(kind: impl Into<String>, connection_id: ConnectionId) -> Self {
        Self {
            exists: true,
            kind: kind.into(),
            connection_id,
        }
    }

    /// The connection to dial, `None` when the handle is absent.
    pub fn target(&self) -> Result<Option<ConnectionId>> {
        match (self.exists, self.connection_id) {
            (false, _) => Ok(None),
            (true, 0) => Err(Error::protocol(format!(
                "handle of kind '{}' has no connection id",
                self.kind
            ))),
            (true, id) => Ok(Some(id)),
        }
    }
}

/// Request argument naming the connection that serves a callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackRegistration {
    #[serde(default)]
    pub handler_connection_id: ConnectionId,
}

impl CallbackRegistration {
    pub fn new(handler_connection_id: ConnectionId) -> Self {
        Self {
            handler_connection_id,
        }
    }

    /// The connection to dial; a zero id is a protocol error.
    pub fn require(&self) -> Result<ConnectionId> {
        if self.handler_connection_id == 0 {
            return Err(Error::protocol("callback registration without connection id"));
        }
        Ok(self.handler_connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_handle_has_no_target() {
        assert_eq!(Handle::absent().target().unwrap(), None);
    }

    #[test]
    fn test_present_handle_without_id_is_protocol_error() {
        let handle = Handle {
            exists: true,
            kind: "chat".into(),
            connection_id: 0,
        };
        assert!(matches!(handle.target(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_missing_fields_decode_as_absent() {
        let handle: Handle = serde_json::from_str("{}").unwrap();
        assert_eq!(handle, Handle::absent());
        let reg: CallbackRegistration = serde_json::from_str("{}").unwrap();
        assert!(reg.require().is_err());
    }
}
