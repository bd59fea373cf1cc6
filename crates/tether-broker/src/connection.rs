//! Virtual connections

use crate::broker::Inner;
use std::sync::Arc;
use tether_core::{ConnectionId, Result};
use tokio::sync::mpsc;

/// One message-oriented stream multiplexed over the transport.
///
/// Dropping a connection closes it; the peer's [`Connection::recv`] then
/// returns `None`.
pub struct Connection {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    inner: Arc<Inner>,
    closed: bool,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        inbound: mpsc::UnboundedReceiver<Vec<u8>>,
        inner: Arc<Inner>,
    ) -> Self {
        Self {
            id,
            inbound,
            inner,
            closed: false,
        }
    }

    /// Stream id on the transport.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue one message for the peer.
    pub fn send(&self, payload: Vec<u8>) -> Result<()> {
        if self.closed {
            return Err(tether_core::Error::ConnectionClosed);
        }
        self.inner.send_data(self.id, payload)
    }

    /// Next message from the peer, `None` once either side closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// Detach and tell the peer. Idempotent.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.release(self.id);
            self.inbound.close();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}
