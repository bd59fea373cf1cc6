//! Object handles: serving a factory result and resolving it on the other side.

use crate::broker::Broker;
use crate::channel::RpcChannel;
use crate::server::{Service, serve_connection};
use std::sync::Arc;
use tether_core::{Handle, Result};
use tracing::debug;

impl Broker {
    /// Serve `service` on a fresh connection and describe it as a handle.
    ///
    /// The serving task ends when the peer closes the resolved proxy, when it
    /// never dials within the accept timeout, or when the broker shuts down.
    pub fn serve_object(&self, kind: &str, service: Arc<dyn Service>) -> Handle {
        let id = self.allocate();
        let token = self.child_token();
        let broker = self.clone();
        self.spawn(async move {
            match broker.accept(id).await {
                Ok(conn) => serve_connection(conn, service, token).await,
                Err(e) => debug!(connection = id, error = %e, "handle never resolved"),
            }
        });
        Handle::new(kind, id)
    }

    /// Serve an optional object; `None` becomes an absent handle.
    pub fn serve_optional(&self, kind: &str, service: Option<Arc<dyn Service>>) -> Handle {
        match service {
            Some(service) => self.serve_object(kind, service),
            None => Handle::absent(),
        }
    }

    /// Dial the connection behind a handle. Absent handles resolve to `None`.
    pub async fn resolve(&self, handle: &Handle) -> Result<Option<RpcChannel>> {
        match handle.target()? {
            None => Ok(None),
            Some(id) => Ok(Some(RpcChannel::new(self.dial(id).await?))),
        }
    }
}
