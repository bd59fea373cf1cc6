//! Client side of a request/response protocol bound to one virtual connection

use crate::connection::Connection;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::atomic::{AtomicU64, Ordering};
use tether_core::{ConnectionId, Error, Request, Response, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// RPC client over a virtual connection.
///
/// Calls on one channel are strictly serialized: the lock is held from send
/// until the matching response arrives. Distinct channels never wait on each
/// other.
pub struct RpcChannel {
    id: ConnectionId,
    conn: Mutex<Connection>,
    request_id: AtomicU64,
}

impl RpcChannel {
    /// Take over `conn` for calls.
    pub fn new(conn: Connection) -> Self {
        Self {
            id: conn.id(),
            conn: Mutex::new(conn),
            request_id: AtomicU64::new(1),
        }
    }

    /// Connection the calls travel on.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Call a method with typed params and result
    pub async fn call<I, O>(&self, method: &str, params: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let value = self.call_value(method, serde_json::to_value(params)?).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Call a method with raw JSON params
    pub async fn call_value(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(method, params, id)?;
        let bytes = serde_json::to_vec(&request)?;

        debug!(connection = self.id, "Calling method: {} (id={})", method, id);

        let mut conn = self.conn.lock().await;
        conn.send(bytes)?;
        loop {
            let Some(bytes) = conn.recv().await else {
                return Err(Error::ConnectionClosed);
            };
            let response: Response = serde_json::from_slice(&bytes)?;
            if response.id != id {
                // Left behind by a caller that gave up waiting.
                warn!(
                    connection = self.id,
                    expected = id,
                    got = response.id,
                    "discarding stale response"
                );
                continue;
            }
            return response.into_result();
        }
    }

    /// Close the underlying connection once any in-flight call finished.
    pub async fn close(&self) {
        self.conn.lock().await.close();
    }
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel").field("id", &self.id).finish()
    }
}
