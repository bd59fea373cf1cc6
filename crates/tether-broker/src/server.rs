//! Server side of a request/response protocol
//!
//! A server stub implements [`Service`] by matching on the method name and
//! handing decoded params to its local implementation.

use crate::connection::Connection;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tether_core::{Request, Response, RpcError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of one dispatched method
pub type MethodResult = std::result::Result<serde_json::Value, RpcError>;

/// A wire-callable object
#[async_trait]
pub trait Service: Send + Sync + 'static {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult;

    /// Called once the connection serving this object is gone. Stubs tear
    /// down the bridges they still hold here.
    async fn on_close(&self) {}
}

/// Answer requests on `conn` one at a time until the peer closes it, the
/// transport fails, `shutdown` fires or a request cannot be decoded.
pub async fn serve_connection(
    mut conn: Connection,
    service: Arc<dyn Service>,
    shutdown: CancellationToken,
) {
    let id = conn.id();
    debug!(connection = id, "serving");
    loop {
        let bytes = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = conn.recv() => match msg {
                Some(bytes) => bytes,
                None => break,
            },
        };

        // Without a request id no answer can reach the caller; closing fails
        // its pending call instead.
        let request = match serde_json::from_slice::<Request>(&bytes) {
            Ok(request) => request,
            Err(e) => {
                warn!(connection = id, error = %e, "malformed request, closing");
                break;
            }
        };
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => break,
            outcome = service.handle(&request.method, request.params) => outcome,
        };
        let response = match outcome {
            Ok(value) => Response::success(request.id, value),
            Err(err) => Response::error(request.id, err),
        };

        let bytes = match serde_json::to_vec(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(connection = id, error = %e, "unencodable response");
                continue;
            }
        };
        if conn.send(bytes).is_err() {
            break;
        }
    }
    conn.close();
    service.on_close().await;
    debug!(connection = id, "stopped serving");
}

/// Decode method params. Missing params decode as the default value.
pub fn decode<T>(params: serde_json::Value) -> std::result::Result<T, RpcError>
where
    T: DeserializeOwned + Default,
{
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// Encode a method result.
pub fn encode<T: Serialize>(value: T) -> MethodResult {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(e.to_string()))
}

/// Encode a fallible local call, forwarding its error message.
pub fn reply<T: Serialize>(result: tether_core::Result<T>) -> MethodResult {
    match result {
        Ok(value) => encode(value),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;
    use crate::channel::RpcChannel;
    use crate::config::{BrokerConfig, Role};
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl Service for Echo {
        async fn handle(&self, _method: &str, params: serde_json::Value) -> MethodResult {
            Ok(params)
        }
    }

    async fn dial_echo() -> (Broker, Broker, Connection) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (host, _) = Broker::new(a, Role::Host, BrokerConfig::default());
        let (ext, _) = Broker::new(b, Role::Extension, BrokerConfig::default());
        let handle = host.serve_object("echo", Arc::new(Echo));
        let conn = ext.dial(handle.connection_id).await.unwrap();
        (host, ext, conn)
    }

    #[tokio::test]
    async fn test_requests_are_answered_in_turn() {
        let (_host, _ext, conn) = dial_echo().await;
        let channel = RpcChannel::new(conn);
        let first: String = channel.call("echo", "one").await.unwrap();
        let second: Vec<u32> = channel.call("echo", &[1, 2]).await.unwrap();
        assert_eq!(first, "one");
        assert_eq!(second, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_undecodable_request_closes_the_connection() {
        let (_host, _ext, mut conn) = dial_echo().await;
        conn.send(b"{not json".to_vec()).unwrap();
        let next = tokio::time::timeout(Duration::from_secs(2), conn.recv())
            .await
            .unwrap();
        assert!(next.is_none());
        assert!(matches!(
            RpcChannel::new(conn).call::<_, String>("echo", "late").await,
            Err(tether_core::Error::ConnectionClosed)
        ));
    }
}
