//! Callback bridges
//!
//! A function-valued argument crosses the wire as a connection id. The side
//! holding the function offers a one-method reverse service on a fresh
//! connection ([`Broker::offer`]); the other side dials it
//! ([`CallbackClient::dial`]) and invokes it whenever the event fires.

use crate::broker::Broker;
use crate::channel::RpcChannel;
use crate::server::{MethodResult, Service, reply, serve_connection};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tether_core::{CallbackRegistration, ConnectionId, Result, RpcError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The single method of every reverse protocol.
pub const INVOKE: &str = "tether.callback.invoke";

/// Ownership of a served bridge. Closing or dropping it stops the serving task.
#[derive(Debug)]
pub struct BridgeHandle {
    id: ConnectionId,
    token: CancellationToken,
    done: CancellationToken,
}

impl BridgeHandle {
    /// Connection the bridge is served on.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The registration to send to the peer.
    pub fn registration(&self) -> CallbackRegistration {
        CallbackRegistration::new(self.id)
    }

    /// Stop serving. A dial that has not attached yet is rejected.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Whether the serving task has exited.
    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Resolves once the serving task has exited.
    pub async fn finished(&self) {
        self.done.cancelled().await
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Broker {
    /// Serve `service` on a freshly allocated connection for the peer to dial.
    pub fn offer(&self, service: Arc<dyn Service>) -> BridgeHandle {
        let id = self.allocate();
        let token = self.child_token();
        let done = CancellationToken::new();

        let broker = self.clone();
        let task_token = token.clone();
        let guard = done.clone().drop_guard();
        self.spawn(async move {
            let _guard = guard;
            let conn = tokio::select! {
                biased;
                _ = task_token.cancelled() => {
                    broker.withdraw(id);
                    return;
                }
                conn = broker.accept(id) => conn,
            };
            match conn {
                Ok(conn) => serve_connection(conn, service, task_token).await,
                Err(e) => debug!(connection = id, error = %e, "bridge never attached"),
            }
        });

        BridgeHandle { id, token, done }
    }
}

/// Remote end of a bridge.
#[derive(Debug)]
pub struct CallbackClient {
    channel: RpcChannel,
}

impl CallbackClient {
    /// Attach to the bridge a registration names.
    pub async fn dial(broker: &Broker, registration: CallbackRegistration) -> Result<Self> {
        let id = registration.require()?;
        Ok(Self {
            channel: RpcChannel::new(broker.dial(id).await?),
        })
    }

    /// Connection this client is attached to.
    pub fn id(&self) -> ConnectionId {
        self.channel.id()
    }

    /// Deliver an event. Delivery is best-effort: a vanished peer is logged and
    /// reported as `false`, never as an error.
    pub async fn invoke<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        match self.channel.call::<T, serde_json::Value>(INVOKE, payload).await {
            Ok(_) => true,
            Err(e) => {
                debug!(connection = self.id(), error = %e, "callback delivery dropped");
                false
            }
        }
    }

    /// Invoke a callback that answers with a value.
    pub async fn call<T, R>(&self, payload: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.channel.call(INVOKE, payload).await
    }

    /// Close the bridge once any in-flight delivery completed.
    pub async fn close(&self) {
        self.channel.close().await
    }
}

pub(crate) type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Reverse service around a plain event handler.
pub struct HandlerService<T> {
    handler: Handler<T>,
}

impl<T> HandlerService<T> {
    pub fn new(handler: Handler<T>) -> Arc<Self> {
        Arc::new(Self { handler })
    }
}

#[async_trait]
impl<T> Service for HandlerService<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        if method != INVOKE {
            return Err(RpcError::method_not_found(method));
        }
        let event: T =
            serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))?;
        (self.handler)(event);
        Ok(serde_json::Value::Null)
    }
}

type AsyncHandler<T, R> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// Reverse service around a handler that answers.
pub struct FnService<T, R> {
    handler: AsyncHandler<T, R>,
}

impl<T, R> FnService<T, R> {
    pub fn new(handler: AsyncHandler<T, R>) -> Arc<Self> {
        Arc::new(Self { handler })
    }
}

#[async_trait]
impl<T, R> Service for FnService<T, R>
where
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        if method != INVOKE {
            return Err(RpcError::method_not_found(method));
        }
        let request: T =
            serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))?;
        reply((self.handler)(request).await)
    }
}
