//! Caller side of callback bridges and deadline-bounded calls.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tether_api::{CancelHandle, EventHandler, SubscriptionSender};
use tether_broker::{BridgeHandle, Broker, HandlerService, Registry, RpcChannel, Service};
use tether_core::{CallContext, CallbackRegistration, Result};
use tracing::debug;

use crate::wire::Timed;

/// Reverse service calling `handler` with each decoded event.
pub fn event_service<W, T>(handler: EventHandler<T>, convert: fn(W) -> T) -> Arc<dyn Service>
where
    W: DeserializeOwned + Send + 'static,
    T: 'static,
{
    HandlerService::<W>::new(Arc::new(move |event| handler(convert(event))))
}

/// Reverse service feeding a local subscription. Items arriving while its
/// buffer is full are dropped.
pub fn subscription_service<W, T>(sender: SubscriptionSender<T>, convert: fn(W) -> T) -> Arc<dyn Service>
where
    W: DeserializeOwned + Send + 'static,
    T: Send + 'static,
{
    HandlerService::<W>::new(Arc::new(move |event| {
        sender.send(convert(event));
    }))
}

/// Bridges this side offered for long-lived registrations, keyed by the id
/// the peer returned.
pub struct ClientBridges {
    bridges: Registry<BridgeHandle>,
}

impl Default for ClientBridges {
    fn default() -> Self {
        Self {
            bridges: Registry::new("listener"),
        }
    }
}

impl ClientBridges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `service`, then announce it with `announce`. A failed
    /// announcement drops the bridge.
    pub async fn register<F, Fut>(&self, broker: &Broker, service: Arc<dyn Service>, announce: F) -> Result<String>
    where
        F: FnOnce(CallbackRegistration) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let bridge = broker.offer(service);
        let id = announce(bridge.registration()).await?;
        if let Some(stale) = self.bridges.insert(id.clone(), bridge) {
            stale.close();
        }
        Ok(id)
    }

    /// Ask the peer to drop the registration, then close the local bridge.
    pub async fn unregister<Fut>(&self, id: &str, withdraw: Fut) -> bool
    where
        Fut: Future<Output = Result<bool>>,
    {
        let ok = match withdraw.await {
            Ok(ok) => ok,
            Err(e) => {
                debug!(id, error = %e, "unregister failed");
                false
            }
        };
        if let Some(bridge) = self.bridges.remove(id) {
            bridge.close();
        }
        ok
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}

/// Keep `bridge` alive until `cancel` fires, the peer closes the bridge, or
/// the broker shuts down. On cancel, `withdraw` tells the peer first.
pub fn watch_cancel<F, Fut>(broker: &Broker, cancel: CancelHandle, bridge: BridgeHandle, withdraw: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let shutdown = broker.child_token();
    broker.spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => withdraw().await,
            _ = bridge.finished() => {}
            _ = shutdown.cancelled() => {}
        }
        bridge.close();
    });
}

/// Call `method` with `args` under `ctx`: the deadline travels with the
/// request and also bounds the local wait.
pub async fn call_timed<A, R>(channel: &RpcChannel, ctx: &CallContext, method: &str, args: A) -> Result<R>
where
    A: Serialize + Send,
    R: DeserializeOwned,
{
    let request = Timed::new(ctx.timeout_ms(), args);
    ctx.run(channel.call(method, &request)).await
}

/// Call a method whose local signature cannot report failure. Errors are
/// logged and dropped.
pub async fn notify<A>(channel: &RpcChannel, method: &str, args: &A)
where
    A: Serialize + ?Sized,
{
    if let Err(e) = channel.call::<A, serde_json::Value>(method, args).await {
        debug!(connection = channel.id(), method, error = %e, "call dropped");
    }
}

/// Like [`notify`] for getters: a failed call yields the default value.
pub async fn fetch_or_default<A, R>(channel: &RpcChannel, method: &str, args: &A) -> R
where
    A: Serialize + ?Sized,
    R: DeserializeOwned + Default,
{
    match channel.call(method, args).await {
        Ok(value) => value,
        Err(e) => {
            debug!(connection = channel.id(), method, error = %e, "call failed");
            R::default()
        }
    }
}

/// Empty parameter record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Empty {}
