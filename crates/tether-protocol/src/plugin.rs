//! Root plugin stubs
//!
//! The extension serves its [`Plugin`] on the bootstrap connection. The host
//! drives it through [`PluginClient`]: `init` offers the host's frame as a
//! bridge and sends its handle, `load` and `unload` carry the caller's
//! deadline.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_api::{ConfigMap, Frame, Plugin};
use tether_broker::{BridgeHandle, Broker, MethodResult, RpcChannel, Service, decode, reply};
use tether_core::{CallContext, Error, Handle, Result, RpcError};
use tracing::{debug, info};

use crate::client::{Empty, call_timed};
use crate::frame::{FrameClient, FrameServer};
use crate::wire::Timed;

pub mod methods {
    pub const INIT: &str = "tether.plugin.init";
    pub const LOAD: &str = "tether.plugin.load";
    pub const UNLOAD: &str = "tether.plugin.unload";
}

/// Handle kind of the frame sent with `init`.
pub const FRAME_KIND: &str = "frame";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct InitArgs {
    frame_handle: Handle,
    id: String,
    config: ConfigMap,
}

/// Serves an extension's [`Plugin`].
pub struct PluginServer {
    inner: Arc<dyn Plugin>,
    broker: Broker,
}

impl PluginServer {
    pub fn new(inner: Arc<dyn Plugin>, broker: Broker) -> Arc<Self> {
        Arc::new(Self { inner, broker })
    }

    async fn init(&self, args: InitArgs) -> Result<()> {
        let Some(channel) = self.broker.resolve(&args.frame_handle).await? else {
            return Err(Error::protocol("init without a frame"));
        };
        let frame = FrameClient::new(Arc::new(channel), self.broker.clone());
        info!(plugin = %args.id, "initializing");
        self.inner.init(Arc::new(frame), &args.id, args.config).await
    }
}

#[async_trait]
impl Service for PluginServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::INIT => {
                let args: InitArgs = decode(params)?;
                reply(self.init(args).await)
            }
            methods::LOAD => {
                let Timed { timeout_ms, .. } = decode::<Timed<Empty>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                reply(ctx.run(self.inner.load(&ctx)).await)
            }
            methods::UNLOAD => {
                let Timed { timeout_ms, .. } = decode::<Timed<Empty>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                reply(ctx.run(self.inner.unload(&ctx)).await)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// Host-side [`Plugin`] proxy over the bootstrap connection.
pub struct PluginClient {
    channel: Arc<RpcChannel>,
    broker: Broker,
    frame: Mutex<Option<BridgeHandle>>,
}

impl PluginClient {
    /// A proxy for the plugin served on the bootstrap channel.
    pub fn new(channel: Arc<RpcChannel>, broker: Broker) -> Self {
        Self {
            channel,
            broker,
            frame: Mutex::new(None),
        }
    }

    /// Withdraw the frame and stop talking to the extension.
    pub async fn close(&self) {
        if let Some(bridge) = self.take_frame() {
            bridge.close();
        }
        self.channel.close().await;
    }

    fn take_frame(&self) -> Option<BridgeHandle> {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl Plugin for PluginClient {
    async fn init(&self, frame: Arc<dyn Frame>, id: &str, config: ConfigMap) -> Result<()> {
        let bridge = self.broker.offer(FrameServer::new(frame, self.broker.clone()));
        let args = InitArgs {
            frame_handle: Handle::new(FRAME_KIND, bridge.id()),
            id: id.to_string(),
            config,
        };
        if let Err(e) = self.channel.call::<_, ()>(methods::INIT, &args).await {
            bridge.close();
            return Err(e);
        }
        debug!(plugin = id, connection = bridge.id(), "frame offered");
        let stale = self
            .frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(bridge);
        if let Some(stale) = stale {
            stale.close();
        }
        Ok(())
    }

    async fn load(&self, ctx: &CallContext) -> Result<()> {
        call_timed(&self.channel, ctx, methods::LOAD, Empty {}).await
    }

    async fn unload(&self, ctx: &CallContext) -> Result<()> {
        call_timed(&self.channel, ctx, methods::UNLOAD, Empty {}).await
    }
}
