//! Frame stubs
//!
//! The frame is the host's root object. Every module it hands out is served
//! on its own connection; the response carries the handle.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_api::{ConfigMap, EventHandler, Frame, Module, PluginConfig};
use tether_broker::{Broker, MethodResult, RpcChannel, Service, decode, encode, reply};
use tether_core::{CallbackRegistration, Handle, ListenerId, Result, RpcError};

use crate::client::{ClientBridges, Empty, event_service};
use crate::kinds::{resolve_module, serve_module};
use crate::relay::Listeners;
use crate::wire::{IdArgs, NameArgs};

pub mod methods {
    pub const LIST_MODULES: &str = "tether.frame.list_modules";
    pub const GET_MODULE: &str = "tether.frame.get_module";
    pub const GET_PLUGIN_CONFIG: &str = "tether.frame.get_plugin_config";
    pub const UPGRADE_PLUGIN_CONFIG: &str = "tether.frame.upgrade_plugin_config";
    pub const REGISTER_WHEN_ACTIVATE: &str = "tether.frame.register_when_activate";
    pub const UNREGISTER_WHEN_ACTIVATE: &str = "tether.frame.unregister_when_activate";
}

/// Answer to `get_module`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleReply {
    pub exists: bool,
    pub name: String,
    pub handle: Handle,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UpgradeArgs {
    id: String,
    config: ConfigMap,
}

/// Serves a local [`Frame`].
pub struct FrameServer {
    inner: Arc<dyn Frame>,
    broker: Broker,
    activate: Listeners<()>,
}

impl FrameServer {
    pub fn new(inner: Arc<dyn Frame>, broker: Broker) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broker,
            activate: Listeners::new(),
        })
    }

    async fn get_module(&self, name: String) -> Result<ModuleReply> {
        Ok(match self.inner.get_module(&name).await? {
            Some(module) => ModuleReply {
                exists: true,
                handle: serve_module(&self.broker, module),
                name,
            },
            None => ModuleReply {
                exists: false,
                name,
                handle: Handle::absent(),
            },
        })
    }
}

#[async_trait]
impl Service for FrameServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::LIST_MODULES => reply(self.inner.list_modules().await),
            methods::GET_MODULE => {
                let args: NameArgs = decode(params)?;
                reply(self.get_module(args.name).await)
            }
            methods::GET_PLUGIN_CONFIG => {
                let args: IdArgs = decode(params)?;
                reply(self.inner.get_plugin_config(&args.id).await)
            }
            methods::UPGRADE_PLUGIN_CONFIG => {
                let args: UpgradeArgs = decode(params)?;
                reply(self.inner.upgrade_plugin_config(&args.id, args.config).await)
            }
            methods::REGISTER_WHEN_ACTIVATE => {
                let registration: CallbackRegistration = decode(params)?;
                reply(
                    self.activate
                        .register(&self.broker, registration, std::convert::identity, |handler| {
                            self.inner.register_when_activate(handler)
                        })
                        .await,
                )
            }
            methods::UNREGISTER_WHEN_ACTIVATE => {
                let args: IdArgs = decode(params)?;
                let stop = self.inner.unregister_when_activate(&args.id);
                encode(self.activate.unregister(&args.id, stop).await)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn on_close(&self) {
        self.activate
            .close_all(|id| async move { self.inner.unregister_when_activate(&id).await })
            .await;
    }
}

/// [`Frame`] proxy handed to the plugin's `init`.
pub struct FrameClient {
    channel: Arc<RpcChannel>,
    broker: Broker,
    bridges: ClientBridges,
}

impl FrameClient {
    /// A proxy for the host frame on `channel`.
    pub fn new(channel: Arc<RpcChannel>, broker: Broker) -> Self {
        Self {
            channel,
            broker,
            bridges: ClientBridges::new(),
        }
    }
}

#[async_trait]
impl Frame for FrameClient {
    async fn list_modules(&self) -> Result<Vec<String>> {
        self.channel.call(methods::LIST_MODULES, &Empty {}).await
    }

    async fn get_module(&self, name: &str) -> Result<Option<Module>> {
        let reply: ModuleReply = self
            .channel
            .call(methods::GET_MODULE, &NameArgs::new(name))
            .await?;
        if !reply.exists {
            return Ok(None);
        }
        resolve_module(&self.broker, &reply.name, &reply.handle).await
    }

    async fn get_plugin_config(&self, id: &str) -> Result<Option<PluginConfig>> {
        self.channel
            .call(methods::GET_PLUGIN_CONFIG, &IdArgs::new(id))
            .await
    }

    async fn upgrade_plugin_config(&self, id: &str, config: ConfigMap) -> Result<()> {
        let args = UpgradeArgs {
            id: id.to_string(),
            config,
        };
        self.channel.call(methods::UPGRADE_PLUGIN_CONFIG, &args).await
    }

    async fn register_when_activate(&self, handler: EventHandler<()>) -> Result<ListenerId> {
        let channel = &self.channel;
        let service = event_service::<(), _>(handler, std::convert::identity);
        self.bridges
            .register(&self.broker, service, |registration| async move {
                channel
                    .call(methods::REGISTER_WHEN_ACTIVATE, &registration)
                    .await
            })
            .await
    }

    async fn unregister_when_activate(&self, listener_id: &str) -> bool {
        let args = IdArgs::new(listener_id);
        let withdraw = self.channel.call(methods::UNREGISTER_WHEN_ACTIVATE, &args);
        self.bridges.unregister(listener_id, withdraw).await
    }
}
