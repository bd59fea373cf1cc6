//! Root objects: the host's frame and the extension's plugin.

use crate::config::PluginConfig;
use crate::modules::Module;
use crate::types::{ConfigMap, EventHandler};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tether_core::{CallContext, Error, ListenerId, Result};

/// What the host offers a plugin: its modules and plugin management.
#[async_trait]
pub trait Frame: Send + Sync {
    async fn list_modules(&self) -> Result<Vec<String>>;

    async fn get_module(&self, name: &str) -> Result<Option<Module>>;

    async fn get_plugin_config(&self, _id: &str) -> Result<Option<PluginConfig>> {
        Ok(None)
    }

    /// Replace the `配置` section of a plugin's on-disk config.
    async fn upgrade_plugin_config(&self, _id: &str, _config: ConfigMap) -> Result<()> {
        Err(Error::module("plugin config upgrades are not supported"))
    }

    /// Runs once the host finished loading every plugin.
    async fn register_when_activate(&self, _handler: EventHandler<()>) -> Result<ListenerId> {
        Err(Error::module("activate events are not supported"))
    }

    async fn unregister_when_activate(&self, _listener_id: &str) -> bool {
        false
    }
}

/// What an extension implements.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn init(&self, frame: Arc<dyn Frame>, id: &str, config: ConfigMap) -> Result<()>;

    async fn load(&self, ctx: &CallContext) -> Result<()>;

    async fn unload(&self, ctx: &CallContext) -> Result<()>;
}

#[derive(Clone)]
struct Init {
    frame: Arc<dyn Frame>,
    id: String,
    config: ConfigMap,
}

/// Keeps what `init` delivered. Plugins embed it and forward `init` to it.
#[derive(Default)]
pub struct BasicPlugin {
    state: RwLock<Option<Init>>,
}

impl BasicPlugin {
    /// An uninitialized plugin.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Option<Init> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The host frame, once initialized.
    pub fn frame(&self) -> Option<Arc<dyn Frame>> {
        self.state().map(|s| s.frame)
    }

    /// Plugin id given at init, empty before.
    pub fn id(&self) -> String {
        self.state().map(|s| s.id).unwrap_or_default()
    }

    /// Config given at init.
    pub fn config(&self) -> ConfigMap {
        self.state().map(|s| s.config).unwrap_or_default()
    }
}

#[async_trait]
impl Plugin for BasicPlugin {
    async fn init(&self, frame: Arc<dyn Frame>, id: &str, config: ConfigMap) -> Result<()> {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(Init {
            frame,
            id: id.to_string(),
            config,
        });
        Ok(())
    }

    async fn load(&self, _ctx: &CallContext) -> Result<()> {
        Ok(())
    }

    async fn unload(&self, _ctx: &CallContext) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for BasicPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("BasicPlugin")
            .field("initialized", &state.is_some())
            .field("id", &state.as_ref().map(|s| s.id.as_str()))
            .finish()
    }
}
