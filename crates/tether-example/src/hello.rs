//! The hello plugin

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tether_api::{
    BasicPlugin, CancelHandle, ChatModule, ChatMsg, CommandsModule, ConfigMap, FlexHandler,
    FlexModule, FlexReply, Frame, Plugin, PluginTool, get_module, names,
};
use tether_core::{CallContext, Error, ListenerId, Result};
use tracing::{debug, info, warn};

/// Flex API taking a JSON string name and answering with a JSON string greeting.
pub const GREET_API: &str = "hello.greet";

const DEFAULT_GREETING: &str = "hello";

#[derive(Default)]
struct Loaded {
    listener: Option<(Arc<dyn ChatModule>, ListenerId)>,
    exposure: Option<CancelHandle>,
}

/// Greets players who say "hello", and anyone calling [`GREET_API`].
#[derive(Default)]
pub struct HelloPlugin {
    base: BasicPlugin,
    loaded: Mutex<Loaded>,
}

impl HelloPlugin {
    /// A hello plugin waiting for init.
    pub fn new() -> Self {
        Self::default()
    }

    /// The `greeting` entry of the plugin config.
    pub fn greeting(&self) -> String {
        self.base
            .config()
            .get("greeting")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_GREETING)
            .to_string()
    }

    fn frame(&self) -> Result<Arc<dyn Frame>> {
        self.base
            .frame()
            .ok_or_else(|| Error::module("hello plugin is not initialized"))
    }

    fn loaded(&self) -> std::sync::MutexGuard<'_, Loaded> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn listen(
        &self,
        chat: Arc<dyn ChatModule>,
        commands: Arc<dyn CommandsModule>,
    ) -> Result<()> {
        let greeting = self.greeting();
        let listener = chat
            .register_when_chat_msg(Arc::new(move |msg: ChatMsg| {
                if !msg.raw_msg.to_lowercase().contains("hello") {
                    return;
                }
                let commands = commands.clone();
                let line = format!("{greeting}, {}", msg.name);
                tokio::spawn(async move {
                    if let Err(e) = commands.send_chat(&line).await {
                        warn!(error = %e, "failed to answer in chat");
                    }
                });
            }))
            .await?;
        self.loaded().listener = Some((chat, listener));
        Ok(())
    }

    async fn expose(&self, flex: Arc<dyn FlexModule>) -> Result<()> {
        let greeting = self.greeting();
        let handler: FlexHandler = Arc::new(move |_ctx: CallContext, args: Vec<u8>| {
            let greeting = greeting.clone();
            Box::pin(async move { greet(&greeting, &args) }) as BoxFuture<'static, FlexReply>
        });
        let exposure = flex.expose(GREET_API, handler).await?;
        self.loaded().exposure = Some(exposure);
        Ok(())
    }
}

fn greet(greeting: &str, args: &[u8]) -> FlexReply {
    let name: String = match serde_json::from_slice(args) {
        Ok(name) => name,
        Err(e) => return FlexReply::err(format!("expected a name: {e}")),
    };
    match serde_json::to_vec(&format!("{greeting}, {name}")) {
        Ok(bytes) => FlexReply::ok(bytes),
        Err(e) => FlexReply::err(e.to_string()),
    }
}

#[async_trait]
impl Plugin for HelloPlugin {
    async fn init(&self, frame: Arc<dyn Frame>, id: &str, config: ConfigMap) -> Result<()> {
        self.base.init(frame.clone(), id, config).await?;
        let tool = PluginTool::new(frame, id).await?;
        tool.log_info("initialized").await;
        info!(plugin = id, name = tool.name(), "hello plugin initialized");
        Ok(())
    }

    async fn load(&self, _ctx: &CallContext) -> Result<()> {
        let frame = self.frame()?;
        let chat = get_module::<Arc<dyn ChatModule>>(frame.as_ref(), names::CHAT).await?;
        let commands =
            get_module::<Arc<dyn CommandsModule>>(frame.as_ref(), names::COMMANDS).await?;
        match (chat, commands) {
            (Some(chat), Some(commands)) => self.listen(chat, commands).await?,
            _ => debug!("no chat on this host, not listening"),
        }

        if let Some(flex) = get_module::<Arc<dyn FlexModule>>(frame.as_ref(), names::FLEX).await? {
            self.expose(flex).await?;
        }
        Ok(())
    }

    async fn unload(&self, _ctx: &CallContext) -> Result<()> {
        let loaded = std::mem::take(&mut *self.loaded());
        if let Some((chat, listener)) = loaded.listener {
            chat.unregister_when_chat_msg(&listener).await;
        }
        if let Some(exposure) = loaded.exposure {
            exposure.cancel();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greet_reads_a_json_name() {
        let reply = greet("hi", br#""alex""#);
        assert_eq!(reply.result.as_deref(), Some(&br#""hi, alex""#[..]));
        assert!(reply.error.is_empty());

        let reply = greet("hi", b"42");
        assert!(reply.result.is_none());
        assert!(reply.error.starts_with("expected a name"));
    }

    #[tokio::test]
    async fn test_load_before_init_fails() {
        let plugin = HelloPlugin::new();
        let err = plugin.load(&CallContext::background()).await.unwrap_err();
        assert!(matches!(err, Error::Module(_)));
        assert_eq!(plugin.greeting(), DEFAULT_GREETING);
    }
}
