//! An in-memory host for driving plugins without a game
//!
//! Chat lines typed with [`DemoHost::say`] reach every chat listener, and
//! whatever a plugin sends back with `send_chat` comes out of
//! [`DemoHost::next_reply`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tether_api::{
    CancelHandle, ChatModule, ChatMsg, CommandOutput, CommandsModule, ConfigMap, EventHandler,
    FlexHandler, FlexModule, FlexReply, Frame, Level, LoggerModule, Module, PluginConfig,
    Subscription, SubscriptionSender, names,
};
use tether_core::{CallContext, ListenerId, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Buffer of each flex topic subscriber.
const TOPIC_BUFFER: usize = 64;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct DemoChat {
    next: AtomicU32,
    listeners: Mutex<HashMap<ListenerId, (Option<String>, EventHandler<ChatMsg>)>>,
    intercepts: Mutex<Vec<(String, CancelHandle, EventHandler<ChatMsg>)>>,
}

impl DemoChat {
    fn add(&self, sender: Option<String>, handler: EventHandler<ChatMsg>) -> ListenerId {
        let id = format!("listener:{}", self.next.fetch_add(1, Ordering::SeqCst) + 1);
        locked(&self.listeners).insert(id.clone(), (sender, handler));
        id
    }

    /// `name` says `text`.
    pub fn say(&self, name: &str, text: &str) {
        let msg = ChatMsg {
            name: name.to_string(),
            raw_msg: text.to_string(),
            parsed_msg: text.to_string(),
            msg: text.split_whitespace().map(str::to_string).collect(),
            ..Default::default()
        };

        let handlers: Vec<_> = locked(&self.listeners)
            .values()
            .filter(|(sender, _)| sender.as_deref().is_none_or(|s| s == name))
            .map(|(_, handler)| handler.clone())
            .collect();
        let intercepts: Vec<_> = {
            let mut pending = locked(&self.intercepts);
            pending.retain(|(_, cancel, _)| !cancel.is_cancelled());
            let (hit, rest): (Vec<_>, Vec<_>) = pending.drain(..).partition(|(s, _, _)| s == name);
            *pending = rest;
            hit.into_iter().map(|(_, _, handler)| handler).collect()
        };

        for handler in handlers.iter().chain(intercepts.iter()) {
            handler(msg.clone());
        }
    }
}

#[async_trait]
impl ChatModule for DemoChat {
    fn name(&self) -> &str {
        names::CHAT
    }

    async fn register_when_chat_msg(&self, handler: EventHandler<ChatMsg>) -> Result<ListenerId> {
        Ok(self.add(None, handler))
    }

    async fn unregister_when_chat_msg(&self, listener_id: &str) -> bool {
        locked(&self.listeners).remove(listener_id).is_some()
    }

    async fn register_when_receive_msg_from_sender_named(
        &self,
        name: &str,
        handler: EventHandler<ChatMsg>,
    ) -> Result<ListenerId> {
        Ok(self.add(Some(name.to_string()), handler))
    }

    async fn unregister_when_receive_msg_from_sender_named(&self, listener_id: &str) -> bool {
        self.unregister_when_chat_msg(listener_id).await
    }

    async fn intercept_next_message(
        &self,
        name: &str,
        handler: EventHandler<ChatMsg>,
    ) -> Result<CancelHandle> {
        let cancel = CancelHandle::new();
        locked(&self.intercepts).push((name.to_string(), cancel.clone(), handler));
        Ok(cancel)
    }
}

/// Logs every command and feeds `send_chat` lines to the host's reply queue.
pub struct DemoCommands {
    replies: mpsc::UnboundedSender<String>,
}

impl DemoCommands {
    fn ran(&self, kind: &str, command: &str) {
        info!(kind, command, "command");
    }

    fn output(command: &str) -> CommandOutput {
        CommandOutput {
            command_line: command.to_string(),
            success_count: 1,
            ..Default::default()
        }
    }
}

#[async_trait]
impl CommandsModule for DemoCommands {
    fn name(&self) -> &str {
        names::COMMANDS
    }

    async fn send_settings_command(&self, command: &str, _dimensional: bool) -> Result<()> {
        self.ran("settings", command);
        Ok(())
    }

    async fn send_player_command(&self, command: &str) -> Result<()> {
        self.ran("player", command);
        Ok(())
    }

    async fn send_ws_command(&self, command: &str) -> Result<()> {
        self.ran("ws", command);
        Ok(())
    }

    async fn send_player_command_with_resp(
        &self,
        _ctx: &CallContext,
        command: &str,
    ) -> Result<CommandOutput> {
        self.ran("player", command);
        Ok(Self::output(command))
    }

    async fn send_ws_command_with_resp(
        &self,
        _ctx: &CallContext,
        command: &str,
    ) -> Result<CommandOutput> {
        self.ran("ws", command);
        Ok(Self::output(command))
    }

    async fn await_changes_general(&self) -> Result<()> {
        Ok(())
    }

    async fn send_chat(&self, content: &str) -> Result<()> {
        let _ = self.replies.send(content.to_string());
        Ok(())
    }

    async fn title(&self, message: &str) -> Result<()> {
        self.ran("title", message);
        Ok(())
    }
}

/// Shared values, topics and exposed APIs, all in memory.
#[derive(Default)]
pub struct DemoFlex {
    values: Mutex<HashMap<String, String>>,
    topics: Mutex<HashMap<String, Vec<SubscriptionSender<Vec<u8>>>>>,
    apis: Mutex<HashMap<String, (CancelHandle, FlexHandler)>>,
}

#[async_trait]
impl FlexModule for DemoFlex {
    fn name(&self) -> &str {
        names::FLEX
    }

    async fn set(&self, key: &str, value: &str) {
        locked(&self.values).insert(key.to_string(), value.to_string());
    }

    async fn get(&self, key: &str) -> Option<String> {
        locked(&self.values).get(key).cloned()
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) {
        let mut topics = locked(&self.topics);
        if let Some(senders) = topics.get_mut(topic) {
            senders.retain(|sender| sender.send(payload.clone()) || !sender.is_closed());
        }
    }

    async fn subscribe(&self, _ctx: &CallContext, topic: &str) -> Result<Subscription<Vec<u8>>> {
        let (sender, subscription) = Subscription::channel(TOPIC_BUFFER);
        locked(&self.topics)
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        Ok(subscription)
    }

    async fn expose(&self, api_name: &str, handler: FlexHandler) -> Result<CancelHandle> {
        let cancel = CancelHandle::new();
        if let Some((stale, _)) =
            locked(&self.apis).insert(api_name.to_string(), (cancel.clone(), handler))
        {
            stale.cancel();
        }
        Ok(cancel)
    }

    async fn call(&self, ctx: &CallContext, api_name: &str, args: Vec<u8>) -> Result<FlexReply> {
        let handler = {
            let mut apis = locked(&self.apis);
            apis.retain(|_, (cancel, _)| !cancel.is_cancelled());
            apis.get(api_name).map(|(_, handler)| handler.clone())
        };
        match handler {
            Some(handler) => Ok(handler(ctx.clone(), args).await),
            None => Ok(FlexReply::err(format!("api {api_name} is not exposed"))),
        }
    }
}

/// Writes plugin log lines to the host's own tracing output.
pub struct TracingLogger;

#[async_trait]
impl LoggerModule for TracingLogger {
    fn name(&self) -> &str {
        names::LOGGER
    }

    async fn log(&self, scope: &str, level: Level, msg: &str) {
        match level {
            Level::Error => error!(scope, "{msg}"),
            Level::Warn => warn!(scope, "{msg}"),
            Level::Info | Level::Success => info!(scope, "{msg}"),
        }
    }
}

struct DemoFrame {
    modules: Vec<Module>,
    configs: Mutex<HashMap<String, PluginConfig>>,
}

#[async_trait]
impl Frame for DemoFrame {
    async fn list_modules(&self) -> Result<Vec<String>> {
        Ok(self.modules.iter().map(|m| m.name().to_string()).collect())
    }

    async fn get_module(&self, name: &str) -> Result<Option<Module>> {
        Ok(self.modules.iter().find(|m| m.name() == name).cloned())
    }

    async fn get_plugin_config(&self, id: &str) -> Result<Option<PluginConfig>> {
        Ok(locked(&self.configs).get(id).cloned())
    }

    async fn upgrade_plugin_config(&self, id: &str, config: ConfigMap) -> Result<()> {
        debug!(plugin = id, "plugin config upgraded");
        locked(&self.configs).entry(id.to_string()).or_default().config = config;
        Ok(())
    }
}

/// The modules and frame of one demo host.
pub struct DemoHost {
    pub chat: Arc<DemoChat>,
    pub flex: Arc<DemoFlex>,
    frame: Arc<DemoFrame>,
    replies: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl DemoHost {
    /// A host with no plugin configs.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let chat = Arc::new(DemoChat::default());
        let flex = Arc::new(DemoFlex::default());
        let modules = vec![
            Module::from(chat.clone() as Arc<dyn ChatModule>),
            Module::from(Arc::new(DemoCommands { replies: tx }) as Arc<dyn CommandsModule>),
            Module::from(flex.clone() as Arc<dyn FlexModule>),
            Module::from(Arc::new(TracingLogger) as Arc<dyn LoggerModule>),
        ];
        Self {
            chat,
            flex,
            frame: Arc::new(DemoFrame {
                modules,
                configs: Mutex::new(HashMap::new()),
            }),
            replies: tokio::sync::Mutex::new(rx),
        }
    }

    /// Register the config handed out for plugin `id`.
    pub fn configure(&self, id: &str, config: PluginConfig) {
        locked(&self.frame.configs).insert(id.to_string(), config);
    }

    /// The frame handed to plugins at init.
    pub fn frame(&self) -> Arc<dyn Frame> {
        self.frame.clone()
    }

    /// `name` says `text` in chat.
    pub fn say(&self, name: &str, text: &str) {
        self.chat.say(name, text);
    }

    /// Next line a plugin sent to chat, `None` if nothing arrives in time.
    pub async fn next_reply(&self, wait: Duration) -> Option<String> {
        let mut replies = self.replies.lock().await;
        tokio::time::timeout(wait, replies.recv()).await.ok().flatten()
    }
}

impl Default for DemoHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hello::{GREET_API, HelloPlugin};
    use tether_api::Plugin;
    use tether_protocol::{ServeConfig, connect_in_process};

    fn config(greeting: &str) -> PluginConfig {
        let mut config = ConfigMap::new();
        config.insert("greeting".into(), greeting.into());
        PluginConfig {
            name: "Hello".into(),
            config,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_named_listener_and_intercept_filter_by_sender() -> anyhow::Result<()> {
        let chat = DemoChat::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let named = tx.clone();
        chat.register_when_receive_msg_from_sender_named(
            "alex",
            Arc::new(move |msg: ChatMsg| {
                let _ = named.send(format!("named {}", msg.raw_msg));
            }),
        )
        .await?;
        chat.intercept_next_message(
            "alex",
            Arc::new(move |msg: ChatMsg| {
                let _ = tx.send(format!("intercept {}", msg.raw_msg));
            }),
        )
        .await?;

        chat.say("steve", "ignored");
        chat.say("alex", "one");
        chat.say("alex", "two");

        assert_eq!(rx.recv().await.as_deref(), Some("named one"));
        assert_eq!(rx.recv().await.as_deref(), Some("intercept one"));
        assert_eq!(rx.recv().await.as_deref(), Some("named two"));
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_hello_plugin_over_in_process_transport() -> anyhow::Result<()> {
        let host = DemoHost::new();
        host.configure("hello", config("hi"));

        let plugin = Arc::new(HelloPlugin::new());
        let session = connect_in_process(plugin.clone(), ServeConfig::in_process())?;
        let root = session.plugin();
        let mut init_config = ConfigMap::new();
        init_config.insert("greeting".into(), "hi".into());
        root.init(host.frame(), "hello", init_config).await?;

        let ctx = CallContext::with_timeout(Duration::from_secs(2));
        root.load(&ctx).await?;

        host.say("steve", "Hello everyone");
        assert_eq!(
            host.next_reply(Duration::from_secs(2)).await.as_deref(),
            Some("hi, steve")
        );
        host.say("steve", "bye");
        assert_eq!(host.next_reply(Duration::from_millis(100)).await, None);

        let reply = host.flex.call(&ctx, GREET_API, br#""alex""#.to_vec()).await?;
        assert_eq!(reply.result.as_deref(), Some(&br#""hi, alex""#[..]));

        root.unload(&ctx).await?;
        host.say("steve", "hello again");
        assert_eq!(host.next_reply(Duration::from_millis(100)).await, None);

        session.shutdown().await;
        Ok(())
    }
}
