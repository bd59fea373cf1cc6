//! In-memory modules and an in-process host/plugin pair.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tether_api::{
    BasicPlugin, CancelHandle, ChatModule, ChatMsg, CommandOutput, CommandsModule, ConfigMap,
    DatabaseModule, DbType, EventHandler, FlexHandler, FlexModule, FlexReply, FromModule, Frame,
    KeyValueDb, Level, LoggerModule, Module, Plugin, PluginConfig, Subscription, SubscriptionSender,
    get_module, names,
};
use tether_core::{CallContext, Error, ListenerId, Result};
use tether_protocol::{HostSession, ServeConfig, connect_in_process};

fn mint(counter: &AtomicU32, prefix: &str) -> String {
    format!("{prefix}:{}", counter.fetch_add(1, Ordering::SeqCst) + 1)
}

#[derive(Default)]
pub struct FakeChat {
    next: AtomicU32,
    handlers: Mutex<HashMap<String, EventHandler<ChatMsg>>>,
    intercepts: Mutex<Vec<(CancelHandle, EventHandler<ChatMsg>)>>,
}

impl FakeChat {
    /// Deliver one message to every listener and every pending intercept.
    /// Intercept handlers stay installed until cancelled.
    pub fn fire(&self, text: &str) {
        let msg = ChatMsg {
            name: "steve".into(),
            raw_msg: text.into(),
            msg: vec![text.into()],
            ..Default::default()
        };
        let handlers: Vec<_> = self.handlers.lock().unwrap().values().cloned().collect();
        for handler in handlers {
            handler(msg.clone());
        }
        let intercepts: Vec<_> = self
            .intercepts
            .lock()
            .unwrap()
            .iter()
            .filter(|(cancel, _)| !cancel.is_cancelled())
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in intercepts {
            handler(msg.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModule for FakeChat {
    fn name(&self) -> &str {
        names::CHAT
    }

    async fn register_when_chat_msg(&self, handler: EventHandler<ChatMsg>) -> Result<ListenerId> {
        let id = mint(&self.next, "listener");
        self.handlers.lock().unwrap().insert(id.clone(), handler);
        Ok(id)
    }

    async fn unregister_when_chat_msg(&self, listener_id: &str) -> bool {
        self.handlers.lock().unwrap().remove(listener_id).is_some()
    }

    async fn register_when_receive_msg_from_sender_named(
        &self,
        _name: &str,
        handler: EventHandler<ChatMsg>,
    ) -> Result<ListenerId> {
        self.register_when_chat_msg(handler).await
    }

    async fn unregister_when_receive_msg_from_sender_named(&self, listener_id: &str) -> bool {
        self.unregister_when_chat_msg(listener_id).await
    }

    async fn intercept_next_message(
        &self,
        _name: &str,
        handler: EventHandler<ChatMsg>,
    ) -> Result<CancelHandle> {
        let cancel = CancelHandle::new();
        self.intercepts
            .lock()
            .unwrap()
            .push((cancel.clone(), handler));
        Ok(cancel)
    }
}

/// Answers `_with_resp` commands only after `delay`.
pub struct SlowCommands {
    pub delay: Duration,
    pub sent: Mutex<Vec<String>>,
}

impl SlowCommands {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            sent: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, command: &str) {
        self.sent.lock().unwrap().push(command.to_string());
    }
}

#[async_trait]
impl CommandsModule for SlowCommands {
    fn name(&self) -> &str {
        names::COMMANDS
    }

    async fn send_settings_command(&self, command: &str, _dimensional: bool) -> Result<()> {
        self.record(command);
        Ok(())
    }

    async fn send_player_command(&self, command: &str) -> Result<()> {
        self.record(command);
        Ok(())
    }

    async fn send_ws_command(&self, command: &str) -> Result<()> {
        self.record(command);
        Ok(())
    }

    async fn send_player_command_with_resp(
        &self,
        _ctx: &CallContext,
        command: &str,
    ) -> Result<CommandOutput> {
        tokio::time::sleep(self.delay).await;
        self.record(command);
        Ok(CommandOutput {
            command_line: command.to_string(),
            success_count: 1,
            ..Default::default()
        })
    }

    async fn send_ws_command_with_resp(
        &self,
        ctx: &CallContext,
        command: &str,
    ) -> Result<CommandOutput> {
        self.send_player_command_with_resp(ctx, command).await
    }

    async fn await_changes_general(&self) -> Result<()> {
        Ok(())
    }

    async fn send_chat(&self, content: &str) -> Result<()> {
        self.record(content);
        Ok(())
    }

    async fn title(&self, message: &str) -> Result<()> {
        self.record(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemDb {
    pairs: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl KeyValueDb for MemDb {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.pairs.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::module("empty key"));
        }
        self.pairs
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.pairs.lock().unwrap().remove(key);
        Ok(())
    }

    async fn iterate(&self, visitor: &mut (dyn for<'k, 'v> FnMut(&'k str, &'v str) -> bool + Send)) -> Result<()> {
        let pairs = self.pairs.lock().unwrap().clone();
        for (key, value) in &pairs {
            if !visitor(key, value) {
                break;
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opening the same name twice yields the same database.
#[derive(Default)]
pub struct FakeDatabase {
    dbs: Mutex<HashMap<String, Arc<MemDb>>>,
}

#[async_trait]
impl DatabaseModule for FakeDatabase {
    fn name(&self) -> &str {
        names::DATABASE
    }

    async fn key_value_db(&self, name: &str, _db_type: DbType) -> Result<Arc<dyn KeyValueDb>> {
        let db = self
            .dbs
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .clone();
        Ok(db)
    }
}

#[derive(Default)]
pub struct FakeFlex {
    values: Mutex<HashMap<String, String>>,
    topics: Mutex<HashMap<String, Vec<SubscriptionSender<Vec<u8>>>>>,
    apis: Mutex<HashMap<String, (CancelHandle, FlexHandler)>>,
}

impl FakeFlex {
    /// Producer ends of every subscription taken on `topic`.
    pub fn senders(&self, topic: &str) -> Vec<SubscriptionSender<Vec<u8>>> {
        self.topics
            .lock()
            .unwrap()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl FlexModule for FakeFlex {
    fn name(&self) -> &str {
        names::FLEX
    }

    async fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) {
        for sender in self.senders(topic) {
            sender.send(payload.clone());
        }
    }

    async fn subscribe(&self, _ctx: &CallContext, topic: &str) -> Result<Subscription<Vec<u8>>> {
        let (sender, subscription) = Subscription::channel(16);
        self.topics
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        Ok(subscription)
    }

    async fn expose(&self, api_name: &str, handler: FlexHandler) -> Result<CancelHandle> {
        let cancel = CancelHandle::new();
        self.apis
            .lock()
            .unwrap()
            .insert(api_name.to_string(), (cancel.clone(), handler));
        Ok(cancel)
    }

    async fn call(&self, ctx: &CallContext, api_name: &str, args: Vec<u8>) -> Result<FlexReply> {
        let handler = self
            .apis
            .lock()
            .unwrap()
            .get(api_name)
            .filter(|(cancel, _)| !cancel.is_cancelled())
            .map(|(_, handler)| handler.clone());
        match handler {
            Some(handler) => Ok(handler(ctx.clone(), args).await),
            None => Ok(FlexReply::err(format!("no api named {api_name}"))),
        }
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    pub lines: Mutex<Vec<String>>,
}

#[async_trait]
impl LoggerModule for RecordingLogger {
    fn name(&self) -> &str {
        names::LOGGER
    }

    async fn log(&self, scope: &str, level: Level, msg: &str) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("[{level}] {scope}: {msg}"));
    }
}

/// A host frame over a fixed set of modules.
pub struct MapFrame {
    modules: Vec<Module>,
    next: AtomicU32,
    activate: Mutex<HashMap<String, EventHandler<()>>>,
    pub upgraded: Mutex<Vec<(String, ConfigMap)>>,
}

impl MapFrame {
    pub fn new(modules: Vec<Module>) -> Self {
        Self {
            modules,
            next: AtomicU32::new(0),
            activate: Mutex::new(HashMap::new()),
            upgraded: Mutex::new(Vec::new()),
        }
    }

    pub fn activate(&self) {
        let handlers: Vec<_> = self.activate.lock().unwrap().values().cloned().collect();
        for handler in handlers {
            handler(());
        }
    }

    pub fn activate_listeners(&self) -> usize {
        self.activate.lock().unwrap().len()
    }
}

#[async_trait]
impl Frame for MapFrame {
    async fn list_modules(&self) -> Result<Vec<String>> {
        Ok(self.modules.iter().map(|m| m.name().to_string()).collect())
    }

    async fn get_module(&self, name: &str) -> Result<Option<Module>> {
        Ok(self.modules.iter().find(|m| m.name() == name).cloned())
    }

    async fn get_plugin_config(&self, id: &str) -> Result<Option<PluginConfig>> {
        let mut config = ConfigMap::new();
        config.insert("greeting".into(), "hi".into());
        Ok(Some(PluginConfig {
            name: format!("{id}-display"),
            config,
            ..Default::default()
        }))
    }

    async fn upgrade_plugin_config(&self, id: &str, config: ConfigMap) -> Result<()> {
        self.upgraded.lock().unwrap().push((id.to_string(), config));
        Ok(())
    }

    async fn register_when_activate(&self, handler: EventHandler<()>) -> Result<ListenerId> {
        let id = mint(&self.next, "listener");
        self.activate.lock().unwrap().insert(id.clone(), handler);
        Ok(id)
    }

    async fn unregister_when_activate(&self, listener_id: &str) -> bool {
        self.activate.lock().unwrap().remove(listener_id).is_some()
    }
}

/// A host and an initialized plugin talking over an in-memory transport.
pub struct Harness {
    pub session: HostSession,
    pub plugin: Arc<BasicPlugin>,
}

impl Harness {
    pub async fn start(frame: Arc<dyn Frame>) -> anyhow::Result<Self> {
        let plugin = Arc::new(BasicPlugin::new());
        let session = connect_in_process(plugin.clone(), ServeConfig::in_process())?;
        session
            .plugin()
            .init(frame, "tester", ConfigMap::new())
            .await?;
        Ok(Self { session, plugin })
    }

    /// The frame as the plugin sees it.
    pub fn frame(&self) -> anyhow::Result<Arc<dyn Frame>> {
        self.plugin.frame().context("plugin was not initialized")
    }

    /// Fetch a module through the plugin's frame proxy.
    pub async fn module<T: FromModule>(&self, name: &str) -> anyhow::Result<T> {
        let frame = self.frame()?;
        get_module::<T>(frame.as_ref(), name)
            .await?
            .with_context(|| format!("module {name} missing or of another kind"))
    }
}

pub fn modules(
    chat: &Arc<FakeChat>,
    commands: &Arc<SlowCommands>,
    database: &Arc<FakeDatabase>,
    flex: &Arc<FakeFlex>,
    logger: &Arc<RecordingLogger>,
) -> Vec<Module> {
    vec![
        Module::from(chat.clone() as Arc<dyn ChatModule>),
        Module::from(commands.clone() as Arc<dyn CommandsModule>),
        Module::from(database.clone() as Arc<dyn DatabaseModule>),
        Module::from(flex.clone() as Arc<dyn FlexModule>),
        Module::from(logger.clone() as Arc<dyn LoggerModule>),
    ]
}

/// Host-side modules backing a [`Harness`].
pub struct Fakes {
    pub chat: Arc<FakeChat>,
    pub commands: Arc<SlowCommands>,
    pub database: Arc<FakeDatabase>,
    pub flex: Arc<FakeFlex>,
    pub logger: Arc<RecordingLogger>,
    pub frame: Arc<MapFrame>,
}

impl Fakes {
    pub fn new(command_delay: Duration) -> Self {
        let chat = Arc::new(FakeChat::default());
        let commands = Arc::new(SlowCommands::new(command_delay));
        let database = Arc::new(FakeDatabase::default());
        let flex = Arc::new(FakeFlex::default());
        let logger = Arc::new(RecordingLogger::default());
        let frame = Arc::new(MapFrame::new(modules(
            &chat, &commands, &database, &flex, &logger,
        )));
        Self {
            chat,
            commands,
            database,
            flex,
            logger,
            frame,
        }
    }

    pub async fn attach(&self) -> anyhow::Result<Harness> {
        Harness::start(self.frame.clone()).await
    }
}
