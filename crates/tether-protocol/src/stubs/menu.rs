//! Terminal menu and game menu stubs
//!
//! A menu entry's trigger crosses as a bridge registered together with the
//! entry. The implementation's entry id keys the bridge on both sides, so
//! removing the entry also closes its trigger.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_api::{
    ChatMsg, EventHandler, GameMenuEntry, GameMenuEntryInfo, GameMenuModule, Subscription,
    TerminalMenuEntry, TerminalMenuEntryInfo, TerminalMenuModule,
};
use tether_broker::{Broker, MethodResult, RpcChannel, Service, decode, encode, reply};
use tether_core::{CallbackRegistration, ListenerId, Result, RpcError};

use crate::client::{ClientBridges, Empty, event_service, notify, subscription_service, watch_cancel};
use crate::forward::Subscriptions;
use crate::relay::Listeners;
use crate::wire::{ChatMsgWire, IdArgs, MenuEntryRegistration, MenuEntryWire, NameArgs};

/// Entries buffered on the subscriber's side before new ones are dropped.
pub const ENTRY_BUFFER: usize = 64;

pub mod methods {
    pub const REGISTER_TERMINAL_MENU_ENTRY: &str = "tether.terminal_menu.register_terminal_menu_entry";
    pub const REMOVE_TERMINAL_MENU_ENTRY: &str = "tether.terminal_menu.remove_terminal_menu_entry";
    pub const TRIGGER_MENU_ENTRY: &str = "tether.terminal_menu.trigger_menu_entry";
    pub const PUBLISH_TERMINAL_CALL: &str = "tether.terminal_menu.publish_terminal_call";
    pub const PUBLISH_POP_BACKEND_MENU: &str = "tether.terminal_menu.publish_pop_backend_menu";
    pub const REGISTER_WHEN_ADD_MENU_ENTRY: &str = "tether.terminal_menu.register_when_add_menu_entry";
    pub const UNREGISTER_WHEN_ADD_MENU_ENTRY: &str =
        "tether.terminal_menu.unregister_when_add_menu_entry";
    pub const REGISTER_WHEN_TERMINAL_CALL: &str = "tether.terminal_menu.register_when_terminal_call";
    pub const UNREGISTER_WHEN_TERMINAL_CALL: &str =
        "tether.terminal_menu.unregister_when_terminal_call";
    pub const REGISTER_WHEN_POP_BACKEND_MENU: &str =
        "tether.terminal_menu.register_when_pop_backend_menu";
    pub const UNREGISTER_WHEN_POP_BACKEND_MENU: &str =
        "tether.terminal_menu.unregister_when_pop_backend_menu";

    pub const REGISTER_GAME_MENU_ENTRY: &str = "tether.game_menu.register_game_menu_entry";
    pub const REMOVE_MENU_ENTRY: &str = "tether.game_menu.remove_menu_entry";
    pub const SUBSCRIBE_ENTRIES: &str = "tether.game_menu.subscribe_entries";
    pub const UNSUBSCRIBE_ENTRIES: &str = "tether.game_menu.unsubscribe_entries";
    pub const TRIGGER_ENTRY: &str = "tether.game_menu.trigger_entry";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct TriggerArgs {
    id: String,
    args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct TriggerEntryArgs {
    id: String,
    chat: ChatMsgWire,
}

/// Serves a local [`TerminalMenuModule`].
pub struct TerminalMenuServer {
    inner: Arc<dyn TerminalMenuModule>,
    broker: Broker,
    entries: Listeners<Vec<String>>,
    added: Listeners<TerminalMenuEntryInfo>,
    calls: Listeners<String>,
    pops: Listeners<()>,
}

impl TerminalMenuServer {
    pub fn new(inner: Arc<dyn TerminalMenuModule>, broker: Broker) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broker,
            entries: Listeners::new(),
            added: Listeners::new(),
            calls: Listeners::new(),
            pops: Listeners::new(),
        })
    }
}

#[async_trait]
impl Service for TerminalMenuServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::REGISTER_TERMINAL_MENU_ENTRY => {
                let MenuEntryRegistration { entry, trigger } = decode(params)?;
                reply(
                    self.entries
                        .register(&self.broker, trigger, std::convert::identity, |on_trigger| {
                            self.inner
                                .register_terminal_menu_entry(entry.into_terminal_entry(on_trigger))
                        })
                        .await,
                )
            }
            methods::REMOVE_TERMINAL_MENU_ENTRY => {
                let args: IdArgs = decode(params)?;
                let stop = self.inner.remove_terminal_menu_entry(&args.id);
                encode(self.entries.unregister(&args.id, stop).await)
            }
            methods::TRIGGER_MENU_ENTRY => {
                let args: TriggerArgs = decode(params)?;
                reply(self.inner.trigger_menu_entry(&args.id, args.args).await)
            }
            methods::PUBLISH_TERMINAL_CALL => {
                let args: NameArgs = decode(params)?;
                self.inner.publish_terminal_call(&args.name).await;
                encode(())
            }
            methods::PUBLISH_POP_BACKEND_MENU => {
                self.inner.publish_pop_backend_menu().await;
                encode(())
            }
            methods::REGISTER_WHEN_ADD_MENU_ENTRY => {
                let registration: CallbackRegistration = decode(params)?;
                reply(
                    self.added
                        .register(&self.broker, registration, std::convert::identity, |handler| {
                            self.inner.register_when_add_menu_entry(handler)
                        })
                        .await,
                )
            }
            methods::UNREGISTER_WHEN_ADD_MENU_ENTRY => {
                let args: IdArgs = decode(params)?;
                let stop = self.inner.unregister_when_add_menu_entry(&args.id);
                encode(self.added.unregister(&args.id, stop).await)
            }
            methods::REGISTER_WHEN_TERMINAL_CALL => {
                let registration: CallbackRegistration = decode(params)?;
                reply(
                    self.calls
                        .register(&self.broker, registration, std::convert::identity, |handler| {
                            self.inner.register_when_terminal_call(handler)
                        })
                        .await,
                )
            }
            methods::UNREGISTER_WHEN_TERMINAL_CALL => {
                let args: IdArgs = decode(params)?;
                let stop = self.inner.unregister_when_terminal_call(&args.id);
                encode(self.calls.unregister(&args.id, stop).await)
            }
            methods::REGISTER_WHEN_POP_BACKEND_MENU => {
                let registration: CallbackRegistration = decode(params)?;
                reply(
                    self.pops
                        .register(&self.broker, registration, std::convert::identity, |handler| {
                            self.inner.register_when_pop_backend_menu(handler)
                        })
                        .await,
                )
            }
            methods::UNREGISTER_WHEN_POP_BACKEND_MENU => {
                let args: IdArgs = decode(params)?;
                let stop = self.inner.unregister_when_pop_backend_menu(&args.id);
                encode(self.pops.unregister(&args.id, stop).await)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn on_close(&self) {
        self.entries
            .close_all(|id| async move { self.inner.remove_terminal_menu_entry(&id).await })
            .await;
        self.added
            .close_all(|id| async move { self.inner.unregister_when_add_menu_entry(&id).await })
            .await;
        self.calls
            .close_all(|id| async move { self.inner.unregister_when_terminal_call(&id).await })
            .await;
        self.pops
            .close_all(|id| async move { self.inner.unregister_when_pop_backend_menu(&id).await })
            .await;
    }
}

/// [`TerminalMenuModule`] proxy.
pub struct TerminalMenuClient {
    name: String,
    channel: Arc<RpcChannel>,
    broker: Broker,
    bridges: ClientBridges,
}

impl TerminalMenuClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>, broker: Broker) -> Self {
        Self {
            name: name.into(),
            channel,
            broker,
            bridges: ClientBridges::new(),
        }
    }

    async fn listen<T>(&self, method: &str, handler: EventHandler<T>) -> Result<ListenerId>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let channel = &self.channel;
        let service = event_service(handler, std::convert::identity);
        self.bridges
            .register(&self.broker, service, |registration| async move {
                channel.call(method, &registration).await
            })
            .await
    }

    async fn unlisten(&self, method: &str, listener_id: &str) -> bool {
        let args = IdArgs::new(listener_id);
        let withdraw = self.channel.call(method, &args);
        self.bridges.unregister(listener_id, withdraw).await
    }
}

#[async_trait]
impl TerminalMenuModule for TerminalMenuClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register_terminal_menu_entry(&self, entry: TerminalMenuEntry) -> Result<String> {
        let channel = &self.channel;
        let wire = MenuEntryWire::from(&entry);
        let service = event_service(entry.on_trigger, std::convert::identity);
        self.bridges
            .register(&self.broker, service, |trigger| async move {
                let args = MenuEntryRegistration {
                    entry: wire,
                    trigger,
                };
                channel
                    .call(methods::REGISTER_TERMINAL_MENU_ENTRY, &args)
                    .await
            })
            .await
    }

    async fn remove_terminal_menu_entry(&self, entry_id: &str) -> bool {
        self.unlisten(methods::REMOVE_TERMINAL_MENU_ENTRY, entry_id)
            .await
    }

    async fn trigger_menu_entry(&self, entry_id: &str, args: Vec<String>) -> Result<bool> {
        let args = TriggerArgs {
            id: entry_id.to_string(),
            args,
        };
        self.channel.call(methods::TRIGGER_MENU_ENTRY, &args).await
    }

    async fn publish_terminal_call(&self, line: &str) {
        notify(&self.channel, methods::PUBLISH_TERMINAL_CALL, &NameArgs::new(line)).await
    }

    async fn publish_pop_backend_menu(&self) {
        notify(&self.channel, methods::PUBLISH_POP_BACKEND_MENU, &Empty {}).await
    }

    async fn register_when_add_menu_entry(
        &self,
        handler: EventHandler<TerminalMenuEntryInfo>,
    ) -> Result<ListenerId> {
        self.listen(methods::REGISTER_WHEN_ADD_MENU_ENTRY, handler)
            .await
    }

    async fn unregister_when_add_menu_entry(&self, listener_id: &str) -> bool {
        self.unlisten(methods::UNREGISTER_WHEN_ADD_MENU_ENTRY, listener_id)
            .await
    }

    async fn register_when_terminal_call(&self, handler: EventHandler<String>) -> Result<ListenerId> {
        self.listen(methods::REGISTER_WHEN_TERMINAL_CALL, handler)
            .await
    }

    async fn unregister_when_terminal_call(&self, listener_id: &str) -> bool {
        self.unlisten(methods::UNREGISTER_WHEN_TERMINAL_CALL, listener_id)
            .await
    }

    async fn register_when_pop_backend_menu(&self, handler: EventHandler<()>) -> Result<ListenerId> {
        self.listen(methods::REGISTER_WHEN_POP_BACKEND_MENU, handler)
            .await
    }

    async fn unregister_when_pop_backend_menu(&self, listener_id: &str) -> bool {
        self.unlisten(methods::UNREGISTER_WHEN_POP_BACKEND_MENU, listener_id)
            .await
    }
}

/// Serves a local [`GameMenuModule`].
pub struct GameMenuServer {
    inner: Arc<dyn GameMenuModule>,
    broker: Broker,
    entries: Listeners<ChatMsgWire>,
    subscriptions: Subscriptions,
}

impl GameMenuServer {
    pub fn new(inner: Arc<dyn GameMenuModule>, broker: Broker) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broker,
            entries: Listeners::new(),
            subscriptions: Subscriptions::new(),
        })
    }
}

#[async_trait]
impl Service for GameMenuServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::REGISTER_GAME_MENU_ENTRY => {
                let MenuEntryRegistration { entry, trigger } = decode(params)?;
                reply(
                    self.entries
                        .register(&self.broker, trigger, ChatMsgWire::from, |on_trigger| {
                            self.inner
                                .register_game_menu_entry(entry.into_game_entry(on_trigger))
                        })
                        .await,
                )
            }
            methods::REMOVE_MENU_ENTRY => {
                let args: IdArgs = decode(params)?;
                let stop = async {
                    self.inner.remove_menu_entry(&args.id).await;
                    true
                };
                encode(self.entries.unregister(&args.id, stop).await)
            }
            methods::SUBSCRIBE_ENTRIES => {
                let registration: CallbackRegistration = decode(params)?;
                reply(
                    self.subscriptions
                        .open(
                            &self.broker,
                            registration,
                            std::convert::identity,
                            self.inner.subscribe_entries(),
                        )
                        .await,
                )
            }
            methods::UNSUBSCRIBE_ENTRIES => {
                let args: IdArgs = decode(params)?;
                encode(self.subscriptions.cancel(&args.id).await)
            }
            methods::TRIGGER_ENTRY => {
                let args: TriggerEntryArgs = decode(params)?;
                self.inner
                    .trigger_entry(&args.id, ChatMsg::from(args.chat))
                    .await;
                encode(())
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn on_close(&self) {
        self.entries
            .close_all(|id| async move {
                self.inner.remove_menu_entry(&id).await;
                true
            })
            .await;
        self.subscriptions.close_all().await;
    }
}

/// [`GameMenuModule`] proxy.
pub struct GameMenuClient {
    name: String,
    channel: Arc<RpcChannel>,
    broker: Broker,
    bridges: ClientBridges,
}

impl GameMenuClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>, broker: Broker) -> Self {
        Self {
            name: name.into(),
            channel,
            broker,
            bridges: ClientBridges::new(),
        }
    }
}

#[async_trait]
impl GameMenuModule for GameMenuClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register_game_menu_entry(&self, entry: GameMenuEntry) -> Result<String> {
        let channel = &self.channel;
        let wire = MenuEntryWire::from(&entry);
        let service = event_service::<ChatMsgWire, _>(entry.on_trigger, ChatMsg::from);
        self.bridges
            .register(&self.broker, service, |trigger| async move {
                let args = MenuEntryRegistration {
                    entry: wire,
                    trigger,
                };
                channel.call(methods::REGISTER_GAME_MENU_ENTRY, &args).await
            })
            .await
    }

    async fn remove_menu_entry(&self, entry_id: &str) {
        let args = IdArgs::new(entry_id);
        let withdraw = async {
            self.channel
                .call::<_, ()>(methods::REMOVE_MENU_ENTRY, &args)
                .await
                .map(|()| true)
        };
        self.bridges.unregister(entry_id, withdraw).await;
    }

    async fn subscribe_entries(&self) -> Result<Subscription<GameMenuEntryInfo>> {
        let (sender, subscription) = Subscription::channel(ENTRY_BUFFER);
        let bridge = self
            .broker
            .offer(subscription_service(sender, std::convert::identity));
        let sub_id: String = self
            .channel
            .call(methods::SUBSCRIBE_ENTRIES, &bridge.registration())
            .await?;

        let channel = self.channel.clone();
        watch_cancel(
            &self.broker,
            subscription.cancel_handle(),
            bridge,
            move || async move {
                notify(&channel, methods::UNSUBSCRIBE_ENTRIES, &IdArgs::new(sub_id)).await
            },
        );
        Ok(subscription)
    }

    async fn trigger_entry(&self, entry_id: &str, chat: ChatMsg) {
        let args = TriggerEntryArgs {
            id: entry_id.to_string(),
            chat: ChatMsgWire::from(chat),
        };
        notify(&self.channel, methods::TRIGGER_ENTRY, &args).await
    }
}
