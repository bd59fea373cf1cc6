//! Chat and commands stubs

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_api::{CancelHandle, ChatModule, ChatMsg, CommandOutput, CommandsModule, EventHandler};
use tether_broker::{Broker, MethodResult, RpcChannel, Service, decode, encode, reply};
use tether_core::{CallContext, CallbackRegistration, ListenerId, Result, RpcError};

use crate::client::{ClientBridges, call_timed, event_service, notify, watch_cancel};
use crate::relay::{Intercepts, Listeners};
use crate::wire::{ChatMsgWire, IdArgs, NameArgs, NamedCallback, Timed};

pub mod methods {
    pub const REGISTER_WHEN_CHAT_MSG: &str = "tether.chat.register_when_chat_msg";
    pub const UNREGISTER_WHEN_CHAT_MSG: &str = "tether.chat.unregister_when_chat_msg";
    pub const REGISTER_WHEN_MSG_FROM: &str = "tether.chat.register_when_receive_msg_from_sender_named";
    pub const UNREGISTER_WHEN_MSG_FROM: &str =
        "tether.chat.unregister_when_receive_msg_from_sender_named";
    pub const INTERCEPT_NEXT_MESSAGE: &str = "tether.chat.intercept_next_message";
    pub const CANCEL_INTERCEPT: &str = "tether.chat.cancel_intercept";

    pub const SEND_SETTINGS_COMMAND: &str = "tether.commands.send_settings_command";
    pub const SEND_PLAYER_COMMAND: &str = "tether.commands.send_player_command";
    pub const SEND_WS_COMMAND: &str = "tether.commands.send_ws_command";
    pub const SEND_PLAYER_COMMAND_WITH_RESP: &str = "tether.commands.send_player_command_with_resp";
    pub const SEND_WS_COMMAND_WITH_RESP: &str = "tether.commands.send_ws_command_with_resp";
    pub const AWAIT_CHANGES_GENERAL: &str = "tether.commands.await_changes_general";
    pub const SEND_CHAT: &str = "tether.commands.send_chat";
    pub const TITLE: &str = "tether.commands.title";
}

/// Serves a local [`ChatModule`].
pub struct ChatServer {
    inner: Arc<dyn ChatModule>,
    broker: Broker,
    chat: Listeners<ChatMsgWire>,
    from_sender: Listeners<ChatMsgWire>,
    intercepts: Intercepts<ChatMsgWire>,
}

impl ChatServer {
    pub fn new(inner: Arc<dyn ChatModule>, broker: Broker) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broker,
            chat: Listeners::new(),
            from_sender: Listeners::new(),
            intercepts: Intercepts::new(),
        })
    }
}

#[async_trait]
impl Service for ChatServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::REGISTER_WHEN_CHAT_MSG => {
                let registration: CallbackRegistration = decode(params)?;
                reply(
                    self.chat
                        .register(&self.broker, registration, ChatMsgWire::from, |handler| {
                            self.inner.register_when_chat_msg(handler)
                        })
                        .await,
                )
            }
            methods::UNREGISTER_WHEN_CHAT_MSG => {
                let args: IdArgs = decode(params)?;
                let stop = self.inner.unregister_when_chat_msg(&args.id);
                encode(self.chat.unregister(&args.id, stop).await)
            }
            methods::REGISTER_WHEN_MSG_FROM => {
                let args: NamedCallback = decode(params)?;
                let name = args.name;
                reply(
                    self.from_sender
                        .register(&self.broker, args.callback, ChatMsgWire::from, |handler| {
                            self.inner
                                .register_when_receive_msg_from_sender_named(&name, handler)
                        })
                        .await,
                )
            }
            methods::UNREGISTER_WHEN_MSG_FROM => {
                let args: IdArgs = decode(params)?;
                let stop = self
                    .inner
                    .unregister_when_receive_msg_from_sender_named(&args.id);
                encode(self.from_sender.unregister(&args.id, stop).await)
            }
            methods::INTERCEPT_NEXT_MESSAGE => {
                let args: NamedCallback = decode(params)?;
                let name = args.name;
                reply(
                    self.intercepts
                        .open(&self.broker, args.callback, ChatMsgWire::from, |handler| {
                            self.inner.intercept_next_message(&name, handler)
                        })
                        .await,
                )
            }
            methods::CANCEL_INTERCEPT => {
                let args: IdArgs = decode(params)?;
                encode(self.intercepts.cancel(&args.id).await)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn on_close(&self) {
        self.chat
            .close_all(|id| async move { self.inner.unregister_when_chat_msg(&id).await })
            .await;
        self.from_sender
            .close_all(|id| async move {
                self.inner
                    .unregister_when_receive_msg_from_sender_named(&id)
                    .await
            })
            .await;
        self.intercepts.close_all().await;
    }
}

/// [`ChatModule`] proxy.
pub struct ChatClient {
    name: String,
    channel: Arc<RpcChannel>,
    broker: Broker,
    bridges: ClientBridges,
}

impl ChatClient {
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
impl ChatModule for ChatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register_when_chat_msg(&self, handler: EventHandler<ChatMsg>) -> Result<ListenerId> {
        let channel = &self.channel;
        let service = event_service::<ChatMsgWire, _>(handler, ChatMsg::from);
        self.bridges
            .register(&self.broker, service, |registration| async move {
                channel
                    .call(methods::REGISTER_WHEN_CHAT_MSG, &registration)
                    .await
            })
            .await
    }

    async fn unregister_when_chat_msg(&self, listener_id: &str) -> bool {
        let args = IdArgs::new(listener_id);
        let withdraw = self.channel.call(methods::UNREGISTER_WHEN_CHAT_MSG, &args);
        self.bridges.unregister(listener_id, withdraw).await
    }

    async fn register_when_receive_msg_from_sender_named(
        &self,
        name: &str,
        handler: EventHandler<ChatMsg>,
    ) -> Result<ListenerId> {
        let channel = &self.channel;
        let service = event_service::<ChatMsgWire, _>(handler, ChatMsg::from);
        self.bridges
            .register(&self.broker, service, |registration| async move {
                let args = NamedCallback::new(name, registration);
                channel.call(methods::REGISTER_WHEN_MSG_FROM, &args).await
            })
            .await
    }

    async fn unregister_when_receive_msg_from_sender_named(&self, listener_id: &str) -> bool {
        let args = IdArgs::new(listener_id);
        let withdraw = self.channel.call(methods::UNREGISTER_WHEN_MSG_FROM, &args);
        self.bridges.unregister(listener_id, withdraw).await
    }

    async fn intercept_next_message(
        &self,
        name: &str,
        handler: EventHandler<ChatMsg>,
    ) -> Result<CancelHandle> {
        let bridge = self
            .broker
            .offer(event_service::<ChatMsgWire, _>(handler, ChatMsg::from));
        let args = NamedCallback::new(name, bridge.registration());
        let intercept_id: String = self
            .channel
            .call(methods::INTERCEPT_NEXT_MESSAGE, &args)
            .await?;

        let cancel = CancelHandle::new();
        let channel = self.channel.clone();
        watch_cancel(&self.broker, cancel.clone(), bridge, move || async move {
            notify(&channel, methods::CANCEL_INTERCEPT, &IdArgs::new(intercept_id)).await
        });
        Ok(cancel)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SettingsCommandArgs {
    command: String,
    dimensional: bool,
}

/// Serves a local [`CommandsModule`].
pub struct CommandsServer {
    inner: Arc<dyn CommandsModule>,
}

impl CommandsServer {
    pub fn new(inner: Arc<dyn CommandsModule>) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl Service for CommandsServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::SEND_SETTINGS_COMMAND => {
                let args: SettingsCommandArgs = decode(params)?;
                reply(
                    self.inner
                        .send_settings_command(&args.command, args.dimensional)
                        .await,
                )
            }
            methods::SEND_PLAYER_COMMAND => {
                let args: NameArgs = decode(params)?;
                reply(self.inner.send_player_command(&args.name).await)
            }
            methods::SEND_WS_COMMAND => {
                let args: NameArgs = decode(params)?;
                reply(self.inner.send_ws_command(&args.name).await)
            }
            methods::SEND_PLAYER_COMMAND_WITH_RESP => {
                let Timed { timeout_ms, args } = decode::<Timed<NameArgs>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                reply(
                    ctx.run(self.inner.send_player_command_with_resp(&ctx, &args.name))
                        .await,
                )
            }
            methods::SEND_WS_COMMAND_WITH_RESP => {
                let Timed { timeout_ms, args } = decode::<Timed<NameArgs>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                reply(
                    ctx.run(self.inner.send_ws_command_with_resp(&ctx, &args.name))
                        .await,
                )
            }
            methods::AWAIT_CHANGES_GENERAL => reply(self.inner.await_changes_general().await),
            methods::SEND_CHAT => {
                let args: NameArgs = decode(params)?;
                reply(self.inner.send_chat(&args.name).await)
            }
            methods::TITLE => {
                let args: NameArgs = decode(params)?;
                reply(self.inner.title(&args.name).await)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// [`CommandsModule`] proxy. Command text travels in the `name` field.
pub struct CommandsClient {
    name: String,
    channel: Arc<RpcChannel>,
}

impl CommandsClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>) -> Self {
        Self {
            name: name.into(),
            channel,
        }
    }

    async fn send(&self, method: &str, text: &str) -> Result<()> {
        self.channel.call(method, &NameArgs::new(text)).await
    }
}

#[async_trait]
impl CommandsModule for CommandsClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_settings_command(&self, command: &str, dimensional: bool) -> Result<()> {
        let args = SettingsCommandArgs {
            command: command.to_string(),
            dimensional,
        };
        self.channel
            .call(methods::SEND_SETTINGS_COMMAND, &args)
            .await
    }

    async fn send_player_command(&self, command: &str) -> Result<()> {
        self.send(methods::SEND_PLAYER_COMMAND, command).await
    }

    async fn send_ws_command(&self, command: &str) -> Result<()> {
        self.send(methods::SEND_WS_COMMAND, command).await
    }

    async fn send_player_command_with_resp(
        &self,
        ctx: &CallContext,
        command: &str,
    ) -> Result<CommandOutput> {
        call_timed(
            &self.channel,
            ctx,
            methods::SEND_PLAYER_COMMAND_WITH_RESP,
            NameArgs::new(command),
        )
        .await
    }

    async fn send_ws_command_with_resp(
        &self,
        ctx: &CallContext,
        command: &str,
    ) -> Result<CommandOutput> {
        call_timed(
            &self.channel,
            ctx,
            methods::SEND_WS_COMMAND_WITH_RESP,
            NameArgs::new(command),
        )
        .await
    }

    async fn await_changes_general(&self) -> Result<()> {
        self.channel
            .call(methods::AWAIT_CHANGES_GENERAL, &serde_json::Value::Null)
            .await
    }

    async fn send_chat(&self, content: &str) -> Result<()> {
        self.send(methods::SEND_CHAT, content).await
    }

    async fn title(&self, message: &str) -> Result<()> {
        self.send(methods::TITLE, message).await
    }
}
