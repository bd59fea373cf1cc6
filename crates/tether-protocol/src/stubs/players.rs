//! Players and player kit stubs
//!
//! Player lookups return handles: every kit the host hands out is served on
//! its own connection and resolved into a [`PlayerKitClient`] on the caller's
//! side.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_api::{
    Ability, EventHandler, PlayerChangeEvent, PlayerKit, PlayerStatus, PlayersModule, names,
};
use tether_broker::{Broker, MethodResult, RpcChannel, Service, decode, encode, reply};
use tether_core::{CallContext, CallbackRegistration, Handle, ListenerId, Result, RpcError};

use crate::client::{ClientBridges, Empty, call_timed, event_service};
use crate::relay::Listeners;
use crate::wire::{IdArgs, NameArgs, Timed};

pub mod methods {
    pub const NEW_PLAYER_KIT: &str = "tether.players.new_player_kit";
    pub const GET_ALL_ONLINE_PLAYERS: &str = "tether.players.get_all_online_players";
    pub const GET_PLAYER_BY_NAME: &str = "tether.players.get_player_by_name";
    pub const GET_PLAYER_BY_UUID: &str = "tether.players.get_player_by_uuid";
    pub const REGISTER_WHEN_PLAYER_CHANGE: &str = "tether.players.register_when_player_change";
    pub const UNREGISTER_WHEN_PLAYER_CHANGE: &str = "tether.players.unregister_when_player_change";
    pub const RAW_SAY_TO: &str = "tether.players.raw_say_to";
    pub const SAY_TO: &str = "tether.players.say_to";
    pub const RAW_TITLE_TO: &str = "tether.players.raw_title_to";
    pub const TITLE_TO: &str = "tether.players.title_to";
    pub const RAW_SUBTITLE_TO: &str = "tether.players.raw_subtitle_to";
    pub const SUBTITLE_TO: &str = "tether.players.subtitle_to";
    pub const ACTION_BAR_TO: &str = "tether.players.action_bar_to";

    pub const UUID: &str = "tether.player_kit.uuid";
    pub const NAME: &str = "tether.player_kit.name";
    pub const ENTITY_UNIQUE_ID: &str = "tether.player_kit.entity_unique_id";
    pub const LOGIN_TIME: &str = "tether.player_kit.login_time";
    pub const PLATFORM_CHAT_ID: &str = "tether.player_kit.platform_chat_id";
    pub const BUILD_PLATFORM: &str = "tether.player_kit.build_platform";
    pub const SKIN_ID: &str = "tether.player_kit.skin_id";
    pub const ABILITY: &str = "tether.player_kit.ability";
    pub const SET_ABILITY: &str = "tether.player_kit.set_ability";
    pub const STATUS: &str = "tether.player_kit.status";
    pub const DEVICE_ID: &str = "tether.player_kit.device_id";
    pub const ENTITY_RUNTIME_ID: &str = "tether.player_kit.entity_runtime_id";
    pub const ENTITY_METADATA: &str = "tether.player_kit.entity_metadata";
    pub const IS_OP: &str = "tether.player_kit.is_op";
    pub const ONLINE: &str = "tether.player_kit.online";
    pub const RAW_SAY: &str = "tether.player_kit.raw_say";
    pub const SAY: &str = "tether.player_kit.say";
    pub const TITLE: &str = "tether.player_kit.title";
    pub const SUBTITLE: &str = "tether.player_kit.subtitle";
    pub const ACTION_BAR: &str = "tether.player_kit.action_bar";
}

/// A message addressed to a target selector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct TargetedArgs {
    target: String,
    message: String,
    /// Title line accompanying a subtitle.
    title: String,
}

fn serve_kit(broker: &Broker, kit: Option<Arc<dyn PlayerKit>>) -> Handle {
    broker.serve_optional(
        names::PLAYER_KIT,
        kit.map(|kit| PlayerKitServer::new(kit) as Arc<dyn Service>),
    )
}

/// Serves a local [`PlayersModule`].
pub struct PlayersServer {
    inner: Arc<dyn PlayersModule>,
    broker: Broker,
    changes: Listeners<PlayerChangeEvent>,
}

impl PlayersServer {
    pub fn new(inner: Arc<dyn PlayersModule>, broker: Broker) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broker,
            changes: Listeners::new(),
        })
    }
}

#[async_trait]
impl Service for PlayersServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::NEW_PLAYER_KIT => {
                let args: NameArgs = decode(params)?;
                let kit = self.inner.new_player_kit(&args.name).await?;
                encode(serve_kit(&self.broker, kit))
            }
            methods::GET_ALL_ONLINE_PLAYERS => {
                let Timed { timeout_ms, .. } = decode::<Timed<Empty>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                let kits = ctx.run(self.inner.get_all_online_players(&ctx)).await?;
                let handles: Vec<Handle> = kits
                    .into_iter()
                    .map(|kit| serve_kit(&self.broker, Some(kit)))
                    .collect();
                encode(handles)
            }
            methods::GET_PLAYER_BY_NAME => {
                let Timed { timeout_ms, args } = decode::<Timed<NameArgs>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                let kit = ctx
                    .run(self.inner.get_player_by_name(&ctx, &args.name))
                    .await?;
                encode(serve_kit(&self.broker, kit))
            }
            methods::GET_PLAYER_BY_UUID => {
                let Timed { timeout_ms, args } = decode::<Timed<NameArgs>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                let kit = ctx
                    .run(self.inner.get_player_by_uuid(&ctx, &args.name))
                    .await?;
                encode(serve_kit(&self.broker, kit))
            }
            methods::REGISTER_WHEN_PLAYER_CHANGE => {
                let registration: CallbackRegistration = decode(params)?;
                reply(
                    self.changes
                        .register(&self.broker, registration, std::convert::identity, |handler| {
                            self.inner.register_when_player_change(handler)
                        })
                        .await,
                )
            }
            methods::UNREGISTER_WHEN_PLAYER_CHANGE => {
                let args: IdArgs = decode(params)?;
                let stop = self.inner.unregister_when_player_change(&args.id);
                encode(self.changes.unregister(&args.id, stop).await)
            }
            methods::RAW_SAY_TO
            | methods::SAY_TO
            | methods::RAW_TITLE_TO
            | methods::TITLE_TO
            | methods::RAW_SUBTITLE_TO
            | methods::SUBTITLE_TO
            | methods::ACTION_BAR_TO => {
                let args: TargetedArgs = decode(params)?;
                let (target, message) = (args.target.as_str(), args.message.as_str());
                let sent = match method {
                    methods::RAW_SAY_TO => self.inner.raw_say_to(target, message).await,
                    methods::SAY_TO => self.inner.say_to(target, message).await,
                    methods::RAW_TITLE_TO => self.inner.raw_title_to(target, message).await,
                    methods::TITLE_TO => self.inner.title_to(target, message).await,
                    methods::RAW_SUBTITLE_TO => {
                        self.inner.raw_subtitle_to(target, message, &args.title).await
                    }
                    methods::SUBTITLE_TO => self.inner.subtitle_to(target, message, &args.title).await,
                    _ => self.inner.action_bar_to(target, message).await,
                };
                reply(sent)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn on_close(&self) {
        self.changes
            .close_all(|id| async move { self.inner.unregister_when_player_change(&id).await })
            .await;
    }
}

/// [`PlayersModule`] proxy.
pub struct PlayersClient {
    name: String,
    channel: Arc<RpcChannel>,
    broker: Broker,
    bridges: ClientBridges,
}

impl PlayersClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>, broker: Broker) -> Self {
        Self {
            name: name.into(),
            channel,
            broker,
            bridges: ClientBridges::new(),
        }
    }

    async fn resolve_kit(&self, handle: Handle) -> Result<Option<Arc<dyn PlayerKit>>> {
        Ok(self
            .broker
            .resolve(&handle)
            .await?
            .map(|channel| Arc::new(PlayerKitClient::new(Arc::new(channel))) as Arc<dyn PlayerKit>))
    }

    async fn send(&self, method: &str, target: &str, message: &str, title: &str) -> Result<()> {
        let args = TargetedArgs {
            target: target.to_string(),
            message: message.to_string(),
            title: title.to_string(),
        };
        self.channel.call(method, &args).await
    }
}

#[async_trait]
impl PlayersModule for PlayersClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn new_player_kit(&self, uuid: &str) -> Result<Option<Arc<dyn PlayerKit>>> {
        let handle: Handle = self
            .channel
            .call(methods::NEW_PLAYER_KIT, &NameArgs::new(uuid))
            .await?;
        self.resolve_kit(handle).await
    }

    async fn get_all_online_players(&self, ctx: &CallContext) -> Result<Vec<Arc<dyn PlayerKit>>> {
        let handles: Vec<Handle> =
            call_timed(&self.channel, ctx, methods::GET_ALL_ONLINE_PLAYERS, Empty {}).await?;
        let mut kits = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(kit) = self.resolve_kit(handle).await? {
                kits.push(kit);
            }
        }
        Ok(kits)
    }

    async fn get_player_by_name(
        &self,
        ctx: &CallContext,
        name: &str,
    ) -> Result<Option<Arc<dyn PlayerKit>>> {
        let handle: Handle =
            call_timed(&self.channel, ctx, methods::GET_PLAYER_BY_NAME, NameArgs::new(name)).await?;
        self.resolve_kit(handle).await
    }

    async fn get_player_by_uuid(
        &self,
        ctx: &CallContext,
        uuid: &str,
    ) -> Result<Option<Arc<dyn PlayerKit>>> {
        let handle: Handle =
            call_timed(&self.channel, ctx, methods::GET_PLAYER_BY_UUID, NameArgs::new(uuid)).await?;
        self.resolve_kit(handle).await
    }

    async fn register_when_player_change(
        &self,
        handler: EventHandler<PlayerChangeEvent>,
    ) -> Result<ListenerId> {
        let channel = &self.channel;
        let service = event_service(handler, std::convert::identity);
        self.bridges
            .register(&self.broker, service, |registration| async move {
                channel
                    .call(methods::REGISTER_WHEN_PLAYER_CHANGE, &registration)
                    .await
            })
            .await
    }

    async fn unregister_when_player_change(&self, listener_id: &str) -> bool {
        let args = IdArgs::new(listener_id);
        let withdraw = self
            .channel
            .call(methods::UNREGISTER_WHEN_PLAYER_CHANGE, &args);
        self.bridges.unregister(listener_id, withdraw).await
    }

    async fn raw_say_to(&self, target: &str, json_text: &str) -> Result<()> {
        self.send(methods::RAW_SAY_TO, target, json_text, "").await
    }

    async fn say_to(&self, target: &str, message: &str) -> Result<()> {
        self.send(methods::SAY_TO, target, message, "").await
    }

    async fn raw_title_to(&self, target: &str, json_text: &str) -> Result<()> {
        self.send(methods::RAW_TITLE_TO, target, json_text, "").await
    }

    async fn title_to(&self, target: &str, message: &str) -> Result<()> {
        self.send(methods::TITLE_TO, target, message, "").await
    }

    async fn raw_subtitle_to(
        &self,
        target: &str,
        subtitle_json: &str,
        title_json: &str,
    ) -> Result<()> {
        self.send(methods::RAW_SUBTITLE_TO, target, subtitle_json, title_json)
            .await
    }

    async fn subtitle_to(&self, target: &str, subtitle: &str, title: &str) -> Result<()> {
        self.send(methods::SUBTITLE_TO, target, subtitle, title).await
    }

    async fn action_bar_to(&self, target: &str, message: &str) -> Result<()> {
        self.send(methods::ACTION_BAR_TO, target, message, "").await
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct AbilityArgs {
    ability: Ability,
    #[serde(default)]
    allow: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StatusArgs {
    status: PlayerStatus,
}

/// Login time on the wire: milliseconds since the unix epoch.
fn to_unix_ms(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

fn from_unix_ms(ms: i64) -> SystemTime {
    let offset = Duration::from_millis(ms.unsigned_abs());
    if ms >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}

/// Parameters without `Default` are required; a request missing them is
/// rejected instead of defaulted.
fn decode_required<T: serde::de::DeserializeOwned>(
    params: serde_json::Value,
) -> std::result::Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// Serves one [`PlayerKit`].
pub struct PlayerKitServer {
    inner: Arc<dyn PlayerKit>,
}

impl PlayerKitServer {
    pub fn new(inner: Arc<dyn PlayerKit>) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl Service for PlayerKitServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        let kit = &self.inner;
        match method {
            methods::UUID => reply(kit.uuid().await),
            methods::NAME => reply(kit.name().await),
            methods::RAW_SAY | methods::SAY | methods::TITLE | methods::ACTION_BAR => {
                let args: NameArgs = decode(params)?;
                let sent = match method {
                    methods::RAW_SAY => kit.raw_say(&args.name).await,
                    methods::SAY => kit.say(&args.name).await,
                    methods::TITLE => kit.title(&args.name).await,
                    _ => kit.action_bar(&args.name).await,
                };
                reply(sent)
            }
            methods::SUBTITLE => {
                let args: TargetedArgs = decode(params)?;
                reply(kit.subtitle(&args.message, &args.title).await)
            }
            methods::ABILITY | methods::SET_ABILITY => {
                let timed: Timed<serde_json::Value> = decode_required(params)?;
                let args: AbilityArgs = decode_required(timed.args)?;
                let ctx = CallContext::from_timeout_ms(timed.timeout_ms);
                if method == methods::ABILITY {
                    reply(ctx.run(kit.ability(&ctx, args.ability)).await)
                } else {
                    reply(ctx.run(kit.set_ability(&ctx, args.ability, args.allow)).await)
                }
            }
            methods::STATUS => {
                let timed: Timed<serde_json::Value> = decode_required(params)?;
                let args: StatusArgs = decode_required(timed.args)?;
                let ctx = CallContext::from_timeout_ms(timed.timeout_ms);
                reply(ctx.run(kit.status(&ctx, args.status)).await)
            }
            _ => {
                let Timed { timeout_ms, .. } = decode::<Timed<Empty>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                match method {
                    methods::ENTITY_UNIQUE_ID => reply(ctx.run(kit.entity_unique_id(&ctx)).await),
                    methods::LOGIN_TIME => {
                        reply(ctx.run(kit.login_time(&ctx)).await.map(to_unix_ms))
                    }
                    methods::PLATFORM_CHAT_ID => reply(ctx.run(kit.platform_chat_id(&ctx)).await),
                    methods::BUILD_PLATFORM => reply(ctx.run(kit.build_platform(&ctx)).await),
                    methods::SKIN_ID => reply(ctx.run(kit.skin_id(&ctx)).await),
                    methods::DEVICE_ID => reply(ctx.run(kit.device_id(&ctx)).await),
                    methods::ENTITY_RUNTIME_ID => {
                        reply(ctx.run(kit.entity_runtime_id(&ctx)).await)
                    }
                    methods::ENTITY_METADATA => reply(ctx.run(kit.entity_metadata(&ctx)).await),
                    methods::IS_OP => reply(ctx.run(kit.is_op(&ctx)).await),
                    methods::ONLINE => reply(ctx.run(kit.online(&ctx)).await),
                    other => Err(RpcError::method_not_found(other)),
                }
            }
        }
    }
}

/// [`PlayerKit`] proxy.
pub struct PlayerKitClient {
    channel: Arc<RpcChannel>,
}

impl PlayerKitClient {
    pub fn new(channel: Arc<RpcChannel>) -> Self {
        Self { channel }
    }

    async fn get<R: serde::de::DeserializeOwned>(&self, ctx: &CallContext, method: &str) -> Result<R> {
        call_timed(&self.channel, ctx, method, Empty {}).await
    }

    async fn send(&self, method: &str, text: &str) -> Result<()> {
        self.channel.call(method, &NameArgs::new(text)).await
    }
}

#[async_trait]
impl PlayerKit for PlayerKitClient {
    async fn uuid(&self) -> Result<String> {
        self.channel.call(methods::UUID, &Empty {}).await
    }

    async fn name(&self) -> Result<String> {
        self.channel.call(methods::NAME, &Empty {}).await
    }

    async fn entity_unique_id(&self, ctx: &CallContext) -> Result<i64> {
        self.get(ctx, methods::ENTITY_UNIQUE_ID).await
    }

    async fn login_time(&self, ctx: &CallContext) -> Result<SystemTime> {
        let ms: i64 = self.get(ctx, methods::LOGIN_TIME).await?;
        Ok(from_unix_ms(ms))
    }

    async fn platform_chat_id(&self, ctx: &CallContext) -> Result<String> {
        self.get(ctx, methods::PLATFORM_CHAT_ID).await
    }

    async fn build_platform(&self, ctx: &CallContext) -> Result<i32> {
        self.get(ctx, methods::BUILD_PLATFORM).await
    }

    async fn skin_id(&self, ctx: &CallContext) -> Result<String> {
        self.get(ctx, methods::SKIN_ID).await
    }

    async fn ability(&self, ctx: &CallContext, ability: Ability) -> Result<bool> {
        let args = AbilityArgs {
            ability,
            allow: false,
        };
        call_timed(&self.channel, ctx, methods::ABILITY, args).await
    }

    async fn set_ability(&self, ctx: &CallContext, ability: Ability, allow: bool) -> Result<()> {
        let args = AbilityArgs { ability, allow };
        call_timed(&self.channel, ctx, methods::SET_ABILITY, args).await
    }

    async fn status(&self, ctx: &CallContext, status: PlayerStatus) -> Result<bool> {
        call_timed(&self.channel, ctx, methods::STATUS, StatusArgs { status }).await
    }

    async fn device_id(&self, ctx: &CallContext) -> Result<String> {
        self.get(ctx, methods::DEVICE_ID).await
    }

    async fn entity_runtime_id(&self, ctx: &CallContext) -> Result<u64> {
        self.get(ctx, methods::ENTITY_RUNTIME_ID).await
    }

    async fn entity_metadata(&self, ctx: &CallContext) -> Result<HashMap<u32, serde_json::Value>> {
        self.get(ctx, methods::ENTITY_METADATA).await
    }

    async fn is_op(&self, ctx: &CallContext) -> Result<bool> {
        self.get(ctx, methods::IS_OP).await
    }

    async fn online(&self, ctx: &CallContext) -> Result<bool> {
        self.get(ctx, methods::ONLINE).await
    }

    async fn raw_say(&self, json_text: &str) -> Result<()> {
        self.send(methods::RAW_SAY, json_text).await
    }

    async fn say(&self, message: &str) -> Result<()> {
        self.send(methods::SAY, message).await
    }

    async fn title(&self, message: &str) -> Result<()> {
        self.send(methods::TITLE, message).await
    }

    async fn subtitle(&self, subtitle: &str, title: &str) -> Result<()> {
        let args = TargetedArgs {
            target: String::new(),
            message: subtitle.to_string(),
            title: title.to_string(),
        };
        self.channel.call(methods::SUBTITLE, &args).await
    }

    async fn action_bar(&self, message: &str) -> Result<()> {
        self.send(methods::ACTION_BAR, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_time_survives_millis() {
        let time = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(from_unix_ms(to_unix_ms(time)), time);
        assert_eq!(to_unix_ms(UNIX_EPOCH), 0);
    }

    #[test]
    fn test_ability_args_require_the_flag() {
        let parsed: std::result::Result<AbilityArgs, _> =
            decode_required(serde_json::json!({"allow": true}));
        assert!(parsed.is_err());
        let parsed: AbilityArgs =
            decode_required(serde_json::json!({"ability": "operator_commands"})).unwrap();
        assert_eq!(parsed.ability, Ability::OperatorCommands);
        assert!(!parsed.allow);
    }
}
