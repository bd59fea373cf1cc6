//! UQHolder stubs
//!
//! Every getter takes a call context and no other argument, so requests carry
//! only the deadline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tether_api::{ConfigMap, GameRule, UqHolderModule};
use tether_broker::{MethodResult, RpcChannel, Service, decode, reply};
use tether_core::{CallContext, Result, RpcError};

use crate::client::{Empty, call_timed};
use crate::wire::Timed;

pub mod methods {
    pub const BOT_NAME: &str = "tether.uqholder.bot_name";
    pub const BOT_RUNTIME_ID: &str = "tether.uqholder.bot_runtime_id";
    pub const BOT_UNIQUE_ID: &str = "tether.uqholder.bot_unique_id";
    pub const BOT_IDENTITY: &str = "tether.uqholder.bot_identity";
    pub const BOT_UUID: &str = "tether.uqholder.bot_uuid";
    pub const BOT_XUID: &str = "tether.uqholder.bot_xuid";
    pub const BASIC_RAW: &str = "tether.uqholder.basic_raw";
    pub const COMPRESS_THRESHOLD: &str = "tether.uqholder.compress_threshold";
    pub const WORLD_GAME_MODE: &str = "tether.uqholder.world_game_mode";
    pub const GAME_MODE: &str = "tether.uqholder.game_mode";
    pub const WORLD_DIFFICULTY: &str = "tether.uqholder.world_difficulty";
    pub const TIME: &str = "tether.uqholder.time";
    pub const DAY_TIME: &str = "tether.uqholder.day_time";
    pub const DAY_TIME_PERCENT: &str = "tether.uqholder.day_time_percent";
    pub const CURRENT_TICK: &str = "tether.uqholder.current_tick";
    pub const SYNC_RATIO: &str = "tether.uqholder.sync_ratio";
    pub const BOT_DIMENSION: &str = "tether.uqholder.bot_dimension";
    pub const BOT_POSITION: &str = "tether.uqholder.bot_position";
    pub const BOT_POSITION_OUT_OF_SYNC_TICK: &str = "tether.uqholder.bot_position_out_of_sync_tick";
    pub const CLIENT_DIMENSION: &str = "tether.uqholder.client_dimension";
    pub const CLIENT_HOTBAR_SLOT: &str = "tether.uqholder.client_hotbar_slot";
    pub const CLIENT_HOLDING_ITEM: &str = "tether.uqholder.client_holding_item";
    pub const GAME_RULES: &str = "tether.uqholder.game_rules";
    pub const EXTEND_RAW: &str = "tether.uqholder.extend_raw";
}

/// Serves a local [`UqHolderModule`].
pub struct UqHolderServer {
    inner: Arc<dyn UqHolderModule>,
}

impl UqHolderServer {
    pub fn new(inner: Arc<dyn UqHolderModule>) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl Service for UqHolderServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        let Timed { timeout_ms, .. } = decode::<Timed<Empty>>(params)?;
        let ctx = CallContext::from_timeout_ms(timeout_ms);
        let uq = &self.inner;
        match method {
            methods::BOT_NAME => reply(ctx.run(uq.bot_name(&ctx)).await),
            methods::BOT_RUNTIME_ID => reply(ctx.run(uq.bot_runtime_id(&ctx)).await),
            methods::BOT_UNIQUE_ID => reply(ctx.run(uq.bot_unique_id(&ctx)).await),
            methods::BOT_IDENTITY => reply(ctx.run(uq.bot_identity(&ctx)).await),
            methods::BOT_UUID => reply(ctx.run(uq.bot_uuid(&ctx)).await),
            methods::BOT_XUID => reply(ctx.run(uq.bot_xuid(&ctx)).await),
            methods::BASIC_RAW => reply(ctx.run(uq.basic_raw(&ctx)).await),
            methods::COMPRESS_THRESHOLD => reply(ctx.run(uq.compress_threshold(&ctx)).await),
            methods::WORLD_GAME_MODE => reply(ctx.run(uq.world_game_mode(&ctx)).await),
            methods::GAME_MODE => reply(ctx.run(uq.game_mode(&ctx)).await),
            methods::WORLD_DIFFICULTY => reply(ctx.run(uq.world_difficulty(&ctx)).await),
            methods::TIME => reply(ctx.run(uq.time(&ctx)).await),
            methods::DAY_TIME => reply(ctx.run(uq.day_time(&ctx)).await),
            methods::DAY_TIME_PERCENT => reply(ctx.run(uq.day_time_percent(&ctx)).await),
            methods::CURRENT_TICK => reply(ctx.run(uq.current_tick(&ctx)).await),
            methods::SYNC_RATIO => reply(ctx.run(uq.sync_ratio(&ctx)).await),
            methods::BOT_DIMENSION => reply(ctx.run(uq.bot_dimension(&ctx)).await),
            methods::BOT_POSITION => reply(ctx.run(uq.bot_position(&ctx)).await),
            methods::BOT_POSITION_OUT_OF_SYNC_TICK => {
                reply(ctx.run(uq.bot_position_out_of_sync_tick(&ctx)).await)
            }
            methods::CLIENT_DIMENSION => reply(ctx.run(uq.client_dimension(&ctx)).await),
            methods::CLIENT_HOTBAR_SLOT => reply(ctx.run(uq.client_hotbar_slot(&ctx)).await),
            methods::CLIENT_HOLDING_ITEM => reply(ctx.run(uq.client_holding_item(&ctx)).await),
            methods::GAME_RULES => reply(ctx.run(uq.game_rules(&ctx)).await),
            methods::EXTEND_RAW => reply(ctx.run(uq.extend_raw(&ctx)).await),
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// [`UqHolderModule`] proxy.
pub struct UqHolderClient {
    name: String,
    channel: Arc<RpcChannel>,
}

impl UqHolderClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>) -> Self {
        Self {
            name: name.into(),
            channel,
        }
    }

    async fn get<R: DeserializeOwned>(&self, ctx: &CallContext, method: &str) -> Result<R> {
        call_timed(&self.channel, ctx, method, Empty {}).await
    }
}

#[async_trait]
impl UqHolderModule for UqHolderClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn bot_name(&self, ctx: &CallContext) -> Result<String> {
        self.get(ctx, methods::BOT_NAME).await
    }

    async fn bot_runtime_id(&self, ctx: &CallContext) -> Result<u64> {
        self.get(ctx, methods::BOT_RUNTIME_ID).await
    }

    async fn bot_unique_id(&self, ctx: &CallContext) -> Result<i64> {
        self.get(ctx, methods::BOT_UNIQUE_ID).await
    }

    async fn bot_identity(&self, ctx: &CallContext) -> Result<String> {
        self.get(ctx, methods::BOT_IDENTITY).await
    }

    async fn bot_uuid(&self, ctx: &CallContext) -> Result<String> {
        self.get(ctx, methods::BOT_UUID).await
    }

    async fn bot_xuid(&self, ctx: &CallContext) -> Result<String> {
        self.get(ctx, methods::BOT_XUID).await
    }

    async fn basic_raw(&self, ctx: &CallContext) -> Result<ConfigMap> {
        self.get(ctx, methods::BASIC_RAW).await
    }

    async fn compress_threshold(&self, ctx: &CallContext) -> Result<Option<u16>> {
        self.get(ctx, methods::COMPRESS_THRESHOLD).await
    }

    async fn world_game_mode(&self, ctx: &CallContext) -> Result<Option<i32>> {
        self.get(ctx, methods::WORLD_GAME_MODE).await
    }

    async fn game_mode(&self, ctx: &CallContext) -> Result<Option<i32>> {
        self.get(ctx, methods::GAME_MODE).await
    }

    async fn world_difficulty(&self, ctx: &CallContext) -> Result<Option<u32>> {
        self.get(ctx, methods::WORLD_DIFFICULTY).await
    }

    async fn time(&self, ctx: &CallContext) -> Result<Option<i32>> {
        self.get(ctx, methods::TIME).await
    }

    async fn day_time(&self, ctx: &CallContext) -> Result<Option<i32>> {
        self.get(ctx, methods::DAY_TIME).await
    }

    async fn day_time_percent(&self, ctx: &CallContext) -> Result<Option<f32>> {
        self.get(ctx, methods::DAY_TIME_PERCENT).await
    }

    async fn current_tick(&self, ctx: &CallContext) -> Result<Option<i64>> {
        self.get(ctx, methods::CURRENT_TICK).await
    }

    async fn sync_ratio(&self, ctx: &CallContext) -> Result<Option<f32>> {
        self.get(ctx, methods::SYNC_RATIO).await
    }

    async fn bot_dimension(&self, ctx: &CallContext) -> Result<Option<i32>> {
        self.get(ctx, methods::BOT_DIMENSION).await
    }

    async fn bot_position(&self, ctx: &CallContext) -> Result<Option<[f32; 3]>> {
        self.get(ctx, methods::BOT_POSITION).await
    }

    async fn bot_position_out_of_sync_tick(&self, ctx: &CallContext) -> Result<Option<i64>> {
        self.get(ctx, methods::BOT_POSITION_OUT_OF_SYNC_TICK).await
    }

    async fn client_dimension(&self, ctx: &CallContext) -> Result<Option<i32>> {
        self.get(ctx, methods::CLIENT_DIMENSION).await
    }

    async fn client_hotbar_slot(&self, ctx: &CallContext) -> Result<Option<u8>> {
        self.get(ctx, methods::CLIENT_HOTBAR_SLOT).await
    }

    async fn client_holding_item(&self, ctx: &CallContext) -> Result<Option<ConfigMap>> {
        self.get(ctx, methods::CLIENT_HOLDING_ITEM).await
    }

    async fn game_rules(&self, ctx: &CallContext) -> Result<HashMap<String, GameRule>> {
        self.get(ctx, methods::GAME_RULES).await
    }

    async fn extend_raw(&self, ctx: &CallContext) -> Result<ConfigMap> {
        self.get(ctx, methods::EXTEND_RAW).await
    }
}
