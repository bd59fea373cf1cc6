use crate::types::{ConfigMap, GameRule};
use async_trait::async_trait;
use std::collections::HashMap;
use tether_core::{CallContext, Result};

/// Read-only view of the bot and the world it is connected to.
///
/// World-state getters answer `None` until the host has observed the value.
#[async_trait]
pub trait UqHolderModule: Send + Sync {
    fn name(&self) -> &str;

    async fn bot_name(&self, ctx: &CallContext) -> Result<String>;
    async fn bot_runtime_id(&self, ctx: &CallContext) -> Result<u64>;
    async fn bot_unique_id(&self, ctx: &CallContext) -> Result<i64>;
    async fn bot_identity(&self, ctx: &CallContext) -> Result<String>;
    async fn bot_uuid(&self, ctx: &CallContext) -> Result<String>;
    async fn bot_xuid(&self, ctx: &CallContext) -> Result<String>;

    async fn basic_raw(&self, ctx: &CallContext) -> Result<ConfigMap>;

    async fn compress_threshold(&self, ctx: &CallContext) -> Result<Option<u16>>;
    async fn world_game_mode(&self, ctx: &CallContext) -> Result<Option<i32>>;
    async fn game_mode(&self, ctx: &CallContext) -> Result<Option<i32>>;
    async fn world_difficulty(&self, ctx: &CallContext) -> Result<Option<u32>>;
    async fn time(&self, ctx: &CallContext) -> Result<Option<i32>>;
    async fn day_time(&self, ctx: &CallContext) -> Result<Option<i32>>;
    async fn day_time_percent(&self, ctx: &CallContext) -> Result<Option<f32>>;
    async fn current_tick(&self, ctx: &CallContext) -> Result<Option<i64>>;
    async fn sync_ratio(&self, ctx: &CallContext) -> Result<Option<f32>>;
    async fn bot_dimension(&self, ctx: &CallContext) -> Result<Option<i32>>;
    async fn bot_position(&self, ctx: &CallContext) -> Result<Option<[f32; 3]>>;
    async fn bot_position_out_of_sync_tick(&self, ctx: &CallContext) -> Result<Option<i64>>;
    async fn client_dimension(&self, ctx: &CallContext) -> Result<Option<i32>>;
    async fn client_hotbar_slot(&self, ctx: &CallContext) -> Result<Option<u8>>;
    async fn client_holding_item(&self, ctx: &CallContext) -> Result<Option<ConfigMap>>;

    async fn game_rules(&self, ctx: &CallContext) -> Result<HashMap<String, GameRule>>;

    async fn extend_raw(&self, ctx: &CallContext) -> Result<ConfigMap>;
}
