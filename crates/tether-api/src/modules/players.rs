use crate::types::{Ability, EventHandler, PlayerChangeEvent, PlayerStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tether_core::{CallContext, ListenerId, Result};

/// Online player directory.
#[async_trait]
pub trait PlayersModule: Send + Sync {
    fn name(&self) -> &str;

    async fn new_player_kit(&self, uuid: &str) -> Result<Option<Arc<dyn PlayerKit>>>;
    async fn get_all_online_players(&self, ctx: &CallContext) -> Result<Vec<Arc<dyn PlayerKit>>>;
    async fn get_player_by_name(
        &self,
        ctx: &CallContext,
        name: &str,
    ) -> Result<Option<Arc<dyn PlayerKit>>>;
    async fn get_player_by_uuid(
        &self,
        ctx: &CallContext,
        uuid: &str,
    ) -> Result<Option<Arc<dyn PlayerKit>>>;

    async fn register_when_player_change(
        &self,
        handler: EventHandler<PlayerChangeEvent>,
    ) -> Result<ListenerId>;
    async fn unregister_when_player_change(&self, listener_id: &str) -> bool;

    async fn raw_say_to(&self, target: &str, json_text: &str) -> Result<()>;
    async fn say_to(&self, target: &str, message: &str) -> Result<()>;
    async fn raw_title_to(&self, target: &str, json_text: &str) -> Result<()>;
    async fn title_to(&self, target: &str, message: &str) -> Result<()>;
    async fn raw_subtitle_to(&self, target: &str, subtitle_json: &str, title_json: &str)
    -> Result<()>;
    async fn subtitle_to(&self, target: &str, subtitle: &str, title: &str) -> Result<()>;
    async fn action_bar_to(&self, target: &str, message: &str) -> Result<()>;
}

/// One player, online or not, as long as their identity is known.
#[async_trait]
pub trait PlayerKit: Send + Sync {
    async fn uuid(&self) -> Result<String>;
    async fn name(&self) -> Result<String>;

    async fn entity_unique_id(&self, ctx: &CallContext) -> Result<i64>;
    async fn login_time(&self, ctx: &CallContext) -> Result<SystemTime>;
    async fn platform_chat_id(&self, ctx: &CallContext) -> Result<String>;
    async fn build_platform(&self, ctx: &CallContext) -> Result<i32>;
    async fn skin_id(&self, ctx: &CallContext) -> Result<String>;

    async fn ability(&self, ctx: &CallContext, ability: Ability) -> Result<bool>;
    async fn set_ability(&self, ctx: &CallContext, ability: Ability, allow: bool) -> Result<()>;
    async fn status(&self, ctx: &CallContext, status: PlayerStatus) -> Result<bool>;

    async fn device_id(&self, ctx: &CallContext) -> Result<String>;
    async fn entity_runtime_id(&self, ctx: &CallContext) -> Result<u64>;
    async fn entity_metadata(&self, ctx: &CallContext) -> Result<HashMap<u32, serde_json::Value>>;

    async fn is_op(&self, ctx: &CallContext) -> Result<bool>;
    async fn online(&self, ctx: &CallContext) -> Result<bool>;

    async fn raw_say(&self, json_text: &str) -> Result<()>;
    async fn say(&self, message: &str) -> Result<()>;
    async fn title(&self, message: &str) -> Result<()>;
    async fn subtitle(&self, subtitle: &str, title: &str) -> Result<()>;
    async fn action_bar(&self, message: &str) -> Result<()>;
}
