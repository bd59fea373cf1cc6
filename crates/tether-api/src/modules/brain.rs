use crate::types::{
    ChunkNewChunkEvent, ConfigMap, EventHandler, PlayerScoreQueryResult, RankQueryResult,
    ScoreUpdateEvent,
};
use async_trait::async_trait;
use std::sync::Arc;
use tether_core::{CallContext, ListenerId, Result};

/// Long-running host services that plugins switch on by name.
#[async_trait]
pub trait BrainModule: Send + Sync {
    fn name(&self) -> &str;

    /// The first enable loads the daemon; later ones only reconfigure it.
    /// Returns the configuration actually in effect.
    async fn enable_daemon(
        &self,
        ctx: &CallContext,
        name: &str,
        config: ConfigMap,
    ) -> Result<(ConfigMap, Option<AnyDaemon>)>;

    async fn disable_daemon(&self, ctx: &CallContext, name: &str) -> Result<()>;
}

#[async_trait]
pub trait Daemon: Send + Sync {
    async fn name(&self) -> Result<String>;
    async fn reconfig(&self, config: ConfigMap) -> Result<()>;
    async fn config(&self) -> Result<ConfigMap>;
}

#[async_trait]
pub trait ScoreboardDaemon: Daemon {
    async fn register_when_score_update(
        &self,
        handler: EventHandler<ScoreUpdateEvent>,
    ) -> Result<ListenerId>;
    async fn unregister_when_score_update(&self, listener_id: &str) -> bool;
    async fn query_score_by_player_uuid(
        &self,
        uuid: &str,
    ) -> Result<Option<Vec<PlayerScoreQueryResult>>>;
    async fn query_rank_by_scoreboard(
        &self,
        scoreboard: &str,
        descending: bool,
        max_count: usize,
    ) -> Result<Option<Vec<RankQueryResult>>>;
}

#[async_trait]
pub trait ChunkDaemon: Daemon {
    async fn register_when_new_chunk(
        &self,
        handler: EventHandler<ChunkNewChunkEvent>,
    ) -> Result<ListenerId>;
    async fn unregister_when_new_chunk(&self, listener_id: &str) -> bool;
}

/// A daemon together with the most specific interface it supports.
#[derive(Clone)]
pub enum AnyDaemon {
    Scoreboard(Arc<dyn ScoreboardDaemon>),
    Chunk(Arc<dyn ChunkDaemon>),
    Basic(Arc<dyn Daemon>),
}

impl AnyDaemon {
    /// Handle kind tag of this daemon.
    pub fn kind(&self) -> &'static str {
        match self {
            AnyDaemon::Scoreboard(_) => super::names::SCOREBOARD_DAEMON,
            AnyDaemon::Chunk(_) => super::names::CHUNK_DAEMON,
            AnyDaemon::Basic(_) => super::names::DAEMON,
        }
    }

    /// View through the common daemon interface.
    pub fn as_daemon(&self) -> &dyn Daemon {
        match self {
            AnyDaemon::Scoreboard(d) => d.as_ref(),
            AnyDaemon::Chunk(d) => d.as_ref(),
            AnyDaemon::Basic(d) => d.as_ref(),
        }
    }
}

impl std::fmt::Debug for AnyDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyDaemon").field(&self.kind()).finish()
    }
}
