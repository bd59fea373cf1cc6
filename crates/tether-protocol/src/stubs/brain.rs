//! Brain and daemon stubs
//!
//! One server and one client serve every daemon kind. The handle kind tells
//! the caller which interface the daemon supports; calls a daemon does not
//! support are answered with "method not found".

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_api::{
    AnyDaemon, BrainModule, ChunkDaemon, ChunkNewChunkEvent, ConfigMap, Daemon, EventHandler,
    PlayerScoreQueryResult, RankQueryResult, ScoreUpdateEvent, ScoreboardDaemon, names,
};
use tether_broker::{Broker, MethodResult, RpcChannel, Service, decode, encode, reply};
use tether_core::{CallContext, CallbackRegistration, Handle, ListenerId, Result, RpcError};

use crate::client::{ClientBridges, Empty, call_timed, event_service};
use crate::relay::Listeners;
use crate::wire::{IdArgs, NameArgs, Timed};

pub mod methods {
    pub const ENABLE_DAEMON: &str = "tether.brain.enable_daemon";
    pub const DISABLE_DAEMON: &str = "tether.brain.disable_daemon";

    pub const NAME: &str = "tether.daemon.name";
    pub const RECONFIG: &str = "tether.daemon.reconfig";
    pub const CONFIG: &str = "tether.daemon.config";

    pub const REGISTER_WHEN_SCORE_UPDATE: &str = "tether.scoreboard.register_when_score_update";
    pub const UNREGISTER_WHEN_SCORE_UPDATE: &str = "tether.scoreboard.unregister_when_score_update";
    pub const QUERY_SCORE_BY_PLAYER_UUID: &str = "tether.scoreboard.query_score_by_player_uuid";
    pub const QUERY_RANK_BY_SCOREBOARD: &str = "tether.scoreboard.query_rank_by_scoreboard";

    pub const REGISTER_WHEN_NEW_CHUNK: &str = "tether.chunk.register_when_new_chunk";
    pub const UNREGISTER_WHEN_NEW_CHUNK: &str = "tether.chunk.unregister_when_new_chunk";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct EnableArgs {
    name: String,
    config: ConfigMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct EnableReply {
    config: ConfigMap,
    daemon: Handle,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigArgs {
    config: ConfigMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RankArgs {
    scoreboard: String,
    descending: bool,
    max_count: usize,
}

/// Serves a local [`BrainModule`].
pub struct BrainServer {
    inner: Arc<dyn BrainModule>,
    broker: Broker,
}

impl BrainServer {
    pub fn new(inner: Arc<dyn BrainModule>, broker: Broker) -> Arc<Self> {
        Arc::new(Self { inner, broker })
    }
}

#[async_trait]
impl Service for BrainServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::ENABLE_DAEMON => {
                let Timed { timeout_ms, args } = decode::<Timed<EnableArgs>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                let (config, daemon) = ctx
                    .run(self.inner.enable_daemon(&ctx, &args.name, args.config))
                    .await?;
                let daemon = match daemon {
                    Some(daemon) => self.broker.serve_object(
                        daemon.kind(),
                        DaemonServer::new(daemon, self.broker.clone()),
                    ),
                    None => Handle::absent(),
                };
                encode(EnableReply { config, daemon })
            }
            methods::DISABLE_DAEMON => {
                let Timed { timeout_ms, args } = decode::<Timed<NameArgs>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                reply(ctx.run(self.inner.disable_daemon(&ctx, &args.name)).await)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// [`BrainModule`] proxy.
pub struct BrainClient {
    name: String,
    channel: Arc<RpcChannel>,
    broker: Broker,
}

impl BrainClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>, broker: Broker) -> Self {
        Self {
            name: name.into(),
            channel,
            broker,
        }
    }
}

#[async_trait]
impl BrainModule for BrainClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enable_daemon(
        &self,
        ctx: &CallContext,
        name: &str,
        config: ConfigMap,
    ) -> Result<(ConfigMap, Option<AnyDaemon>)> {
        let args = EnableArgs {
            name: name.to_string(),
            config,
        };
        let reply: EnableReply = call_timed(&self.channel, ctx, methods::ENABLE_DAEMON, args).await?;
        let daemon = resolve_daemon(&self.broker, &reply.daemon).await?;
        Ok((reply.config, daemon))
    }

    async fn disable_daemon(&self, ctx: &CallContext, name: &str) -> Result<()> {
        call_timed(&self.channel, ctx, methods::DISABLE_DAEMON, NameArgs::new(name)).await
    }
}

/// Dial a daemon handle and wrap it in the interface its kind names.
///
/// Kinds match case-insensitively. Any kind other than scoreboard or chunk,
/// including a host's own daemon names, resolves to a basic daemon.
pub async fn resolve_daemon(broker: &Broker, handle: &Handle) -> Result<Option<AnyDaemon>> {
    let Some(channel) = broker.resolve(handle).await? else {
        return Ok(None);
    };
    let client = Arc::new(DaemonClient::new(Arc::new(channel), broker.clone()));
    Ok(Some(daemon_of_kind(&handle.kind, client)))
}

fn daemon_of_kind(kind: &str, client: Arc<DaemonClient>) -> AnyDaemon {
    let kind = kind.trim();
    if kind.eq_ignore_ascii_case(names::SCOREBOARD_DAEMON) {
        AnyDaemon::Scoreboard(client)
    } else if kind.eq_ignore_ascii_case(names::CHUNK_DAEMON) {
        AnyDaemon::Chunk(client)
    } else {
        AnyDaemon::Basic(client)
    }
}

/// Serves a daemon of any kind.
pub struct DaemonServer {
    inner: AnyDaemon,
    broker: Broker,
    scores: Listeners<ScoreUpdateEvent>,
    chunks: Listeners<ChunkNewChunkEvent>,
}

impl DaemonServer {
    pub fn new(inner: AnyDaemon, broker: Broker) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broker,
            scores: Listeners::new(),
            chunks: Listeners::new(),
        })
    }

    async fn handle_scoreboard(
        &self,
        daemon: &Arc<dyn ScoreboardDaemon>,
        method: &str,
        params: serde_json::Value,
    ) -> MethodResult {
        match method {
            methods::REGISTER_WHEN_SCORE_UPDATE => {
                let registration: CallbackRegistration = decode(params)?;
                reply(
                    self.scores
                        .register(&self.broker, registration, std::convert::identity, |handler| {
                            daemon.register_when_score_update(handler)
                        })
                        .await,
                )
            }
            methods::UNREGISTER_WHEN_SCORE_UPDATE => {
                let args: IdArgs = decode(params)?;
                let stop = daemon.unregister_when_score_update(&args.id);
                encode(self.scores.unregister(&args.id, stop).await)
            }
            methods::QUERY_SCORE_BY_PLAYER_UUID => {
                let args: NameArgs = decode(params)?;
                reply(daemon.query_score_by_player_uuid(&args.name).await)
            }
            methods::QUERY_RANK_BY_SCOREBOARD => {
                let args: RankArgs = decode(params)?;
                reply(
                    daemon
                        .query_rank_by_scoreboard(&args.scoreboard, args.descending, args.max_count)
                        .await,
                )
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn handle_chunk(
        &self,
        daemon: &Arc<dyn ChunkDaemon>,
        method: &str,
        params: serde_json::Value,
    ) -> MethodResult {
        match method {
            methods::REGISTER_WHEN_NEW_CHUNK => {
                let registration: CallbackRegistration = decode(params)?;
                reply(
                    self.chunks
                        .register(&self.broker, registration, std::convert::identity, |handler| {
                            daemon.register_when_new_chunk(handler)
                        })
                        .await,
                )
            }
            methods::UNREGISTER_WHEN_NEW_CHUNK => {
                let args: IdArgs = decode(params)?;
                let stop = daemon.unregister_when_new_chunk(&args.id);
                encode(self.chunks.unregister(&args.id, stop).await)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

#[async_trait]
impl Service for DaemonServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        let daemon = self.inner.as_daemon();
        match method {
            methods::NAME => reply(daemon.name().await),
            methods::RECONFIG => {
                let args: ConfigArgs = decode(params)?;
                reply(daemon.reconfig(args.config).await)
            }
            methods::CONFIG => reply(daemon.config().await),
            _ => match &self.inner {
                AnyDaemon::Scoreboard(scoreboard) => {
                    self.handle_scoreboard(scoreboard, method, params).await
                }
                AnyDaemon::Chunk(chunk) => self.handle_chunk(chunk, method, params).await,
                AnyDaemon::Basic(_) => Err(RpcError::method_not_found(method)),
            },
        }
    }

    async fn on_close(&self) {
        match &self.inner {
            AnyDaemon::Scoreboard(daemon) => {
                self.scores
                    .close_all(|id| async move { daemon.unregister_when_score_update(&id).await })
                    .await
            }
            AnyDaemon::Chunk(daemon) => {
                self.chunks
                    .close_all(|id| async move { daemon.unregister_when_new_chunk(&id).await })
                    .await
            }
            AnyDaemon::Basic(_) => {}
        }
    }
}

/// Proxy for a daemon of any kind.
pub struct DaemonClient {
    channel: Arc<RpcChannel>,
    broker: Broker,
    bridges: ClientBridges,
}

impl DaemonClient {
    pub fn new(channel: Arc<RpcChannel>, broker: Broker) -> Self {
        Self {
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
impl Daemon for DaemonClient {
    async fn name(&self) -> Result<String> {
        self.channel.call(methods::NAME, &Empty {}).await
    }

    async fn reconfig(&self, config: ConfigMap) -> Result<()> {
        self.channel
            .call(methods::RECONFIG, &ConfigArgs { config })
            .await
    }

    async fn config(&self) -> Result<ConfigMap> {
        self.channel.call(methods::CONFIG, &Empty {}).await
    }
}

#[async_trait]
impl ScoreboardDaemon for DaemonClient {
    async fn register_when_score_update(
        &self,
        handler: EventHandler<ScoreUpdateEvent>,
    ) -> Result<ListenerId> {
        self.listen(methods::REGISTER_WHEN_SCORE_UPDATE, handler)
            .await
    }

    async fn unregister_when_score_update(&self, listener_id: &str) -> bool {
        self.unlisten(methods::UNREGISTER_WHEN_SCORE_UPDATE, listener_id)
            .await
    }

    async fn query_score_by_player_uuid(
        &self,
        uuid: &str,
    ) -> Result<Option<Vec<PlayerScoreQueryResult>>> {
        self.channel
            .call(methods::QUERY_SCORE_BY_PLAYER_UUID, &NameArgs::new(uuid))
            .await
    }

    async fn query_rank_by_scoreboard(
        &self,
        scoreboard: &str,
        descending: bool,
        max_count: usize,
    ) -> Result<Option<Vec<RankQueryResult>>> {
        let args = RankArgs {
            scoreboard: scoreboard.to_string(),
            descending,
            max_count,
        };
        self.channel
            .call(methods::QUERY_RANK_BY_SCOREBOARD, &args)
            .await
    }
}

#[async_trait]
impl ChunkDaemon for DaemonClient {
    async fn register_when_new_chunk(
        &self,
        handler: EventHandler<ChunkNewChunkEvent>,
    ) -> Result<ListenerId> {
        self.listen(methods::REGISTER_WHEN_NEW_CHUNK, handler).await
    }

    async fn unregister_when_new_chunk(&self, listener_id: &str) -> bool {
        self.unlisten(methods::UNREGISTER_WHEN_NEW_CHUNK, listener_id)
            .await
    }
}
