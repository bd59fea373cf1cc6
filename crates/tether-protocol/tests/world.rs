//! Players, menus, daemons and the bot view through their proxies.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use common::{Harness, MapFrame};
use tether_api::{
    Ability, AnyDaemon, BrainModule, ChatMsg, ConfigMap, Daemon, EventHandler, GameMenuEntry,
    GameMenuEntryInfo, GameMenuModule, GameRule, Module, PlayerChangeEvent, PlayerChangeKind,
    PlayerKit, PlayerScoreQueryResult, PlayerStatus, PlayersModule, RankQueryResult,
    ScoreUpdateEvent, ScoreboardDaemon, Subscription, SubscriptionSender, UqHolderModule, names,
};
use tether_core::{CallContext, Error, ListenerId, Result};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

struct FakeKit {
    uuid: String,
    name: String,
    abilities: Mutex<HashMap<Ability, bool>>,
    said: Mutex<Vec<String>>,
}

impl FakeKit {
    fn new(uuid: &str, name: &str) -> Arc<Self> {
        Arc::new(Self {
            uuid: uuid.into(),
            name: name.into(),
            abilities: Mutex::new(HashMap::new()),
            said: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl PlayerKit for FakeKit {
    async fn uuid(&self) -> Result<String> {
        Ok(self.uuid.clone())
    }

    async fn name(&self) -> Result<String> {
        Ok(self.name.clone())
    }

    async fn entity_unique_id(&self, _ctx: &CallContext) -> Result<i64> {
        Ok(-7)
    }

    async fn login_time(&self, _ctx: &CallContext) -> Result<SystemTime> {
        Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }

    async fn platform_chat_id(&self, _ctx: &CallContext) -> Result<String> {
        Ok(String::new())
    }

    async fn build_platform(&self, _ctx: &CallContext) -> Result<i32> {
        Ok(7)
    }

    async fn skin_id(&self, _ctx: &CallContext) -> Result<String> {
        Ok("steve-skin".into())
    }

    async fn ability(&self, _ctx: &CallContext, ability: Ability) -> Result<bool> {
        Ok(self.abilities.lock().unwrap().get(&ability).copied().unwrap_or(false))
    }

    async fn set_ability(&self, _ctx: &CallContext, ability: Ability, allow: bool) -> Result<()> {
        self.abilities.lock().unwrap().insert(ability, allow);
        Ok(())
    }

    async fn status(&self, _ctx: &CallContext, status: PlayerStatus) -> Result<bool> {
        Ok(status == PlayerStatus::MayFly)
    }

    async fn device_id(&self, _ctx: &CallContext) -> Result<String> {
        Ok("device".into())
    }

    async fn entity_runtime_id(&self, _ctx: &CallContext) -> Result<u64> {
        Ok(42)
    }

    async fn entity_metadata(&self, _ctx: &CallContext) -> Result<HashMap<u32, serde_json::Value>> {
        Ok(HashMap::from([(0, serde_json::json!(1))]))
    }

    async fn is_op(&self, _ctx: &CallContext) -> Result<bool> {
        Ok(true)
    }

    async fn online(&self, _ctx: &CallContext) -> Result<bool> {
        Ok(true)
    }

    async fn raw_say(&self, json_text: &str) -> Result<()> {
        self.said.lock().unwrap().push(json_text.to_string());
        Ok(())
    }

    async fn say(&self, message: &str) -> Result<()> {
        self.said.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn title(&self, message: &str) -> Result<()> {
        self.say(message).await
    }

    async fn subtitle(&self, subtitle: &str, _title: &str) -> Result<()> {
        self.say(subtitle).await
    }

    async fn action_bar(&self, message: &str) -> Result<()> {
        self.say(message).await
    }
}

#[derive(Default)]
struct FakePlayers {
    online: Vec<Arc<FakeKit>>,
    next: AtomicU32,
    change: Mutex<HashMap<String, EventHandler<PlayerChangeEvent>>>,
}

impl FakePlayers {
    fn with(online: Vec<Arc<FakeKit>>) -> Arc<Self> {
        Arc::new(Self {
            online,
            ..Default::default()
        })
    }

    fn find(&self, pred: impl Fn(&FakeKit) -> bool) -> Option<Arc<dyn PlayerKit>> {
        self.online
            .iter()
            .find(|kit| pred(kit.as_ref()))
            .map(|kit| kit.clone() as Arc<dyn PlayerKit>)
    }

    fn join(&self, kit: &FakeKit) {
        let event = PlayerChangeEvent {
            uuid: kit.uuid.clone(),
            name: kit.name.clone(),
            kind: PlayerChangeKind::Online,
        };
        let handlers: Vec<_> = self.change.lock().unwrap().values().cloned().collect();
        for handler in handlers {
            handler(event.clone());
        }
    }
}

#[async_trait]
impl PlayersModule for FakePlayers {
    fn name(&self) -> &str {
        names::PLAYERS
    }

    async fn new_player_kit(&self, uuid: &str) -> Result<Option<Arc<dyn PlayerKit>>> {
        Ok(self.find(|kit| kit.uuid == uuid))
    }

    async fn get_all_online_players(&self, _ctx: &CallContext) -> Result<Vec<Arc<dyn PlayerKit>>> {
        Ok(self
            .online
            .iter()
            .map(|kit| kit.clone() as Arc<dyn PlayerKit>)
            .collect())
    }

    async fn get_player_by_name(
        &self,
        _ctx: &CallContext,
        name: &str,
    ) -> Result<Option<Arc<dyn PlayerKit>>> {
        Ok(self.find(|kit| kit.name == name))
    }

    async fn get_player_by_uuid(
        &self,
        _ctx: &CallContext,
        uuid: &str,
    ) -> Result<Option<Arc<dyn PlayerKit>>> {
        Ok(self.find(|kit| kit.uuid == uuid))
    }

    async fn register_when_player_change(
        &self,
        handler: EventHandler<PlayerChangeEvent>,
    ) -> Result<ListenerId> {
        let id = format!("listener:{}", self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.change.lock().unwrap().insert(id.clone(), handler);
        Ok(id)
    }

    async fn unregister_when_player_change(&self, listener_id: &str) -> bool {
        self.change.lock().unwrap().remove(listener_id).is_some()
    }

    async fn raw_say_to(&self, _target: &str, _json_text: &str) -> Result<()> {
        Ok(())
    }

    async fn say_to(&self, target: &str, message: &str) -> Result<()> {
        match self.find(|kit| kit.name == target) {
            Some(kit) => kit.say(message).await,
            None => Err(Error::module(format!("no player {target}"))),
        }
    }

    async fn raw_title_to(&self, _target: &str, _json_text: &str) -> Result<()> {
        Ok(())
    }

    async fn title_to(&self, _target: &str, _message: &str) -> Result<()> {
        Ok(())
    }

    async fn raw_subtitle_to(&self, _target: &str, _subtitle: &str, _title: &str) -> Result<()> {
        Ok(())
    }

    async fn subtitle_to(&self, _target: &str, _subtitle: &str, _title: &str) -> Result<()> {
        Ok(())
    }

    async fn action_bar_to(&self, _target: &str, _message: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeGameMenu {
    next: AtomicU32,
    entries: Mutex<Vec<(String, GameMenuEntry)>>,
    watchers: Mutex<Vec<SubscriptionSender<GameMenuEntryInfo>>>,
}

fn info(id: &str, entry: &GameMenuEntry) -> GameMenuEntryInfo {
    GameMenuEntryInfo {
        entry_id: id.to_string(),
        triggers: entry.triggers.clone(),
        argument_hint: entry.argument_hint.clone(),
        usage: entry.usage.clone(),
    }
}

#[async_trait]
impl GameMenuModule for FakeGameMenu {
    fn name(&self) -> &str {
        names::GAME_MENU
    }

    async fn register_game_menu_entry(&self, entry: GameMenuEntry) -> Result<String> {
        let id = format!("entry:{}", self.next.fetch_add(1, Ordering::SeqCst) + 1);
        for watcher in self.watchers.lock().unwrap().iter() {
            watcher.send(info(&id, &entry));
        }
        self.entries.lock().unwrap().push((id.clone(), entry));
        Ok(id)
    }

    async fn remove_menu_entry(&self, entry_id: &str) {
        self.entries.lock().unwrap().retain(|(id, _)| id != entry_id);
    }

    async fn subscribe_entries(&self) -> Result<Subscription<GameMenuEntryInfo>> {
        let (sender, subscription) = Subscription::channel(16);
        for (id, entry) in self.entries.lock().unwrap().iter() {
            sender.send(info(id, entry));
        }
        self.watchers.lock().unwrap().push(sender);
        Ok(subscription)
    }

    async fn trigger_entry(&self, entry_id: &str, chat: ChatMsg) {
        let handler = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == entry_id)
            .map(|(_, entry)| entry.on_trigger.clone());
        if let Some(handler) = handler {
            handler(chat);
        }
    }
}

struct FakeScoreboard {
    config: Mutex<ConfigMap>,
}

#[async_trait]
impl Daemon for FakeScoreboard {
    async fn name(&self) -> Result<String> {
        Ok("scoreboard".into())
    }

    async fn reconfig(&self, config: ConfigMap) -> Result<()> {
        *self.config.lock().unwrap() = config;
        Ok(())
    }

    async fn config(&self) -> Result<ConfigMap> {
        Ok(self.config.lock().unwrap().clone())
    }
}

#[async_trait]
impl ScoreboardDaemon for FakeScoreboard {
    async fn register_when_score_update(
        &self,
        _handler: EventHandler<ScoreUpdateEvent>,
    ) -> Result<ListenerId> {
        Ok("listener:1".into())
    }

    async fn unregister_when_score_update(&self, _listener_id: &str) -> bool {
        true
    }

    async fn query_score_by_player_uuid(
        &self,
        uuid: &str,
    ) -> Result<Option<Vec<PlayerScoreQueryResult>>> {
        if uuid != "u-steve" {
            return Ok(None);
        }
        Ok(Some(vec![PlayerScoreQueryResult {
            scoreboard_name: "kills".into(),
            display_name: "Kills".into(),
            score: 3,
        }]))
    }

    async fn query_rank_by_scoreboard(
        &self,
        _scoreboard: &str,
        descending: bool,
        max_count: usize,
    ) -> Result<Option<Vec<RankQueryResult>>> {
        let mut ranks = vec![
            RankQueryResult {
                player_uuid: "u-alex".into(),
                player_name: "alex".into(),
                score: 1,
            },
            RankQueryResult {
                player_uuid: "u-steve".into(),
                player_name: "steve".into(),
                score: 3,
            },
        ];
        if descending {
            ranks.reverse();
        }
        ranks.truncate(max_count);
        Ok(Some(ranks))
    }
}

#[derive(Default)]
struct FakeBrain {
    scoreboard: Mutex<Option<Arc<FakeScoreboard>>>,
}

#[async_trait]
impl BrainModule for FakeBrain {
    fn name(&self) -> &str {
        names::BRAIN
    }

    async fn enable_daemon(
        &self,
        _ctx: &CallContext,
        name: &str,
        config: ConfigMap,
    ) -> Result<(ConfigMap, Option<AnyDaemon>)> {
        if name != names::SCOREBOARD_DAEMON {
            return Ok((config, None));
        }
        let mut effective = config;
        effective.insert("interval_ms".into(), 500.into());
        let daemon = Arc::new(FakeScoreboard {
            config: Mutex::new(effective.clone()),
        });
        *self.scoreboard.lock().unwrap() = Some(daemon.clone());
        Ok((effective, Some(AnyDaemon::Scoreboard(daemon))))
    }

    async fn disable_daemon(&self, _ctx: &CallContext, name: &str) -> Result<()> {
        if name == names::SCOREBOARD_DAEMON {
            self.scoreboard.lock().unwrap().take();
        }
        Ok(())
    }
}

struct FakeUqHolder;

#[async_trait]
impl UqHolderModule for FakeUqHolder {
    fn name(&self) -> &str {
        names::UQHOLDER
    }

    async fn bot_name(&self, _ctx: &CallContext) -> Result<String> {
        Ok("bot".into())
    }

    async fn bot_runtime_id(&self, _ctx: &CallContext) -> Result<u64> {
        Ok(1)
    }

    async fn bot_unique_id(&self, _ctx: &CallContext) -> Result<i64> {
        Ok(-1)
    }

    async fn bot_identity(&self, _ctx: &CallContext) -> Result<String> {
        Ok("identity".into())
    }

    async fn bot_uuid(&self, _ctx: &CallContext) -> Result<String> {
        Ok("u-bot".into())
    }

    async fn bot_xuid(&self, _ctx: &CallContext) -> Result<String> {
        Ok("x-bot".into())
    }

    async fn basic_raw(&self, _ctx: &CallContext) -> Result<ConfigMap> {
        Ok(ConfigMap::new())
    }

    async fn compress_threshold(&self, _ctx: &CallContext) -> Result<Option<u16>> {
        Ok(Some(256))
    }

    async fn world_game_mode(&self, _ctx: &CallContext) -> Result<Option<i32>> {
        Ok(None)
    }

    async fn game_mode(&self, _ctx: &CallContext) -> Result<Option<i32>> {
        Ok(Some(1))
    }

    async fn world_difficulty(&self, _ctx: &CallContext) -> Result<Option<u32>> {
        Ok(None)
    }

    async fn time(&self, _ctx: &CallContext) -> Result<Option<i32>> {
        Ok(None)
    }

    async fn day_time(&self, _ctx: &CallContext) -> Result<Option<i32>> {
        Ok(None)
    }

    async fn day_time_percent(&self, _ctx: &CallContext) -> Result<Option<f32>> {
        Ok(Some(0.5))
    }

    async fn current_tick(&self, _ctx: &CallContext) -> Result<Option<i64>> {
        Ok(None)
    }

    async fn sync_ratio(&self, _ctx: &CallContext) -> Result<Option<f32>> {
        Ok(None)
    }

    async fn bot_dimension(&self, _ctx: &CallContext) -> Result<Option<i32>> {
        Ok(Some(0))
    }

    async fn bot_position(&self, _ctx: &CallContext) -> Result<Option<[f32; 3]>> {
        Ok(Some([1.0, 64.0, -2.5]))
    }

    async fn bot_position_out_of_sync_tick(&self, _ctx: &CallContext) -> Result<Option<i64>> {
        Ok(None)
    }

    async fn client_dimension(&self, _ctx: &CallContext) -> Result<Option<i32>> {
        Ok(None)
    }

    async fn client_hotbar_slot(&self, _ctx: &CallContext) -> Result<Option<u8>> {
        Ok(None)
    }

    async fn client_holding_item(&self, _ctx: &CallContext) -> Result<Option<ConfigMap>> {
        Ok(None)
    }

    async fn game_rules(&self, _ctx: &CallContext) -> Result<HashMap<String, GameRule>> {
        Ok(HashMap::from([(
            "keepinventory".to_string(),
            GameRule {
                can_be_modified: true,
                value: "true".into(),
            },
        )]))
    }

    async fn extend_raw(&self, _ctx: &CallContext) -> Result<ConfigMap> {
        Ok(ConfigMap::new())
    }
}

struct World {
    steve: Arc<FakeKit>,
    players: Arc<FakePlayers>,
    menu: Arc<FakeGameMenu>,
    brain: Arc<FakeBrain>,
    harness: Harness,
}

impl World {
    async fn start() -> anyhow::Result<Self> {
        let steve = FakeKit::new("u-steve", "steve");
        let players = FakePlayers::with(vec![steve.clone(), FakeKit::new("u-alex", "alex")]);
        let menu = Arc::new(FakeGameMenu::default());
        let brain = Arc::new(FakeBrain::default());
        let frame = MapFrame::new(vec![
            Module::from(players.clone() as Arc<dyn PlayersModule>),
            Module::from(menu.clone() as Arc<dyn GameMenuModule>),
            Module::from(brain.clone() as Arc<dyn BrainModule>),
            Module::from(Arc::new(FakeUqHolder) as Arc<dyn UqHolderModule>),
        ]);
        let harness = Harness::start(Arc::new(frame)).await?;
        Ok(Self {
            steve,
            players,
            menu,
            brain,
            harness,
        })
    }
}

fn ctx() -> CallContext {
    CallContext::with_timeout(WAIT)
}

#[tokio::test]
async fn test_player_handles_reach_the_host_kit() -> anyhow::Result<()> {
    let world = World::start().await?;
    let players = world
        .harness
        .module::<Arc<dyn PlayersModule>>(names::PLAYERS)
        .await?;

    let online = players.get_all_online_players(&ctx()).await?;
    let mut names: Vec<String> = Vec::new();
    for kit in &online {
        names.push(kit.name().await?);
    }
    names.sort();
    assert_eq!(names, vec!["alex".to_string(), "steve".to_string()]);

    assert!(players.get_player_by_name(&ctx(), "herobrine").await?.is_none());
    let steve = players.get_player_by_name(&ctx(), "steve").await?.unwrap();
    assert_eq!(steve.uuid().await?, "u-steve");
    assert_eq!(steve.entity_unique_id(&ctx()).await?, -7);
    assert_eq!(steve.entity_runtime_id(&ctx()).await?, 42);
    assert_eq!(
        steve.login_time(&ctx()).await?,
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    );
    assert!(steve.status(&ctx(), PlayerStatus::MayFly).await?);
    assert!(!steve.status(&ctx(), PlayerStatus::Flying).await?);
    assert_eq!(steve.entity_metadata(&ctx()).await?[&0], serde_json::json!(1));

    steve.set_ability(&ctx(), Ability::Build, true).await?;
    assert!(steve.ability(&ctx(), Ability::Build).await?);
    assert!(!steve.ability(&ctx(), Ability::Teleport).await?);
    assert_eq!(world.steve.abilities.lock().unwrap().get(&Ability::Build), Some(&true));

    // Same player through a second, independently resolved handle.
    let again = players.new_player_kit("u-steve").await?.unwrap();
    again.say("hi").await?;
    players.say_to("steve", "welcome").await?;
    assert_eq!(
        *world.steve.said.lock().unwrap(),
        vec!["hi".to_string(), "welcome".to_string()]
    );

    let err = players.say_to("herobrine", "boo").await.unwrap_err();
    assert!(matches!(&err, Error::Module(msg) if msg == "no player herobrine"));

    world.harness.session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_player_change_listener() -> anyhow::Result<()> {
    let world = World::start().await?;
    let players = world
        .harness
        .module::<Arc<dyn PlayersModule>>(names::PLAYERS)
        .await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = players
        .register_when_player_change(Arc::new(move |event: PlayerChangeEvent| {
            let _ = tx.send(event);
        }))
        .await?;
    world.players.join(&world.steve);

    let event = timeout(WAIT, rx.recv()).await?.unwrap();
    assert_eq!(event.name, "steve");
    assert_eq!(event.kind, PlayerChangeKind::Online);

    assert!(players.unregister_when_player_change(&listener).await);
    assert!(world.players.change.lock().unwrap().is_empty());

    world.harness.session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_game_menu_replays_entries_and_triggers_remotely() -> anyhow::Result<()> {
    let world = World::start().await?;
    let menu = world
        .harness
        .module::<Arc<dyn GameMenuModule>>(names::GAME_MENU)
        .await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let entry_id = menu
        .register_game_menu_entry(GameMenuEntry {
            triggers: vec!["home".into()],
            argument_hint: "[name]".into(),
            usage: "go home".into(),
            on_trigger: Arc::new(move |chat: ChatMsg| {
                let _ = tx.send(chat.name);
            }),
        })
        .await?;

    let mut entries = menu.subscribe_entries().await?;
    let replayed = timeout(WAIT, entries.recv()).await?.unwrap();
    assert_eq!(replayed.entry_id, entry_id);
    assert_eq!(replayed.triggers, vec!["home".to_string()]);

    // Triggered through the proxy, delivered back over the entry's bridge.
    let chat = ChatMsg {
        name: "steve".into(),
        ..Default::default()
    };
    menu.trigger_entry(&entry_id, chat).await;
    assert_eq!(timeout(WAIT, rx.recv()).await?.as_deref(), Some("steve"));

    menu.remove_menu_entry(&entry_id).await;
    assert!(world.menu.entries.lock().unwrap().is_empty());
    entries.cancel();

    world.harness.session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_enabled_daemon_is_typed_by_its_handle_kind() -> anyhow::Result<()> {
    let world = World::start().await?;
    let brain = world
        .harness
        .module::<Arc<dyn BrainModule>>(names::BRAIN)
        .await?;

    let mut config = ConfigMap::new();
    config.insert("boards".into(), serde_json::json!(["kills"]));
    let (effective, daemon) = brain
        .enable_daemon(&ctx(), names::SCOREBOARD_DAEMON, config)
        .await?;
    assert_eq!(effective["interval_ms"], 500);

    let scoreboard = match daemon {
        Some(AnyDaemon::Scoreboard(scoreboard)) => scoreboard,
        other => panic!("expected a scoreboard daemon, got {other:?}"),
    };
    assert_eq!(scoreboard.name().await?, "scoreboard");

    let ranks = scoreboard
        .query_rank_by_scoreboard("kills", true, 1)
        .await?
        .unwrap();
    assert_eq!(ranks.len(), 1);
    assert_eq!(ranks[0].player_name, "steve");
    assert!(scoreboard.query_score_by_player_uuid("u-nobody").await?.is_none());

    let mut changed = ConfigMap::new();
    changed.insert("interval_ms".into(), 100.into());
    scoreboard.reconfig(changed.clone()).await?;
    assert_eq!(scoreboard.config().await?, changed);

    let (_, none) = brain.enable_daemon(&ctx(), "weather", ConfigMap::new()).await?;
    assert!(none.is_none());

    brain.disable_daemon(&ctx(), names::SCOREBOARD_DAEMON).await?;
    assert!(world.brain.scoreboard.lock().unwrap().is_none());

    world.harness.session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_uqholder_optional_values_stay_absent() -> anyhow::Result<()> {
    let world = World::start().await?;
    let uq = world
        .harness
        .module::<Arc<dyn UqHolderModule>>(names::UQHOLDER)
        .await?;

    assert_eq!(uq.bot_name(&ctx()).await?, "bot");
    assert_eq!(uq.bot_unique_id(&ctx()).await?, -1);
    assert_eq!(uq.compress_threshold(&ctx()).await?, Some(256));
    assert_eq!(uq.world_game_mode(&ctx()).await?, None);
    assert_eq!(uq.day_time_percent(&ctx()).await?, Some(0.5));
    assert_eq!(uq.bot_position(&ctx()).await?, Some([1.0, 64.0, -2.5]));
    assert_eq!(uq.client_holding_item(&ctx()).await?, None);
    assert_eq!(uq.game_rules(&ctx()).await?["keepinventory"].value, "true");

    world.harness.session.shutdown().await;
    Ok(())
}
