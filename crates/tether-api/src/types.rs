//! Domain payloads exchanged with capability modules
//!
//! Plain data types here derive serde. Types that hold closures or opaque
//! values ([`ChatMsg`], [`GameMenuEntry`], [`TerminalMenuEntry`]) do not; the
//! protocol layer converts them to wire records explicitly.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tether_core::CallContext;

/// Free-form configuration object.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Event handler crossing the process boundary via a callback bridge.
pub type EventHandler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Opaque host-side value attached to a chat message. Never transmitted.
pub type Aux = Arc<dyn Any + Send + Sync>;

/// Host-specific chat details.
#[derive(Clone, Default)]
pub struct ChatUd {
    pub name: String,
    pub msg: Vec<String>,
    pub kind: i32,
    pub raw_msg: String,
    pub raw_name: String,
    pub raw_parameters: Vec<String>,
    pub aux: Option<Aux>,
    pub parsed_msg: String,
}

impl std::fmt::Debug for ChatUd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatUd")
            .field("name", &self.name)
            .field("msg", &self.msg)
            .field("kind", &self.kind)
            .field("raw_msg", &self.raw_msg)
            .field("raw_name", &self.raw_name)
            .field("raw_parameters", &self.raw_parameters)
            .field("aux", &self.aux.as_ref().map(|_| ".."))
            .field("parsed_msg", &self.parsed_msg)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatMsg {
    pub msg: Vec<String>,
    pub name: String,
    pub parsed_msg: String,
    pub raw_msg: String,
    pub raw_parameters: Vec<String>,
    pub msg_type: u8,
    pub ud: ChatUd,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandOriginInfo {
    pub origin: u32,
    pub uuid: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandOutputMessage {
    pub success: bool,
    pub message: String,
    pub parameters: Vec<String>,
}

/// Game output produced by a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandOutput {
    pub command_line: String,
    pub origin: CommandOriginInfo,
    pub output_type: u8,
    pub success_count: u32,
    pub messages: Vec<CommandOutputMessage>,
    pub data_set: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerChangeKind {
    #[default]
    Exist,
    Online,
    Offline,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerChangeEvent {
    pub uuid: String,
    pub name: String,
    pub kind: PlayerChangeKind,
}

/// Permission flags of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    Build,
    Dig,
    DoorsAndSwitches,
    OpenContainers,
    AttackPlayers,
    AttackMobs,
    OperatorCommands,
    Teleport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Invulnerable,
    Flying,
    MayFly,
}

/// Severity tag used by the terminal and logger modules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    #[serde(rename = "SUCC")]
    Success,
    #[default]
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "ERRO")]
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Success => "SUCC",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERRO",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry in the in-game menu.
#[derive(Clone)]
pub struct GameMenuEntry {
    pub triggers: Vec<String>,
    pub argument_hint: String,
    pub usage: String,
    pub on_trigger: EventHandler<ChatMsg>,
}

/// Serializable snapshot of a game menu entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameMenuEntryInfo {
    pub entry_id: String,
    pub triggers: Vec<String>,
    pub argument_hint: String,
    pub usage: String,
}

/// Entry in the backend terminal menu.
#[derive(Clone)]
pub struct TerminalMenuEntry {
    pub triggers: Vec<String>,
    pub argument_hint: String,
    pub usage: String,
    pub on_trigger: EventHandler<Vec<String>>,
}

/// Serializable snapshot of a terminal menu entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalMenuEntryInfo {
    pub entry_id: String,
    pub triggers: Vec<String>,
    pub argument_hint: String,
    pub usage: String,
}

/// Outcome of an exposed flex API. `result = None` travels as JSON `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlexReply {
    pub result: Option<Vec<u8>>,
    pub error: String,
}

impl FlexReply {
    /// A successful reply carrying `result`.
    pub fn ok(result: impl Into<Vec<u8>>) -> Self {
        Self {
            result: Some(result.into()),
            error: String::new(),
        }
    }

    /// A failed reply with no result.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            result: None,
            error: error.into(),
        }
    }

    /// Result bytes as sent on the wire.
    pub fn result_bytes(&self) -> Vec<u8> {
        match &self.result {
            Some(bytes) if !bytes.is_empty() => bytes.clone(),
            _ => b"null".to_vec(),
        }
    }
}

/// Handler behind an exposed flex API.
pub type FlexHandler = Arc<dyn Fn(CallContext, Vec<u8>) -> BoxFuture<'static, FlexReply> + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreUpdateEvent {
    pub scores: HashMap<String, HashMap<String, i64>>,
    pub players: HashMap<String, String>,
    pub scoreboards: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerScoreQueryResult {
    pub scoreboard_name: String,
    pub display_name: String,
    pub score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankQueryResult {
    pub player_uuid: String,
    pub player_name: String,
    pub score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkNewChunkEvent {
    pub dimension: i32,
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub sub_chunks: Vec<Vec<u8>>,
    pub biomes: Vec<u8>,
    pub block_entities: Vec<u8>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRule {
    pub can_be_modified: bool,
    pub value: String,
}

/// Backend of a key-value database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    #[default]
    TextLog,
    Level,
    Json,
}

impl DbType {
    /// Parse the host's type tag; the empty string selects the default.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "" | "text_log" => Some(DbType::TextLog),
            "level" => Some(DbType::Level),
            "json" => Some(DbType::Json),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DbType::TextLog => "text_log",
            DbType::Level => "level",
            DbType::Json => "json",
        }
    }
}
