//! Per-module server and client stubs
//!
//! A server stub is a [`tether_broker::Service`] wrapping a local module. A
//! client stub implements the module trait by calling its server over an
//! [`tether_broker::RpcChannel`]. Method names are `tether.<module>.<op>`.

pub mod brain;
pub mod chat;
pub mod database;
pub mod flex;
pub mod menu;
pub mod players;
pub mod terminal;
pub mod uqholder;

pub use brain::{BrainClient, BrainServer, DaemonClient, DaemonServer, resolve_daemon};
pub use chat::{ChatClient, ChatServer, CommandsClient, CommandsServer};
pub use database::{DatabaseClient, DatabaseServer, KeyValueDbClient, KeyValueDbServer};
pub use flex::{FlexClient, FlexServer};
pub use menu::{GameMenuClient, GameMenuServer, TerminalMenuClient, TerminalMenuServer};
pub use players::{PlayerKitClient, PlayerKitServer, PlayersClient, PlayersServer};
pub use terminal::{
    LoggerClient, LoggerServer, StoragePathClient, StoragePathServer, TerminalClient,
    TerminalServer,
};
pub use uqholder::{UqHolderClient, UqHolderServer};
