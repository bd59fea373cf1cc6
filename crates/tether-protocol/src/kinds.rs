//! Module kinds
//!
//! The closed table mapping a kind tag to the client stub that proxies it.
//! Serving goes the other way: a [`Module`] variant picks its server stub.
//! Supporting a new module kind means one [`Module`] variant, one arm in
//! [`server_for`] and one row in [`KINDS`].

use std::sync::Arc;

use async_trait::async_trait;
use tether_api::{Module, names};
use tether_broker::{Broker, MethodResult, RpcChannel, Service};
use tether_core::{Handle, Result, RpcError};
use tracing::debug;

use crate::stubs::{
    BrainClient, BrainServer, ChatClient, ChatServer, CommandsClient, CommandsServer,
    DatabaseClient, DatabaseServer, FlexClient, FlexServer, GameMenuClient, GameMenuServer,
    LoggerClient, LoggerServer, PlayersClient, PlayersServer, StoragePathClient,
    StoragePathServer, TerminalClient, TerminalMenuClient, TerminalMenuServer, TerminalServer,
    UqHolderClient, UqHolderServer,
};

/// Kind tag of modules this build cannot proxy.
pub const OPAQUE: &str = "opaque";

/// Builds the client stub for one kind from a dialed channel.
pub type ClientCtor = fn(String, Arc<RpcChannel>, Broker) -> Module;

/// Every module kind a frame can hand out.
pub const KINDS: &[(&str, ClientCtor)] = &[
    (names::CHAT, chat),
    (names::COMMANDS, commands),
    (names::PLAYERS, players),
    (names::TERMINAL, terminal),
    (names::TERMINAL_MENU, terminal_menu),
    (names::GAME_MENU, game_menu),
    (names::FLEX, flex),
    (names::STORAGE_PATH, storage_path),
    (names::LOGGER, logger),
    (names::DATABASE, database),
    (names::BRAIN, brain),
    (names::UQHOLDER, uqholder),
];

fn chat(name: String, channel: Arc<RpcChannel>, broker: Broker) -> Module {
    Module::Chat(Arc::new(ChatClient::new(name, channel, broker)))
}

fn commands(name: String, channel: Arc<RpcChannel>, _broker: Broker) -> Module {
    Module::Commands(Arc::new(CommandsClient::new(name, channel)))
}

fn players(name: String, channel: Arc<RpcChannel>, broker: Broker) -> Module {
    Module::Players(Arc::new(PlayersClient::new(name, channel, broker)))
}

fn terminal(name: String, channel: Arc<RpcChannel>, broker: Broker) -> Module {
    Module::Terminal(Arc::new(TerminalClient::new(name, channel, broker)))
}

fn terminal_menu(name: String, channel: Arc<RpcChannel>, broker: Broker) -> Module {
    Module::TerminalMenu(Arc::new(TerminalMenuClient::new(name, channel, broker)))
}

fn game_menu(name: String, channel: Arc<RpcChannel>, broker: Broker) -> Module {
    Module::GameMenu(Arc::new(GameMenuClient::new(name, channel, broker)))
}

fn flex(name: String, channel: Arc<RpcChannel>, broker: Broker) -> Module {
    Module::Flex(Arc::new(FlexClient::new(name, channel, broker)))
}

fn storage_path(name: String, channel: Arc<RpcChannel>, _broker: Broker) -> Module {
    Module::StoragePath(Arc::new(StoragePathClient::new(name, channel)))
}

fn logger(name: String, channel: Arc<RpcChannel>, _broker: Broker) -> Module {
    Module::Logger(Arc::new(LoggerClient::new(name, channel)))
}

fn database(name: String, channel: Arc<RpcChannel>, broker: Broker) -> Module {
    Module::Database(Arc::new(DatabaseClient::new(name, channel, broker)))
}

fn brain(name: String, channel: Arc<RpcChannel>, broker: Broker) -> Module {
    Module::Brain(Arc::new(BrainClient::new(name, channel, broker)))
}

fn uqholder(name: String, channel: Arc<RpcChannel>, _broker: Broker) -> Module {
    Module::UqHolder(Arc::new(UqHolderClient::new(name, channel)))
}

/// Client constructor for `kind`, if this build knows it.
pub fn client_for(kind: &str) -> Option<ClientCtor> {
    KINDS
        .iter()
        .find(|(tag, _)| *tag == kind)
        .map(|(_, ctor)| *ctor)
}

/// Answers nothing. Stands in for modules only their name is known of.
struct Unsupported;

#[async_trait]
impl Service for Unsupported {
    async fn handle(&self, method: &str, _params: serde_json::Value) -> MethodResult {
        Err(RpcError::method_not_found(method))
    }
}

/// Kind tag and server stub for a local module.
pub fn server_for(broker: &Broker, module: Module) -> (&'static str, Arc<dyn Service>) {
    let broker = broker.clone();
    match module {
        Module::Chat(m) => (names::CHAT, ChatServer::new(m, broker)),
        Module::Commands(m) => (names::COMMANDS, CommandsServer::new(m)),
        Module::Players(m) => (names::PLAYERS, PlayersServer::new(m, broker)),
        Module::Terminal(m) => (names::TERMINAL, TerminalServer::new(m, broker)),
        Module::TerminalMenu(m) => (names::TERMINAL_MENU, TerminalMenuServer::new(m, broker)),
        Module::GameMenu(m) => (names::GAME_MENU, GameMenuServer::new(m, broker)),
        Module::Flex(m) => (names::FLEX, FlexServer::new(m, broker)),
        Module::StoragePath(m) => (names::STORAGE_PATH, StoragePathServer::new(m)),
        Module::Logger(m) => (names::LOGGER, LoggerServer::new(m)),
        Module::Database(m) => (names::DATABASE, DatabaseServer::new(m, broker)),
        Module::Brain(m) => (names::BRAIN, BrainServer::new(m, broker)),
        Module::UqHolder(m) => (names::UQHOLDER, UqHolderServer::new(m)),
        Module::Opaque { .. } => (OPAQUE, Arc::new(Unsupported)),
    }
}

/// Serve `module` on a fresh connection.
pub fn serve_module(broker: &Broker, module: Module) -> Handle {
    let (kind, service) = server_for(broker, module);
    broker.serve_object(kind, service)
}

/// Dial a module handle and wrap it in the client stub its kind names.
///
/// An absent handle yields `None`. A kind missing from [`KINDS`] still
/// attaches, so the host's serving task ends promptly, and degrades to
/// [`Module::Opaque`].
pub async fn resolve_module(broker: &Broker, name: &str, handle: &Handle) -> Result<Option<Module>> {
    let Some(channel) = broker.resolve(handle).await? else {
        return Ok(None);
    };
    match client_for(&handle.kind) {
        Some(ctor) => Ok(Some(ctor(name.to_string(), Arc::new(channel), broker.clone()))),
        None => {
            debug!(module = name, kind = %handle.kind, "unknown module kind");
            channel.close().await;
            Ok(Some(Module::Opaque {
                name: name.to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_kind_table_has_no_duplicates() {
        let tags: HashSet<&str> = KINDS.iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags.len(), KINDS.len());
    }

    #[test]
    fn test_object_kinds_are_not_frame_modules() {
        assert!(client_for(names::CHAT).is_some());
        assert!(client_for(names::UQHOLDER).is_some());
        assert!(client_for(names::PLAYER_KIT).is_none());
        assert!(client_for(names::KEY_VALUE_DB).is_none());
        assert!(client_for(OPAQUE).is_none());
        assert!(client_for("radio").is_none());
    }
}
