//! Capability module interfaces
//!
//! Every module is an object-safe async trait. A frame hands modules out as a
//! [`Module`], a closed enum with one variant per kind; [`get_module`] picks
//! the typed interface back out of it.

mod brain;
mod chat;
mod database;
mod flex;
mod menu;
mod players;
mod terminal;
mod uqholder;

pub use brain::{AnyDaemon, BrainModule, ChunkDaemon, Daemon, ScoreboardDaemon};
pub use chat::{ChatModule, CommandsModule};
pub use database::{DatabaseModule, KeyValueDb, migrate_key_value_db};
pub use flex::FlexModule;
pub use menu::{GameMenuModule, TerminalMenuModule};
pub use players::{PlayerKit, PlayersModule};
pub use terminal::{LoggerModule, StoragePathModule, TerminalModule};
pub use uqholder::UqHolderModule;

use crate::frame::Frame;
use std::sync::Arc;
use tether_core::Result;

/// Kind tags. Frame-level modules are also registered under these names.
pub mod names {
    pub const CHAT: &str = "chat";
    pub const COMMANDS: &str = "commands";
    pub const PLAYERS: &str = "players";
    pub const PLAYER_KIT: &str = "player_kit";
    pub const TERMINAL: &str = "terminal";
    pub const TERMINAL_MENU: &str = "terminal_menu";
    pub const GAME_MENU: &str = "game_menu";
    pub const FLEX: &str = "flex";
    pub const STORAGE_PATH: &str = "storage_path";
    pub const LOGGER: &str = "logger";
    pub const DATABASE: &str = "database";
    pub const KEY_VALUE_DB: &str = "key_value_db";
    pub const BRAIN: &str = "brain";
    pub const UQHOLDER: &str = "uqholder";

    pub const SCOREBOARD_DAEMON: &str = "scoreboard";
    pub const CHUNK_DAEMON: &str = "chunk";
    pub const DAEMON: &str = "daemon";
}

/// Conversion out of a [`Module`] into one typed interface.
pub trait FromModule: Sized {
    fn from_module(module: Module) -> Option<Self>;
}

macro_rules! modules {
    ($($variant:ident($iface:ident) => $kind:ident),* $(,)?) => {
        /// A module obtained from a frame.
        #[derive(Clone)]
        pub enum Module {
            $($variant(Arc<dyn $iface>),)*
            /// A module whose kind this build does not know. Only its name is usable.
            Opaque { name: String },
        }

        impl Module {
            /// Kind tag, `None` for opaque modules.
            pub fn kind(&self) -> Option<&'static str> {
                match self {
                    $(Module::$variant(_) => Some(names::$kind),)*
                    Module::Opaque { .. } => None,
                }
            }

            /// The registered name of this module kind.
            pub fn name(&self) -> &str {
                match self {
                    $(Module::$variant(m) => m.name(),)*
                    Module::Opaque { name } => name,
                }
            }
        }

        $(
            impl FromModule for Arc<dyn $iface> {
                fn from_module(module: Module) -> Option<Self> {
                    match module {
                        Module::$variant(m) => Some(m),
                        _ => None,
                    }
                }
            }

            impl From<Arc<dyn $iface>> for Module {
                fn from(module: Arc<dyn $iface>) -> Self {
                    Module::$variant(module)
                }
            }
        )*
    };
}

modules! {
    Chat(ChatModule) => CHAT,
    Commands(CommandsModule) => COMMANDS,
    Players(PlayersModule) => PLAYERS,
    Terminal(TerminalModule) => TERMINAL,
    TerminalMenu(TerminalMenuModule) => TERMINAL_MENU,
    GameMenu(GameMenuModule) => GAME_MENU,
    Flex(FlexModule) => FLEX,
    StoragePath(StoragePathModule) => STORAGE_PATH,
    Logger(LoggerModule) => LOGGER,
    Database(DatabaseModule) => DATABASE,
    Brain(BrainModule) => BRAIN,
    UqHolder(UqHolderModule) => UQHOLDER,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

/// Fetch `name` from `frame` as interface `T`.
///
/// `None` when the frame has no such module or it has a different kind.
pub async fn get_module<T: FromModule>(frame: &dyn Frame, name: &str) -> Result<Option<T>> {
    Ok(frame.get_module(name).await?.and_then(T::from_module))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Level;
    use async_trait::async_trait;

    struct Log;

    #[async_trait]
    impl LoggerModule for Log {
        fn name(&self) -> &str {
            "logger"
        }

        async fn log(&self, _scope: &str, _level: Level, _msg: &str) {}
    }

    #[test]
    fn test_module_kind_and_name() {
        let module = Module::from(Arc::new(Log) as Arc<dyn LoggerModule>);
        assert_eq!(module.kind(), Some(names::LOGGER));
        assert_eq!(module.name(), "logger");

        let opaque = Module::Opaque {
            name: "radio".into(),
        };
        assert_eq!(opaque.kind(), None);
        assert_eq!(opaque.name(), "radio");
    }

    #[test]
    fn test_from_module_checks_kind() {
        let module = Module::from(Arc::new(Log) as Arc<dyn LoggerModule>);
        assert!(<Arc<dyn LoggerModule>>::from_module(module.clone()).is_some());
        assert!(<Arc<dyn TerminalModule>>::from_module(module).is_none());
    }
}
