use crate::subscription::Subscription;
use crate::types::{ChatMsg, EventHandler, GameMenuEntry, GameMenuEntryInfo, TerminalMenuEntry, TerminalMenuEntryInfo};
use async_trait::async_trait;
use tether_core::{ListenerId, Result};

/// Backend terminal menu.
#[async_trait]
pub trait TerminalMenuModule: Send + Sync {
    fn name(&self) -> &str;

    /// Add an entry; the returned id removes or triggers it later.
    async fn register_terminal_menu_entry(&self, entry: TerminalMenuEntry) -> Result<String>;
    async fn remove_terminal_menu_entry(&self, entry_id: &str) -> bool;
    async fn trigger_menu_entry(&self, entry_id: &str, args: Vec<String>) -> Result<bool>;

    async fn publish_terminal_call(&self, line: &str);
    async fn publish_pop_backend_menu(&self);

    async fn register_when_add_menu_entry(
        &self,
        handler: EventHandler<TerminalMenuEntryInfo>,
    ) -> Result<ListenerId>;
    async fn unregister_when_add_menu_entry(&self, listener_id: &str) -> bool;

    async fn register_when_terminal_call(&self, handler: EventHandler<String>) -> Result<ListenerId>;
    async fn unregister_when_terminal_call(&self, listener_id: &str) -> bool;

    async fn register_when_pop_backend_menu(&self, handler: EventHandler<()>) -> Result<ListenerId>;
    async fn unregister_when_pop_backend_menu(&self, listener_id: &str) -> bool;
}

/// In-game chat menu.
#[async_trait]
pub trait GameMenuModule: Send + Sync {
    fn name(&self) -> &str;

    async fn register_game_menu_entry(&self, entry: GameMenuEntry) -> Result<String>;
    async fn remove_menu_entry(&self, entry_id: &str);

    /// Existing entries replayed first, then every later registration.
    async fn subscribe_entries(&self) -> Result<Subscription<GameMenuEntryInfo>>;

    async fn trigger_entry(&self, entry_id: &str, chat: ChatMsg);
}
