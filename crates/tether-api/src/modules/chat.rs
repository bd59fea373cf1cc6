use crate::subscription::CancelHandle;
use crate::types::{ChatMsg, CommandOutput, EventHandler};
use async_trait::async_trait;
use tether_core::{CallContext, ListenerId, Result};

/// Chat events from the game.
#[async_trait]
pub trait ChatModule: Send + Sync {
    fn name(&self) -> &str;

    async fn register_when_chat_msg(&self, handler: EventHandler<ChatMsg>) -> Result<ListenerId>;
    async fn unregister_when_chat_msg(&self, listener_id: &str) -> bool;

    async fn register_when_receive_msg_from_sender_named(
        &self,
        name: &str,
        handler: EventHandler<ChatMsg>,
    ) -> Result<ListenerId>;
    async fn unregister_when_receive_msg_from_sender_named(&self, listener_id: &str) -> bool;

    /// Deliver the next message from `name` to `handler` once. Cancelling
    /// before it fires drops the intercept.
    async fn intercept_next_message(
        &self,
        name: &str,
        handler: EventHandler<ChatMsg>,
    ) -> Result<CancelHandle>;
}

/// Sending commands to the game.
#[async_trait]
pub trait CommandsModule: Send + Sync {
    fn name(&self) -> &str;

    async fn send_settings_command(&self, command: &str, dimensional: bool) -> Result<()>;
    async fn send_player_command(&self, command: &str) -> Result<()>;
    async fn send_ws_command(&self, command: &str) -> Result<()>;

    /// Send a command and wait for its output until `ctx`'s deadline.
    async fn send_player_command_with_resp(
        &self,
        ctx: &CallContext,
        command: &str,
    ) -> Result<CommandOutput>;

    /// Send a websocket command and wait for its output until `ctx`'s deadline.
    async fn send_ws_command_with_resp(
        &self,
        ctx: &CallContext,
        command: &str,
    ) -> Result<CommandOutput>;

    async fn await_changes_general(&self) -> Result<()>;
    async fn send_chat(&self, content: &str) -> Result<()>;
    async fn title(&self, message: &str) -> Result<()>;
}
