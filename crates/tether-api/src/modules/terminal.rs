use crate::subscription::{CancelHandle, Subscription};
use crate::types::{EventHandler, Level};
use async_trait::async_trait;
use std::time::Duration;
use tether_core::{CallContext, Result};

/// Backend terminal output and input.
#[async_trait]
pub trait TerminalModule: Send + Sync {
    fn name(&self) -> &str;

    async fn print(&self, level: Level, scope: &str, msg: &str);

    async fn info(&self, scope: &str, msg: &str) {
        self.print(Level::Info, scope, msg).await
    }

    async fn warn(&self, scope: &str, msg: &str) {
        self.print(Level::Warn, scope, msg).await
    }

    async fn error(&self, scope: &str, msg: &str) {
        self.print(Level::Error, scope, msg).await
    }

    async fn success(&self, scope: &str, msg: &str) {
        self.print(Level::Success, scope, msg).await
    }

    async fn raw(&self, msg: &str);

    async fn color_trans_ansi(&self, msg: &str) -> String;

    /// Every line typed into the terminal from now on.
    async fn subscribe_lines(&self, ctx: &CallContext) -> Result<Subscription<String>>;

    /// Hand the next typed line to `handler` instead of the menu. `None`
    /// waits indefinitely.
    async fn intercept_next_line(
        &self,
        ctx: &CallContext,
        timeout: Option<Duration>,
        handler: EventHandler<String>,
    ) -> Result<CancelHandle>;
}

/// Persistent log storage, separate from terminal output.
#[async_trait]
pub trait LoggerModule: Send + Sync {
    fn name(&self) -> &str;

    async fn log(&self, scope: &str, level: Level, msg: &str);

    async fn info(&self, scope: &str, msg: &str) {
        self.log(scope, Level::Info, msg).await
    }

    async fn warn(&self, scope: &str, msg: &str) {
        self.log(scope, Level::Warn, msg).await
    }

    async fn error(&self, scope: &str, msg: &str) {
        self.log(scope, Level::Error, msg).await
    }

    async fn success(&self, scope: &str, msg: &str) {
        self.log(scope, Level::Success, msg).await
    }
}

/// Host-owned directories, joined with the given parts.
#[async_trait]
pub trait StoragePathModule: Send + Sync {
    fn name(&self) -> &str;

    async fn config_path(&self, parts: &[&str]) -> String;
    async fn code_path(&self, parts: &[&str]) -> String;
    async fn data_file_path(&self, parts: &[&str]) -> String;
    async fn cache_path(&self, parts: &[&str]) -> String;
}
