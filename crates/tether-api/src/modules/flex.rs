use crate::subscription::{CancelHandle, Subscription};
use crate::types::{FlexHandler, FlexReply};
use async_trait::async_trait;
use tether_core::{CallContext, Result};

/// Cross-plugin communication: shared values, topics, and callable APIs.
///
/// Payloads are JSON text carried as bytes.
#[async_trait]
pub trait FlexModule: Send + Sync {
    fn name(&self) -> &str;

    async fn set(&self, key: &str, value: &str);
    async fn get(&self, key: &str) -> Option<String>;

    async fn publish(&self, topic: &str, payload: Vec<u8>);
    /// Every payload published on `topic` from now on.
    async fn subscribe(&self, ctx: &CallContext, topic: &str) -> Result<Subscription<Vec<u8>>>;

    /// Serve `api_name` until the returned handle is cancelled.
    async fn expose(&self, api_name: &str, handler: FlexHandler) -> Result<CancelHandle>;

    async fn call(&self, ctx: &CallContext, api_name: &str, args: Vec<u8>) -> Result<FlexReply>;
}
