//! Terminal, logger and storage path stubs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_api::{
    CancelHandle, EventHandler, Level, LoggerModule, StoragePathModule, Subscription,
    TerminalModule,
};
use tether_broker::{Broker, MethodResult, RpcChannel, Service, decode, encode, reply};
use tether_core::{CallContext, CallbackRegistration, Result, RpcError};

use crate::client::{
    event_service, fetch_or_default, notify, subscription_service, watch_cancel,
};
use crate::forward::Subscriptions;
use crate::relay::Intercepts;
use crate::wire::{IdArgs, NameArgs, Timed};

/// Lines buffered on the subscriber's side before new ones are dropped.
pub const LINE_BUFFER: usize = 64;

pub mod methods {
    pub const PRINT: &str = "tether.terminal.print";
    pub const RAW: &str = "tether.terminal.raw";
    pub const COLOR_TRANS_ANSI: &str = "tether.terminal.color_trans_ansi";
    pub const SUBSCRIBE_LINES: &str = "tether.terminal.subscribe_lines";
    pub const UNSUBSCRIBE_LINES: &str = "tether.terminal.unsubscribe_lines";
    pub const INTERCEPT_NEXT_LINE: &str = "tether.terminal.intercept_next_line";
    pub const CANCEL_INTERCEPT: &str = "tether.terminal.cancel_intercept";

    pub const LOG: &str = "tether.logger.log";

    pub const CONFIG_PATH: &str = "tether.storage_path.config_path";
    pub const CODE_PATH: &str = "tether.storage_path.code_path";
    pub const DATA_FILE_PATH: &str = "tether.storage_path.data_file_path";
    pub const CACHE_PATH: &str = "tether.storage_path.cache_path";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct OutputArgs {
    level: Level,
    scope: String,
    msg: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct InterceptLineArgs {
    /// How long to wait for a line, `0` for indefinitely.
    wait_ms: u64,
    #[serde(flatten)]
    callback: CallbackRegistration,
}

/// Serves a local [`TerminalModule`].
pub struct TerminalServer {
    inner: Arc<dyn TerminalModule>,
    broker: Broker,
    lines: Subscriptions,
    intercepts: Intercepts<String>,
}

impl TerminalServer {
    pub fn new(inner: Arc<dyn TerminalModule>, broker: Broker) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broker,
            lines: Subscriptions::new(),
            intercepts: Intercepts::new(),
        })
    }
}

#[async_trait]
impl Service for TerminalServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::PRINT => {
                let args: OutputArgs = decode(params)?;
                self.inner.print(args.level, &args.scope, &args.msg).await;
                encode(())
            }
            methods::RAW => {
                let args: NameArgs = decode(params)?;
                self.inner.raw(&args.name).await;
                encode(())
            }
            methods::COLOR_TRANS_ANSI => {
                let args: NameArgs = decode(params)?;
                encode(self.inner.color_trans_ansi(&args.name).await)
            }
            methods::SUBSCRIBE_LINES => {
                let Timed { timeout_ms, args } = decode::<Timed<CallbackRegistration>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                reply(
                    self.lines
                        .open(
                            &self.broker,
                            args,
                            std::convert::identity,
                            ctx.run(self.inner.subscribe_lines(&ctx)),
                        )
                        .await,
                )
            }
            methods::UNSUBSCRIBE_LINES => {
                let args: IdArgs = decode(params)?;
                encode(self.lines.cancel(&args.id).await)
            }
            methods::INTERCEPT_NEXT_LINE => {
                let Timed { timeout_ms, args } = decode::<Timed<InterceptLineArgs>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                let wait = (args.wait_ms > 0).then(|| Duration::from_millis(args.wait_ms));
                reply(
                    self.intercepts
                        .open(&self.broker, args.callback, std::convert::identity, |handler| {
                            ctx.run(self.inner.intercept_next_line(&ctx, wait, handler))
                        })
                        .await,
                )
            }
            methods::CANCEL_INTERCEPT => {
                let args: IdArgs = decode(params)?;
                encode(self.intercepts.cancel(&args.id).await)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn on_close(&self) {
        self.lines.close_all().await;
        self.intercepts.close_all().await;
    }
}

/// [`TerminalModule`] proxy.
pub struct TerminalClient {
    name: String,
    channel: Arc<RpcChannel>,
    broker: Broker,
}

impl TerminalClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>, broker: Broker) -> Self {
        Self {
            name: name.into(),
            channel,
            broker,
        }
    }
}

#[async_trait]
impl TerminalModule for TerminalClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn print(&self, level: Level, scope: &str, msg: &str) {
        let args = OutputArgs {
            level,
            scope: scope.to_string(),
            msg: msg.to_string(),
        };
        notify(&self.channel, methods::PRINT, &args).await
    }

    async fn raw(&self, msg: &str) {
        notify(&self.channel, methods::RAW, &NameArgs::new(msg)).await
    }

    async fn color_trans_ansi(&self, msg: &str) -> String {
        fetch_or_default(&self.channel, methods::COLOR_TRANS_ANSI, &NameArgs::new(msg)).await
    }

    async fn subscribe_lines(&self, ctx: &CallContext) -> Result<Subscription<String>> {
        let (sender, subscription) = Subscription::channel(LINE_BUFFER);
        let bridge = self
            .broker
            .offer(subscription_service(sender, std::convert::identity));
        let request = Timed::new(ctx.timeout_ms(), bridge.registration());
        let sub_id: String = ctx
            .run(self.channel.call(methods::SUBSCRIBE_LINES, &request))
            .await?;

        let channel = self.channel.clone();
        watch_cancel(
            &self.broker,
            subscription.cancel_handle(),
            bridge,
            move || async move {
                notify(&channel, methods::UNSUBSCRIBE_LINES, &IdArgs::new(sub_id)).await
            },
        );
        Ok(subscription)
    }

    async fn intercept_next_line(
        &self,
        ctx: &CallContext,
        timeout: Option<Duration>,
        handler: EventHandler<String>,
    ) -> Result<CancelHandle> {
        let bridge = self
            .broker
            .offer(event_service(handler, std::convert::identity));
        let args = InterceptLineArgs {
            wait_ms: timeout
                .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1))
                .unwrap_or(0),
            callback: bridge.registration(),
        };
        let request = Timed::new(ctx.timeout_ms(), args);
        let intercept_id: String = ctx
            .run(self.channel.call(methods::INTERCEPT_NEXT_LINE, &request))
            .await?;

        let cancel = CancelHandle::new();
        let channel = self.channel.clone();
        watch_cancel(&self.broker, cancel.clone(), bridge, move || async move {
            notify(&channel, methods::CANCEL_INTERCEPT, &IdArgs::new(intercept_id)).await
        });
        Ok(cancel)
    }
}

/// Serves a local [`LoggerModule`].
pub struct LoggerServer {
    inner: Arc<dyn LoggerModule>,
}

impl LoggerServer {
    pub fn new(inner: Arc<dyn LoggerModule>) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl Service for LoggerServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::LOG => {
                let args: OutputArgs = decode(params)?;
                self.inner.log(&args.scope, args.level, &args.msg).await;
                encode(())
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// [`LoggerModule`] proxy.
pub struct LoggerClient {
    name: String,
    channel: Arc<RpcChannel>,
}

impl LoggerClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>) -> Self {
        Self {
            name: name.into(),
            channel,
        }
    }
}

#[async_trait]
impl LoggerModule for LoggerClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn log(&self, scope: &str, level: Level, msg: &str) {
        let args = OutputArgs {
            level,
            scope: scope.to_string(),
            msg: msg.to_string(),
        };
        notify(&self.channel, methods::LOG, &args).await
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct PathArgs {
    parts: Vec<String>,
}

/// Serves a local [`StoragePathModule`].
pub struct StoragePathServer {
    inner: Arc<dyn StoragePathModule>,
}

impl StoragePathServer {
    pub fn new(inner: Arc<dyn StoragePathModule>) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl Service for StoragePathServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        let args: PathArgs = decode(params)?;
        let parts: Vec<&str> = args.parts.iter().map(String::as_str).collect();
        let path = match method {
            methods::CONFIG_PATH => self.inner.config_path(&parts).await,
            methods::CODE_PATH => self.inner.code_path(&parts).await,
            methods::DATA_FILE_PATH => self.inner.data_file_path(&parts).await,
            methods::CACHE_PATH => self.inner.cache_path(&parts).await,
            other => return Err(RpcError::method_not_found(other)),
        };
        encode(path)
    }
}

/// [`StoragePathModule`] proxy. Unreachable hosts yield empty paths.
pub struct StoragePathClient {
    name: String,
    channel: Arc<RpcChannel>,
}

impl StoragePathClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>) -> Self {
        Self {
            name: name.into(),
            channel,
        }
    }

    async fn path(&self, method: &str, parts: &[&str]) -> String {
        let args = PathArgs {
            parts: parts.iter().map(|p| p.to_string()).collect(),
        };
        fetch_or_default(&self.channel, method, &args).await
    }
}

#[async_trait]
impl StoragePathModule for StoragePathClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn config_path(&self, parts: &[&str]) -> String {
        self.path(methods::CONFIG_PATH, parts).await
    }

    async fn code_path(&self, parts: &[&str]) -> String {
        self.path(methods::CODE_PATH, parts).await
    }

    async fn data_file_path(&self, parts: &[&str]) -> String {
        self.path(methods::DATA_FILE_PATH, parts).await
    }

    async fn cache_path(&self, parts: &[&str]) -> String {
        self.path(methods::CACHE_PATH, parts).await
    }
}
