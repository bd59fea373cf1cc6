//! Flex stubs: shared values, topics and exposed APIs
//!
//! An exposed API is a bridge answering calls. The host side wraps the dialed
//! bridge into a [`FlexHandler`], so other plugins call it like any local
//! handler.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tether_api::{CancelHandle, FlexHandler, FlexModule, FlexReply, Subscription};
use tether_broker::{
    Broker, CallbackClient, FnService, MethodResult, Registry, RpcChannel, Service, decode, encode,
    reply,
};
use tether_core::{CallContext, Result, RpcError};
use tracing::debug;

use crate::client::{call_timed, fetch_or_default, notify, subscription_service, watch_cancel};
use crate::forward::Subscriptions;
use crate::wire::{IdArgs, NameArgs, NamedCallback, Timed};

/// Messages buffered on the subscriber's side before new ones are dropped.
pub const TOPIC_BUFFER: usize = 256;

pub mod methods {
    pub const SET: &str = "tether.flex.set";
    pub const GET: &str = "tether.flex.get";
    pub const PUBLISH: &str = "tether.flex.publish";
    pub const SUBSCRIBE: &str = "tether.flex.subscribe";
    pub const UNSUBSCRIBE: &str = "tether.flex.unsubscribe";
    pub const EXPOSE: &str = "tether.flex.expose";
    pub const UNEXPOSE: &str = "tether.flex.unexpose";
    pub const CALL: &str = "tether.flex.call";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SetArgs {
    key: String,
    value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct PublishArgs {
    topic: String,
    payload: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CallArgs {
    api: String,
    args: Vec<u8>,
}

/// One invocation of an exposed API, sent over its bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ApiRequest {
    args: Vec<u8>,
}

/// [`FlexReply`] on the wire. An absent result travels as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexReplyWire {
    pub result: Vec<u8>,
    pub error: String,
}

impl From<FlexReply> for FlexReplyWire {
    fn from(reply: FlexReply) -> Self {
        Self {
            result: reply.result_bytes(),
            error: reply.error,
        }
    }
}

impl From<FlexReplyWire> for FlexReply {
    fn from(wire: FlexReplyWire) -> Self {
        let result = (!wire.result.is_empty() && wire.result != b"null").then_some(wire.result);
        Self {
            result,
            error: wire.error,
        }
    }
}

struct Exposure {
    cancel: CancelHandle,
    client: Arc<CallbackClient>,
}

/// Serves a local [`FlexModule`].
pub struct FlexServer {
    inner: Arc<dyn FlexModule>,
    broker: Broker,
    subscriptions: Subscriptions,
    exposed: Registry<Exposure>,
}

impl FlexServer {
    pub fn new(inner: Arc<dyn FlexModule>, broker: Broker) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broker,
            subscriptions: Subscriptions::new(),
            exposed: Registry::new("api"),
        })
    }

    async fn expose(&self, args: NamedCallback) -> Result<()> {
        let client = Arc::new(CallbackClient::dial(&self.broker, args.callback).await?);
        let remote = client.clone();
        let handler: FlexHandler = Arc::new(move |ctx: CallContext, args: Vec<u8>| {
            let remote = remote.clone();
            Box::pin(async move {
                let request = Timed::new(ctx.timeout_ms(), ApiRequest { args });
                match ctx.run(remote.call::<_, FlexReplyWire>(&request)).await {
                    Ok(wire) => FlexReply::from(wire),
                    Err(e) => FlexReply::err(e.to_string()),
                }
            }) as BoxFuture<'static, FlexReply>
        });

        let cancel = match self.inner.expose(&args.name, handler).await {
            Ok(cancel) => cancel,
            Err(e) => {
                client.close().await;
                return Err(e);
            }
        };
        if let Some(stale) = self.exposed.insert(args.name, Exposure { cancel, client }) {
            stale.cancel.cancel();
            stale.client.close().await;
        }
        Ok(())
    }

    async fn unexpose(&self, api: &str) -> bool {
        let Some(exposure) = self.exposed.remove(api) else {
            return false;
        };
        exposure.cancel.cancel();
        exposure.client.close().await;
        true
    }
}

#[async_trait]
impl Service for FlexServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::SET => {
                let args: SetArgs = decode(params)?;
                self.inner.set(&args.key, &args.value).await;
                encode(())
            }
            methods::GET => {
                let args: NameArgs = decode(params)?;
                encode(self.inner.get(&args.name).await)
            }
            methods::PUBLISH => {
                let args: PublishArgs = decode(params)?;
                self.inner.publish(&args.topic, args.payload).await;
                encode(())
            }
            methods::SUBSCRIBE => {
                let Timed { timeout_ms, args } = decode::<Timed<NamedCallback>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                reply(
                    self.subscriptions
                        .open(
                            &self.broker,
                            args.callback,
                            std::convert::identity,
                            ctx.run(self.inner.subscribe(&ctx, &args.name)),
                        )
                        .await,
                )
            }
            methods::UNSUBSCRIBE => {
                let args: IdArgs = decode(params)?;
                encode(self.subscriptions.cancel(&args.id).await)
            }
            methods::EXPOSE => {
                let args: NamedCallback = decode(params)?;
                reply(self.expose(args).await)
            }
            methods::UNEXPOSE => {
                let args: NameArgs = decode(params)?;
                encode(self.unexpose(&args.name).await)
            }
            methods::CALL => {
                let Timed { timeout_ms, args } = decode::<Timed<CallArgs>>(params)?;
                let ctx = CallContext::from_timeout_ms(timeout_ms);
                let outcome = ctx.run(self.inner.call(&ctx, &args.api, args.args)).await;
                reply(outcome.map(FlexReplyWire::from))
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn on_close(&self) {
        self.subscriptions.close_all().await;
        for (api, exposure) in self.exposed.drain() {
            debug!(api = %api, "withdrawing exposed api");
            exposure.cancel.cancel();
            exposure.client.close().await;
        }
    }
}

/// [`FlexModule`] proxy.
pub struct FlexClient {
    name: String,
    channel: Arc<RpcChannel>,
    broker: Broker,
}

impl FlexClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>, broker: Broker) -> Self {
        Self {
            name: name.into(),
            channel,
            broker,
        }
    }
}

#[async_trait]
impl FlexModule for FlexClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set(&self, key: &str, value: &str) {
        let args = SetArgs {
            key: key.to_string(),
            value: value.to_string(),
        };
        notify(&self.channel, methods::SET, &args).await
    }

    async fn get(&self, key: &str) -> Option<String> {
        fetch_or_default(&self.channel, methods::GET, &NameArgs::new(key)).await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) {
        let args = PublishArgs {
            topic: topic.to_string(),
            payload,
        };
        notify(&self.channel, methods::PUBLISH, &args).await
    }

    async fn subscribe(&self, ctx: &CallContext, topic: &str) -> Result<Subscription<Vec<u8>>> {
        let (sender, subscription) = Subscription::channel(TOPIC_BUFFER);
        let bridge = self
            .broker
            .offer(subscription_service(sender, std::convert::identity));
        let args = NamedCallback::new(topic, bridge.registration());
        let sub_id: String = call_timed(&self.channel, ctx, methods::SUBSCRIBE, args).await?;

        let channel = self.channel.clone();
        watch_cancel(
            &self.broker,
            subscription.cancel_handle(),
            bridge,
            move || async move {
                notify(&channel, methods::UNSUBSCRIBE, &IdArgs::new(sub_id)).await
            },
        );
        Ok(subscription)
    }

    async fn expose(&self, api_name: &str, handler: FlexHandler) -> Result<CancelHandle> {
        let service = FnService::<Timed<ApiRequest>, FlexReplyWire>::new(Arc::new(
            move |request: Timed<ApiRequest>| {
                let handler = handler.clone();
                Box::pin(async move {
                    let ctx = CallContext::from_timeout_ms(request.timeout_ms);
                    let reply = handler(ctx, request.args.args).await;
                    Ok(FlexReplyWire::from(reply))
                }) as BoxFuture<'static, Result<FlexReplyWire>>
            },
        ));
        let bridge = self.broker.offer(service);
        let args = NamedCallback::new(api_name, bridge.registration());
        self.channel.call::<_, ()>(methods::EXPOSE, &args).await?;

        let cancel = CancelHandle::new();
        let channel = self.channel.clone();
        let api = api_name.to_string();
        watch_cancel(&self.broker, cancel.clone(), bridge, move || async move {
            notify(&channel, methods::UNEXPOSE, &NameArgs::new(api)).await
        });
        Ok(cancel)
    }

    async fn call(&self, ctx: &CallContext, api_name: &str, args: Vec<u8>) -> Result<FlexReply> {
        let args = CallArgs {
            api: api_name.to_string(),
            args,
        };
        let wire: FlexReplyWire = call_timed(&self.channel, ctx, methods::CALL, args).await?;
        Ok(wire.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_api::names;
    use tether_broker::{BrokerConfig, Role};
    use tether_core::Error;

    /// A host flex that never answers.
    struct StalledFlex;

    #[async_trait]
    impl Service for StalledFlex {
        async fn handle(&self, _method: &str, _params: serde_json::Value) -> MethodResult {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_subscribe_gives_up_at_the_deadline() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (host, _) = Broker::new(a, Role::Host, BrokerConfig::default());
        let (ext, _) = Broker::new(b, Role::Extension, BrokerConfig::default());
        let handle = host.serve_object(names::FLEX, Arc::new(StalledFlex));
        let channel = ext.resolve(&handle).await.unwrap().unwrap();
        let flex = FlexClient::new(names::FLEX, Arc::new(channel), ext);

        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        let err = flex.subscribe(&ctx, "weather").await.err().unwrap();
        assert!(matches!(err, Error::DeadlineExceeded));
    }

    #[test]
    fn test_absent_result_round_trips_as_null() {
        let wire = FlexReplyWire::from(FlexReply::err("no such api"));
        assert_eq!(wire.result, b"null");
        let back = FlexReply::from(wire);
        assert_eq!(back.result, None);
        assert_eq!(back.error, "no such api");

        let ok = FlexReply::from(FlexReplyWire::from(FlexReply::ok(b"[1,2]".to_vec())));
        assert_eq!(ok.result.as_deref(), Some(&b"[1,2]"[..]));
    }
}
