//! Database and key-value stubs
//!
//! `iterate` visits pairs through a bridge that answers each pair with a
//! continue flag. The caller's visitor runs on the caller's task while the
//! iterate call is still pending, so it may borrow local state.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tether_api::{DatabaseModule, DbType, KeyValueDb, names};
use tether_broker::{
    Broker, CallbackClient, FnService, MethodResult, RpcChannel, Service, decode, encode, reply,
};
use tether_core::{CallbackRegistration, Error, Handle, Result, RpcError};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::client::Empty;
use crate::wire::NameArgs;

pub mod methods {
    pub const KEY_VALUE_DB: &str = "tether.database.key_value_db";

    pub const GET: &str = "tether.key_value_db.get";
    pub const SET: &str = "tether.key_value_db.set";
    pub const DELETE: &str = "tether.key_value_db.delete";
    pub const ITERATE: &str = "tether.key_value_db.iterate";
    pub const CLOSE: &str = "tether.key_value_db.close";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct OpenArgs {
    name: String,
    /// Backend tag; empty selects the default.
    db_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct KeyValue {
    key: String,
    value: String,
}

/// Serves a local [`DatabaseModule`].
pub struct DatabaseServer {
    inner: Arc<dyn DatabaseModule>,
    broker: Broker,
}

impl DatabaseServer {
    pub fn new(inner: Arc<dyn DatabaseModule>, broker: Broker) -> Arc<Self> {
        Arc::new(Self { inner, broker })
    }
}

#[async_trait]
impl Service for DatabaseServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::KEY_VALUE_DB => {
                let args: OpenArgs = decode(params)?;
                let db_type = DbType::parse(&args.db_type).ok_or_else(|| {
                    RpcError::module_error(format!("unknown database type '{}'", args.db_type))
                })?;
                let db = self.inner.key_value_db(&args.name, db_type).await?;
                let server = KeyValueDbServer::new(db, self.broker.clone());
                encode(self.broker.serve_object(names::KEY_VALUE_DB, server))
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// [`DatabaseModule`] proxy.
pub struct DatabaseClient {
    name: String,
    channel: Arc<RpcChannel>,
    broker: Broker,
}

impl DatabaseClient {
    pub fn new(name: impl Into<String>, channel: Arc<RpcChannel>, broker: Broker) -> Self {
        Self {
            name: name.into(),
            channel,
            broker,
        }
    }
}

#[async_trait]
impl DatabaseModule for DatabaseClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn key_value_db(&self, name: &str, db_type: DbType) -> Result<Arc<dyn KeyValueDb>> {
        let args = OpenArgs {
            name: name.to_string(),
            db_type: db_type.as_str().to_string(),
        };
        let handle: Handle = self.channel.call(methods::KEY_VALUE_DB, &args).await?;
        match self.broker.resolve(&handle).await? {
            Some(channel) => Ok(Arc::new(KeyValueDbClient::new(
                self.broker.clone(),
                Arc::new(channel),
            ))),
            None => Err(Error::protocol(format!("database '{name}' came back without a handle"))),
        }
    }
}

/// Serves one [`KeyValueDb`].
pub struct KeyValueDbServer {
    inner: Arc<dyn KeyValueDb>,
    broker: Broker,
}

impl KeyValueDbServer {
    pub fn new(inner: Arc<dyn KeyValueDb>, broker: Broker) -> Arc<Self> {
        Arc::new(Self { inner, broker })
    }

    async fn iterate(&self, registration: CallbackRegistration) -> Result<()> {
        let visitor = CallbackClient::dial(&self.broker, registration).await?;

        let mut pairs = Vec::new();
        let collected = self
            .inner
            .iterate(&mut |key, value| {
                pairs.push(KeyValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
                true
            })
            .await;
        if let Err(e) = collected {
            visitor.close().await;
            return Err(e);
        }

        for pair in &pairs {
            match visitor.call::<_, bool>(pair).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    debug!(key = %pair.key, error = %e, "iteration stopped by visitor");
                    break;
                }
            }
        }
        visitor.close().await;
        Ok(())
    }
}

#[async_trait]
impl Service for KeyValueDbServer {
    async fn handle(&self, method: &str, params: serde_json::Value) -> MethodResult {
        match method {
            methods::GET => {
                let args: NameArgs = decode(params)?;
                reply(self.inner.get(&args.name).await)
            }
            methods::SET => {
                let args: KeyValue = decode(params)?;
                reply(self.inner.set(&args.key, &args.value).await)
            }
            methods::DELETE => {
                let args: NameArgs = decode(params)?;
                reply(self.inner.delete(&args.name).await)
            }
            methods::ITERATE => {
                let registration: CallbackRegistration = decode(params)?;
                reply(self.iterate(registration).await)
            }
            methods::CLOSE => reply(self.inner.close().await),
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

type Visit = (KeyValue, oneshot::Sender<bool>);

/// [`KeyValueDb`] proxy.
pub struct KeyValueDbClient {
    broker: Broker,
    channel: Arc<RpcChannel>,
}

impl KeyValueDbClient {
    pub fn new(broker: Broker, channel: Arc<RpcChannel>) -> Self {
        Self { broker, channel }
    }
}

#[async_trait]
impl KeyValueDb for KeyValueDbClient {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.channel.call(methods::GET, &NameArgs::new(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let args = KeyValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.channel.call(methods::SET, &args).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.channel.call(methods::DELETE, &NameArgs::new(key)).await
    }

    async fn iterate(&self, visitor: &mut (dyn for<'k, 'v> FnMut(&'k str, &'v str) -> bool + Send)) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Visit>();
        let service = FnService::<KeyValue, bool>::new(Arc::new(move |pair: KeyValue| {
            let tx = tx.clone();
            Box::pin(async move {
                let (answer, answered) = oneshot::channel();
                if tx.send((pair, answer)).is_err() {
                    return Ok(false);
                }
                Ok(answered.await.unwrap_or(false))
            }) as BoxFuture<'static, Result<bool>>
        }));
        let bridge = self.broker.offer(service);
        let registration = bridge.registration();

        let call = self.channel.call::<_, ()>(methods::ITERATE, &registration);
        tokio::pin!(call);
        let result = loop {
            let visit = tokio::select! {
                result = &mut call => break result,
                visit = rx.recv() => visit,
            };
            let Some((pair, answer)) = visit else {
                break call.as_mut().await;
            };
            let keep_going = visitor(pair.key.as_str(), pair.value.as_str());
            let _ = answer.send(keep_going);
        };
        bridge.close();
        result
    }

    async fn close(&self) -> Result<()> {
        self.channel.call(methods::CLOSE, &Empty {}).await
    }
}
