//! Subscription forwarding
//!
//! The implementation side pairs a [`Subscription`] with a dialed bridge and
//! runs one forwarding task per subscription. The task ends when the stream
//! ends, when the subscription is cancelled, when the bridge breaks or when
//! the broker shuts down; it always closes the bridge on the way out.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tether_api::{CancelHandle, Subscription};
use tether_broker::{Broker, CallbackClient, Registry};
use tether_core::{CallbackRegistration, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Forward `subscription` through `client` until one side goes away.
///
/// `done` fires once the bridge is closed, before `on_exit` runs.
pub fn spawn_forwarder<T, W, F>(
    broker: &Broker,
    mut subscription: Subscription<T>,
    client: CallbackClient,
    convert: fn(T) -> W,
    done: CancellationToken,
    on_exit: F,
) where
    T: Send + 'static,
    W: Serialize + Send + Sync + 'static,
    F: FnOnce() + Send + 'static,
{
    let shutdown = broker.child_token();
    broker.spawn(async move {
        loop {
            let item = tokio::select! {
                _ = shutdown.cancelled() => break,
                item = subscription.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };
            if !client.invoke(&convert(item)).await {
                break;
            }
        }
        subscription.cancel();
        client.close().await;
        debug!(connection = client.id(), "subscription forwarder stopped");
        done.cancel();
        on_exit();
    });
}

struct Forwarding {
    cancel: CancelHandle,
    done: CancellationToken,
}

/// Active subscriptions served by one stub, keyed `sub:N`.
pub struct Subscriptions {
    entries: Arc<Registry<Arc<Forwarding>>>,
}

impl Default for Subscriptions {
    fn default() -> Self {
        Self {
            entries: Arc::new(Registry::new("sub")),
        }
    }
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dial the bridge, obtain the subscription from `start`, and forward it.
    pub async fn open<T, W, Fut>(
        &self,
        broker: &Broker,
        registration: CallbackRegistration,
        convert: fn(T) -> W,
        start: Fut,
    ) -> Result<String>
    where
        T: Send + 'static,
        W: Serialize + Send + Sync + 'static,
        Fut: Future<Output = Result<Subscription<T>>>,
    {
        let client = CallbackClient::dial(broker, registration).await?;
        let subscription = match start.await {
            Ok(subscription) => subscription,
            Err(e) => {
                client.close().await;
                return Err(e);
            }
        };

        let sub_id = self.entries.mint();
        let forwarding = Arc::new(Forwarding {
            cancel: subscription.cancel_handle(),
            done: CancellationToken::new(),
        });
        self.entries.insert(sub_id.clone(), forwarding.clone());

        let entries = self.entries.clone();
        let exiting = sub_id.clone();
        spawn_forwarder(
            broker,
            subscription,
            client,
            convert,
            forwarding.done.clone(),
            move || {
                entries.remove(&exiting);
            },
        );
        Ok(sub_id)
    }

    /// Cancel a subscription and wait for its forwarder. Idempotent.
    pub async fn cancel(&self, sub_id: &str) -> bool {
        let Some(forwarding) = self.entries.remove(sub_id) else {
            return false;
        };
        forwarding.cancel.cancel();
        forwarding.done.cancelled().await;
        true
    }

    pub async fn close_all(&self) {
        for (_, forwarding) in self.entries.drain() {
            forwarding.cancel.cancel();
            forwarding.done.cancelled().await;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
