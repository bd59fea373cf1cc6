//! Implementation side of callback bridges
//!
//! A local implementation raises events through plain `Fn(T)` handlers. The
//! server stub hands it a handler that pushes into an [`EventRelay`], which
//! forwards events over the dialed bridge one at a time and in order.
//! [`Listeners`] and [`Intercepts`] keep the relays reachable by id so that
//! unregistering mechanically stops delivery.

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::Serialize;
use tether_api::{CancelHandle, EventHandler};
use tether_broker::{Broker, CallbackClient, Registry};
use tether_core::{CallbackRegistration, ListenerId, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Ordered, best-effort delivery of events over one bridge.
pub struct EventRelay<W> {
    tx: Mutex<Option<mpsc::UnboundedSender<W>>>,
    stop: CancellationToken,
    done: CancellationToken,
}

impl<W> EventRelay<W>
where
    W: Serialize + Send + Sync + 'static,
{
    /// Dial the bridge announced in `registration` and start forwarding.
    pub async fn dial(broker: &Broker, registration: CallbackRegistration) -> Result<Arc<Self>> {
        let client = CallbackClient::dial(broker, registration).await?;
        let (tx, mut rx) = mpsc::unbounded_channel::<W>();
        let stop = broker.child_token();
        let done = CancellationToken::new();

        let task_stop = stop.clone();
        let guard = done.clone().drop_guard();
        broker.spawn(async move {
            let _guard = guard;
            loop {
                let event = tokio::select! {
                    biased;
                    _ = task_stop.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                if !client.invoke(&event).await {
                    break;
                }
            }
            client.close().await;
            debug!(connection = client.id(), "relay closed");
        });

        Ok(Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            stop,
            done,
        }))
    }

    /// Queue an event. Dropped silently once the relay is finishing.
    pub fn push(&self, event: W) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx.as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl<W> EventRelay<W> {
    /// Deliver what is queued, then close the bridge.
    pub fn finish(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Stop now. Returns once no delivery is in flight.
    pub async fn close(&self) {
        self.finish();
        self.stop.cancel();
        self.done.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }
}

/// Long-lived listeners, keyed by the id the implementation minted.
pub struct Listeners<W> {
    relays: Registry<Arc<EventRelay<W>>>,
}

impl<W> Default for Listeners<W> {
    fn default() -> Self {
        Self {
            relays: Registry::new("listener"),
        }
    }
}

impl<W> Listeners<W>
where
    W: Serialize + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Dial the bridge, then let `start` register a handler feeding it.
    ///
    /// If `start` fails the bridge is closed and nothing stays registered.
    pub async fn register<T, F, Fut>(
        &self,
        broker: &Broker,
        registration: CallbackRegistration,
        convert: fn(T) -> W,
        start: F,
    ) -> Result<ListenerId>
    where
        T: 'static,
        F: FnOnce(EventHandler<T>) -> Fut,
        Fut: Future<Output = Result<ListenerId>>,
    {
        let relay = EventRelay::dial(broker, registration).await?;
        let feed = relay.clone();
        let handler: EventHandler<T> = Arc::new(move |event| feed.push(convert(event)));
        match start(handler).await {
            Ok(listener_id) => {
                if let Some(stale) = self.relays.insert(listener_id.clone(), relay) {
                    stale.close().await;
                }
                Ok(listener_id)
            }
            Err(e) => {
                relay.close().await;
                Err(e)
            }
        }
    }

    /// Run the implementation's `stop`, then close the bridge. No event
    /// reaches the peer once this returns.
    pub async fn unregister<Fut>(&self, listener_id: &str, stop: Fut) -> bool
    where
        Fut: Future<Output = bool>,
    {
        let ok = stop.await;
        if let Some(relay) = self.relays.remove(listener_id) {
            relay.close().await;
        }
        ok
    }

    /// Unregister everything, e.g. when the stub's own connection is gone.
    pub async fn close_all<F, Fut>(&self, mut stop: F)
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = bool>,
    {
        for (listener_id, relay) in self.relays.drain() {
            stop(listener_id).await;
            relay.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}

struct Intercept<W> {
    relay: Arc<EventRelay<W>>,
    cancel: OnceLock<CancelHandle>,
}

/// One-shot handlers. The first event is delivered, then the bridge closes.
pub struct Intercepts<W> {
    entries: Arc<Registry<Arc<Intercept<W>>>>,
}

impl<W> Default for Intercepts<W> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Registry::new("intercept")),
        }
    }
}

impl<W> Intercepts<W>
where
    W: Serialize + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Dial the bridge and let `start` install a one-shot handler feeding it.
    /// Returns the `intercept:N` id used to cancel it.
    pub async fn open<T, F, Fut>(
        &self,
        broker: &Broker,
        registration: CallbackRegistration,
        convert: fn(T) -> W,
        start: F,
    ) -> Result<String>
    where
        T: 'static,
        F: FnOnce(EventHandler<T>) -> Fut,
        Fut: Future<Output = Result<CancelHandle>>,
    {
        let relay = EventRelay::dial(broker, registration).await?;
        let intercept_id = self.entries.mint();
        let entry = Arc::new(Intercept {
            relay: relay.clone(),
            cancel: OnceLock::new(),
        });
        self.entries.insert(intercept_id.clone(), entry.clone());

        let entries = self.entries.clone();
        let fired = intercept_id.clone();
        let handler: EventHandler<T> = Arc::new(move |event| {
            if entries.remove(&fired).is_some() {
                relay.push(convert(event));
                relay.finish();
            }
        });

        match start(handler).await {
            Ok(cancel) => {
                let _ = entry.cancel.set(cancel);
                Ok(intercept_id)
            }
            Err(e) => {
                self.entries.remove(&intercept_id);
                entry.relay.close().await;
                Err(e)
            }
        }
    }
}

impl<W> Intercepts<W> {
    /// Cancel a pending intercept. `false` if it already fired or never existed.
    pub async fn cancel(&self, intercept_id: &str) -> bool {
        let Some(entry) = self.entries.remove(intercept_id) else {
            return false;
        };
        if let Some(cancel) = entry.cancel.get() {
            cancel.cancel();
        }
        entry.relay.close().await;
        true
    }

    pub async fn close_all(&self) {
        for (_, entry) in self.entries.drain() {
            if let Some(cancel) = entry.cancel.get() {
                cancel.cancel();
            }
            entry.relay.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
