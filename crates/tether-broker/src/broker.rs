//! Connection multiplexer
//!
//! A [`Broker`] owns one transport byte stream and carves it into virtual
//! connections. Either side may allocate an id, announce it to the peer inside
//! a request payload, and then `accept` it while the peer `dial`s it.

use crate::config::{BrokerConfig, Role};
use crate::connection::Connection;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tether_core::frame::{self, Frame};
use tether_core::{ConnectionId, Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

/// Stream id of the bootstrap connection both sides own from the start.
pub const BOOTSTRAP_ID: ConnectionId = 0;

/// Handle to a multiplexed transport. Cheap to clone.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    role: Role,
    config: BrokerConfig,
    next_id: AtomicU32,
    outbound: mpsc::UnboundedSender<Frame>,
    state: Mutex<State>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

#[derive(Default)]
struct State {
    /// Inbound message queues of attached (or attaching) streams.
    streams: HashMap<ConnectionId, mpsc::UnboundedSender<Vec<u8>>>,
    /// Dials waiting for ack/reject.
    dialing: HashMap<ConnectionId, oneshot::Sender<bool>>,
    /// Accepts waiting for the peer's open.
    accepting: HashMap<ConnectionId, oneshot::Sender<()>>,
    /// Opens that arrived before the matching accept. Dropped when the dialer
    /// gives up or the offer is withdrawn.
    parked: HashSet<ConnectionId>,
    /// Ids whose accept gave up; a late open is rejected once, then forgotten.
    abandoned: HashSet<ConnectionId>,
    closed: bool,
}

impl Broker {
    /// Start multiplexing `io`. Returns the broker and the bootstrap connection.
    pub fn new<T>(io: T, role: Role, config: BrokerConfig) -> (Broker, Connection)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        let (outbound, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            role,
            config,
            next_id: AtomicU32::new(role.first_id()),
            outbound,
            state: Mutex::new(State::default()),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        let (tx, inbound) = mpsc::unbounded_channel();
        inner.state().streams.insert(BOOTSTRAP_ID, tx);
        let bootstrap = Connection::new(BOOTSTRAP_ID, inbound, inner.clone());

        inner.tasks.spawn(read_loop(inner.clone(), reader));
        inner.tasks.spawn(write_loop(inner.clone(), writer, rx));
        info!(?role, "broker started");

        (Broker { inner }, bootstrap)
    }

    /// Which side of the transport this broker is.
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Attach timeouts in effect.
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Next unused connection id for this side.
    pub fn allocate(&self) -> ConnectionId {
        self.inner.next_id.fetch_add(2, Ordering::Relaxed)
    }

    /// Attach to a connection the peer allocated and is accepting.
    pub async fn dial(&self, id: ConnectionId) -> Result<Connection> {
        if id == BOOTSTRAP_ID || self.inner.role.owns(id) {
            return Err(Error::protocol(format!(
                "cannot dial connection {id}: not allocated by the peer"
            )));
        }

        let (tx, rx) = oneshot::channel();
        let inbound = {
            let mut state = self.inner.state();
            if state.closed {
                return Err(Error::ConnectionClosed);
            }
            if state.streams.contains_key(&id) {
                return Err(Error::protocol(format!("connection {id} already attached")));
            }
            state.dialing.insert(id, tx);
            let (stream_tx, inbound) = mpsc::unbounded_channel();
            state.streams.insert(id, stream_tx);
            inbound
        };

        let mut pending = Pending::dial(&self.inner, id);
        self.inner.send(Frame::Open(id))?;
        match tokio::time::timeout(self.inner.config.dial_timeout(), rx).await {
            Ok(Ok(true)) => {
                pending.disarm();
                debug!(connection = id, "dialed");
                Ok(Connection::new(id, inbound, self.inner.clone()))
            }
            Ok(Ok(false)) => {
                pending.disarm();
                Err(Error::Rejected(id))
            }
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::AttachTimeout(id)),
        }
    }

    /// Wait for the peer to dial a connection this side allocated.
    pub async fn accept(&self, id: ConnectionId) -> Result<Connection> {
        if !self.inner.role.owns(id) {
            return Err(Error::protocol(format!(
                "cannot accept connection {id}: not allocated by this side"
            )));
        }

        let (tx, rx) = oneshot::channel();
        let inbound = {
            let mut state = self.inner.state();
            if state.closed {
                return Err(Error::ConnectionClosed);
            }
            if state.streams.contains_key(&id) {
                return Err(Error::protocol(format!("connection {id} already attached")));
            }
            let (stream_tx, inbound) = mpsc::unbounded_channel();
            state.streams.insert(id, stream_tx);
            if state.parked.remove(&id) {
                drop(state);
                self.inner.send(Frame::Ack(id))?;
                debug!(connection = id, "accepted parked open");
                return Ok(Connection::new(id, inbound, self.inner.clone()));
            }
            state.accepting.insert(id, tx);
            inbound
        };

        let mut pending = Pending::accept(&self.inner, id);
        match tokio::time::timeout(self.inner.config.accept_timeout(), rx).await {
            Ok(Ok(())) => {
                pending.disarm();
                debug!(connection = id, "accepted");
                Ok(Connection::new(id, inbound, self.inner.clone()))
            }
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // The open may have landed between the timer firing and now.
                let acked = {
                    let state = self.inner.state();
                    !state.closed
                        && !state.accepting.contains_key(&id)
                        && state.streams.contains_key(&id)
                };
                if acked {
                    pending.disarm();
                    return Ok(Connection::new(id, inbound, self.inner.clone()));
                }
                Err(Error::AttachTimeout(id))
            }
        }
    }

    /// Give up on an id this side allocated but will no longer accept. An open
    /// that already arrived is rejected now, a later one on arrival.
    pub fn withdraw(&self, id: ConnectionId) {
        let mut state = self.inner.state();
        if state.closed || state.streams.contains_key(&id) {
            return;
        }
        if state.parked.remove(&id) {
            debug!(connection = id, "rejecting parked open");
            let _ = self.inner.send(Frame::Reject(id));
        } else {
            state.abandoned.insert(id);
        }
    }

    /// Spawn a task owned by this broker.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.tasks.spawn(fut)
    }

    /// A token that fires when the broker shuts down.
    pub fn child_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    /// Tear down the transport and every virtual connection on it.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Whether the transport is gone.
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Resolves once the transport is gone.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await
    }

    /// Wait for every task spawned through this broker to finish.
    pub async fn wait(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, frame: Frame) -> Result<()> {
        self.outbound.send(frame).map_err(|_| Error::ConnectionClosed)
    }

    pub(crate) fn send_data(&self, id: ConnectionId, payload: Vec<u8>) -> Result<()> {
        let state = self.state();
        if state.closed || !state.streams.contains_key(&id) {
            return Err(Error::ConnectionClosed);
        }
        self.send(Frame::Data {
            stream: id,
            payload,
        })
    }

    /// Detach a stream, telling the peer if it was still attached.
    pub(crate) fn release(&self, id: ConnectionId) {
        let mut state = self.state();
        let was_open = state.streams.remove(&id).is_some();
        if was_open && !state.closed {
            let _ = self.send(Frame::Close(id));
            trace!(connection = id, "closed");
        }
    }

    fn dispatch(&self, frame: Frame) {
        let mut state = self.state();
        match frame {
            Frame::Open(id) => {
                let allocated = self.role.owns(id) && id < self.next_id.load(Ordering::Relaxed);
                if !allocated || state.abandoned.remove(&id) {
                    debug!(connection = id, "rejecting open");
                    let _ = self.send(Frame::Reject(id));
                } else if let Some(waiter) = state.accepting.remove(&id) {
                    let _ = waiter.send(());
                    let _ = self.send(Frame::Ack(id));
                } else {
                    state.parked.insert(id);
                }
            }
            Frame::Ack(id) => {
                if let Some(waiter) = state.dialing.remove(&id) {
                    let _ = waiter.send(true);
                }
            }
            Frame::Reject(id) => {
                state.streams.remove(&id);
                if let Some(waiter) = state.dialing.remove(&id) {
                    let _ = waiter.send(false);
                }
            }
            Frame::Data { stream, payload } => match state.streams.get(&stream) {
                Some(tx) => {
                    let _ = tx.send(payload);
                }
                None => trace!(connection = stream, "data for detached connection dropped"),
            },
            Frame::Close(id) => {
                state.streams.remove(&id);
                state.parked.remove(&id);
                state.abandoned.remove(&id);
            }
        }
    }

    fn close_all(&self) {
        let mut state = self.state();
        if !state.closed {
            info!(role = ?self.role, "broker closed");
        }
        state.closed = true;
        state.streams.clear();
        state.dialing.clear();
        state.accepting.clear();
        state.parked.clear();
        state.abandoned.clear();
        drop(state);
        self.shutdown.cancel();
    }
}

enum PendingKind {
    Dial,
    Accept,
}

/// Cleans up a dial or accept whose future was dropped or failed.
struct Pending<'a> {
    inner: &'a Inner,
    id: ConnectionId,
    kind: PendingKind,
    armed: bool,
}

impl<'a> Pending<'a> {
    fn dial(inner: &'a Inner, id: ConnectionId) -> Self {
        Self {
            inner,
            id,
            kind: PendingKind::Dial,
            armed: true,
        }
    }

    fn accept(inner: &'a Inner, id: ConnectionId) -> Self {
        Self {
            inner,
            id,
            kind: PendingKind::Accept,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.state();
        let attached = state.streams.remove(&self.id).is_some();
        let still_waiting = match self.kind {
            PendingKind::Dial => state.dialing.remove(&self.id).is_some(),
            PendingKind::Accept => {
                let waiting = state.accepting.remove(&self.id).is_some();
                if waiting {
                    state.abandoned.insert(self.id);
                }
                waiting
            }
        };
        // An acceptor may hold the stream attached or parked. A pending accept
        // never reached the peer.
        let tell_peer = match self.kind {
            PendingKind::Dial => attached,
            PendingKind::Accept => attached && !still_waiting,
        };
        if tell_peer && !state.closed {
            let _ = self.inner.send(Frame::Close(self.id));
        }
    }
}

async fn read_loop<R>(inner: Arc<Inner>, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let result = tokio::select! {
        _ = inner.shutdown.cancelled() => Ok(()),
        result = read_frames(&inner, &mut reader) => result,
    };
    match result {
        Ok(()) => debug!("transport reader finished"),
        Err(e) => warn!(error = %e, "transport reader failed"),
    }
    inner.close_all();
}

async fn read_frames<R>(inner: &Inner, reader: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut prefix = [0u8; 4];
        match reader.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let length = frame::check_length(u32::from_le_bytes(prefix))?;
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;
        inner.dispatch(Frame::decode(&body)?);
    }
}

async fn write_loop<W>(inner: Arc<Inner>, mut writer: W, mut rx: mpsc::UnboundedReceiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let bytes = frame.encode();
        let written = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            warn!(error = %e, "transport writer failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
    inner.close_all();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> ((Broker, Connection), (Broker, Connection)) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            Broker::new(a, Role::Host, BrokerConfig::default()),
            Broker::new(b, Role::Extension, BrokerConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_allocate_is_monotonic_and_partitioned() {
        let ((host, _), (ext, _)) = pair();
        let a = host.allocate();
        let b = host.allocate();
        assert!(b > a);
        assert_eq!(a % 2, 1);
        assert_eq!(ext.allocate() % 2, 0);
    }

    #[tokio::test]
    async fn test_dial_before_accept_is_parked() {
        let ((host, _), (ext, _)) = pair();
        let id = host.allocate();
        let dialer = tokio::spawn({
            let ext = ext.clone();
            async move { ext.dial(id).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let mut accepted = host.accept(id).await.unwrap();
        let dialed = dialer.await.unwrap().unwrap();

        dialed.send(b"ping".to_vec()).unwrap();
        assert_eq!(accepted.recv().await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_dial_of_unallocated_id_is_rejected() {
        let ((host, _), (ext, _)) = pair();
        let _ = host.allocate();
        let err = ext.dial(99).await.err().unwrap();
        assert!(matches!(err, Error::Rejected(99)));
    }

    #[tokio::test]
    async fn test_dial_own_id_is_protocol_error() {
        let ((host, _), _) = pair();
        let id = host.allocate();
        assert!(matches!(host.dial(id).await, Err(Error::Protocol(_))));
        assert!(matches!(host.dial(0).await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_withdraw_rejects_a_parked_open() {
        let ((host, _), (ext, _)) = pair();
        let id = host.allocate();
        let dialer = tokio::spawn({
            let ext = ext.clone();
            async move { ext.dial(id).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(host.inner.state().parked.contains(&id));

        host.withdraw(id);
        assert!(matches!(dialer.await.unwrap(), Err(Error::Rejected(_))));
        assert!(host.inner.state().parked.is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_rejects_a_later_open_once() {
        let ((host, _), (ext, _)) = pair();
        let id = host.allocate();
        host.withdraw(id);
        assert!(matches!(ext.dial(id).await, Err(Error::Rejected(_))));
        assert!(host.inner.state().abandoned.is_empty());
    }

    #[tokio::test]
    async fn test_closed_offer_rejects_its_dialer() {
        let ((host, _), (ext, _)) = pair();
        let ignore: crate::bridge::Handler<serde_json::Value> = Arc::new(|_| {});
        let bridge = host.offer(crate::bridge::HandlerService::new(ignore));
        bridge.close();
        assert!(matches!(ext.dial(bridge.id()).await, Err(Error::Rejected(_))));
        assert!(host.inner.state().parked.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_timeout_releases_the_parked_open() {
        let (a, b) = tokio::io::duplex(1024);
        let config = BrokerConfig {
            accept_timeout_ms: 50,
            dial_timeout_ms: 50,
        };
        let (host, _h) = Broker::new(a, Role::Host, config.clone());
        let (ext, _e) = Broker::new(b, Role::Extension, config);
        let id = host.allocate();
        assert!(matches!(ext.dial(id).await, Err(Error::AttachTimeout(_))));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(host.inner.state().parked.is_empty());
        assert!(matches!(host.accept(id).await, Err(Error::AttachTimeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_times_out_and_late_dial_is_rejected() {
        let (a, b) = tokio::io::duplex(1024);
        let config = BrokerConfig {
            accept_timeout_ms: 50,
            dial_timeout_ms: 50,
        };
        let (host, _h) = Broker::new(a, Role::Host, config.clone());
        let (ext, _e) = Broker::new(b, Role::Extension, config);
        let id = host.allocate();
        assert!(matches!(host.accept(id).await, Err(Error::AttachTimeout(_))));
        assert!(ext.dial(id).await.is_err());
    }
}
