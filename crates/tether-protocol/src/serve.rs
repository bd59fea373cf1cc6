//! Serve and connect entry points
//!
//! The extension calls [`serve`] with its plugin and a [`ServeConfig`]. The
//! host attaches with [`connect_io`] or [`connect_tcp`] and drives the plugin
//! through [`HostSession::plugin`]. With an in-process config both ends live
//! in one runtime ([`connect_in_process`]).

use std::sync::Arc;

use tether_api::Plugin;
use tether_broker::{Broker, BrokerConfig, RpcChannel, Role, serve_connection};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ServeConfig, Transport};
use crate::error::{ServeError, ServeResult};
use crate::handshake::{self, HandshakeLine};
use crate::plugin::{PluginClient, PluginServer};

/// Buffer of the in-memory pipe between an in-process host and plugin.
const IN_PROCESS_BUFFER: usize = 64 * 1024;

/// Refuse to start unless a host launched this process or the config keeps
/// both ends in-process.
pub fn check_launch(config: &ServeConfig, cookie: Option<&str>) -> ServeResult<()> {
    if config.is_in_process() {
        return Ok(());
    }
    handshake::check_cookie(cookie)
}

/// Serve `plugin` over the transport `config` selects, until the host goes
/// away.
pub async fn serve(plugin: Arc<dyn Plugin>, config: ServeConfig) -> ServeResult<()> {
    check_launch(&config, handshake::cookie_from_env().as_deref())?;
    match &config.transport {
        Transport::Stdio => {
            let io = tokio::io::join(tokio::io::stdin(), tokio::io::stdout());
            serve_io(plugin, io, config.broker).await
        }
        Transport::Tcp { addr } => {
            let listener = TcpListener::bind(addr.as_str()).await?;
            let line = HandshakeLine::new(listener.local_addr()?);
            let mut stdout = tokio::io::stdout();
            stdout.write_all(format!("{line}\n").as_bytes()).await?;
            stdout.flush().await?;

            let (stream, peer) = listener.accept().await?;
            info!(%peer, "host connected");
            stream.set_nodelay(true)?;
            serve_io(plugin, stream, config.broker).await
        }
        Transport::InProcess => Err(ServeError::UnsupportedTransport(
            "in-process plugins are attached with connect_in_process",
        )),
    }
}

/// Serve `plugin` on the bootstrap connection of `io`.
pub async fn serve_io<T>(plugin: Arc<dyn Plugin>, io: T, config: BrokerConfig) -> ServeResult<()>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (broker, bootstrap) = Broker::new(io, Role::Extension, config);
    let service = PluginServer::new(plugin, broker.clone());
    serve_connection(bootstrap, service, broker.child_token()).await;
    info!("host disconnected");
    broker.shutdown();
    broker.wait().await;
    Ok(())
}

/// Host side of one plugin connection.
pub struct HostSession {
    broker: Broker,
    plugin: Arc<PluginClient>,
    local: Option<JoinHandle<ServeResult<()>>>,
}

impl HostSession {
    /// The plugin's root object.
    pub fn plugin(&self) -> Arc<PluginClient> {
        self.plugin.clone()
    }

    /// Broker of the plugin's transport.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Withdraw everything offered to the plugin and drop the transport.
    pub async fn shutdown(mut self) {
        self.plugin.close().await;
        self.broker.shutdown();
        self.broker.wait().await;
        if let Some(local) = self.local.take() {
            match local.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "in-process plugin failed"),
                Err(e) => warn!(error = %e, "in-process plugin panicked"),
            }
        }
    }
}

/// Attach to a plugin served on the other end of `io`.
pub fn connect_io<T>(io: T, config: BrokerConfig) -> HostSession
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (broker, bootstrap) = Broker::new(io, Role::Host, config);
    let plugin = Arc::new(PluginClient::new(
        Arc::new(RpcChannel::new(bootstrap)),
        broker.clone(),
    ));
    HostSession {
        broker,
        plugin,
        local: None,
    }
}

/// Attach to a plugin that announced `line` on its stdout.
pub async fn connect_tcp(line: &str, config: BrokerConfig) -> ServeResult<HostSession> {
    let handshake: HandshakeLine = line.parse()?;
    let stream = TcpStream::connect(handshake.addr).await?;
    stream.set_nodelay(true)?;
    info!(addr = %handshake.addr, "connected to plugin");
    Ok(connect_io(stream, config))
}

/// Run `plugin` in this process and attach to it.
pub fn connect_in_process(plugin: Arc<dyn Plugin>, config: ServeConfig) -> ServeResult<HostSession> {
    if !config.is_in_process() {
        return Err(ServeError::UnsupportedTransport(config.transport.name()));
    }
    let (host_io, plugin_io) = tokio::io::duplex(IN_PROCESS_BUFFER);
    let local = tokio::spawn(serve_io(plugin, plugin_io, config.broker.clone()));
    let mut session = connect_io(host_io, config.broker);
    session.local = Some(local);
    Ok(session)
}
