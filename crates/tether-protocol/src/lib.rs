//! Tether protocol
//!
//! Proxies the `tether-api` traits across a brokered connection:
//!
//! - [`stubs`]: one server and one client stub per capability module
//! - [`kinds`]: the closed table from module kind to client stub
//! - [`frame`] / [`plugin`]: the root objects (`Init`, `Load`, `Unload`)
//! - [`serve`] / [`connect_io`] / [`connect_in_process`]: entry points
//!
//! Extension side:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_api::BasicPlugin;
//! use tether_protocol::{ServeConfig, serve};
//!
//! # async fn run() -> Result<(), tether_protocol::ServeError> {
//! serve(Arc::new(BasicPlugin::new()), ServeConfig::default()).await
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod forward;
pub mod frame;
pub mod handshake;
pub mod kinds;
pub mod plugin;
pub mod relay;
pub mod serve;
pub mod stubs;
pub mod wire;

pub use config::{ServeConfig, Transport};
pub use error::{ServeError, ServeResult};
pub use frame::{FrameClient, FrameServer};
pub use kinds::{resolve_module, serve_module};
pub use plugin::{PluginClient, PluginServer};
pub use serve::{
    HostSession, check_launch, connect_in_process, connect_io, connect_tcp, serve, serve_io,
};
