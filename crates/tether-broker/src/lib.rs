//! Tether broker
//!
//! Runtime pieces of the brokered RPC protocol:
//!
//! - [`Broker`]: multiplexes virtual connections over one transport
//! - [`RpcChannel`]: serialized request/response client on one connection
//! - [`Service`] / [`serve_connection`]: the server loop stubs plug into
//! - [`Broker::offer`] / [`CallbackClient`]: callback bridges
//! - [`Broker::serve_object`] / [`Broker::resolve`]: object handles
//! - [`Registry`]: id-minting registries for listeners and subscriptions

pub mod bridge;
pub mod broker;
pub mod channel;
pub mod config;
pub mod connection;
pub mod handle;
pub mod registry;
pub mod server;

pub use bridge::{BridgeHandle, CallbackClient, FnService, HandlerService, INVOKE};
pub use broker::{BOOTSTRAP_ID, Broker};
pub use channel::RpcChannel;
pub use config::{BrokerConfig, Role};
pub use connection::Connection;
pub use registry::Registry;
pub use server::{MethodResult, Service, decode, encode, reply, serve_connection};
