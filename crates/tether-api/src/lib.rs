//! Tether API
//!
//! The interfaces a host offers and an extension consumes. Nothing here knows
//! about the wire: `tether-protocol` proxies these traits across processes, and
//! in-process code can implement and call them directly.

pub mod config;
pub mod frame;
pub mod modules;
pub mod subscription;
pub mod tool;
pub mod types;

pub use config::PluginConfig;
pub use frame::{BasicPlugin, Frame, Plugin};
pub use modules::*;
pub use subscription::{CancelHandle, Subscription, SubscriptionSender};
pub use tool::PluginTool;
pub use types::*;

pub use tether_core::{CallContext, Error, ListenerId, Result};
