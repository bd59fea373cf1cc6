//! Tether core
//!
//! Wire vocabulary shared by both sides of a tether connection: the
//! multiplexer frame codec, the JSON-RPC envelopes carried inside data frames,
//! object handles, callback registrations, and call-context deadline
//! translation.

pub mod deadline;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod handle;

pub use deadline::CallContext;
pub use envelope::{Request, Response, RpcError};
pub use error::{Error, Result};
pub use frame::Frame;
pub use handle::{CallbackRegistration, ConnectionId, Handle, ListenerId};
