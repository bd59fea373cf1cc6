//! Tether example
//!
//! [`HelloPlugin`] answers "hello" in chat and exposes a flex API.
//! [`DemoHost`] is a small in-memory host for driving it.

pub mod hello;
pub mod host;

pub use hello::{GREET_API, HelloPlugin};
pub use host::DemoHost;
