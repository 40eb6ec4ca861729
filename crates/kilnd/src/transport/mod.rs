//! Socket listener for daemon transport endpoints.
//!
//! The transport module binds to the configured socket endpoint and accepts
//! connections in a background thread, handing each one to a
//! [`ConnectionHandler`] on its own thread.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod listener_tests;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream};
#[cfg(test)]
pub(crate) use self::listener::ListenerHandle;
pub(crate) use self::listener::SocketListener;
#[cfg(test)]
pub(crate) use self::test_utils::RequestLineRecorder;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
