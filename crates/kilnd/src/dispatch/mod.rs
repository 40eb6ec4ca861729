//! Request dispatch for compilation calls.
//!
//! A connection carries one [`Request`](kiln_protocol::Request). The
//! [`DispatchConnectionHandler`] decodes it, builds the per-call output sink
//! and, for incremental calls, the cache registry bridged back to the caller,
//! then hands the call to the [`CompileService`].

mod errors;
mod handler;
mod service;
#[cfg(test)]
mod service_tests;
mod session;
mod sink;

pub use errors::DispatchError;
pub use handler::{DispatchConnectionHandler, DispatchSettings};
pub use service::{CallOutcome, CompileMode, CompileService};
pub use session::CallState;
pub use sink::{DiagnosticSink, OutputSink, SinkError};

/// Tracing target for dispatch events.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
