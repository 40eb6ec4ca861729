//! Failures of the daemon socket.

use std::io;

use thiserror::Error;

/// Errors raised while claiming the daemon socket or running its accept loop.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The TCP host did not resolve to any address.
    #[error("cannot resolve daemon address {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: Option<io::Error>,
    },
    /// The endpoint could not be bound.
    #[error("cannot bind daemon socket {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// Preparing the bound socket or the accept thread failed.
    #[error("cannot start accepting on the daemon socket: {source}")]
    Start {
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix { endpoint: String },
    /// A live daemon still answers on the socket path.
    #[cfg(unix)]
    #[error("daemon socket {path} is served by a running daemon")]
    SocketInUse { path: String },
    /// Something other than a socket sits at the socket path.
    #[cfg(unix)]
    #[error("daemon socket path {path} is not a socket")]
    NotASocket { path: String },
    /// A stale socket left by an earlier daemon could not be inspected or
    /// removed.
    #[cfg(unix)]
    #[error("cannot reclaim stale daemon socket {path}: {source}")]
    Reclaim {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("accept loop panicked")]
    AcceptLoopPanicked,
}
