//! Listener implementation for daemon transport sockets.

use std::io;
use std::net::{TcpListener, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use kiln_config::SocketEndpoint;

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Bound daemon socket, not yet accepting.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    kind: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl ListenerKind {
    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            Self::Unix(listener) => listener.set_nonblocking(true),
        }
    }

    /// Next pending connection, switched back to blocking mode. `None` when
    /// nobody is waiting.
    fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            #[cfg(unix)]
            Self::Unix(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl SocketListener {
    /// Binds `endpoint`, reclaiming a stale Unix socket left by an earlier
    /// daemon.
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let kind = match endpoint {
            SocketEndpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => ListenerKind::Unix(bind_unix(path.as_std_path())?),
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => {
                return Err(ListenerError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                });
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            kind,
        })
    }

    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    #[cfg(test)]
    pub(crate) fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match &self.kind {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Starts the accept loop, handing each connection to `handler` on its
    /// own thread.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(source) = self.kind.set_nonblocking() {
            self.release();
            return Err(ListenerError::Start { source });
        }
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);
        let accept_thread = thread::Builder::new()
            .name("kilnd-accept".to_owned())
            .spawn(move || self.accept_until(&loop_stop, &handler))
            .map_err(|source| ListenerError::Start { source })?;
        Ok(ListenerHandle {
            stop,
            accept_thread: Some(accept_thread),
        })
    }

    fn accept_until(self, stop: &AtomicBool, handler: &Arc<dyn ConnectionHandler>) {
        info!(
            target: LISTENER_TARGET,
            endpoint = %self.endpoint,
            "socket listener active"
        );
        let mut connections: u64 = 0;
        let mut repeated = None::<io::ErrorKind>;
        while !stop.load(Ordering::SeqCst) {
            match self.kind.accept() {
                Ok(Some(stream)) => {
                    repeated = None;
                    connections += 1;
                    spawn_connection(connections, stream, handler);
                }
                Ok(None) => thread::sleep(ACCEPT_BACKOFF),
                Err(error) => {
                    // Only the first of a run of identical failures is logged.
                    if repeated.replace(error.kind()) != Some(error.kind()) {
                        warn!(target: LISTENER_TARGET, %error, "socket accept error");
                    }
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        info!(
            target: LISTENER_TARGET,
            endpoint = %self.endpoint,
            connections,
            "socket listener stopped"
        );
        self.release();
    }

    /// Removes the socket file of a Unix endpoint.
    fn release(&self) {
        #[cfg(unix)]
        cleanup_unix_socket(&self.endpoint);
    }
}

/// Running accept loop.
pub(crate) struct ListenerHandle {
    stop: Arc<AtomicBool>,
    accept_thread: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stops accepting connections. Calls already running finish on their
    /// own threads.
    pub(crate) fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit and release the socket.
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.accept_thread.take().map(thread::JoinHandle::join) {
            Some(Err(_)) => Err(ListenerError::AcceptLoopPanicked),
            Some(Ok(())) | None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_connection(connection: u64, stream: ConnectionStream, handler: &Arc<dyn ConnectionHandler>) {
    let handler = Arc::clone(handler);
    let spawned = thread::Builder::new()
        .name(format!("kilnd-conn-{connection}"))
        .spawn(move || handler.handle(stream));
    match spawned {
        Ok(_) => debug!(target: LISTENER_TARGET, connection, "connection accepted"),
        Err(error) => warn!(
            target: LISTENER_TARGET,
            connection,
            error = %error,
            "failed to spawn connection thread"
        ),
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let unresolved = |source| ListenerError::Resolve {
        host: host.to_owned(),
        port,
        source,
    };
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|error| unresolved(Some(error)))?
        .next()
        .ok_or_else(|| unresolved(None))?;
    TcpListener::bind(addr).map_err(|source| ListenerError::Bind {
        endpoint: addr.to_string(),
        source,
    })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        reclaim_stale_socket(path)?;
    }
    UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        endpoint: path.display().to_string(),
        source,
    })
}

/// Removes the socket file of a daemon that is no longer running. Refuses
/// when the path is not a socket or a daemon still answers on it.
#[cfg(unix)]
fn reclaim_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let display = || path.display().to_string();
    let reclaim = |source| ListenerError::Reclaim {
        path: display(),
        source,
    };
    let metadata = fs::symlink_metadata(path).map_err(reclaim)?;
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::NotASocket { path: display() });
    }
    match UnixStream::connect(path) {
        Ok(_live) => Err(ListenerError::SocketInUse { path: display() }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            fs::remove_file(path).map_err(reclaim)
        }
        Err(error) => Err(reclaim(error)),
    }
}

#[cfg(unix)]
fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let SocketEndpoint::Unix { path } = endpoint else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}
