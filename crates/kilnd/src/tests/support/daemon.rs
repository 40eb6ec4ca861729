//! A dispatch handler listening on loopback TCP, and a scripted caller.
//!
//! [`Session`] plays the client side of one connection: it writes the
//! request and answers cache queries from in-memory [`CallerCache`]s until
//! the daemon sends a terminal frame.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use kiln_config::SocketEndpoint;
use kiln_protocol::framing::{self, FrameReader};
use kiln_protocol::{CacheOutcome, CacheQuery, ClientMessage, Request, ServerMessage};

use crate::dispatch::{CompileService, DispatchConnectionHandler, DispatchSettings};
use crate::frontend::{CompilerFrontend, SourceCheckFrontend};
use crate::process::ShutdownCause;
use crate::transport::{ListenerHandle, SocketListener};

use super::reporter::RecordingHealthReporter;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Caller-side state of one module's cache handle.
#[derive(Debug, Clone, Default)]
pub struct CallerCache {
    pub obsolete: BTreeSet<String>,
    pub data: BTreeMap<String, Vec<u8>>,
    pub queries: usize,
    pub closes: usize,
}

impl CallerCache {
    /// Cache holding `data` for each listed unit.
    pub fn with_units<'u>(units: impl IntoIterator<Item = &'u str>) -> Self {
        Self {
            data: units
                .into_iter()
                .map(|unit| (unit.to_owned(), format!("compiled {unit}").into_bytes()))
                .collect(),
            ..Self::default()
        }
    }

    fn answer(&mut self, query: &CacheQuery) -> CacheOutcome {
        self.queries += 1;
        match query {
            CacheQuery::ObsoletePackageParts => CacheOutcome::Names {
                names: self.obsolete.clone(),
            },
            CacheQuery::PackageData { fq_name } => match self.data.get(fq_name) {
                Some(data) => CacheOutcome::Data { data: data.clone() },
                None => CacheOutcome::Error {
                    message: format!("no package data for {fq_name}"),
                },
            },
        }
    }
}

/// Daemon dispatch stack bound to an ephemeral loopback port.
pub struct DaemonHarness {
    pub reporter: Arc<RecordingHealthReporter>,
    address: SocketAddr,
    listener: Option<ListenerHandle>,
    shutdowns: Receiver<ShutdownCause>,
}

impl DaemonHarness {
    /// Starts the stack with the reference front-end.
    pub fn start() -> Self {
        Self::start_with(Arc::new(SourceCheckFrontend::new()))
    }

    /// Starts the stack around `frontend`.
    pub fn start_with(frontend: Arc<dyn CompilerFrontend>) -> Self {
        let reporter = Arc::new(RecordingHealthReporter::default());
        let (notifier, shutdowns) = mpsc::channel();
        let service = Arc::new(
            CompileService::new(frontend, reporter.clone()).with_shutdown_notifier(notifier),
        );
        let settings = DispatchSettings {
            cache_query_timeout: Duration::from_secs(2),
            sink_write_timeout: Duration::from_secs(2),
            sink_capacity: 4,
            max_request_bytes: 64 * 1024,
        };
        let handler = Arc::new(DispatchConnectionHandler::new(service, settings));
        let listener =
            SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind listener");
        let address = listener.local_addr().expect("tcp listener address");
        let handle = listener.start(handler).expect("start listener");
        Self {
            reporter,
            address,
            listener: Some(handle),
            shutdowns,
        }
    }

    /// Opens a new connection to the daemon.
    pub fn connect(&self) -> Session {
        let stream = TcpStream::connect(self.address).expect("connect to daemon");
        stream
            .set_read_timeout(Some(CLIENT_TIMEOUT))
            .expect("set read timeout");
        let reader = FrameReader::new(stream.try_clone().expect("clone stream"), 64 * 1024);
        Session {
            stream,
            reader,
            transcript: Vec::new(),
        }
    }

    /// Shutdown cause forwarded by the service, if one arrives soon.
    pub fn shutdown_notification(&self) -> Option<ShutdownCause> {
        self.shutdowns.recv_timeout(Duration::from_secs(1)).ok()
    }
}

impl Drop for DaemonHarness {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.shutdown();
            let _ = handle.join();
        }
    }
}

/// Client end of one connection.
pub struct Session {
    stream: TcpStream,
    reader: FrameReader<TcpStream>,
    transcript: Vec<ServerMessage>,
}

impl Session {
    /// Writes the request line.
    pub fn send(&mut self, request: &Request) {
        framing::write_message(&mut self.stream, request).expect("write request");
    }

    /// Writes `line` verbatim followed by a newline.
    pub fn send_raw(&mut self, line: &str) {
        self.stream
            .write_all(format!("{line}\n").as_bytes())
            .expect("write raw request");
    }

    /// Reads frames until the first cache query or the end of the call.
    pub fn next_query(&mut self) -> Option<ServerMessage> {
        while let Some(message) = self.read() {
            let query = matches!(message, ServerMessage::CacheQuery { .. });
            self.transcript.push(message.clone());
            if query {
                return Some(message);
            }
            if message.is_terminal() {
                return None;
            }
        }
        None
    }

    /// Serves cache queries from `caches` until the call ends.
    pub fn serve(mut self, caches: &mut BTreeMap<String, CallerCache>) -> Vec<ServerMessage> {
        while let Some(message) = self.read() {
            self.transcript.push(message.clone());
            match message {
                ServerMessage::CacheQuery { id, module, query } => {
                    let outcome = match caches.get_mut(&module) {
                        Some(cache) => cache.answer(&query),
                        None => CacheOutcome::Error {
                            message: format!("no cache for module {module}"),
                        },
                    };
                    framing::write_message(
                        &mut self.stream,
                        &ClientMessage::CacheReply { id, outcome },
                    )
                    .expect("write cache reply");
                }
                ServerMessage::CacheClose { module } => {
                    if let Some(cache) = caches.get_mut(&module) {
                        cache.closes += 1;
                    }
                }
                terminal if terminal.is_terminal() => break,
                _ => {}
            }
        }
        self.transcript
    }

    /// Closes both directions of the connection without answering.
    pub fn hang_up(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn read(&mut self) -> Option<ServerMessage> {
        self.reader.read_message().expect("read server frame")
    }
}

