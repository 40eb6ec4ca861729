//! Connection handler that dispatches compilation requests.
//!
//! Each connection is handled synchronously on its own thread: the handler
//! reads one request line, runs the call and ends the connection with an
//! exit or abort frame. Incremental calls keep reading from the connection
//! for cache replies while the call runs.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use kiln_config::Config;
use kiln_protocol::framing::{self, FrameReader};
use kiln_protocol::{ExitStatus, OutputFormat, Request, ServerMessage};

use super::errors::DispatchError;
use super::service::{CallOutcome, CompileService, report_internal};
use super::sink::{DiagnosticSink, OutputSink};
use super::DISPATCH_TARGET;
use crate::cache::{CacheBridge, remote_registry};
use crate::transport::{ConnectionHandler, ConnectionStream};

/// Limits applied to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Longest wait for the request line and for each cache reply.
    pub cache_query_timeout: Duration,
    /// Longest wait for one socket write.
    pub sink_write_timeout: Duration,
    /// Frames queued before producers block.
    pub sink_capacity: usize,
    /// Largest accepted request or reply line.
    pub max_request_bytes: usize,
}

impl DispatchSettings {
    /// Reads the limits from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_query_timeout: config.cache_query_timeout(),
            sink_write_timeout: config.sink_write_timeout(),
            sink_capacity: config.sink_capacity(),
            max_request_bytes: config.max_request_bytes(),
        }
    }
}

/// Connection handler that parses and dispatches compilation requests.
pub struct DispatchConnectionHandler {
    service: Arc<CompileService>,
    settings: DispatchSettings,
}

impl DispatchConnectionHandler {
    /// Creates a handler running calls on `service`.
    pub fn new(service: Arc<CompileService>, settings: DispatchSettings) -> Self {
        Self { service, settings }
    }

    fn dispatch(&self, stream: ConnectionStream) {
        if let Err(error) = stream
            .set_read_timeout(Some(self.settings.cache_query_timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.settings.sink_write_timeout)))
        {
            warn!(target: DISPATCH_TARGET, %error, "failed to configure connection timeouts");
            return;
        }
        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to split connection");
                return;
            }
        };

        let reader: Box<dyn Read + Send> = Box::new(stream);
        let mut replies = FrameReader::new(reader, self.settings.max_request_bytes);
        let request = match replies.read_frame() {
            Ok(Some(frame)) => framing::decode::<Request>(&frame).map_err(DispatchError::from),
            Ok(None) => {
                debug!(target: DISPATCH_TARGET, "client disconnected without request");
                return;
            }
            Err(error) => Err(DispatchError::from(error)),
        };

        let sink = match OutputSink::spawn(writer, self.settings.sink_capacity) {
            Ok(sink) => sink,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to start output sink");
                return;
            }
        };

        let pending = match request {
            Ok(request) => self.route(request, &sink, replies),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "rejected request");
                Some(report_internal(&sink, OutputFormat::Plain, &error))
            }
        };

        if let Some(outcome) = pending
            && let Err(error) = sink.conclude(&outcome)
        {
            debug!(target: DISPATCH_TARGET, %error, "call status not delivered");
        }
    }

    /// Runs `request`. Compilations deliver their own outcome and return
    /// `None`; control requests return the outcome still to be sent.
    fn route(
        &self,
        request: Request,
        sink: &OutputSink,
        replies: FrameReader<Box<dyn Read + Send>>,
    ) -> Option<CallOutcome> {
        debug!(target: DISPATCH_TARGET, kind = request.kind(), "dispatching request");
        let outcome = match request {
            Request::Compile {
                arguments,
                output_format,
            } => {
                self.service.compile(&arguments, sink, output_format);
                return None;
            }
            Request::IncrementalCompile {
                arguments,
                caches,
                output_format,
            } => {
                let bridge = CacheBridge::new(sink, replies, self.settings.cache_query_timeout);
                let registry = remote_registry(&bridge, caches);
                self.service
                    .incremental_compile(&arguments, &registry, sink, output_format);
                return None;
            }
            Request::CompilerId => match self.service.compiler_id() {
                Ok((name, version)) => match sink.send(ServerMessage::CompilerId { name, version }) {
                    Ok(()) => CallOutcome::Completed(ExitStatus::Ok),
                    Err(error) => CallOutcome::failed(error.to_string()),
                },
                Err(error) => report_internal(sink, OutputFormat::Plain, &error),
            },
            Request::Shutdown => match self.service.shutdown() {
                Ok(()) => CallOutcome::Completed(ExitStatus::Ok),
                Err(error) => report_internal(sink, OutputFormat::Plain, &error),
            },
        };
        Some(outcome)
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.dispatch(stream);
    }
}
