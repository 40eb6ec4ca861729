//! Ordered, bounded output towards the caller.
//!
//! Every frame the daemon sends during a call (diagnostic records, cache
//! callbacks, the terminal status) goes through one bounded queue drained by
//! a writer thread. The queue gives backpressure: a producer blocks once
//! `capacity` frames are waiting. Sharing the queue keeps the wire order
//! equal to the order frames were produced.

use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::debug;

use kiln_protocol::framing::{self, FrameError};
use kiln_protocol::{ExitStatus, ServerMessage};

use super::DISPATCH_TARGET;
use super::service::CallOutcome;

const DROPPED_REASON: &str = "call ended without a status";

/// Destination for rendered diagnostic records.
pub trait DiagnosticSink {
    /// Writes one discrete record. Blocks while the sink is saturated.
    fn write_record(&self, record: String) -> Result<(), SinkError>;

    /// Delivers the end of the call: the status of a completed call, or an
    /// abort for a failed one. Returns once the caller was written to.
    fn conclude(&self, outcome: &CallOutcome) -> Result<(), SinkError>;
}

/// Failures of the output path.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The writer stopped; the caller is no longer reachable.
    #[error("client connection closed")]
    Disconnected,
    /// Writing a frame to the socket failed or timed out.
    #[error("failed to write to client: {0}")]
    Write(#[source] FrameError),
    /// The writer thread could not be started.
    #[error("failed to start output writer: {0}")]
    Spawn(#[source] io::Error),
    /// The writer thread panicked.
    #[error("output writer panicked")]
    WriterPanicked,
}

/// Per-call output sink backed by a writer thread.
///
/// The first terminal frame ends the call; later ones report
/// [`SinkError::Disconnected`].
#[derive(Debug)]
pub struct OutputSink {
    sender: Mutex<Option<SyncSender<ServerMessage>>>,
    writer: Mutex<Option<JoinHandle<Result<(), SinkError>>>>,
}

impl OutputSink {
    /// Starts a writer thread draining into `writer`.
    pub fn spawn<W>(writer: W, capacity: usize) -> Result<Self, SinkError>
    where
        W: Write + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let handle = thread::Builder::new()
            .name("kilnd-sink".to_owned())
            .spawn(move || run_writer(writer, &receiver))
            .map_err(SinkError::Spawn)?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            writer: Mutex::new(Some(handle)),
        })
    }

    /// Queues one frame.
    pub fn send(&self, message: ServerMessage) -> Result<(), SinkError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
            .ok_or(SinkError::Disconnected)?;
        sender.send(message).map_err(|_| SinkError::Disconnected)
    }

    /// Ends the call with `status`, waiting until every frame was written.
    pub fn finish(&self, status: ExitStatus) -> Result<(), SinkError> {
        self.terminate(ServerMessage::Exit {
            status: status.code(),
        })
    }

    /// Ends the call without a status. The abort frame is best effort: the
    /// caller may already be gone.
    pub fn abort(&self, reason: impl Into<String>) -> Result<(), SinkError> {
        self.terminate(ServerMessage::Abort {
            reason: reason.into(),
        })
    }

    fn terminate(&self, message: ServerMessage) -> Result<(), SinkError> {
        let taken = self
            .sender
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take();
        let Some(sender) = taken else {
            return Err(SinkError::Disconnected);
        };
        let sent = sender.send(message).map_err(|_| SinkError::Disconnected);
        drop(sender);
        self.join_writer()?;
        sent
    }

    fn join_writer(&self) -> Result<(), SinkError> {
        let handle = self
            .writer
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take();
        match handle {
            Some(handle) => handle.join().map_err(|_| SinkError::WriterPanicked)?,
            None => Ok(()),
        }
    }
}

impl DiagnosticSink for OutputSink {
    fn write_record(&self, record: String) -> Result<(), SinkError> {
        self.send(ServerMessage::output(record))
    }

    fn conclude(&self, outcome: &CallOutcome) -> Result<(), SinkError> {
        match outcome {
            CallOutcome::Completed(status) => self.finish(*status),
            CallOutcome::Failed { reason } => self.abort(reason.as_str()),
        }
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        let taken = self
            .sender
            .get_mut()
            .unwrap_or_else(|poison| poison.into_inner())
            .take();
        let Some(sender) = taken else {
            return;
        };
        if let Err(error) = sender.try_send(ServerMessage::Abort {
            reason: DROPPED_REASON.to_owned(),
        }) {
            debug!(target: DISPATCH_TARGET, %error, "abort frame not queued during drop");
        }
        drop(sender);
        if let Err(error) = self.join_writer() {
            debug!(target: DISPATCH_TARGET, %error, "output writer failed during drop");
        }
    }
}

fn run_writer<W: Write>(mut writer: W, messages: &Receiver<ServerMessage>) -> Result<(), SinkError> {
    for message in messages {
        if let Err(error) = framing::write_message(&mut writer, &message) {
            debug!(target: DISPATCH_TARGET, %error, "output frame write failed");
            return Err(SinkError::Write(error));
        }
        if message.is_terminal() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use kiln_protocol::CacheQuery;

    use super::*;
    use crate::tests::support::SharedBuffer;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Accepts bytes freely but holds every flush until a token arrives.
    struct GatedWriter {
        inner: SharedBuffer,
        gate: Receiver<()>,
    }

    impl Write for GatedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.gate
                .recv()
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn frames_arrive_in_emission_order() {
        let buffer = SharedBuffer::default();
        let sink = OutputSink::spawn(buffer.clone(), 4).expect("spawn sink");
        sink.write_record("first\n".to_owned()).expect("first");
        sink.send(ServerMessage::CacheQuery {
            id: 1,
            module: "A".to_owned(),
            query: CacheQuery::ObsoletePackageParts,
        })
        .expect("query");
        sink.write_record("second\n".to_owned()).expect("second");
        sink.finish(ExitStatus::CompilationError).expect("finish");

        let kinds: Vec<String> = buffer
            .messages()
            .into_iter()
            .map(|message| match message {
                ServerMessage::Output { data } => data,
                ServerMessage::CacheQuery { id, .. } => format!("query {id}"),
                ServerMessage::Exit { status } => format!("exit {status}"),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec!["first\n", "query 1", "second\n", "exit 1"]);
    }

    #[test]
    fn dropping_an_unfinished_sink_aborts_the_call() {
        let buffer = SharedBuffer::default();
        {
            let sink = OutputSink::spawn(buffer.clone(), 4).expect("spawn sink");
            sink.write_record("partial\n".to_owned()).expect("record");
        }
        let messages = buffer.messages();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages.last(), Some(ServerMessage::Abort { .. })));
    }

    #[test]
    fn failed_outcomes_conclude_with_an_abort_once() {
        let buffer = SharedBuffer::default();
        let sink = OutputSink::spawn(buffer.clone(), 4).expect("spawn sink");
        sink.conclude(&CallOutcome::failed("peer gone"))
            .expect("abort delivered");
        assert!(matches!(
            sink.conclude(&CallOutcome::Completed(ExitStatus::Ok)),
            Err(SinkError::Disconnected)
        ));
        assert_eq!(
            buffer.messages(),
            vec![ServerMessage::Abort {
                reason: "peer gone".to_owned()
            }]
        );
    }

    #[test]
    fn writer_failure_surfaces_on_finish() {
        let sink = OutputSink::spawn(BrokenPipe, 1).expect("spawn sink");
        let error = sink.finish(ExitStatus::Ok).expect_err("writer is broken");
        assert!(matches!(error, SinkError::Write(_)));
    }

    #[test]
    fn sends_after_writer_failure_report_disconnection() {
        let sink = OutputSink::spawn(BrokenPipe, 1).expect("spawn sink");
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut result = Ok(());
        while Instant::now() < deadline && result.is_ok() {
            result = sink.write_record("lost\n".to_owned());
        }
        assert!(matches!(result, Err(SinkError::Disconnected)));
    }

    #[test]
    fn full_queue_blocks_the_producer() {
        let (tokens, gate) = mpsc::channel();
        let buffer = SharedBuffer::default();
        let writer = GatedWriter {
            inner: buffer.clone(),
            gate,
        };
        let sink = OutputSink::spawn(writer, 1).expect("spawn sink");
        let sent = Arc::new(AtomicUsize::new(0));

        thread::scope(|scope| {
            let producer_sent = Arc::clone(&sent);
            let sink_ref = &sink;
            scope.spawn(move || {
                for index in 0..3 {
                    sink_ref
                        .write_record(format!("record {index}\n"))
                        .expect("record");
                    producer_sent.fetch_add(1, Ordering::SeqCst);
                }
            });

            let deadline = Instant::now() + Duration::from_secs(2);
            while sent.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            thread::sleep(Duration::from_millis(100));
            assert_eq!(
                sent.load(Ordering::SeqCst),
                2,
                "third record should wait for the writer"
            );
            for _ in 0..4 {
                tokens.send(()).expect("release writer");
            }
        });

        sink.finish(ExitStatus::Ok).expect("finish");
        assert_eq!(buffer.messages().len(), 4);
    }
}
