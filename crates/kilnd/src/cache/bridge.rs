//! Callback channel from the daemon to the caller's cache handles.

use std::io::Read;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use kiln_protocol::framing::FrameReader;
use kiln_protocol::{CacheError, CacheOutcome, CacheQuery, ClientMessage, ServerMessage};

use crate::dispatch::{DISPATCH_TARGET, OutputSink};

/// Reply half of a call's connection.
pub(crate) type ReplyReader = FrameReader<Box<dyn Read + Send>>;

/// Serialises cache round trips for one call.
///
/// Queries are written through the call's [`OutputSink`], so they keep their
/// place relative to diagnostic records. Replies are read from the same
/// connection; only one query is in flight at a time and each reply must
/// carry the id of the query it answers. The first transport failure breaks
/// the bridge for the rest of the call.
pub(crate) struct CacheBridge<'a> {
    sink: &'a OutputSink,
    replies: Mutex<ReplyReader>,
    next_id: AtomicU64,
    reply_timeout: Duration,
    broken: AtomicBool,
}

impl<'a> CacheBridge<'a> {
    /// `reply_timeout` must already be applied to the reader's socket; it is
    /// kept here to describe timeouts in error messages.
    pub(crate) fn new(sink: &'a OutputSink, replies: ReplyReader, reply_timeout: Duration) -> Self {
        Self {
            sink,
            replies: Mutex::new(replies),
            next_id: AtomicU64::new(1),
            reply_timeout,
            broken: AtomicBool::new(false),
        }
    }

    /// Sends `query` about `module` and waits for the matching reply.
    pub(crate) fn query(&self, module: &str, query: CacheQuery) -> Result<CacheOutcome, CacheError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(CacheError::transport("connection to the caller was lost"));
        }
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| self.fail("cache reply channel poisoned"))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(target: DISPATCH_TARGET, id, module, ?query, "sending cache query");
        self.sink
            .send(ServerMessage::CacheQuery {
                id,
                module: module.to_owned(),
                query,
            })
            .map_err(|error| self.fail(error.to_string()))?;

        match replies.read_message::<ClientMessage>() {
            Ok(Some(ClientMessage::CacheReply { id: answered, outcome })) if answered == id => {
                Ok(outcome)
            }
            Ok(Some(ClientMessage::CacheReply { id: answered, .. })) => Err(self.fail(format!(
                "reply {answered} does not answer cache query {id}"
            ))),
            Ok(None) => Err(self.fail("caller closed the connection during a cache query")),
            Err(error) if error.is_timeout() => Err(self.fail(format!(
                "no cache reply within {} ms",
                self.reply_timeout.as_millis()
            ))),
            Err(error) => Err(self.fail(format!("invalid cache reply: {error}"))),
        }
    }

    /// Tells the caller the daemon is done with `module`'s handle.
    pub(crate) fn release(&self, module: &str) -> Result<(), CacheError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(CacheError::transport("connection to the caller was lost"));
        }
        self.sink
            .send(ServerMessage::CacheClose {
                module: module.to_owned(),
            })
            .map_err(|error| self.fail(error.to_string()))
    }

    fn fail(&self, message: impl Into<String>) -> CacheError {
        let message = message.into();
        if !self.broken.swap(true, Ordering::SeqCst) {
            warn!(target: DISPATCH_TARGET, reason = %message, "cache bridge broken");
        }
        CacheError::transport(message)
    }
}
