//! The client side of one call.
//!
//! After the request line the client reads daemon frames until a terminal
//! one. Diagnostic records are copied to the caller's writer as they arrive;
//! cache queries are answered from the lent handles on the same connection.
//! Every lent handle is closed exactly once: when the daemon releases it, or
//! when the call ends if the daemon never did.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use kiln_protocol::framing::{self, FrameReader};
use kiln_protocol::{
    CacheOutcome, CacheQuery, ClientMessage, ExitStatus, Request, ServerMessage,
};

use tracing::debug;

use crate::memory::LocalCaches;
use crate::{CLIENT_TARGET, ClientError};

/// What a finished call produced besides its diagnostic records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallSummary {
    pub(crate) status: ExitStatus,
    pub(crate) compiler: Option<(String, String)>,
}

/// Sends `request` and serves the call until the daemon ends it.
pub(crate) fn run_call<R, W>(
    frames: &mut FrameReader<R>,
    requests: &mut W,
    request: &Request,
    caches: &LocalCaches,
    output: &mut dyn Write,
) -> Result<CallSummary, ClientError>
where
    R: Read,
    W: Write,
{
    let mut handles = LentHandles::new(caches);
    framing::write_message(requests, request).map_err(ClientError::Send)?;

    let mut compiler = None;
    loop {
        let message = frames
            .read_message::<ServerMessage>()
            .map_err(ClientError::Receive)?
            .ok_or(ClientError::MissingExit)?;
        match message {
            ServerMessage::Output { data } => {
                output
                    .write_all(data.as_bytes())
                    .and_then(|()| output.flush())
                    .map_err(ClientError::ForwardOutput)?;
            }
            ServerMessage::CacheQuery { id, module, query } => {
                let outcome = handles.answer(&module, &query);
                framing::write_message(requests, &ClientMessage::CacheReply { id, outcome })
                    .map_err(ClientError::Send)?;
            }
            ServerMessage::CacheClose { module } => handles.close(&module),
            ServerMessage::CompilerId { name, version } => compiler = Some((name, version)),
            ServerMessage::Abort { reason } => return Err(ClientError::Aborted { reason }),
            ServerMessage::Exit { status } => {
                let status =
                    ExitStatus::from_code(status).ok_or(ClientError::UnknownStatus(status))?;
                return Ok(CallSummary { status, compiler });
            }
        }
    }
}

/// Tracks which lent handles are still open.
struct LentHandles<'c> {
    caches: &'c LocalCaches,
    closed: BTreeSet<String>,
}

impl<'c> LentHandles<'c> {
    const fn new(caches: &'c LocalCaches) -> Self {
        Self {
            caches,
            closed: BTreeSet::new(),
        }
    }

    fn answer(&self, module: &str, query: &CacheQuery) -> CacheOutcome {
        let Some(handle) = self.caches.get(module) else {
            return CacheOutcome::Error {
                message: format!("no cache handle for module '{module}'"),
            };
        };
        if self.closed.contains(module) {
            return CacheOutcome::Error {
                message: format!("cache for module '{module}' is closed"),
            };
        }
        let answered = match query {
            CacheQuery::ObsoletePackageParts => handle
                .obsolete_package_parts()
                .map(|names| CacheOutcome::Names { names }),
            CacheQuery::PackageData { fq_name } => handle
                .package_data(fq_name)
                .map(|data| CacheOutcome::Data { data }),
        };
        answered.unwrap_or_else(|error| CacheOutcome::Error {
            message: error.to_string(),
        })
    }

    fn close(&mut self, module: &str) {
        if let Some(handle) = self.caches.get(module)
            && self.closed.insert(module.to_owned())
        {
            if let Err(error) = handle.close() {
                debug!(target: CLIENT_TARGET, module, %error, "cache handle close failed");
            }
        }
    }
}

impl Drop for LentHandles<'_> {
    fn drop(&mut self) {
        let modules: Vec<String> = self.caches.keys().cloned().collect();
        for module in modules {
            self.close(&module);
        }
    }
}
