//! Test helpers for the transport module.

use std::io::{BufRead, BufReader};
use std::sync::{Arc, Mutex};

use super::{ConnectionHandler, ConnectionStream};

/// Records the first line sent on every accepted connection.
#[derive(Default)]
pub(crate) struct RequestLineRecorder {
    lines: Mutex<Vec<String>>,
}

impl RequestLineRecorder {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl ConnectionHandler for RequestLineRecorder {
    fn handle(&self, stream: ConnectionStream) {
        let mut line = String::new();
        if BufReader::new(stream).read_line(&mut line).is_ok()
            && let Ok(mut lines) = self.lines.lock()
        {
            lines.push(line.trim_end().to_owned());
        }
    }
}
