//! In-memory writer shared between a sink thread and the test body.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use kiln_protocol::ServerMessage;
use kiln_protocol::framing::FrameReader;

/// Cloneable byte buffer; every clone appends to the same storage.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Raw bytes written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().expect("buffer mutex poisoned").clone()
    }

    /// Decodes every complete frame written so far.
    pub fn messages(&self) -> Vec<ServerMessage> {
        let bytes = self.contents();
        let mut reader = FrameReader::new(bytes.as_slice(), usize::MAX);
        let mut messages = Vec::new();
        while let Some(message) = reader.read_message().expect("decode server frame") {
            messages.push(message);
        }
        messages
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .map_err(|_| io::Error::other("buffer mutex poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
