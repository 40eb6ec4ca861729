//! JSONL framing shared by the daemon and the client.
//!
//! A frame is one JSON document followed by `\n`. Readers enforce a size
//! limit so a misbehaving peer cannot make the other side buffer without
//! bound, and keep any bytes that follow a newline for the next frame.

use std::io::{self, BufRead, BufReader, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised while reading, writing or decoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying stream failed (including read or write timeouts).
    #[error("frame IO error: {0}")]
    Io(#[from] io::Error),
    /// A frame exceeded the configured limit.
    #[error("frame too large: {size} bytes exceeds {max_size} byte limit")]
    TooLarge {
        /// Bytes buffered when the limit was hit.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },
    /// A frame was blank.
    #[error("empty frame")]
    Empty,
    /// A frame was not valid JSON for the expected type.
    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),
    /// A value could not be serialised.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

impl FrameError {
    /// Returns `true` when the error came from a read or write timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Io(error)
                if matches!(error.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

/// Buffered reader yielding one frame at a time.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: BufReader<R>,
    max_frame_bytes: usize,
}

impl<R: Read> FrameReader<R> {
    /// Wraps a stream, rejecting frames longer than `max_frame_bytes`.
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_frame_bytes,
        }
    }

    /// Reads the next raw frame, including its trailing newline.
    ///
    /// Returns `Ok(None)` when the peer closed the stream before sending any
    /// byte of a new frame. A partial frame at end of stream is returned as
    /// is, so the caller can report it as malformed.
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut frame = Vec::new();
        loop {
            let available = match self.inner.fill_buf() {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(FrameError::Io(error)),
            };

            if available.is_empty() {
                return Ok(if frame.is_empty() { None } else { Some(frame) });
            }

            if let Some(newline) = available.iter().position(|byte| *byte == b'\n') {
                let (line, _) = available.split_at(newline + 1);
                frame.extend_from_slice(line);
                self.inner.consume(newline + 1);
                self.enforce_limit(frame.len())?;
                return Ok(Some(frame));
            }

            let consumed = available.len();
            frame.extend_from_slice(available);
            self.inner.consume(consumed);
            self.enforce_limit(frame.len())?;
        }
    }

    /// Reads and decodes the next frame.
    pub fn read_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        match self.read_frame()? {
            Some(frame) => decode(&frame).map(Some),
            None => Ok(None),
        }
    }

    const fn enforce_limit(&self, size: usize) -> Result<(), FrameError> {
        if size > self.max_frame_bytes {
            return Err(FrameError::TooLarge {
                size,
                max_size: self.max_frame_bytes,
            });
        }
        Ok(())
    }
}

/// Decodes one frame, ignoring trailing whitespace.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, FrameError> {
    let trimmed = trim_trailing_whitespace(frame);
    if trimmed.is_empty() {
        return Err(FrameError::Empty);
    }
    serde_json::from_slice(trimmed).map_err(FrameError::Decode)
}

/// Serialises `message` as one frame and flushes the writer.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), FrameError> {
    let mut line = serde_json::to_vec(message).map_err(FrameError::Encode)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.split_at(end).0
}
