//! Wire types shared by the Kiln daemon and its clients.
//!
//! One connection carries exactly one request. The client writes a single
//! [`Request`] line; the daemon answers with a stream of [`ServerMessage`]
//! lines that ends in either [`ServerMessage::Exit`] or
//! [`ServerMessage::Abort`]. During an incremental compile the daemon calls
//! back into the client's cache handles with [`ServerMessage::CacheQuery`],
//! which the client answers with [`ClientMessage::CacheReply`] on the same
//! connection.
//!
//! Every message is one JSON object terminated by a newline. The
//! [`framing`] module provides the bounded reader and the writer used on both
//! sides.

mod cache;
mod format;
pub mod framing;
mod message;
mod status;

pub use cache::{CacheError, IncrementalCache};
pub use format::{OutputFormat, OutputFormatParseError};
pub use message::{CacheOutcome, CacheQuery, ClientMessage, Request, ServerMessage};
pub use status::ExitStatus;
