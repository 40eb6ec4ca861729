//! Request and response envelopes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::format::OutputFormat;

/// First line a client sends on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    /// Full, non-incremental compilation.
    Compile {
        /// Compiler command-line arguments, forwarded verbatim.
        arguments: Vec<String>,
        /// Serialisation of diagnostic records.
        #[serde(default)]
        output_format: OutputFormat,
    },
    /// Incremental compilation against caller-owned cache handles.
    IncrementalCompile {
        /// Compiler command-line arguments, forwarded verbatim.
        arguments: Vec<String>,
        /// Modules for which the caller holds a cache handle.
        #[serde(default)]
        caches: BTreeSet<String>,
        /// Serialisation of diagnostic records.
        #[serde(default)]
        output_format: OutputFormat,
    },
    /// Asks the daemon to identify its compiler front-end.
    CompilerId,
    /// Asks the daemon to stop accepting work.
    Shutdown,
}

impl Request {
    /// Short label used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Compile { .. } => "compile",
            Self::IncrementalCompile { .. } => "incremental_compile",
            Self::CompilerId => "compiler_id",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Query the daemon issues against one cache handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CacheQuery {
    /// `obsolete_package_parts()`.
    ObsoletePackageParts,
    /// `package_data(fq_name)`.
    PackageData {
        /// Fully-qualified unit name.
        fq_name: String,
    },
}

/// Answer to a [`CacheQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Obsolete package part names.
    Names {
        /// Names that must not be reused.
        names: BTreeSet<String>,
    },
    /// Serialised package data.
    Data {
        /// Raw bytes of the cached unit.
        data: Vec<u8>,
    },
    /// The handle could not answer.
    Error {
        /// Description supplied by the handle.
        message: String,
    },
}

/// Lines written by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One diagnostic record, already rendered in the requested format.
    Output {
        /// Rendered record.
        data: String,
    },
    /// Callback into a caller-side cache handle; expects a reply.
    CacheQuery {
        /// Correlation id echoed by the reply.
        id: u64,
        /// Module whose handle is queried.
        module: String,
        /// The query itself.
        query: CacheQuery,
    },
    /// The daemon is done with a handle; the caller releases it.
    CacheClose {
        /// Module whose handle is released.
        module: String,
    },
    /// Identity of the daemon's compiler front-end.
    CompilerId {
        /// Front-end name.
        name: String,
        /// Front-end version.
        version: String,
    },
    /// The call could not complete; the outcome is unknown.
    Abort {
        /// Human-readable cause.
        reason: String,
    },
    /// Terminal message carrying the call status.
    Exit {
        /// Numeric status, see [`crate::ExitStatus`].
        status: i32,
    },
}

impl ServerMessage {
    /// Builds an output record message.
    pub fn output(data: impl Into<String>) -> Self {
        Self::Output { data: data.into() }
    }

    /// Returns `true` for messages after which the daemon sends nothing else.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Exit { .. } | Self::Abort { .. })
    }
}

/// Lines written by the client after its request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Answer to [`ServerMessage::CacheQuery`].
    CacheReply {
        /// Id of the query being answered.
        id: u64,
        /// Result of the query.
        outcome: CacheOutcome,
    },
}
