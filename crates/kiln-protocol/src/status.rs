//! Process-like status codes returned by compile calls.

use std::fmt;

/// Outcome class of a call that ran to completion.
///
/// The numeric convention is stable: `0` success, `1` errors found in the
/// compiled sources, `2` the daemon could not run the job (malformed
/// arguments, setup failure, service shut down). Transport failures never
/// produce a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Compilation finished without errors.
    Ok,
    /// The front-end reported source-level errors.
    CompilationError,
    /// The dispatch path failed before or outside compilation.
    InternalError,
}

impl ExitStatus {
    /// Returns the numeric code sent on the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::CompilationError => 1,
            Self::InternalError => 2,
        }
    }

    /// Maps a wire code back to a status, when it is one of ours.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::CompilationError),
            2 => Some(Self::InternalError),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "ok",
            Self::CompilationError => "compilation error",
            Self::InternalError => "internal error",
        };
        write!(formatter, "{label} ({})", self.code())
    }
}
