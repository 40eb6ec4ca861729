//! Diagnostic output format selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serialisation applied to diagnostic records written to the output sink.
///
/// The format is chosen once per call and never changes mid-stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One human-readable line per diagnostic.
    #[default]
    Plain,
    /// One `<MESSAGE>` element per diagnostic.
    Xml,
}

impl OutputFormat {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error returned when an output format name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported output format: {0}")]
pub struct OutputFormatParseError(String);

impl FromStr for OutputFormat {
    type Err = OutputFormatParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "xml" => Ok(Self::Xml),
            other => Err(OutputFormatParseError(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("plain", OutputFormat::Plain)]
    #[case::xml_upper("XML", OutputFormat::Xml)]
    #[case::padded(" xml ", OutputFormat::Xml)]
    fn parses_names(#[case] input: &str, #[case] expected: OutputFormat) {
        assert_eq!(input.parse::<OutputFormat>(), Ok(expected));
    }

    #[test]
    fn rejects_unknown_names() {
        assert!("html".parse::<OutputFormat>().is_err());
    }
}
