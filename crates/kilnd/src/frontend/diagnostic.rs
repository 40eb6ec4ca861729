//! Diagnostic records and their wire renderings.

use std::fmt;

use quick_xml::escape::escape;

use kiln_protocol::OutputFormat;

/// Severity of a diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// The compiler itself failed.
    Exception,
    /// The source is incorrect.
    Error,
    /// The source is suspicious.
    Warning,
    /// Informational message.
    Info,
}

impl Severity {
    /// Returns `true` for severities that fail the compilation.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Exception | Self::Error)
    }

    const fn plain_label(self) -> &'static str {
        match self {
            Self::Exception => "exception",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    const fn xml_label(self) -> &'static str {
        match self {
            Self::Exception => "EXCEPTION",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.plain_label())
    }
}

/// Position a diagnostic refers to. Lines and columns start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Source path as given on the command line.
    pub path: String,
    /// One-based line.
    pub line: u32,
    /// One-based column.
    pub column: u32,
}

impl Location {
    /// Builds a location.
    pub fn new(path: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}:{}", self.path, self.line, self.column)
    }
}

/// One message emitted by a compiler front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// How serious the message is.
    pub severity: Severity,
    /// Human-readable text.
    pub message: String,
    /// Source position, when the message concerns one.
    pub location: Option<Location>,
}

impl Diagnostic {
    /// Builds a diagnostic without a location.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            location: None,
        }
    }

    /// Builds an error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Builds a warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Builds an exception diagnostic, used for failures of the compiler
    /// rather than of the source.
    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(Severity::Exception, message)
    }

    /// Attaches a source location.
    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Renders the diagnostic as one discrete record.
    #[must_use]
    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Plain => self.render_plain(),
            OutputFormat::Xml => self.render_xml(),
        }
    }

    fn render_plain(&self) -> String {
        match &self.location {
            Some(location) => format!("{location}: {}: {}\n", self.severity, self.message),
            None => format!("{}: {}\n", self.severity, self.message),
        }
    }

    fn render_xml(&self) -> String {
        let severity = self.severity.xml_label();
        let text = escape(self.message.as_str());
        match &self.location {
            Some(location) => format!(
                "<MESSAGE severity=\"{severity}\" path=\"{}\" line=\"{}\" column=\"{}\">{text}</MESSAGE>\n",
                escape(location.path.as_str()),
                location.line,
                location.column,
            ),
            None => format!("<MESSAGE severity=\"{severity}\">{text}</MESSAGE>\n"),
        }
    }
}
