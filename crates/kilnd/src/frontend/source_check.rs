//! Reference front-end that checks delimiter balance in source files.
//!
//! Each positional path is one compilation unit named
//! `<module>.<file stem>`. In incremental calls the unit is taken from the
//! caller's cache unless the cache lists it as obsolete, the fetch fails or
//! the cached data is empty.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::debug;

use kiln_protocol::IncrementalCache;

use super::{
    CompileContext, CompileReport, CompilerFrontend, Diagnostic, FrontendError, Location,
    classify_cache_error,
};
use crate::dispatch::DISPATCH_TARGET;

const FRONTEND_NAME: &str = "kiln-source-check";

#[derive(Debug, Parser)]
#[command(
    name = "kiln-source-check",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true
)]
struct SourceCheckArgs {
    /// Module the sources belong to.
    #[arg(long, default_value = "main")]
    module: String,
    /// Fail the compilation when warnings are reported.
    #[arg(long)]
    warnings_as_errors: bool,
    /// Source files to check.
    #[arg(value_name = "SOURCE")]
    sources: Vec<PathBuf>,
}

/// Front-end that treats unbalanced `()`, `[]` and `{}` as compilation
/// errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceCheckFrontend;

impl SourceCheckFrontend {
    /// Builds the front-end.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CompilerFrontend for SourceCheckFrontend {
    fn name(&self) -> &str {
        FRONTEND_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn execute(
        &self,
        arguments: &[String],
        context: &mut CompileContext<'_>,
    ) -> Result<CompileReport, FrontendError> {
        let args = SourceCheckArgs::try_parse_from(arguments)
            .map_err(|error| FrontendError::invalid_arguments(summarise_clap_error(&error)))?;

        let cache = context.incremental_cache(&args.module);
        let obsolete = match cache {
            Some(handle) => obsolete_parts(handle, &args.module)?,
            None => None,
        };

        let mut report = CompileReport::default();
        for source in &args.sources {
            let unit = unit_name(&args.module, source);
            if let (Some(handle), Some(obsolete)) = (cache, obsolete.as_ref())
                && !obsolete.contains(&unit)
                && reuse_unit(handle, &unit)?
            {
                report.reused.push(unit);
                continue;
            }
            check_unit(source, context)?;
            report.recompiled.push(unit);
        }

        report.failed = context.error_count() > 0
            || (args.warnings_as_errors && context.warning_count() > 0);
        debug!(
            target: DISPATCH_TARGET,
            module = %args.module,
            recompiled = report.recompiled.len(),
            reused = report.reused.len(),
            failed = report.failed,
            "source check finished"
        );
        Ok(report)
    }
}

/// Asks the handle which units are stale. `None` means nothing may be reused.
fn obsolete_parts(
    handle: &dyn IncrementalCache,
    module: &str,
) -> Result<Option<BTreeSet<String>>, FrontendError> {
    match handle.obsolete_package_parts() {
        Ok(names) => Ok(Some(names)),
        Err(error) => {
            let error = classify_cache_error(error)?;
            debug!(
                target: DISPATCH_TARGET,
                module,
                error = %error,
                "obsolete part query failed; recompiling the module"
            );
            Ok(None)
        }
    }
}

fn reuse_unit(handle: &dyn IncrementalCache, unit: &str) -> Result<bool, FrontendError> {
    match handle.package_data(unit) {
        Ok(data) if !data.is_empty() => Ok(true),
        Ok(_) => {
            debug!(target: DISPATCH_TARGET, unit, "cached data is empty; recompiling");
            Ok(false)
        }
        Err(error) => {
            let error = classify_cache_error(error)?;
            debug!(
                target: DISPATCH_TARGET,
                unit,
                error = %error,
                "cached data unavailable; recompiling"
            );
            Ok(false)
        }
    }
}

fn check_unit(source: &Path, context: &mut CompileContext<'_>) -> Result<(), FrontendError> {
    let display = source.display().to_string();
    let text = match fs::read_to_string(source) {
        Ok(text) => text,
        Err(error) => {
            return context
                .report(&Diagnostic::error(format!("cannot read source file {display}: {error}")));
        }
    };

    if text.trim().is_empty() {
        return context.report(
            &Diagnostic::warning("source file is empty").at(Location::new(display, 1, 1)),
        );
    }

    for issue in scan_delimiters(&text) {
        context.report(
            &Diagnostic::error(issue.message).at(Location::new(
                display.as_str(),
                issue.line,
                issue.column,
            )),
        )?;
    }
    Ok(())
}

fn unit_name(module: &str, source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    format!("{module}.{stem}")
}

fn summarise_clap_error(error: &clap::Error) -> String {
    let rendered = error.to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first.trim_start_matches("error: ").trim().to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SyntaxIssue {
    line: u32,
    column: u32,
    message: String,
}

#[derive(Debug, Clone, Copy)]
struct Open {
    delimiter: char,
    line: u32,
    column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    Code,
    String { line: u32, column: u32 },
    Escape { line: u32, column: u32 },
    LineComment,
}

const fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Finds unbalanced delimiters, skipping `"` strings and `//` comments.
fn scan_delimiters(text: &str) -> Vec<SyntaxIssue> {
    let mut issues = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    let mut mode = ScanMode::Code;
    let mut chars = text.chars().peekable();
    let (mut line, mut column) = (1_u32, 0_u32);

    while let Some(ch) = chars.next() {
        if ch == '\n' {
            line = line.saturating_add(1);
            column = 0;
            if mode == ScanMode::LineComment {
                mode = ScanMode::Code;
            }
            continue;
        }
        column = column.saturating_add(1);

        mode = match mode {
            ScanMode::Code => match ch {
                '/' if chars.peek() == Some(&'/') => ScanMode::LineComment,
                '"' => ScanMode::String { line, column },
                '(' | '[' | '{' => {
                    stack.push(Open {
                        delimiter: ch,
                        line,
                        column,
                    });
                    ScanMode::Code
                }
                ')' | ']' | '}' => {
                    match stack.pop() {
                        Some(open) if closing_for(open.delimiter) == ch => {}
                        Some(open) => issues.push(SyntaxIssue {
                            line,
                            column,
                            message: format!(
                                "mismatched '{ch}': expected '{}' to close '{}' opened at {}:{}",
                                closing_for(open.delimiter),
                                open.delimiter,
                                open.line,
                                open.column
                            ),
                        }),
                        None => issues.push(SyntaxIssue {
                            line,
                            column,
                            message: format!("unmatched closing '{ch}'"),
                        }),
                    }
                    ScanMode::Code
                }
                _ => ScanMode::Code,
            },
            ScanMode::String { line: start, column: start_column } => match ch {
                '\\' => ScanMode::Escape {
                    line: start,
                    column: start_column,
                },
                '"' => ScanMode::Code,
                _ => mode,
            },
            ScanMode::Escape { line: start, column: start_column } => ScanMode::String {
                line: start,
                column: start_column,
            },
            ScanMode::LineComment => ScanMode::LineComment,
        };
    }

    if let ScanMode::String { line: start, column: start_column }
    | ScanMode::Escape { line: start, column: start_column } = mode
    {
        issues.push(SyntaxIssue {
            line: start,
            column: start_column,
            message: "unterminated string literal".to_owned(),
        });
    }
    issues.extend(stack.into_iter().map(|open| SyntaxIssue {
        line: open.line,
        column: open.column,
        message: format!("unclosed '{}'", open.delimiter),
    }));
    issues
}
