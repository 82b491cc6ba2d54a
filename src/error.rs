//! Shared error utilities used across the compilation pipeline.
//!
//! Fatal problems travel as [`CompileError`] through `?` up to the driver.
//! Problems the pipeline can step over (an illegal byte, an undeclared
//! symbol) are recorded as [`Diagnostic`]s instead and inspected once the
//! stage finishes.

use std::collections::TryReserveError;
use std::fmt;
use std::io;
use std::path::PathBuf;

use snafu::Snafu;

use crate::location::Location;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("cannot open '{}': {source}", path.display()))]
  OpenSource { path: PathBuf, source: io::Error },

  #[snafu(display("cannot write '{}': {source}", path.display()))]
  WriteOutput { path: PathBuf, source: io::Error },

  #[snafu(display("out of memory growing the {pool} pool by {requested} bytes"))]
  PoolExhausted {
    pool: &'static str,
    requested: usize,
    source: TryReserveError,
  },

  #[snafu(display("{loc}: expected {expected}, but got {found}\n{line}\n{marker}"))]
  Syntax {
    loc: Location,
    expected: String,
    found: String,
    line: String,
    marker: String,
  },

  #[snafu(display("{loc}: {message}"))]
  Codegen { loc: Location, message: String },

  #[snafu(display(
    "stack frame needs {required} bytes but only {reserved} are reserved"
  ))]
  FrameOverflow { required: usize, reserved: usize },

  #[snafu(display("{}", render_rejected(diagnostics)))]
  Rejected { diagnostics: Vec<Diagnostic> },
}

impl CompileError {
  /// Syntax error anchored at `loc`; `line` is the text of the offending row.
  pub fn syntax(
    loc: Location,
    line: Option<String>,
    expected: impl Into<String>,
    found: impl Into<String>,
  ) -> Self {
    let line = line.unwrap_or_default();
    let marker = caret_marker(&line, loc.column);
    Self::Syntax {
      loc,
      expected: expected.into(),
      found: found.into(),
      line,
      marker,
    }
  }

  pub fn codegen(loc: Location, message: impl Into<String>) -> Self {
    Self::Codegen {
      loc,
      message: message.into(),
    }
  }
}

/// Spaces up to the 1-based `column`, then a caret. Tabs are kept so the
/// caret lines up under tab-indented source.
fn caret_marker(line: &str, column: usize) -> String {
  let mut marker: String = line
    .chars()
    .take(column.saturating_sub(1))
    .map(|c| if c == '\t' { '\t' } else { ' ' })
    .collect();
  marker.push('^');
  marker
}

fn render_rejected(diagnostics: &[Diagnostic]) -> String {
  let errors = diagnostics
    .iter()
    .filter(|d| d.severity == Severity::Error)
    .map(ToString::to_string)
    .collect::<Vec<_>>();
  format!(
    "compilation rejected with {} error(s)\n{}",
    errors.len(),
    errors.join("\n")
  )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  Warning,
  Error,
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Severity::Warning => f.write_str("warning"),
      Severity::Error => f.write_str("error"),
    }
  }
}

/// A reported problem that does not stop the stage that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub severity: Severity,
  pub loc: Location,
  pub message: String,
}

impl Diagnostic {
  pub fn warning(loc: Location, message: impl Into<String>) -> Self {
    Self {
      severity: Severity::Warning,
      loc,
      message: message.into(),
    }
  }

  pub fn error(loc: Location, message: impl Into<String>) -> Self {
    Self {
      severity: Severity::Error,
      loc,
      message: message.into(),
    }
  }

  pub fn is_error(&self) -> bool {
    self.severity == Severity::Error
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}: {}", self.severity, self.loc, self.message)
  }
}
