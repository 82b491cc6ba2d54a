//! Line-oriented access to the source file.
//!
//! The lexer never sees the whole file at once: it peeks the current line,
//! consumes bytes from it and advances to the next one when the line is
//! exhausted. Line terminators (`\n`, `\r\n`) are stripped on load.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use snafu::ResultExt;
use tracing::debug;

use crate::error::{CompileResult, OpenSourceSnafu};

/// Sequential, peekable lines of one source file.
#[derive(Debug, Clone)]
pub struct SourceLines {
  name: Rc<str>,
  lines: Vec<Box<[u8]>>,
  current: usize,
}

impl SourceLines {
  /// Read the whole file and split it into lines.
  pub fn open(path: &Path) -> CompileResult<Self> {
    let bytes = fs::read(path).context(OpenSourceSnafu { path })?;
    let name: Rc<str> = Rc::from(path.display().to_string());
    let source = Self::from_bytes(name, &bytes);
    debug!(file = %source.name, lines = source.lines.len(), "loaded source");
    Ok(source)
  }

  /// Build a provider over in-memory text; `name` is used in locations.
  pub fn from_source(name: &str, text: &str) -> Self {
    Self::from_bytes(Rc::from(name), text.as_bytes())
  }

  fn from_bytes(name: Rc<str>, bytes: &[u8]) -> Self {
    let mut lines: Vec<Box<[u8]>> = bytes
      .split(|&b| b == b'\n')
      .map(|line| line.strip_suffix(b"\r").unwrap_or(line).into())
      .collect();
    // A trailing newline does not open another line.
    if bytes.ends_with(b"\n") || bytes.is_empty() {
      lines.pop();
    }
    Self {
      name,
      lines,
      current: 0,
    }
  }

  pub fn name(&self) -> &Rc<str> {
    &self.name
  }

  /// The line under the cursor, or `None` once every line was consumed.
  pub fn peek(&self) -> Option<&[u8]> {
    self.lines.get(self.current).map(|line| &line[..])
  }

  /// Move to the next line and return it.
  pub fn advance(&mut self) -> Option<&[u8]> {
    if self.current < self.lines.len() {
      self.current += 1;
    }
    self.peek()
  }

  /// Whether a line follows the current one.
  pub fn has_more(&self) -> bool {
    self.current + 1 < self.lines.len()
  }

  /// Text of a 1-based row, for rendering diagnostics.
  pub fn line_text(&self, row: usize) -> Option<String> {
    let line = self.lines.get(row.checked_sub(1)?)?;
    Some(String::from_utf8_lossy(line).into_owned())
  }
}
