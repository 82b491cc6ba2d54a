//! Source positions attached to tokens, AST nodes and diagnostics.

use std::fmt;
use std::rc::Rc;

/// File identity plus a 1-based row and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
  pub file: Rc<str>,
  pub row: usize,
  pub column: usize,
}

impl Location {
  pub fn new(file: Rc<str>, row: usize, column: usize) -> Self {
    Self { file, row, column }
  }

  /// The first byte of `file`.
  pub fn start(file: Rc<str>) -> Self {
    Self::new(file, 1, 1)
  }
}

impl fmt::Display for Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.file, self.row, self.column)
  }
}
