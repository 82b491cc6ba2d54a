//! Compiler settings shared by the driver and the pipeline stages.

use crate::pool::{DEFAULT_IDENT_BLOCK_SIZE, DEFAULT_STRING_BLOCK_SIZE};

/// How the prologue sizes the stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePolicy {
  /// Reserve exactly what the declared locals need, rounded to 16 bytes.
  #[default]
  Computed,
  /// Reserve a constant number of bytes; generation fails if the locals need
  /// more.
  Fixed(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub ident_block_size: usize,
  pub string_block_size: usize,
  pub frame: FramePolicy,
  /// Symbol of the generated routine.
  pub entry_symbol: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      ident_block_size: DEFAULT_IDENT_BLOCK_SIZE,
      string_block_size: DEFAULT_STRING_BLOCK_SIZE,
      frame: FramePolicy::Computed,
      entry_symbol: "main".to_string(),
    }
  }
}
