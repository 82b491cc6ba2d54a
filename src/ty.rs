use std::fmt;

use crate::tokenizer::Keyword;

/// Built-in types. `int` is the only one the language has today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
  Int,
}

impl Type {
  /// Map a type-specifier keyword to its type, if the language supports it.
  pub fn from_keyword(keyword: Keyword) -> Option<Self> {
    match keyword {
      Keyword::Int => Some(Type::Int),
      _ => None,
    }
  }

  /// Size of a value in bytes; generated code moves `int`s with 32-bit
  /// instructions.
  pub fn size(&self) -> usize {
    match self {
      Type::Int => 4,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Type::Int => "int",
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}
