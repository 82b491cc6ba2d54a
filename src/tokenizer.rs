//! Lexical analysis: a pull-based token producer over the source lines.
//!
//! The lexer keeps nothing between calls except its cursor, so the parser
//! can drive it one token at a time. Classification follows a fixed
//! priority: keywords, then multi-character punctuators, then single
//! punctuators, identifiers, integers and finally string literals. Anything
//! else becomes an `Illegal` token carrying the raw byte.
//!
//! Words are taken by maximal munch: a keyword only matches when the whole
//! word equals it, so `ret1` is the identifier `ret1`, not `ret` then `1`.
//!
//! An unterminated string is the one lexical error the lexer recovers from:
//! it yields `Illegal(b'"')`, records a diagnostic and resumes on the next
//! line.

use std::fmt;

use tracing::{trace, warn};

use crate::error::{CompileResult, Diagnostic};
use crate::location::Location;
use crate::pool::{Ident, IdentPool, StrRef, StringPool};
use crate::source::SourceLines;

/// Reserved words, each with its canonical text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
  If,
  Else,
  Ret,
  While,
  For,
  Break,
  Continue,
  Void,
  Int,
  Char,
  Blob,
  Float,
  Const,
  Func,
  Proc,
  Struct,
  Enum,
}

impl Keyword {
  pub const ALL: [Keyword; 17] = [
    Keyword::If,
    Keyword::Else,
    Keyword::Ret,
    Keyword::While,
    Keyword::For,
    Keyword::Break,
    Keyword::Continue,
    Keyword::Void,
    Keyword::Int,
    Keyword::Char,
    Keyword::Blob,
    Keyword::Float,
    Keyword::Const,
    Keyword::Func,
    Keyword::Proc,
    Keyword::Struct,
    Keyword::Enum,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Keyword::If => "if",
      Keyword::Else => "else",
      Keyword::Ret => "ret",
      Keyword::While => "while",
      Keyword::For => "for",
      Keyword::Break => "break",
      Keyword::Continue => "continue",
      Keyword::Void => "void",
      Keyword::Int => "int",
      Keyword::Char => "char",
      Keyword::Blob => "blob",
      Keyword::Float => "float",
      Keyword::Const => "const",
      Keyword::Func => "func",
      Keyword::Proc => "proc",
      Keyword::Struct => "struct",
      Keyword::Enum => "enum",
    }
  }

  fn from_word(word: &[u8]) -> Option<Self> {
    Self::ALL
      .into_iter()
      .find(|kw| kw.as_str().as_bytes() == word)
  }
}

/// Punctuators. Compound sequences are matched before single bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
  Arrow,
  LShift,
  RShift,
  EqEq,
  LessEq,
  GreaterEq,
  NotEq,
  Increment,
  Decrement,
  Ampersand,
  At,
  Backslash,
  Caret,
  Colon,
  Comma,
  Dollar,
  Equal,
  Exclamation,
  Grave,
  Greater,
  Hash,
  LBrace,
  LBracket,
  Less,
  LParen,
  Minus,
  Percent,
  Period,
  Pipe,
  Plus,
  QMark,
  Quote,
  RBrace,
  RBracket,
  RParen,
  Semicolon,
  Slash,
  Star,
  Tilde,
}

impl Punct {
  const COMPOUND: [Punct; 9] = [
    Punct::Arrow,
    Punct::LShift,
    Punct::RShift,
    Punct::EqEq,
    Punct::LessEq,
    Punct::GreaterEq,
    Punct::NotEq,
    Punct::Increment,
    Punct::Decrement,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Punct::Arrow => "->",
      Punct::LShift => "<<",
      Punct::RShift => ">>",
      Punct::EqEq => "==",
      Punct::LessEq => "<=",
      Punct::GreaterEq => ">=",
      Punct::NotEq => "!=",
      Punct::Increment => "++",
      Punct::Decrement => "--",
      Punct::Ampersand => "&",
      Punct::At => "@",
      Punct::Backslash => "\\",
      Punct::Caret => "^",
      Punct::Colon => ":",
      Punct::Comma => ",",
      Punct::Dollar => "$",
      Punct::Equal => "=",
      Punct::Exclamation => "!",
      Punct::Grave => "`",
      Punct::Greater => ">",
      Punct::Hash => "#",
      Punct::LBrace => "{",
      Punct::LBracket => "[",
      Punct::Less => "<",
      Punct::LParen => "(",
      Punct::Minus => "-",
      Punct::Percent => "%",
      Punct::Period => ".",
      Punct::Pipe => "|",
      Punct::Plus => "+",
      Punct::QMark => "?",
      Punct::Quote => "'",
      Punct::RBrace => "}",
      Punct::RBracket => "]",
      Punct::RParen => ")",
      Punct::Semicolon => ";",
      Punct::Slash => "/",
      Punct::Star => "*",
      Punct::Tilde => "~",
    }
  }

  /// Name used when a diagnostic describes the punctuator.
  pub fn name(self) -> &'static str {
    match self {
      Punct::Arrow => "arrow",
      Punct::LShift => "lshift",
      Punct::RShift => "rshift",
      Punct::EqEq => "double-equal",
      Punct::LessEq => "less-or-equal",
      Punct::GreaterEq => "greater-or-equal",
      Punct::NotEq => "not-equal",
      Punct::Increment => "increase",
      Punct::Decrement => "decrease",
      Punct::Ampersand => "ampersand",
      Punct::At => "at",
      Punct::Backslash => "backslash",
      Punct::Caret => "caret",
      Punct::Colon => "colon",
      Punct::Comma => "comma",
      Punct::Dollar => "dollar",
      Punct::Equal => "equal",
      Punct::Exclamation => "exclamation",
      Punct::Grave => "grave",
      Punct::Greater => "greater",
      Punct::Hash => "hash",
      Punct::LBrace => "lbrace",
      Punct::LBracket => "lbracket",
      Punct::Less => "less",
      Punct::LParen => "lparen",
      Punct::Minus => "minus",
      Punct::Percent => "percent",
      Punct::Period => "period",
      Punct::Pipe => "pipe",
      Punct::Plus => "plus",
      Punct::QMark => "qmark",
      Punct::Quote => "quote",
      Punct::RBrace => "rbrace",
      Punct::RBracket => "rbracket",
      Punct::RParen => "rparen",
      Punct::Semicolon => "semicolon",
      Punct::Slash => "slash",
      Punct::Star => "star",
      Punct::Tilde => "tilde",
    }
  }

  fn from_byte(c: u8) -> Option<Self> {
    let punct = match c {
      b'&' => Punct::Ampersand,
      b'@' => Punct::At,
      b'\\' => Punct::Backslash,
      b'^' => Punct::Caret,
      b':' => Punct::Colon,
      b',' => Punct::Comma,
      b'$' => Punct::Dollar,
      b'=' => Punct::Equal,
      b'!' => Punct::Exclamation,
      b'`' => Punct::Grave,
      b'>' => Punct::Greater,
      b'#' => Punct::Hash,
      b'{' => Punct::LBrace,
      b'[' => Punct::LBracket,
      b'<' => Punct::Less,
      b'(' => Punct::LParen,
      b'-' => Punct::Minus,
      b'%' => Punct::Percent,
      b'.' => Punct::Period,
      b'|' => Punct::Pipe,
      b'+' => Punct::Plus,
      b'?' => Punct::QMark,
      b'\'' => Punct::Quote,
      b'}' => Punct::RBrace,
      b']' => Punct::RBracket,
      b')' => Punct::RParen,
      b';' => Punct::Semicolon,
      b'/' => Punct::Slash,
      b'*' => Punct::Star,
      b'~' => Punct::Tilde,
      _ => return None,
    };
    Some(punct)
  }
}

/// Token classification together with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Illegal(u8),
  Eof,
  Ident(Ident),
  Integer(u64),
  Str(StrRef),
  Punct(Punct),
  Keyword(Keyword),
}

impl TokenKind {
  /// Short category name, e.g. `identifier` or `semicolon`.
  pub fn describe(&self) -> &'static str {
    match self {
      TokenKind::Illegal(_) => "illegal",
      TokenKind::Eof => "EOF",
      TokenKind::Ident(_) => "identifier",
      TokenKind::Integer(_) => "integer",
      TokenKind::Str(_) => "string",
      TokenKind::Punct(p) => p.name(),
      TokenKind::Keyword(k) => k.as_str(),
    }
  }
}

/// A classified lexical unit; immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub loc: Location,
}

impl Token {
  pub fn new(kind: TokenKind, loc: Location) -> Self {
    Self { kind, loc }
  }

  pub fn is_eof(&self) -> bool {
    self.kind == TokenKind::Eof
  }

  /// Render the token the way diagnostics and dumps show it.
  pub fn display<'a>(&'a self, idents: &'a IdentPool, strings: &'a StringPool) -> TokenDisplay<'a> {
    TokenDisplay {
      kind: self.kind,
      idents,
      strings,
    }
  }
}

pub struct TokenDisplay<'a> {
  kind: TokenKind,
  idents: &'a IdentPool,
  strings: &'a StringPool,
}

impl fmt::Display for TokenDisplay<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.kind {
      TokenKind::Illegal(c) if c.is_ascii_graphic() => write!(f, "ILLEGAL({})", char::from(c)),
      TokenKind::Illegal(c) => write!(f, "ILLEGAL(0x{c:02x})"),
      TokenKind::Eof => f.write_str("EOF"),
      TokenKind::Ident(id) => write!(f, "IDENT({})", self.idents.resolve(id)),
      TokenKind::Integer(n) => write!(f, "INTEGER({n})"),
      TokenKind::Str(s) => write!(f, "STRING(\"{}\")", self.strings.resolve(s).escape_ascii()),
      TokenKind::Punct(p) => f.write_str(&p.name().to_ascii_uppercase()),
      TokenKind::Keyword(k) => write!(f, "KEYWORD({})", k.as_str()),
    }
  }
}

/// Outcome of scanning at the cursor inside the current line.
enum Scan {
  Token(TokenKind, usize),
  Unterminated,
}

/// Pull-based lexer. `loc` always points at the next unread byte.
pub struct Lexer {
  source: SourceLines,
  loc: Location,
  diagnostics: Vec<Diagnostic>,
}

impl Lexer {
  pub fn new(source: SourceLines) -> Self {
    let loc = Location::start(source.name().clone());
    Self {
      source,
      loc,
      diagnostics: Vec::new(),
    }
  }

  /// Recoverable problems reported so far.
  pub fn diagnostics(&self) -> &[Diagnostic] {
    &self.diagnostics
  }

  pub fn source(&self) -> &SourceLines {
    &self.source
  }

  fn next_line(&mut self) {
    self.source.advance();
    self.loc.row += 1;
    self.loc.column = 1;
  }

  /// Produce the next token. Returns `Eof` forever once input is exhausted;
  /// errors are fatal (pool exhaustion).
  pub fn next(&mut self, idents: &mut IdentPool, strings: &mut StringPool) -> CompileResult<Token> {
    loop {
      let Some(line) = self.source.peek() else {
        return Ok(Token::new(TokenKind::Eof, self.loc.clone()));
      };

      let mut col = self.loc.column - 1;
      while col < line.len() && line[col].is_ascii_whitespace() {
        col += 1;
      }
      if col >= line.len() || line[col..].starts_with(b"//") {
        self.next_line();
        continue;
      }

      let scanned = scan(&line[col..], idents, strings)?;
      self.loc.column = col + 1;
      let loc = self.loc.clone();

      let token = match scanned {
        Scan::Token(kind, width) => {
          self.loc.column += width;
          Token::new(kind, loc)
        }
        Scan::Unterminated => {
          self
            .diagnostics
            .push(Diagnostic::warning(loc.clone(), "string not closed"));
          warn!(%loc, "string not closed; skipping rest of line");
          self.next_line();
          Token::new(TokenKind::Illegal(b'"'), loc)
        }
      };
      trace!(loc = %token.loc, kind = token.kind.describe(), "token");
      return Ok(token);
    }
  }

  /// Drain the lexer, including the final `Eof`.
  pub fn tokenize_all(
    &mut self,
    idents: &mut IdentPool,
    strings: &mut StringPool,
  ) -> CompileResult<Vec<Token>> {
    let mut tokens = Vec::new();
    loop {
      let token = self.next(idents, strings)?;
      let done = token.is_eof();
      tokens.push(token);
      if done {
        return Ok(tokens);
      }
    }
  }
}

fn is_word_start(c: u8) -> bool {
  c.is_ascii_alphabetic() || c == b'_'
}

fn is_word_continue(c: u8) -> bool {
  c.is_ascii_alphanumeric() || c == b'_'
}

/// Classify the bytes at the start of `rest`, which is never empty and never
/// starts with whitespace.
fn scan(rest: &[u8], idents: &mut IdentPool, strings: &mut StringPool) -> CompileResult<Scan> {
  let c = rest[0];

  if is_word_start(c) {
    let len = rest.iter().take_while(|&&b| is_word_continue(b)).count();
    let word = &rest[..len];
    if let Some(keyword) = Keyword::from_word(word) {
      return Ok(Scan::Token(TokenKind::Keyword(keyword), len));
    }
    // Word bytes are ASCII, so this never fails.
    let text = std::str::from_utf8(word).unwrap_or_default();
    let ident = idents.intern(text)?;
    return Ok(Scan::Token(TokenKind::Ident(ident), len));
  }

  if let Some(punct) = Punct::COMPOUND
    .into_iter()
    .find(|p| rest.starts_with(p.as_str().as_bytes()))
  {
    return Ok(Scan::Token(TokenKind::Punct(punct), punct.as_str().len()));
  }

  if let Some(punct) = Punct::from_byte(c) {
    return Ok(Scan::Token(TokenKind::Punct(punct), 1));
  }

  if c.is_ascii_digit() {
    let len = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    let mut value: u64 = 0;
    let mut wrapped = false;
    for &digit in &rest[..len] {
      let next = value
        .checked_mul(10)
        .and_then(|v| v.checked_add(u64::from(digit - b'0')));
      value = next.unwrap_or_else(|| {
        wrapped = true;
        value.wrapping_mul(10).wrapping_add(u64::from(digit - b'0'))
      });
    }
    if wrapped {
      warn!(
        literal = %String::from_utf8_lossy(&rest[..len]),
        value,
        "integer literal overflows and wraps"
      );
    }
    return Ok(Scan::Token(TokenKind::Integer(value), len));
  }

  if c == b'"' {
    return scan_string(rest, strings);
  }

  Ok(Scan::Token(TokenKind::Illegal(c), 1))
}

fn scan_string(rest: &[u8], strings: &mut StringPool) -> CompileResult<Scan> {
  let mut bytes = Vec::new();
  let mut i = 1;
  while i < rest.len() {
    match rest[i] {
      b'"' => {
        let handle = strings.store(&bytes)?;
        return Ok(Scan::Token(TokenKind::Str(handle), i + 1));
      }
      b'\\' if i + 1 < rest.len() => {
        bytes.push(match rest[i + 1] {
          b'n' => b'\n',
          b't' => b'\t',
          b'r' => b'\r',
          b'0' => 0,
          other => other,
        });
        i += 2;
      }
      b => {
        bytes.push(b);
        i += 1;
      }
    }
  }
  Ok(Scan::Unterminated)
}
