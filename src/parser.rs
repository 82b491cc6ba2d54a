//! Recursive-descent parser producing the statement list of one unit.
//!
//! The parser pulls tokens from the lexer on demand and never looks further
//! than one token ahead. Once a rule has committed to a branch, any token
//! that does not fit is a fatal syntax error; there is no recovery.
//!
//! ```text
//! program    := statement* EOF
//! statement  := "ret" expr
//!             | IDENT ":" type ["=" expr]
//!             | IDENT "=" expr
//! type       := "int"
//! expr       := primary (("+"|"*") primary)* ";"
//! primary    := INTEGER | IDENT
//! ```
//!
//! `expr` consumes its own terminating `;`, so statement rules never expect
//! one after an expression. Operators are kept flat and evaluated left to
//! right; `+` and `*` share one precedence level.

use tracing::debug;

use crate::ast::{Ast, NodeId, NodeKind};
use crate::error::{CompileError, CompileResult};
use crate::location::Location;
use crate::pool::{Ident, IdentPool, StringPool};
use crate::tokenizer::{Keyword, Lexer, Punct, Token, TokenKind};
use crate::ty::Type;

/// Parse a whole unit, driving `lexer` until `Eof`.
pub fn parse(
  lexer: &mut Lexer,
  idents: &mut IdentPool,
  strings: &mut StringPool,
) -> CompileResult<Ast> {
  Parser::new(lexer, idents, strings).parse_program()
}

struct Parser<'a> {
  lexer: &'a mut Lexer,
  idents: &'a mut IdentPool,
  strings: &'a mut StringPool,
  peeked: Option<Token>,
  ast: Ast,
}

impl<'a> Parser<'a> {
  fn new(lexer: &'a mut Lexer, idents: &'a mut IdentPool, strings: &'a mut StringPool) -> Self {
    Self {
      lexer,
      idents,
      strings,
      peeked: None,
      ast: Ast::new(),
    }
  }

  /// Current token, pulling it from the lexer on first access.
  fn peek(&mut self) -> CompileResult<&Token> {
    let token = match self.peeked.take() {
      Some(token) => token,
      None => self.lexer.next(self.idents, self.strings)?,
    };
    Ok(self.peeked.insert(token))
  }

  /// Consume and return the current token.
  fn bump(&mut self) -> CompileResult<Token> {
    match self.peeked.take() {
      Some(token) => Ok(token),
      None => self.lexer.next(self.idents, self.strings),
    }
  }

  fn at_punct(&mut self, punct: Punct) -> CompileResult<bool> {
    Ok(self.peek()?.kind == TokenKind::Punct(punct))
  }

  /// Consume the current token if it is `punct`.
  fn accept_punct(&mut self, punct: Punct) -> CompileResult<Option<Token>> {
    if self.at_punct(punct)? {
      return self.bump().map(Some);
    }
    Ok(None)
  }

  fn expect_punct(&mut self, punct: Punct) -> CompileResult<Token> {
    match self.accept_punct(punct)? {
      Some(token) => Ok(token),
      None => Err(self.unexpected(&format!("'{}'", punct.name()))),
    }
  }

  /// Fatal error for the current token.
  fn unexpected(&mut self, expected: &str) -> CompileError {
    let token = match self.peek() {
      Ok(token) => token.clone(),
      Err(err) => return err,
    };
    let found = token.display(self.idents, self.strings).to_string();
    let line = self.lexer.source().line_text(token.loc.row);
    CompileError::syntax(token.loc, line, expected, found)
  }

  fn parse_program(mut self) -> CompileResult<Ast> {
    let start = self.peek()?.loc.clone();
    let mut statements = Vec::new();
    while !self.peek()?.is_eof() {
      let statement = self.parse_statement()?;
      statements.push(statement);
    }
    let root_loc = Location::start(start.file);
    self.ast.set_root(root_loc, &statements);
    debug!(statements = statements.len(), nodes = self.ast.len(), "parsed unit");
    Ok(self.ast)
  }

  fn parse_statement(&mut self) -> CompileResult<NodeId> {
    let kind = self.peek()?.kind;
    match kind {
      TokenKind::Keyword(Keyword::Ret) => {
        let ret = self.bump()?;
        self.parse_return(ret)
      }
      TokenKind::Ident(ident) => {
        let name = self.bump()?;
        if self.accept_punct(Punct::Colon)?.is_some() {
          return self.parse_declaration(ident, name);
        }
        if self.accept_punct(Punct::Equal)?.is_some() {
          return self.parse_assignment(ident, name);
        }
        Err(self.unexpected("'colon' or 'equal'"))
      }
      _ => Err(self.unexpected("start of statement ('ret' or identifier)")),
    }
  }

  fn parse_return(&mut self, ret: Token) -> CompileResult<NodeId> {
    let expr = self.parse_expr()?;
    debug!(loc = %ret.loc, "return statement");
    let loc = ret.loc.clone();
    Ok(self.ast.alloc(NodeKind::Return, Some(ret), loc, &[expr]))
  }

  fn parse_declaration(&mut self, ident: Ident, name: Token) -> CompileResult<NodeId> {
    let ty = self.parse_type()?;
    let mut children = vec![ty];
    if self.accept_punct(Punct::Equal)?.is_some() {
      children.push(self.parse_expr()?);
    } else {
      self.expect_punct(Punct::Semicolon)?;
    }
    debug!(loc = %name.loc, name = self.idents.resolve(ident), "declaration");
    let loc = name.loc.clone();
    Ok(self.ast.alloc(
      NodeKind::Declaration { name: ident },
      Some(name),
      loc,
      &children,
    ))
  }

  fn parse_assignment(&mut self, ident: Ident, name: Token) -> CompileResult<NodeId> {
    let expr = self.parse_expr()?;
    debug!(loc = %name.loc, target = self.idents.resolve(ident), "assignment");
    let loc = name.loc.clone();
    Ok(self.ast.alloc(
      NodeKind::Assignment { target: ident },
      Some(name),
      loc,
      &[expr],
    ))
  }

  fn parse_type(&mut self) -> CompileResult<NodeId> {
    let ty = match self.peek()?.kind {
      TokenKind::Keyword(keyword) => Type::from_keyword(keyword),
      _ => None,
    };
    let Some(ty) = ty else {
      return Err(self.unexpected("type ('int')"));
    };
    let token = self.bump()?;
    let loc = token.loc.clone();
    Ok(self.ast.alloc(NodeKind::TypeRef(ty), Some(token), loc, &[]))
  }

  fn parse_expr(&mut self) -> CompileResult<NodeId> {
    let loc = self.peek()?.loc.clone();
    let mut operands = vec![self.parse_primary()?];

    loop {
      let op = match self.peek()?.kind {
        TokenKind::Punct(Punct::Plus) => NodeKind::AddOperator,
        TokenKind::Punct(Punct::Star) => NodeKind::MulOperator,
        _ => break,
      };
      let token = self.bump()?;
      let op_loc = token.loc.clone();
      operands.push(self.ast.alloc(op, Some(token), op_loc, &[]));
      operands.push(self.parse_primary()?);
    }
    self.expect_punct(Punct::Semicolon)?;

    Ok(self.ast.alloc(NodeKind::Expression, None, loc, &operands))
  }

  fn parse_primary(&mut self) -> CompileResult<NodeId> {
    let kind = match self.peek()?.kind {
      TokenKind::Integer(value) => NodeKind::IntegerLiteral(value),
      TokenKind::Ident(ident) => NodeKind::Identifier(ident),
      _ => return Err(self.unexpected("primary expression (integer or identifier)")),
    };
    let token = self.bump()?;
    let loc = token.loc.clone();
    Ok(self.ast.alloc(kind, Some(token), loc, &[]))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::SourceLines;

  fn parse_src(src: &str) -> (CompileResult<Ast>, IdentPool) {
    let mut idents = IdentPool::default();
    let mut strings = StringPool::default();
    let mut lexer = Lexer::new(SourceLines::from_source("test.cm", src));
    let ast = parse(&mut lexer, &mut idents, &mut strings);
    (ast, idents)
  }

  fn dump(src: &str) -> String {
    let (ast, idents) = parse_src(src);
    ast.unwrap().dump(&idents)
  }

  fn error(src: &str) -> String {
    let (ast, _) = parse_src(src);
    ast.unwrap_err().to_string()
  }

  #[test]
  fn declaration_and_return() {
    assert_eq!(
      dump("x: int = 2 + 3;\nret x;\n"),
      "Root\n\
       |   Declaration(x)\n\
       |   |   TypeRef(int)\n\
       |   |   Expression\n\
       |   |   |   Integer(2)\n\
       |   |   |   Add\n\
       |   |   |   Integer(3)\n\
       |   Return\n\
       |   |   Expression\n\
       |   |   |   Identifier(x)\n"
    );
  }

  #[test]
  fn operators_stay_flat_left_to_right() {
    let (ast, _) = parse_src("a: int = 1 + 2 * 3 + 4;");
    let ast = ast.unwrap();
    let decl = ast.statements()[0];
    let expr = ast.children(decl)[1];
    let kinds: Vec<_> = ast.children(expr).iter().map(|&id| ast.kind(id)).collect();
    assert_eq!(
      kinds,
      [
        NodeKind::IntegerLiteral(1),
        NodeKind::AddOperator,
        NodeKind::IntegerLiteral(2),
        NodeKind::MulOperator,
        NodeKind::IntegerLiteral(3),
        NodeKind::AddOperator,
        NodeKind::IntegerLiteral(4),
      ]
    );
  }

  #[test]
  fn declaration_without_initializer_consumes_semicolon() {
    assert_eq!(
      dump("x: int;\nx = 4;"),
      "Root\n\
       |   Declaration(x)\n\
       |   |   TypeRef(int)\n\
       |   Assignment(x)\n\
       |   |   Expression\n\
       |   |   |   Integer(4)\n"
    );
  }

  #[test]
  fn empty_program_has_empty_root() {
    assert_eq!(dump("// nothing here\n"), "Root\n");
  }

  #[test]
  fn nodes_carry_locations() {
    let (ast, _) = parse_src("\n  y = 1;");
    let ast = ast.unwrap();
    let assign = ast.node(ast.statements()[0]);
    assert_eq!((assign.loc.row, assign.loc.column), (2, 3));
    assert!(assign.token.is_some());
  }

  #[test]
  fn missing_semicolon_is_fatal() {
    assert_eq!(
      error("ret 1\nret 2;"),
      "test.cm:2:1: expected 'semicolon', but got KEYWORD(ret)\nret 2;\n^"
    );
  }

  #[test]
  fn bad_statement_start() {
    let msg = error("  ; ret 1;");
    assert!(msg.starts_with("test.cm:1:3: expected start of statement"), "{msg}");
    assert!(msg.ends_with("  ; ret 1;\n  ^"), "{msg}");
  }

  #[test]
  fn identifier_needs_colon_or_equal() {
    let msg = error("x + 1;");
    assert!(msg.contains("expected 'colon' or 'equal', but got PLUS"), "{msg}");
  }

  #[test]
  fn only_int_is_a_type() {
    let msg = error("x: float = 1;");
    assert!(msg.contains("expected type ('int'), but got KEYWORD(float)"), "{msg}");
  }

  #[test]
  fn illegal_token_is_a_syntax_error() {
    let msg = error("x: int = \"abc\n");
    assert!(
      msg.contains("expected primary expression (integer or identifier), but got ILLEGAL(\")"),
      "{msg}"
    );
  }

  #[test]
  fn string_operand_is_rejected() {
    let msg = error("ret \"s\";");
    assert!(msg.contains("but got STRING(\"s\")"), "{msg}");
  }
}
