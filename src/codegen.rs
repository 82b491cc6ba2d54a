//! Code generation: lower the parsed AST into AT&T x86-64 assembly.
//!
//! The emitter uses a single accumulator. A leaf is loaded into `%eax`; each
//! following `(operator, value)` pair pushes the accumulator, loads the value,
//! moves it to `%edi`, pops the accumulator back and combines the two. Locals
//! live in the stack frame and are addressed relative to `%rbp`.

use std::fmt::Write;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::ast::{Ast, NodeId, NodeKind};
use crate::config::{Config, FramePolicy};
use crate::error::{CompileError, CompileResult, Diagnostic};
use crate::pool::{Ident, IdentPool};
use crate::ty::Type;

/// Size of one stack slot.
pub const WORD_SIZE: usize = 8;

const FRAME_ALIGN: usize = 16;

/// Bytes a local of type `ty` occupies: its size rounded up to whole words.
fn slot_width(ty: Type) -> usize {
  ty.size().div_ceil(WORD_SIZE) * WORD_SIZE
}

/// Flat identifier-to-slot map for one compiled unit.
///
/// Slots are handed out one word at a time and never reused. Declaring a
/// name again moves it to a fresh slot; the old offset is forgotten.
#[derive(Debug, Default)]
pub struct SymbolTable {
  offsets: FxHashMap<Ident, usize>,
  next_offset: usize,
  declarations: usize,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Allocate the next slot for `name` and return its offset below `%rbp`.
  pub fn declare(&mut self, name: Ident, ty: Type) -> usize {
    self.next_offset += slot_width(ty);
    self.declarations += 1;
    self.offsets.insert(name, self.next_offset);
    self.next_offset
  }

  pub fn lookup(&self, name: Ident) -> Option<usize> {
    self.offsets.get(&name).copied()
  }

  /// Number of names with an active slot.
  pub fn len(&self) -> usize {
    self.offsets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.offsets.is_empty()
  }

  /// Number of `declare` calls so far, repeats included.
  pub fn declarations(&self) -> usize {
    self.declarations
  }
}

/// Output of a generation run.
#[derive(Debug)]
pub struct Generated {
  pub asm: String,
  /// Non-fatal reports, such as reads of undeclared symbols.
  pub diagnostics: Vec<Diagnostic>,
}

/// Emit assembly for every top-level statement of `ast`.
pub fn generate(ast: &Ast, idents: &IdentPool, config: &Config) -> CompileResult<Generated> {
  let mut codegen = CodeGen {
    ast,
    idents,
    symbols: SymbolTable::new(),
    asm: String::new(),
    diagnostics: Vec::new(),
  };

  let frame = frame_size(ast, config.frame)?;
  codegen.emit_prologue(&config.entry_symbol, frame);

  for (i, &stmt) in ast.statements().iter().enumerate() {
    codegen.line(format_args!("# [{i}]"));
    codegen.emit_stmt(stmt)?;
  }

  Ok(Generated {
    asm: codegen.asm,
    diagnostics: codegen.diagnostics,
  })
}

/// Bytes to reserve below `%rbp` for the unit's declarations.
fn frame_size(ast: &Ast, policy: FramePolicy) -> CompileResult<usize> {
  let required: usize = ast
    .statements()
    .iter()
    .filter(|&&stmt| matches!(ast.kind(stmt), NodeKind::Declaration { .. }))
    .filter_map(|&stmt| match ast.children(stmt).first().map(|&c| ast.kind(c)) {
      Some(NodeKind::TypeRef(ty)) => Some(slot_width(ty)),
      _ => None,
    })
    .sum();

  match policy {
    FramePolicy::Computed => Ok(required.div_ceil(FRAME_ALIGN) * FRAME_ALIGN),
    FramePolicy::Fixed(reserved) if required > reserved => {
      Err(CompileError::FrameOverflow { required, reserved })
    }
    FramePolicy::Fixed(reserved) => Ok(reserved),
  }
}

struct CodeGen<'a> {
  ast: &'a Ast,
  idents: &'a IdentPool,
  symbols: SymbolTable,
  asm: String,
  diagnostics: Vec<Diagnostic>,
}

impl CodeGen<'_> {
  /// Write one indented instruction line.
  fn line(&mut self, args: std::fmt::Arguments<'_>) {
    let _ = writeln!(self.asm, "    {args}");
  }

  fn emit_prologue(&mut self, entry: &str, frame: usize) {
    let _ = write!(self.asm, "# HEAD:\n.global {entry}\n.text\n\n{entry}:\n");
    self.asm.push_str("    push %rbp\n");
    self.asm.push_str("    mov %rsp, %rbp\n");
    if frame > 0 {
      self.line(format_args!("sub ${frame}, %rsp"));
    }
    self.asm.push_str("\n# CODE:\n");
    debug!(frame, "emitted prologue");
  }

  fn error(&self, id: NodeId, message: impl Into<String>) -> CompileError {
    CompileError::codegen(self.ast.node(id).loc.clone(), message)
  }

  /// Slot of `name`, reporting and falling back to offset 0 when undeclared.
  fn slot(&mut self, id: NodeId, name: Ident) -> usize {
    if let Some(offset) = self.symbols.lookup(name) {
      return offset;
    }
    let loc = self.ast.node(id).loc.clone();
    let idents = self.idents;
    let name = idents.resolve(name);
    warn!(%loc, name, "undeclared symbol");
    self
      .diagnostics
      .push(Diagnostic::error(loc, format!("undeclared symbol '{name}'")));
    0
  }

  /// Low 32 bits of `value`, warning when the literal does not fit.
  fn immediate(&mut self, id: NodeId, value: u64) -> u32 {
    let imm = value as u32;
    if u64::from(imm) != value {
      let loc = self.ast.node(id).loc.clone();
      warn!(%loc, value, imm, "integer literal truncated to 32 bits");
      self.diagnostics.push(Diagnostic::warning(
        loc,
        format!("integer literal {value} does not fit in 32 bits; truncated to {imm}"),
      ));
    }
    imm
  }

  fn emit_stmt(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    let children = ast.children(id);
    match ast.kind(id) {
      NodeKind::Declaration { name } => {
        let ty = match children.first().map(|&c| ast.kind(c)) {
          Some(NodeKind::TypeRef(ty)) => ty,
          _ => return Err(self.error(id, "declaration without a type")),
        };
        let offset = self.symbols.declare(name, ty);
        debug!(name = self.idents.resolve(name), offset, "declared local");
        if let Some(&expr) = children.get(1) {
          self.emit_expr(expr)?;
          self.line(format_args!("movl %eax, -{offset}(%rbp)"));
        }
      }
      NodeKind::Assignment { target } => {
        let Some(&expr) = children.first() else {
          return Err(self.error(id, "assignment without a value"));
        };
        self.emit_expr(expr)?;
        let offset = self.slot(id, target);
        self.line(format_args!("movl %eax, -{offset}(%rbp)"));
      }
      NodeKind::Return => {
        let Some(&expr) = children.first() else {
          return Err(self.error(id, "return without a value"));
        };
        self.emit_expr(expr)?;
        self.asm.push_str("    mov %rbp, %rsp\n");
        self.asm.push_str("    pop %rbp\n");
        self.asm.push_str("    ret\n");
      }
      kind @ (NodeKind::Root
      | NodeKind::TypeRef(_)
      | NodeKind::Expression
      | NodeKind::Identifier(_)
      | NodeKind::IntegerLiteral(_)
      | NodeKind::AddOperator
      | NodeKind::MulOperator) => {
        return Err(self.error(id, format!("unhandled statement node {kind:?}")));
      }
    }
    Ok(())
  }

  /// Evaluate an `Expression` node into `%eax`.
  fn emit_expr(&mut self, id: NodeId) -> CompileResult<()> {
    if self.ast.kind(id) != NodeKind::Expression {
      return Err(self.error(
        id,
        format!("expected an expression, found {:?}", self.ast.kind(id)),
      ));
    }

    let ast = self.ast;
    let Some((&first, rest)) = ast.children(id).split_first() else {
      return Err(self.error(id, "empty expression"));
    };
    self.emit_load(first)?;

    for pair in rest.chunks(2) {
      let &[op, rhs] = pair else {
        return Err(self.error(pair[0], "operator without a right operand"));
      };
      self.asm.push_str("    push %rax\n");
      self.emit_load(rhs)?;
      self.asm.push_str("    movl %eax, %edi\n");
      self.asm.push_str("    pop %rax\n");
      match self.ast.kind(op) {
        NodeKind::AddOperator => self.asm.push_str("    addl %edi, %eax\n"),
        NodeKind::MulOperator => self.asm.push_str("    imull %edi, %eax\n"),
        kind @ (NodeKind::Root
        | NodeKind::Declaration { .. }
        | NodeKind::Assignment { .. }
        | NodeKind::TypeRef(_)
        | NodeKind::Expression
        | NodeKind::Return
        | NodeKind::Identifier(_)
        | NodeKind::IntegerLiteral(_)) => {
          return Err(self.error(op, format!("unknown binary operator {kind:?}")));
        }
      }
    }
    Ok(())
  }

  /// Load a literal or a local into `%eax`.
  fn emit_load(&mut self, id: NodeId) -> CompileResult<()> {
    match self.ast.kind(id) {
      NodeKind::IntegerLiteral(value) => {
        let imm = self.immediate(id, value);
        self.line(format_args!("movl ${imm}, %eax"));
      }
      NodeKind::Identifier(name) => {
        let offset = self.slot(id, name);
        self.line(format_args!("movl -{offset}(%rbp), %eax"));
      }
      kind @ (NodeKind::Root
      | NodeKind::Declaration { .. }
      | NodeKind::Assignment { .. }
      | NodeKind::TypeRef(_)
      | NodeKind::Expression
      | NodeKind::Return
      | NodeKind::AddOperator
      | NodeKind::MulOperator) => {
        return Err(self.error(id, format!("unexpected node in operand position: {kind:?}")));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::location::Location;
  use crate::parser::parse;
  use crate::pool::StringPool;
  use crate::source::SourceLines;
  use crate::tokenizer::Lexer;
  use std::rc::Rc;

  fn compile(src: &str, config: &Config) -> CompileResult<Generated> {
    let mut idents = IdentPool::default();
    let mut strings = StringPool::default();
    let mut lexer = Lexer::new(SourceLines::from_source("gen.cm", src));
    let ast = parse(&mut lexer, &mut idents, &mut strings)?;
    generate(&ast, &idents, config)
  }

  fn loc() -> Location {
    Location::start(Rc::from("gen.cm"))
  }

  #[test]
  fn redeclaration_overwrites_offset() {
    let mut idents = IdentPool::default();
    let x = idents.intern("x").unwrap();
    let mut symbols = SymbolTable::new();
    let first = symbols.declare(x, Type::Int);
    let second = symbols.declare(x, Type::Int);
    assert_eq!((first, second), (8, 16));
    assert_eq!(symbols.declarations(), 2);
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols.lookup(x), Some(second));
  }

  #[test]
  fn emits_full_listing() {
    let out = compile("x: int = 2 * 3;\nret x;\n", &Config::default()).unwrap();
    assert!(out.diagnostics.is_empty());
    assert_eq!(
      out.asm,
      "# HEAD:\n\
       .global main\n\
       .text\n\
       \n\
       main:\n    push %rbp\n    mov %rsp, %rbp\n    sub $16, %rsp\n\
       \n\
       # CODE:\n    # [0]\n    movl $2, %eax\n    push %rax\n    movl $3, %eax\n    movl %eax, %edi\n    pop %rax\n    imull %edi, %eax\n    movl %eax, -8(%rbp)\n    # [1]\n    movl -8(%rbp), %eax\n    mov %rbp, %rsp\n    pop %rbp\n    ret\n"
    );
  }

  #[test]
  fn no_locals_means_no_frame_reservation() {
    let out = compile("ret 7;", &Config::default()).unwrap();
    assert!(!out.asm.contains("sub $"));
  }

  #[test]
  fn computed_frame_is_16_byte_aligned() {
    let out = compile("a: int = 1;\nb: int = 2;\nc: int = 3;\nret c;", &Config::default()).unwrap();
    assert!(out.asm.contains("    sub $32, %rsp\n"));
    assert!(out.asm.contains("movl %eax, -24(%rbp)"));
  }

  #[test]
  fn fixed_frame_is_kept_when_large_enough() {
    let config = Config {
      frame: FramePolicy::Fixed(64),
      ..Config::default()
    };
    let out = compile("a: int = 1;\nret a;", &config).unwrap();
    assert!(out.asm.contains("    sub $64, %rsp\n"));
  }

  #[test]
  fn fixed_frame_overflow_is_fatal() {
    let config = Config {
      frame: FramePolicy::Fixed(8),
      ..Config::default()
    };
    let err = compile("a: int = 1;\nb: int = 2;\nret a;", &config).unwrap_err();
    assert!(matches!(
      err,
      CompileError::FrameOverflow {
        required: 16,
        reserved: 8
      }
    ));
  }

  #[test]
  fn custom_entry_symbol() {
    let config = Config {
      entry_symbol: "start".to_string(),
      ..Config::default()
    };
    let out = compile("ret 0;", &config).unwrap();
    assert!(out.asm.starts_with("# HEAD:\n.global start\n.text\n\nstart:\n"));
  }

  #[test]
  fn undeclared_assignment_is_reported() {
    let out = compile("y = 1;", &Config::default()).unwrap();
    assert!(out.diagnostics.iter().any(Diagnostic::is_error));
    assert_eq!(out.diagnostics.len(), 1);
    assert_eq!(out.diagnostics[0].message, "undeclared symbol 'y'");
    assert_eq!(out.diagnostics[0].loc.row, 1);
  }

  #[test]
  fn undeclared_read_is_reported() {
    let out = compile("ret z + 1;", &Config::default()).unwrap();
    assert_eq!(out.diagnostics[0].message, "undeclared symbol 'z'");
  }

  #[test]
  fn empty_expression_is_fatal() {
    let mut ast = Ast::new();
    let expr = ast.alloc(NodeKind::Expression, None, loc(), &[]);
    let ret = ast.alloc(NodeKind::Return, None, loc(), &[expr]);
    ast.set_root(loc(), &[ret]);
    let err = generate(&ast, &IdentPool::default(), &Config::default()).unwrap_err();
    assert_eq!(err.to_string(), "gen.cm:1:1: empty expression");
  }

  #[test]
  fn return_of_non_expression_is_fatal() {
    let mut ast = Ast::new();
    let lit = ast.alloc(NodeKind::IntegerLiteral(1), None, loc(), &[]);
    let ret = ast.alloc(NodeKind::Return, None, loc(), &[lit]);
    ast.set_root(loc(), &[ret]);
    let err = generate(&ast, &IdentPool::default(), &Config::default()).unwrap_err();
    assert!(err.to_string().contains("expected an expression"));
  }

  #[test]
  fn operator_in_value_position_is_fatal() {
    let mut ast = Ast::new();
    let one = ast.alloc(NodeKind::IntegerLiteral(1), None, loc(), &[]);
    let bad = ast.alloc(NodeKind::Return, None, loc(), &[]);
    let two = ast.alloc(NodeKind::IntegerLiteral(2), None, loc(), &[]);
    let expr = ast.alloc(NodeKind::Expression, None, loc(), &[one, bad, two]);
    let ret = ast.alloc(NodeKind::Return, None, loc(), &[expr]);
    ast.set_root(loc(), &[ret]);
    let err = generate(&ast, &IdentPool::default(), &Config::default()).unwrap_err();
    assert!(err.to_string().contains("unknown binary operator"));
  }

  #[test]
  fn dangling_operator_is_fatal() {
    let mut ast = Ast::new();
    let one = ast.alloc(NodeKind::IntegerLiteral(1), None, loc(), &[]);
    let add = ast.alloc(NodeKind::AddOperator, None, loc(), &[]);
    let expr = ast.alloc(NodeKind::Expression, None, loc(), &[one, add]);
    let ret = ast.alloc(NodeKind::Return, None, loc(), &[expr]);
    ast.set_root(loc(), &[ret]);
    let err = generate(&ast, &IdentPool::default(), &Config::default()).unwrap_err();
    assert!(err.to_string().contains("operator without a right operand"));
  }

  #[test]
  fn top_level_expression_is_not_a_statement() {
    let mut ast = Ast::new();
    let one = ast.alloc(NodeKind::IntegerLiteral(1), None, loc(), &[]);
    let expr = ast.alloc(NodeKind::Expression, None, loc(), &[one]);
    ast.set_root(loc(), &[expr]);
    let err = generate(&ast, &IdentPool::default(), &Config::default()).unwrap_err();
    assert!(err.to_string().contains("unhandled statement node Expression"));
  }

  #[test]
  fn frame_covers_every_declared_slot() {
    let src = "a: int;\nb: int;\nc: int;\nd: int;\ne: int;\nret 0;";
    let out = compile(src, &Config::default()).unwrap();
    let deepest = 5 * slot_width(Type::Int);
    let frame = deepest.div_ceil(FRAME_ALIGN) * FRAME_ALIGN;
    assert!(out.asm.contains(&format!("    sub ${frame}, %rsp\n")));

    let config = Config {
      frame: FramePolicy::Fixed(deepest - 1),
      ..Config::default()
    };
    let err = compile(src, &config).unwrap_err();
    assert!(matches!(err, CompileError::FrameOverflow { required, .. } if required == deepest));
  }

  #[test]
  fn wide_literal_is_truncated_with_warning() {
    let out = compile("ret 4294967298;", &Config::default()).unwrap();
    assert!(out.asm.contains("    movl $2, %eax\n"));
    assert_eq!(out.diagnostics.len(), 1);
    assert!(!out.diagnostics[0].is_error());
    assert_eq!(
      out.diagnostics[0].message,
      "integer literal 4294967298 does not fit in 32 bits; truncated to 2"
    );
  }

  #[test]
  fn largest_32_bit_literal_is_kept() {
    let out = compile("ret 4294967295;", &Config::default()).unwrap();
    assert!(out.asm.contains("    movl $4294967295, %eax\n"));
    assert!(out.diagnostics.is_empty());
  }
}
