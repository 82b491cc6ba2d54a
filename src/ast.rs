//! Arena-backed syntax tree.
//!
//! Every node lives in one `Vec` owned by [`Ast`]; parents reference their
//! children through a contiguous range of [`NodeId`]s in a shared side
//! table. Children are always finished before their parent is allocated, so
//! the tree is built bottom-up and can never contain a cycle.

use std::fmt::Write;
use std::ops::Range;

use crate::location::Location;
use crate::pool::{Ident, IdentPool};
use crate::tokenizer::Token;
use crate::ty::Type;

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
  /// Synthetic top-level node; children are statements in source order.
  Root,
  /// `name: type [= expr]`; children are `TypeRef` and optionally `Expression`.
  Declaration { name: Ident },
  /// `target = expr`; the single child is an `Expression`.
  Assignment { target: Ident },
  TypeRef(Type),
  /// Flat operand list: `value, op, value, op, value, ...`.
  Expression,
  /// `ret expr`; the single child is an `Expression`.
  Return,
  Identifier(Ident),
  IntegerLiteral(u64),
  AddOperator,
  MulOperator,
}

#[derive(Debug, Clone)]
pub struct Node {
  pub kind: NodeKind,
  pub token: Option<Token>,
  pub loc: Location,
  children: Range<u32>,
}

/// The syntax tree of one compiled unit.
#[derive(Debug, Clone, Default)]
pub struct Ast {
  nodes: Vec<Node>,
  child_ids: Vec<NodeId>,
  root: Option<NodeId>,
}

impl Ast {
  pub fn new() -> Self {
    Self::default()
  }

  /// Allocate a node whose children are already in the arena.
  pub fn alloc(
    &mut self,
    kind: NodeKind,
    token: Option<Token>,
    loc: Location,
    children: &[NodeId],
  ) -> NodeId {
    let start = self.child_ids.len() as u32;
    self.child_ids.extend_from_slice(children);
    let end = self.child_ids.len() as u32;
    let id = NodeId(self.nodes.len() as u32);
    self.nodes.push(Node {
      kind,
      token,
      loc,
      children: start..end,
    });
    id
  }

  /// Allocate the root node and remember it.
  pub fn set_root(&mut self, loc: Location, statements: &[NodeId]) -> NodeId {
    let root = self.alloc(NodeKind::Root, None, loc, statements);
    self.root = Some(root);
    root
  }

  pub fn root(&self) -> Option<NodeId> {
    self.root
  }

  pub fn node(&self, id: NodeId) -> &Node {
    &self.nodes[id.index()]
  }

  pub fn kind(&self, id: NodeId) -> NodeKind {
    self.node(id).kind
  }

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    let range = &self.node(id).children;
    &self.child_ids[range.start as usize..range.end as usize]
  }

  /// Top-level statements, empty when no root was set.
  pub fn statements(&self) -> &[NodeId] {
    match self.root {
      Some(root) => self.children(root),
      None => &[],
    }
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Indented outline of the tree, one node per line.
  pub fn dump(&self, idents: &IdentPool) -> String {
    let mut out = String::new();
    if let Some(root) = self.root {
      self.dump_node(root, 0, idents, &mut out);
    }
    out
  }

  fn dump_node(&self, id: NodeId, depth: usize, idents: &IdentPool, out: &mut String) {
    let label = match self.kind(id) {
      NodeKind::Root => "Root".to_string(),
      NodeKind::Declaration { name } => format!("Declaration({})", idents.resolve(name)),
      NodeKind::Assignment { target } => format!("Assignment({})", idents.resolve(target)),
      NodeKind::TypeRef(ty) => format!("TypeRef({ty})"),
      NodeKind::Expression => "Expression".to_string(),
      NodeKind::Return => "Return".to_string(),
      NodeKind::Identifier(name) => format!("Identifier({})", idents.resolve(name)),
      NodeKind::IntegerLiteral(value) => format!("Integer({value})"),
      NodeKind::AddOperator => "Add".to_string(),
      NodeKind::MulOperator => "Mul".to_string(),
    };
    let _ = writeln!(out, "{}{label}", "|   ".repeat(depth));
    for &child in self.children(id) {
      self.dump_node(child, depth + 1, idents, out);
    }
  }
}
