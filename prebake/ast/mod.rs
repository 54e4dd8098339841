// Copyright 2026 the Prebake authors. MIT license.

//! The module syntax shapes the pipeline inspects.
//!
//! The concrete parser and printer for the source language live outside
//! this crate behind [`SourceParser`]; only the node shapes below are
//! meaningful to the core. Anything else a parser produces is carried
//! as [`Expr::Opaque`] / [`Item::Opaque`] and flows through unchanged.

pub mod comments;

use async_trait::async_trait;

use crate::specifier::ModuleId;

pub use comments::BindStage;
pub use comments::Comment;

/// A parsed module body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
  pub items: Vec<Item>,
}

impl Program {
  pub fn new(items: Vec<Item>) -> Self {
    Self { items }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
  Import(ImportDeclaration),
  ExportNamed(ExportNamedDeclaration),
  ExportDefault(ExportDefaultDeclaration),
  ExportAll(ExportAllDeclaration),
  Var(VariableDeclaration),
  Func(FunctionDeclaration),
  Stmt(ExpressionStatement),
  /// A statement the core does not inspect.
  Opaque,
}

/// A string literal node. The rewriter matches dependency specifiers
/// against these by identity, so they keep their source line.
#[derive(Debug, Clone, PartialEq)]
pub struct StrLit {
  pub value: String,
  pub line: u32,
}

impl StrLit {
  pub fn new(value: impl Into<String>, line: u32) -> Self {
    Self {
      value: value.into(),
      line,
    }
  }
}

/// An identifier at a binding site, carrying the leading comments the
/// stage annotation scan inspects.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
  pub name: String,
  pub line: u32,
  pub leading_comments: Vec<Comment>,
}

impl Ident {
  pub fn new(name: impl Into<String>, line: u32) -> Self {
    Self {
      name: name.into(),
      line,
      leading_comments: Vec::new(),
    }
  }

  pub fn with_comment(mut self, text: &str) -> Self {
    self.leading_comments.push(Comment::new(text));
    self
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDeclaration {
  pub specifier: StrLit,
  pub default_binding: Option<Ident>,
  pub namespace_binding: Option<Ident>,
  pub named: Vec<ImportSpecifier>,
  pub leading_comments: Vec<Comment>,
  pub line: u32,
}

/// One named import: `{ remote as local }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpecifier {
  pub remote: String,
  pub local: Ident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportNamedDeclaration {
  pub declaration: Option<Declaration>,
  pub specifiers: Vec<ExportSpecifier>,
  pub source: Option<StrLit>,
  pub leading_comments: Vec<Comment>,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
  Var(VariableDeclaration),
  Func(FunctionDeclaration),
}

/// One export specifier: `{ local as exported }`. With a source this is
/// a re-export and `local` names the binding in the source module.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSpecifier {
  pub local: Ident,
  pub exported: Option<Ident>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportDefaultDeclaration {
  /// The local name, when the default export is a named declaration.
  pub binding: Option<Ident>,
  pub leading_comments: Vec<Comment>,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportAllDeclaration {
  pub specifier: StrLit,
  /// `export * as alias from '...'`.
  pub alias: Option<Ident>,
  pub leading_comments: Vec<Comment>,
  pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
  Const,
  Let,
  Var,
}

impl VarKind {
  /// Whether bindings of this kind are unrepeatable single assignments,
  /// the only form stage annotations are honored on.
  pub fn is_single_assignment(self) -> bool {
    matches!(self, VarKind::Const)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
  pub kind: VarKind,
  pub declarators: Vec<VariableDeclarator>,
  pub leading_comments: Vec<Comment>,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclarator {
  pub pattern: Pattern,
  pub init: Option<Expr>,
}

/// A function declaration. The body is not inspected by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
  pub ident: Ident,
  pub leading_comments: Vec<Comment>,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
  Ident(Ident),
  Object(ObjectPattern),
  Array(ArrayPattern),
  /// A pattern with a default value; the default is not inspected.
  Assign(Box<Pattern>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPattern {
  pub props: Vec<ObjectPatternProp>,
  pub rest: Option<Ident>,
  pub line: u32,
}

/// `{ key: value }` in a destructuring pattern; shorthand `{ a }` has
/// `key == "a"` and an identifier pattern for the value.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatternProp {
  pub key: String,
  pub value: Pattern,
  pub leading_comments: Vec<Comment>,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayPattern {
  pub elements: Vec<Option<Pattern>>,
  pub rest: Option<Box<Pattern>>,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionStatement {
  pub expr: Expr,
  pub leading_comments: Vec<Comment>,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Call(CallExpression),
  Member(MemberExpression),
  Assign(Box<AssignmentExpression>),
  Ident(Ident),
  Lit(Lit),
  Object(ObjectLit),
  /// An expression the core does not inspect.
  Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
  pub callee: Box<Expr>,
  pub args: Vec<Expr>,
  pub line: u32,
}

/// A static member access `obj.prop`; computed members reach the core
/// as [`Expr::Opaque`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpression {
  pub obj: Box<Expr>,
  pub prop: String,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpression {
  pub target: Expr,
  pub value: Expr,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
  Str(StrLit),
  Num(f64),
  Bool(bool),
  Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLit {
  pub props: Vec<ObjectLitProp>,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectLitProp {
  KeyValue {
    key: String,
    value: Expr,
    leading_comments: Vec<Comment>,
    line: u32,
  },
  Spread {
    expr: Expr,
    line: u32,
  },
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error: {message}")]
pub struct ParseError {
  pub message: String,
  pub line: Option<u32>,
}

impl ParseError {
  pub fn new(message: impl Into<String>, line: Option<u32>) -> Self {
    Self {
      message: message.into(),
      line,
    }
  }
}

/// The external parser peer. The pipeline suspends at parse calls.
#[async_trait(?Send)]
pub trait SourceParser {
  async fn parse(
    &self,
    id: &ModuleId,
    source: &str,
  ) -> Result<Program, ParseError>;
}
