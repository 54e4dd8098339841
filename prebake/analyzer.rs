// Copyright 2026 the Prebake authors. MIT license.

//! Extracts structured import/export findings from a parsed module:
//! declaration-style linkage, require-style linkage, and the stage
//! annotation attached to each bound symbol. The extractor never
//! mutates the program it walks.

use std::collections::HashSet;

use crate::ast;
use crate::ast::comments::stage_from_comments;
use crate::ast::BindStage;
use crate::ast::Comment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
  Import,
  Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
  Declaration,
  RequireLike,
}

/// A symbol name on either side of a binding: a plain name, the default
/// binding, a whole namespace, or nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolName {
  Name(String),
  Default,
  Star,
  None,
}

impl SymbolName {
  fn name(name: impl Into<String>) -> Self {
    SymbolName::Name(name.into())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFinding {
  pub remote: SymbolName,
  pub local: SymbolName,
  pub stage: Option<BindStage>,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
  pub kind: FindingKind,
  pub link: LinkType,
  pub specifier: Option<ast::StrLit>,
  pub symbols: Vec<SymbolFinding>,
  pub line: u32,
}

/// Walks `program` and returns its linkage findings. `analyze_require`
/// controls whether require-style linkage is extracted at all.
pub fn analyze(program: &ast::Program, analyze_require: bool) -> Vec<Finding> {
  let scope = module_scope_bindings(program);
  let mut findings = Vec::new();
  for item in &program.items {
    match item {
      ast::Item::Import(decl) => findings.push(import_finding(decl)),
      ast::Item::ExportNamed(decl) => {
        findings.extend(export_named_findings(decl))
      }
      ast::Item::ExportDefault(decl) => {
        findings.push(export_default_finding(decl))
      }
      ast::Item::ExportAll(decl) => findings.push(export_all_finding(decl)),
      ast::Item::Var(decl) if analyze_require => {
        findings.extend(require_import_findings(decl, &scope))
      }
      ast::Item::Stmt(stmt) if analyze_require => {
        findings.extend(statement_findings(stmt, &scope))
      }
      _ => {}
    }
  }
  findings
}

/// The names bound at module scope, used to decide whether `require`,
/// `exports` and `module` are free.
fn module_scope_bindings(program: &ast::Program) -> HashSet<String> {
  let mut names = HashSet::new();
  for item in &program.items {
    match item {
      ast::Item::Var(decl) => {
        for declarator in &decl.declarators {
          pattern_names(&declarator.pattern, &mut names);
        }
      }
      ast::Item::Func(decl) => {
        names.insert(decl.ident.name.clone());
      }
      ast::Item::Import(decl) => {
        if let Some(default) = &decl.default_binding {
          names.insert(default.name.clone());
        }
        if let Some(namespace) = &decl.namespace_binding {
          names.insert(namespace.name.clone());
        }
        for specifier in &decl.named {
          names.insert(specifier.local.name.clone());
        }
      }
      ast::Item::ExportNamed(decl) => match &decl.declaration {
        Some(ast::Declaration::Var(var)) => {
          for declarator in &var.declarators {
            pattern_names(&declarator.pattern, &mut names);
          }
        }
        Some(ast::Declaration::Func(func)) => {
          names.insert(func.ident.name.clone());
        }
        None => {}
      },
      _ => {}
    }
  }
  names
}

fn pattern_names(pattern: &ast::Pattern, names: &mut HashSet<String>) {
  match pattern {
    ast::Pattern::Ident(ident) => {
      names.insert(ident.name.clone());
    }
    ast::Pattern::Object(object) => {
      for prop in &object.props {
        pattern_names(&prop.value, names);
      }
      if let Some(rest) = &object.rest {
        names.insert(rest.name.clone());
      }
    }
    ast::Pattern::Array(array) => {
      for element in array.elements.iter().flatten() {
        pattern_names(element, names);
      }
      if let Some(rest) = &array.rest {
        pattern_names(rest, names);
      }
    }
    ast::Pattern::Assign(inner) => pattern_names(inner, names),
  }
}

/// Stage of a binding: the nearest annotation on the binding itself,
/// else the enclosing declaration. Not honored on repeatable binding
/// forms.
fn stage_of(
  binding_comments: &[Comment],
  declaration_comments: &[Comment],
  honored: bool,
) -> Option<BindStage> {
  if !honored {
    return None;
  }
  stage_from_comments(binding_comments)
    .or_else(|| stage_from_comments(declaration_comments))
}

fn import_finding(decl: &ast::ImportDeclaration) -> Finding {
  let mut symbols = Vec::new();
  if let Some(default) = &decl.default_binding {
    symbols.push(SymbolFinding {
      remote: SymbolName::Default,
      local: SymbolName::name(&default.name),
      stage: stage_of(&default.leading_comments, &decl.leading_comments, true),
      line: default.line,
    });
  }
  if let Some(namespace) = &decl.namespace_binding {
    symbols.push(SymbolFinding {
      remote: SymbolName::Star,
      local: SymbolName::name(&namespace.name),
      stage: stage_of(
        &namespace.leading_comments,
        &decl.leading_comments,
        true,
      ),
      line: namespace.line,
    });
  }
  for specifier in &decl.named {
    symbols.push(SymbolFinding {
      remote: SymbolName::name(&specifier.remote),
      local: SymbolName::name(&specifier.local.name),
      stage: stage_of(
        &specifier.local.leading_comments,
        &decl.leading_comments,
        true,
      ),
      line: specifier.local.line,
    });
  }
  Finding {
    kind: FindingKind::Import,
    link: LinkType::Declaration,
    specifier: Some(decl.specifier.clone()),
    symbols,
    line: decl.line,
  }
}

fn export_named_findings(decl: &ast::ExportNamedDeclaration) -> Vec<Finding> {
  let mut symbols = Vec::new();
  match &decl.declaration {
    Some(ast::Declaration::Var(var)) => {
      let honored = var.kind.is_single_assignment();
      for declarator in &var.declarators {
        exported_pattern_symbols(
          &declarator.pattern,
          &var.leading_comments,
          honored,
          &mut symbols,
        );
      }
    }
    Some(ast::Declaration::Func(func)) => {
      symbols.push(SymbolFinding {
        remote: SymbolName::name(&func.ident.name),
        local: SymbolName::name(&func.ident.name),
        stage: stage_of(
          &func.ident.leading_comments,
          &func.leading_comments,
          true,
        ),
        line: func.line,
      });
    }
    None => {}
  }
  for specifier in &decl.specifiers {
    let exported = specifier.exported.as_ref().unwrap_or(&specifier.local);
    let (remote, local) = if decl.source.is_some() {
      // Re-export: the far side is the source module's binding.
      (
        SymbolName::name(&specifier.local.name),
        SymbolName::name(&exported.name),
      )
    } else {
      (
        SymbolName::name(&exported.name),
        SymbolName::name(&specifier.local.name),
      )
    };
    symbols.push(SymbolFinding {
      remote,
      local,
      stage: stage_of(
        &specifier.local.leading_comments,
        &decl.leading_comments,
        true,
      ),
      line: specifier.local.line,
    });
  }
  vec![Finding {
    kind: FindingKind::Export,
    link: LinkType::Declaration,
    specifier: decl.source.clone(),
    symbols,
    line: decl.line,
  }]
}

/// Destructuring traversal for `export const { .. } = ..`; every bound
/// name surfaces under its own name.
fn exported_pattern_symbols(
  pattern: &ast::Pattern,
  declaration_comments: &[Comment],
  honored: bool,
  symbols: &mut Vec<SymbolFinding>,
) {
  match pattern {
    ast::Pattern::Ident(ident) => {
      symbols.push(SymbolFinding {
        remote: SymbolName::name(&ident.name),
        local: SymbolName::name(&ident.name),
        stage: stage_of(&ident.leading_comments, declaration_comments, honored),
        line: ident.line,
      });
    }
    ast::Pattern::Object(object) => {
      for prop in &object.props {
        if let ast::Pattern::Ident(ident) = innermost_binding(&prop.value) {
          symbols.push(SymbolFinding {
            remote: SymbolName::name(&ident.name),
            local: SymbolName::name(&ident.name),
            stage: stage_of(
              &merged_comments(prop, ident),
              declaration_comments,
              honored,
            ),
            line: ident.line,
          });
        } else {
          exported_pattern_symbols(
            &prop.value,
            declaration_comments,
            honored,
            symbols,
          );
        }
      }
      if let Some(rest) = &object.rest {
        symbols.push(SymbolFinding {
          remote: SymbolName::name(&rest.name),
          local: SymbolName::name(&rest.name),
          stage: stage_of(&rest.leading_comments, declaration_comments, honored),
          line: rest.line,
        });
      }
    }
    ast::Pattern::Array(array) => {
      for element in array.elements.iter().flatten() {
        exported_pattern_symbols(
          element,
          declaration_comments,
          honored,
          symbols,
        );
      }
      if let Some(rest) = &array.rest {
        exported_pattern_symbols(rest, declaration_comments, honored, symbols);
      }
    }
    ast::Pattern::Assign(inner) => {
      exported_pattern_symbols(inner, declaration_comments, honored, symbols)
    }
  }
}

fn export_default_finding(decl: &ast::ExportDefaultDeclaration) -> Finding {
  let local = match &decl.binding {
    Some(ident) => SymbolName::name(&ident.name),
    None => SymbolName::None,
  };
  let binding_comments = decl
    .binding
    .as_ref()
    .map(|ident| ident.leading_comments.as_slice())
    .unwrap_or(&[]);
  Finding {
    kind: FindingKind::Export,
    link: LinkType::Declaration,
    specifier: None,
    symbols: vec![SymbolFinding {
      remote: SymbolName::Default,
      local,
      stage: stage_of(binding_comments, &decl.leading_comments, true),
      line: decl.line,
    }],
    line: decl.line,
  }
}

fn export_all_finding(decl: &ast::ExportAllDeclaration) -> Finding {
  let local = match &decl.alias {
    Some(ident) => SymbolName::name(&ident.name),
    None => SymbolName::None,
  };
  let alias_comments = decl
    .alias
    .as_ref()
    .map(|ident| ident.leading_comments.as_slice())
    .unwrap_or(&[]);
  Finding {
    kind: FindingKind::Export,
    link: LinkType::Declaration,
    specifier: Some(decl.specifier.clone()),
    symbols: vec![SymbolFinding {
      remote: SymbolName::Star,
      local,
      stage: stage_of(alias_comments, &decl.leading_comments, true),
      line: decl.line,
    }],
    line: decl.line,
  }
}

/// `const x = require('lit')` and friends.
fn require_import_findings(
  decl: &ast::VariableDeclaration,
  scope: &HashSet<String>,
) -> Vec<Finding> {
  let mut findings = Vec::new();
  let honored = decl.kind.is_single_assignment();
  for declarator in &decl.declarators {
    let Some(init) = &declarator.init else {
      continue;
    };
    let Some(specifier) = as_require_call(init, scope) else {
      continue;
    };
    let mut symbols = Vec::new();
    require_pattern_symbols(
      &declarator.pattern,
      &decl.leading_comments,
      honored,
      &mut symbols,
    );
    findings.push(Finding {
      kind: FindingKind::Import,
      link: LinkType::RequireLike,
      specifier: Some(specifier.clone()),
      symbols,
      line: decl.line,
    });
  }
  findings
}

fn require_pattern_symbols(
  pattern: &ast::Pattern,
  declaration_comments: &[Comment],
  honored: bool,
  symbols: &mut Vec<SymbolFinding>,
) {
  match pattern {
    // The whole exports namespace lands on one binding.
    ast::Pattern::Ident(ident) => symbols.push(SymbolFinding {
      remote: SymbolName::Star,
      local: SymbolName::name(&ident.name),
      stage: stage_of(&ident.leading_comments, declaration_comments, honored),
      line: ident.line,
    }),
    ast::Pattern::Object(object) => {
      for prop in &object.props {
        if let ast::Pattern::Ident(ident) = innermost_binding(&prop.value) {
          symbols.push(SymbolFinding {
            remote: SymbolName::name(&prop.key),
            local: SymbolName::name(&ident.name),
            stage: stage_of(
              &merged_comments(prop, ident),
              declaration_comments,
              honored,
            ),
            line: ident.line,
          });
        }
      }
      if let Some(rest) = &object.rest {
        symbols.push(SymbolFinding {
          remote: SymbolName::Star,
          local: SymbolName::name(&rest.name),
          stage: stage_of(&rest.leading_comments, declaration_comments, honored),
          line: rest.line,
        });
      }
    }
    ast::Pattern::Array(array) => {
      for element in array.elements.iter().flatten() {
        if let ast::Pattern::Ident(ident) = innermost_binding(element) {
          symbols.push(SymbolFinding {
            remote: SymbolName::None,
            local: SymbolName::name(&ident.name),
            stage: stage_of(
              &ident.leading_comments,
              declaration_comments,
              honored,
            ),
            line: ident.line,
          });
        }
      }
      if let Some(rest) = &array.rest {
        if let ast::Pattern::Ident(ident) = innermost_binding(rest) {
          symbols.push(SymbolFinding {
            remote: SymbolName::Star,
            local: SymbolName::name(&ident.name),
            stage: stage_of(
              &ident.leading_comments,
              declaration_comments,
              honored,
            ),
            line: ident.line,
          });
        }
      }
    }
    ast::Pattern::Assign(inner) => {
      require_pattern_symbols(inner, declaration_comments, honored, symbols)
    }
  }
}

/// Bare `require('lit')` statements and `exports` assignments.
fn statement_findings(
  stmt: &ast::ExpressionStatement,
  scope: &HashSet<String>,
) -> Vec<Finding> {
  if let Some(specifier) = as_require_call(&stmt.expr, scope) {
    return vec![Finding {
      kind: FindingKind::Import,
      link: LinkType::RequireLike,
      specifier: Some(specifier.clone()),
      symbols: Vec::new(),
      line: stmt.line,
    }];
  }
  let ast::Expr::Assign(assign) = &stmt.expr else {
    return Vec::new();
  };
  // `exports.name = value`: a single property export.
  if let ast::Expr::Member(member) = &assign.target {
    if is_exports_object(&member.obj, scope) {
      return vec![Finding {
        kind: FindingKind::Export,
        link: LinkType::RequireLike,
        specifier: None,
        symbols: vec![SymbolFinding {
          remote: SymbolName::name(&member.prop),
          local: value_name(&assign.value),
          stage: stage_of(&stmt.leading_comments, &[], true),
          line: stmt.line,
        }],
        line: stmt.line,
      }];
    }
  }
  // `exports = { .. }` / `module.exports = { .. }`: a bulk export.
  if is_exports_object(&assign.target, scope) {
    return bulk_export_findings(&assign.value, stmt, scope);
  }
  Vec::new()
}

fn bulk_export_findings(
  value: &ast::Expr,
  stmt: &ast::ExpressionStatement,
  scope: &HashSet<String>,
) -> Vec<Finding> {
  // `module.exports = require('lit')` re-exports the whole namespace.
  if let Some(specifier) = as_require_call(value, scope) {
    return vec![namespace_reexport(specifier.clone(), stmt.line)];
  }
  let ast::Expr::Object(object) = value else {
    return Vec::new();
  };
  let mut findings = Vec::new();
  let mut symbols = Vec::new();
  for prop in &object.props {
    match prop {
      ast::ObjectLitProp::KeyValue {
        key,
        value,
        leading_comments,
        line,
      } => symbols.push(SymbolFinding {
        remote: SymbolName::name(key),
        local: value_name(value),
        stage: stage_of(leading_comments, &stmt.leading_comments, true),
        line: *line,
      }),
      ast::ObjectLitProp::Spread { expr, line } => {
        // `...require('lit')` inside a bulk export is a re-export.
        if let Some(specifier) = as_require_call(expr, scope) {
          findings.push(namespace_reexport(specifier.clone(), *line));
        }
      }
    }
  }
  findings.insert(
    0,
    Finding {
      kind: FindingKind::Export,
      link: LinkType::RequireLike,
      specifier: None,
      symbols,
      line: stmt.line,
    },
  );
  findings
}

fn namespace_reexport(specifier: ast::StrLit, line: u32) -> Finding {
  Finding {
    kind: FindingKind::Export,
    link: LinkType::RequireLike,
    specifier: Some(specifier),
    symbols: vec![SymbolFinding {
      remote: SymbolName::Star,
      local: SymbolName::None,
      stage: None,
      line,
    }],
    line,
  }
}

/// Matches `require('literal')` where `require` is unbound at module
/// scope.
fn as_require_call<'a>(
  expr: &'a ast::Expr,
  scope: &HashSet<String>,
) -> Option<&'a ast::StrLit> {
  let ast::Expr::Call(call) = expr else {
    return None;
  };
  let ast::Expr::Ident(callee) = &*call.callee else {
    return None;
  };
  if callee.name != "require" || scope.contains("require") {
    return None;
  }
  if call.args.len() != 1 {
    return None;
  }
  match call.args.first() {
    Some(ast::Expr::Lit(ast::Lit::Str(literal))) => Some(literal),
    _ => None,
  }
}

fn is_exports_object(expr: &ast::Expr, scope: &HashSet<String>) -> bool {
  match expr {
    ast::Expr::Ident(ident) => {
      ident.name == "exports" && !scope.contains("exports")
    }
    ast::Expr::Member(member) => {
      member.prop == "exports"
        && matches!(
          &*member.obj,
          ast::Expr::Ident(object)
            if object.name == "module" && !scope.contains("module")
        )
    }
    _ => false,
  }
}

fn value_name(expr: &ast::Expr) -> SymbolName {
  match expr {
    ast::Expr::Ident(ident) => SymbolName::name(&ident.name),
    _ => SymbolName::None,
  }
}

fn innermost_binding(pattern: &ast::Pattern) -> &ast::Pattern {
  match pattern {
    ast::Pattern::Assign(inner) => innermost_binding(inner),
    other => other,
  }
}

fn merged_comments(
  prop: &ast::ObjectPatternProp,
  ident: &ast::Ident,
) -> Vec<Comment> {
  let mut comments = prop.leading_comments.clone();
  comments.extend(ident.leading_comments.iter().cloned());
  comments
}
