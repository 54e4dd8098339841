// Copyright 2026 the Prebake authors. MIT license.

//! Module lifecycle records. A module's stage is a function of which
//! fields are populated, so each stage is a distinct variant carrying
//! exactly its fields; promotion consumes the older variant and error
//! absorbs any of them.

use std::fmt;
use std::rc::Rc;

use crate::ast::Program;
use crate::diagnostics::Diagnostic;
use crate::specifier::ModuleId;

/// Lifecycle stages in ascending order. `Error` compares strictly
/// greater than any non-error stage so an error is never overwritten by
/// a non-error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
  Unresolved,
  Resolved,
  Rewritten,
  Output,
  Error,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let name = match self {
      Stage::Unresolved => "unresolved",
      Stage::Resolved => "resolved",
      Stage::Rewritten => "rewritten",
      Stage::Output => "output",
      Stage::Error => "error",
    };
    write!(f, "{}", name)
  }
}

/// Where a fetch came from, for later resolution and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchContext {
  pub importer: ModuleId,
  pub line: u32,
}

impl FetchContext {
  pub fn new(importer: ModuleId, line: u32) -> Self {
    Self { importer, line }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleMetadata {
  /// The id the module was first fetched through.
  pub base: ModuleId,
  pub properties: serde_json::Map<String, serde_json::Value>,
}

impl ModuleMetadata {
  pub fn new(base: ModuleId) -> Self {
    Self {
      base,
      properties: serde_json::Map::new(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct UnresolvedModule {
  pub id: ModuleId,
  pub fetch_context: FetchContext,
}

#[derive(Debug, Clone)]
pub struct ResolvedModule {
  pub id: ModuleId,
  pub metadata: ModuleMetadata,
  pub source: String,
}

#[derive(Debug, Clone)]
pub struct RewrittenModule {
  pub id: ModuleId,
  pub metadata: ModuleMetadata,
  pub source: String,
  pub original_ast: Rc<Program>,
  pub rewritten_ast: Rc<Program>,
  pub swiss_ast: Rc<Program>,
}

#[derive(Debug, Clone)]
pub struct OutputModule {
  pub id: ModuleId,
  pub metadata: ModuleMetadata,
  pub source: String,
  pub original_ast: Rc<Program>,
  pub rewritten_ast: Rc<Program>,
  pub swiss_ast: Rc<Program>,
  pub output_ast: Rc<Program>,
}

#[derive(Debug, Clone)]
pub struct ErrorModule {
  pub id: ModuleId,
  pub diagnostics: Vec<Diagnostic>,
}

impl ErrorModule {
  pub fn new(id: ModuleId, diagnostic: Diagnostic) -> Self {
    Self {
      id,
      diagnostics: vec![diagnostic],
    }
  }

  /// Accumulates another module's diagnostics onto this error module.
  pub fn merge_errors(&mut self, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
      if !self.diagnostics.contains(diagnostic) {
        self.diagnostics.push(diagnostic.clone());
      }
    }
  }
}

#[derive(Debug, Clone)]
pub enum Module {
  Unresolved(UnresolvedModule),
  Resolved(ResolvedModule),
  Rewritten(RewrittenModule),
  Output(OutputModule),
  Error(ErrorModule),
}

impl Module {
  pub fn unresolved(id: ModuleId, fetch_context: FetchContext) -> Self {
    Module::Unresolved(UnresolvedModule { id, fetch_context })
  }

  pub fn id(&self) -> &ModuleId {
    match self {
      Module::Unresolved(m) => &m.id,
      Module::Resolved(m) => &m.id,
      Module::Rewritten(m) => &m.id,
      Module::Output(m) => &m.id,
      Module::Error(m) => &m.id,
    }
  }

  pub fn stage(&self) -> Stage {
    match self {
      Module::Unresolved(_) => Stage::Unresolved,
      Module::Resolved(_) => Stage::Resolved,
      Module::Rewritten(_) => Stage::Rewritten,
      Module::Output(_) => Stage::Output,
      Module::Error(_) => Stage::Error,
    }
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Module::Error(_))
  }

  pub fn fetch_context(&self) -> Option<&FetchContext> {
    match self {
      Module::Unresolved(m) => Some(&m.fetch_context),
      _ => None,
    }
  }

  pub fn metadata(&self) -> Option<&ModuleMetadata> {
    match self {
      Module::Resolved(m) => Some(&m.metadata),
      Module::Rewritten(m) => Some(&m.metadata),
      Module::Output(m) => Some(&m.metadata),
      _ => None,
    }
  }

  pub fn source(&self) -> Option<&str> {
    match self {
      Module::Resolved(m) => Some(&m.source),
      Module::Rewritten(m) => Some(&m.source),
      Module::Output(m) => Some(&m.source),
      _ => None,
    }
  }

  pub fn original_ast(&self) -> Option<&Rc<Program>> {
    match self {
      Module::Rewritten(m) => Some(&m.original_ast),
      Module::Output(m) => Some(&m.original_ast),
      _ => None,
    }
  }

  pub fn rewritten_ast(&self) -> Option<&Rc<Program>> {
    match self {
      Module::Rewritten(m) => Some(&m.rewritten_ast),
      Module::Output(m) => Some(&m.rewritten_ast),
      _ => None,
    }
  }

  pub fn swiss_ast(&self) -> Option<&Rc<Program>> {
    match self {
      Module::Rewritten(m) => Some(&m.swiss_ast),
      Module::Output(m) => Some(&m.swiss_ast),
      _ => None,
    }
  }

  pub fn output_ast(&self) -> Option<&Rc<Program>> {
    match self {
      Module::Output(m) => Some(&m.output_ast),
      _ => None,
    }
  }

  pub fn errors(&self) -> Option<&[Diagnostic]> {
    match self {
      Module::Error(m) => Some(&m.diagnostics),
      _ => None,
    }
  }

  /// Absorbs this module into an error module carrying `diagnostic`.
  pub fn to_error(&self, diagnostic: Diagnostic) -> ErrorModule {
    match self {
      Module::Error(m) => {
        let mut merged = m.clone();
        merged.merge_errors(std::slice::from_ref(&diagnostic));
        merged
      }
      other => ErrorModule::new(other.id().clone(), diagnostic),
    }
  }
}

impl ResolvedModule {
  /// Promotes a resolved module with the transform results.
  pub fn rewrite(
    self,
    original_ast: Rc<Program>,
    rewritten_ast: Rc<Program>,
    swiss_ast: Rc<Program>,
  ) -> RewrittenModule {
    RewrittenModule {
      id: self.id,
      metadata: self.metadata,
      source: self.source,
      original_ast,
      rewritten_ast,
      swiss_ast,
    }
  }
}

impl RewrittenModule {
  pub fn into_output(self, output_ast: Rc<Program>) -> OutputModule {
    OutputModule {
      id: self.id,
      metadata: self.metadata,
      source: self.source,
      original_ast: self.original_ast,
      rewritten_ast: self.rewritten_ast,
      swiss_ast: self.swiss_ast,
      output_ast,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn id(s: &str) -> ModuleId {
    ModuleId::tentative(Url::parse(s).unwrap())
  }

  #[test]
  fn stages_are_totally_ordered() {
    let stages = [
      Stage::Unresolved,
      Stage::Resolved,
      Stage::Rewritten,
      Stage::Output,
      Stage::Error,
    ];
    for window in stages.windows(2) {
      assert!(window[0] < window[1]);
    }
    // Error compares greater than every non-error stage.
    for stage in &stages[..4] {
      assert!(*stage < Stage::Error);
    }
  }

  #[test]
  fn compare_stage_is_zero_only_for_the_same_variant() {
    let stages = [
      Stage::Unresolved,
      Stage::Resolved,
      Stage::Rewritten,
      Stage::Output,
      Stage::Error,
    ];
    for a in stages {
      for b in stages {
        assert_eq!(a.cmp(&b) == std::cmp::Ordering::Equal, a == b);
      }
    }
  }

  #[test]
  fn error_absorbs_any_module() {
    let module = Module::unresolved(
      id("file:///m.js"),
      FetchContext::new(id("file:///base.js"), 1),
    );
    let error = module.to_error(Diagnostic::error(None, "nope"));
    assert_eq!(error.diagnostics.len(), 1);
    assert_eq!(Module::Error(error).stage(), Stage::Error);
  }

  #[test]
  fn merge_errors_accumulates_without_duplicates() {
    let mut error =
      ErrorModule::new(id("file:///m.js"), Diagnostic::error(None, "first"));
    error.merge_errors(&[
      Diagnostic::error(None, "first"),
      Diagnostic::error(None, "second"),
    ]);
    assert_eq!(error.diagnostics.len(), 2);
  }
}
