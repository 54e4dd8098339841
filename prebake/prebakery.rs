// Copyright 2026 the Prebake authors. MIT license.

//! The façade binding the module set, gatherer and rewriter together.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use prebake_object_graph::Recorder;
use serde::Deserialize;

use crate::ast::SourceParser;
use crate::diagnostics::Diagnostics;
use crate::errors::anyhow;
use crate::file_fetcher::Fetcher;
use crate::file_fetcher::FetcherChain;
use crate::file_fetcher::Outcome;
use crate::gatherer::Gatherer;
use crate::graph::ModuleSet;
use crate::module::FetchContext;
use crate::module::Stage;
use crate::resolver::SpecifierResolver;
use crate::rewriter::Instrumenter;
use crate::rewriter::Rewriter;
use crate::specifier::ModuleId;
use crate::AnyError;

/// Run configuration, deserializable from a host-supplied JSON blob.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrebakeOptions {
  /// Bare specifiers resolved as platform built-ins.
  pub builtin_modules: Vec<String>,
  /// Whether require-style linkage is analyzed at all.
  pub analyze_require: bool,
}

impl Default for PrebakeOptions {
  fn default() -> Self {
    Self {
      builtin_modules: Vec::new(),
      analyze_require: true,
    }
  }
}

/// The populated module set plus the specifier-to-id map for the
/// entries that were requested.
pub struct PrebakeOutput {
  pub modules: ModuleSet,
  pub entries: IndexMap<String, ModuleId>,
}

impl PrebakeOutput {
  pub fn entry_id(&self, specifier: &str) -> Option<&ModuleId> {
    self.entries.get(specifier)
  }
}

pub struct Prebakery {
  module_set: ModuleSet,
  fetchers: FetcherChain,
  gatherer: Gatherer,
  rewriter: Rewriter,
  recorder: Rc<RefCell<Recorder>>,
}

impl Prebakery {
  pub fn new(
    options: PrebakeOptions,
    fetchers: Vec<Rc<dyn Fetcher>>,
    parser: Rc<dyn SourceParser>,
    instrumenter: Rc<dyn Instrumenter>,
    diagnostics: Diagnostics,
  ) -> Self {
    let resolver =
      Rc::new(SpecifierResolver::new(options.builtin_modules.clone()));
    let module_set = ModuleSet::new(resolver, diagnostics.clone());
    let fetchers = FetcherChain::new(fetchers);
    let gatherer =
      Gatherer::spawn(&module_set, fetchers.clone(), diagnostics.clone());
    let rewriter = Rewriter::spawn(
      &module_set,
      parser,
      instrumenter,
      options.analyze_require,
      diagnostics,
    );
    Self {
      module_set,
      fetchers,
      gatherer,
      rewriter,
      recorder: Rc::new(RefCell::new(Recorder::new())),
    }
  }

  pub fn module_set(&self) -> &ModuleSet {
    &self.module_set
  }

  /// The interposition layer the sandbox routes early value traffic
  /// through; the reknitter queries it after early execution to
  /// reconstitute values into the rewritten output.
  pub fn recorder(&self) -> Rc<RefCell<Recorder>> {
    self.recorder.clone()
  }

  pub fn gatherer(&self) -> &Gatherer {
    &self.gatherer
  }

  pub fn rewriter(&self) -> &Rewriter {
    &self.rewriter
  }

  /// Fetches every entry specifier relative to `base`, awaits promotion
  /// to rewritten for each one that did not immediately error, and
  /// returns the populated module set with the specifier-to-id map.
  pub async fn prebake(
    &self,
    entries: &[&str],
    base: &ModuleId,
  ) -> PrebakeOutput {
    let context = FetchContext::new(base.clone(), 0);
    let mut entry_ids = IndexMap::new();
    let mut waits = Vec::new();
    for entry in entries {
      let module = self.module_set.fetch(entry, &context);
      entry_ids.insert(entry.to_string(), module.id().clone());
      if !module.is_error() {
        waits.push(self.module_set.on_promoted_to(&module, Stage::Rewritten));
      }
    }
    for wait in waits {
      // An error module settles the waiter too; the caller inspects
      // stages through the returned set.
      let _ = wait.await;
    }
    PrebakeOutput {
      modules: self.module_set.clone(),
      entries: entry_ids,
    }
  }

  /// Expands a glob through the fetcher chain's `list` operation and
  /// prebakes every module it yields.
  pub async fn prebake_glob(
    &self,
    pattern: &str,
    base: &ModuleId,
  ) -> Result<PrebakeOutput, AnyError> {
    let base_id = base.clone();
    match self.fetchers.list(pattern, &base_id).await? {
      Outcome::Understood(ids) => {
        let specifiers: Vec<String> =
          ids.iter().map(|id| id.abs().to_string()).collect();
        let entries: Vec<&str> =
          specifiers.iter().map(String::as_str).collect();
        Ok(self.prebake(&entries, base).await)
      }
      Outcome::NotUnderstood => {
        Err(anyhow!("no fetcher understood glob \"{}\"", pattern))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::ImportDeclaration;
  use crate::ast::Item;
  use crate::ast::ParseError;
  use crate::ast::Program;
  use crate::ast::StrLit;
  use crate::errors::anyhow;
  use crate::file_fetcher::FetchedSource;
  use crate::file_fetcher::Outcome;
  use crate::module::ModuleMetadata;
  use crate::rewriter::IdentityInstrumenter;
  use crate::AnyError;
  use async_trait::async_trait;
  use pretty_assertions::assert_eq;
  use std::collections::HashMap;
  use url::Url;

  struct MemoryFetcher {
    fixtures: Vec<(&'static str, &'static str)>,
  }

  #[async_trait(?Send)]
  impl Fetcher for MemoryFetcher {
    async fn canonicalize(
      &self,
      abs: &Url,
      _base: &ModuleId,
      _next: FetcherChain,
    ) -> Result<Outcome<ModuleId>, AnyError> {
      Ok(Outcome::Understood(ModuleId::canonical(
        abs.clone(),
        abs.clone(),
      )))
    }

    async fn list(
      &self,
      _pattern: &str,
      _base: &ModuleId,
      _next: FetcherChain,
    ) -> Result<Outcome<Vec<ModuleId>>, AnyError> {
      Ok(Outcome::NotUnderstood)
    }

    async fn fetch(
      &self,
      id: &ModuleId,
      _base: &ModuleId,
      _next: FetcherChain,
    ) -> Result<Outcome<FetchedSource>, AnyError> {
      for (url, source) in &self.fixtures {
        if *url == id.key().as_str() {
          return Ok(Outcome::Understood(FetchedSource {
            id: id.clone(),
            source: (*source).to_string(),
            metadata: ModuleMetadata::new(id.clone()),
          }));
        }
      }
      Err(anyhow!("no fixture for {}", id))
    }
  }

  struct MockParser {
    programs: HashMap<String, Program>,
  }

  #[async_trait(?Send)]
  impl SourceParser for MockParser {
    async fn parse(
      &self,
      _id: &ModuleId,
      source: &str,
    ) -> Result<Program, ParseError> {
      self
        .programs
        .get(source)
        .cloned()
        .ok_or_else(|| ParseError::new("unknown fixture source", None))
    }
  }

  fn import_program(specifier: &str) -> Program {
    Program::new(vec![Item::Import(ImportDeclaration {
      specifier: StrLit::new(specifier, 1),
      default_binding: None,
      namespace_binding: None,
      named: Vec::new(),
      leading_comments: Vec::new(),
      line: 1,
    })])
  }

  fn prebakery(
    fixtures: Vec<(&'static str, &'static str)>,
    programs: Vec<(&str, Program)>,
  ) -> Prebakery {
    Prebakery::new(
      PrebakeOptions::default(),
      vec![Rc::new(MemoryFetcher { fixtures })],
      Rc::new(MockParser {
        programs: programs
          .into_iter()
          .map(|(source, program)| (source.to_string(), program))
          .collect(),
      }),
      Rc::new(IdentityInstrumenter),
      Diagnostics::new(),
    )
  }

  fn base() -> ModuleId {
    ModuleId::tentative(Url::parse("file:///proj/main.js").unwrap())
  }

  #[tokio::test]
  async fn entries_reach_rewritten() {
    tokio::task::LocalSet::new()
      .run_until(async {
        let prebakery = prebakery(
          vec![
            ("file:///proj/entry.js", "entry"),
            ("file:///proj/dep.js", "dep"),
          ],
          vec![
            ("entry", import_program("./dep.js")),
            ("dep", Program::new(vec![Item::Opaque])),
          ],
        );
        let output = prebakery.prebake(&["./entry.js"], &base()).await;
        let entry_id = output.entry_id("./entry.js").unwrap();
        let entry = output.modules.get(entry_id).unwrap();
        assert_eq!(entry.stage(), Stage::Rewritten);
        let dep = output
          .modules
          .get(&ModuleId::tentative(
            Url::parse("file:///proj/dep.js").unwrap(),
          ))
          .unwrap();
        assert_eq!(dep.stage(), Stage::Rewritten);
        assert_eq!(output.modules.len(), 2);
      })
      .await;
  }

  #[test]
  fn recorder_is_bootstrapped_for_the_sandbox() {
    let prebakery = prebakery(Vec::new(), Vec::new());
    let recorder = prebakery.recorder();
    let mut recorder = recorder.borrow_mut();
    let global = recorder.global();
    let object = recorder.get(&global, &"Object".into()).unwrap();
    assert!(object.is_object());
  }

  #[tokio::test]
  async fn failing_entry_surfaces_as_error_module() {
    tokio::task::LocalSet::new()
      .run_until(async {
        let prebakery = prebakery(Vec::new(), Vec::new());
        let output = prebakery.prebake(&["./missing.js"], &base()).await;
        let entry_id = output.entry_id("./missing.js").unwrap();
        let module = output.modules.get(entry_id).unwrap();
        assert!(module.is_error());
      })
      .await;
  }
}
