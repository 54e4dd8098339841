// Copyright 2026 the Prebake authors. MIT license.

//! End-to-end pipeline tests: entry specifiers in, rewritten module
//! set out.

use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use url::Url;

use prebake::ast::ExportAllDeclaration;
use prebake::ast::ImportDeclaration;
use prebake::ast::Item;
use prebake::ast::ParseError;
use prebake::ast::Program;
use prebake::ast::SourceParser;
use prebake::ast::StrLit;
use prebake::diagnostics::Diagnostic;
use prebake::diagnostics::DiagnosticSink;
use prebake::diagnostics::Diagnostics;
use prebake::diagnostics::Level;
use prebake::file_fetcher::FsFetcher;
use prebake::module::Stage;
use prebake::rewriter::IdentityInstrumenter;
use prebake::rewriter::JobState;
use prebake::specifier::ModuleId;
use prebake::AnyError;
use prebake::PrebakeOptions;
use prebake::Prebakery;

/// Maps fixture source text onto prebuilt programs, the way the real
/// parser peer would produce them.
struct FixtureParser {
  programs: HashMap<String, Program>,
}

impl FixtureParser {
  fn new(programs: Vec<(&str, Program)>) -> Rc<Self> {
    Rc::new(Self {
      programs: programs
        .into_iter()
        .map(|(source, program)| (source.trim().to_string(), program))
        .collect(),
    })
  }
}

#[async_trait(?Send)]
impl SourceParser for FixtureParser {
  async fn parse(
    &self,
    _id: &ModuleId,
    source: &str,
  ) -> Result<Program, ParseError> {
    self
      .programs
      .get(source.trim())
      .cloned()
      .ok_or_else(|| ParseError::new("unknown fixture source", Some(1)))
  }
}

#[derive(Default)]
struct CaptureSink {
  diagnostics: std::cell::RefCell<Vec<Diagnostic>>,
}

impl DiagnosticSink for CaptureSink {
  fn publish(&self, diagnostic: &Diagnostic) -> Result<(), AnyError> {
    self.diagnostics.borrow_mut().push(diagnostic.clone());
    Ok(())
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

fn export_all_program(specifier: &str) -> Program {
  Program::new(vec![Item::ExportAll(ExportAllDeclaration {
    specifier: StrLit::new(specifier, 1),
    alias: None,
    leading_comments: Vec::new(),
    line: 1,
  })])
}

fn leaf_program() -> Program {
  Program::new(vec![Item::Opaque])
}

#[tokio::test]
async fn filesystem_entry_is_gathered_parsed_and_rewritten() {
  tokio::task::LocalSet::new()
    .run_until(async {
      let dir = tempfile::tempdir().unwrap();
      std::fs::write(dir.path().join("entry.js"), "import './util.js'\n")
        .unwrap();
      std::fs::write(dir.path().join("util.js"), "util\n").unwrap();
      let base = ModuleId::tentative(
        Url::from_file_path(dir.path().join("main.js")).unwrap(),
      );

      let prebakery = Prebakery::new(
        PrebakeOptions::default(),
        vec![Rc::new(FsFetcher::new())],
        FixtureParser::new(vec![
          ("import './util.js'", import_program("./util.js")),
          ("util", leaf_program()),
        ]),
        Rc::new(IdentityInstrumenter),
        Diagnostics::new(),
      );
      let output = prebakery.prebake(&["./entry.js"], &base).await;

      let entry = output
        .modules
        .get(output.entry_id("./entry.js").unwrap())
        .unwrap();
      assert_eq!(entry.stage(), Stage::Rewritten);
      assert!(entry.id().is_canonical());
      assert!(entry.original_ast().is_some());
      assert!(entry.swiss_ast().is_some());

      let util = output
        .modules
        .get(&ModuleId::tentative(
          Url::from_file_path(dir.path().join("util.js")).unwrap(),
        ))
        .unwrap();
      assert_eq!(util.stage(), Stage::Rewritten);
      assert_eq!(output.modules.len(), 2);
    })
    .await;
}

#[tokio::test]
async fn mutually_reexporting_modules_both_converge() {
  tokio::task::LocalSet::new()
    .run_until(async {
      let dir = tempfile::tempdir().unwrap();
      std::fs::write(dir.path().join("a.js"), "module a\n").unwrap();
      std::fs::write(dir.path().join("b.js"), "module b\n").unwrap();
      let base = ModuleId::tentative(
        Url::from_file_path(dir.path().join("main.js")).unwrap(),
      );

      let sink = Rc::new(CaptureSink::default());
      let prebakery = Prebakery::new(
        PrebakeOptions::default(),
        vec![Rc::new(FsFetcher::new())],
        FixtureParser::new(vec![
          ("module a", export_all_program("./b.js")),
          ("module b", export_all_program("./a.js")),
        ]),
        Rc::new(IdentityInstrumenter),
        Diagnostics::with_sinks(vec![sink.clone()]),
      );
      let output = prebakery.prebake(&["./a.js"], &base).await;

      for name in ["a.js", "b.js"] {
        let id = ModuleId::tentative(
          Url::from_file_path(dir.path().join(name)).unwrap(),
        );
        let module = output.modules.get(&id).unwrap();
        assert_eq!(module.stage(), Stage::Rewritten, "{} converges", name);
        assert_eq!(
          prebakery.rewriter().job_state(module.id()),
          Some(JobState::Complete)
        );
        assert!(
          prebakery.rewriter().recursively_depends_on_self(module.id()),
          "{} is flagged as recursively depending on itself",
          name
        );
      }
      let infos: Vec<_> = sink
        .diagnostics
        .borrow()
        .iter()
        .filter(|diagnostic| {
          diagnostic.level == Level::Info
            && diagnostic.message.contains("recursively")
        })
        .cloned()
        .collect();
      assert_eq!(infos.len(), 2, "one info diagnostic per cycle member");
    })
    .await;
}

#[tokio::test]
async fn missing_dependency_fails_the_importer() {
  tokio::task::LocalSet::new()
    .run_until(async {
      let dir = tempfile::tempdir().unwrap();
      std::fs::write(dir.path().join("entry.js"), "import './gone.js'\n")
        .unwrap();
      let base = ModuleId::tentative(
        Url::from_file_path(dir.path().join("main.js")).unwrap(),
      );

      let prebakery = Prebakery::new(
        PrebakeOptions::default(),
        vec![Rc::new(FsFetcher::new())],
        FixtureParser::new(vec![(
          "import './gone.js'",
          import_program("./gone.js"),
        )]),
        Rc::new(IdentityInstrumenter),
        Diagnostics::new(),
      );
      let output = prebakery.prebake(&["./entry.js"], &base).await;

      let entry = output
        .modules
        .get(output.entry_id("./entry.js").unwrap())
        .unwrap();
      assert!(entry.is_error());
      let messages: Vec<_> = entry
        .errors()
        .unwrap()
        .iter()
        .map(|diagnostic| diagnostic.message.clone())
        .collect();
      assert!(
        messages.iter().any(|message| message.contains("./gone.js")),
        "the failing dependency is named: {:?}",
        messages
      );
    })
    .await;
}

#[tokio::test]
async fn glob_prebake_covers_every_listed_module() {
  tokio::task::LocalSet::new()
    .run_until(async {
      let dir = tempfile::tempdir().unwrap();
      std::fs::write(dir.path().join("one.js"), "one\n").unwrap();
      std::fs::write(dir.path().join("two.js"), "two\n").unwrap();
      std::fs::write(dir.path().join("notes.txt"), "skip me\n").unwrap();
      let base = ModuleId::tentative(
        Url::from_file_path(dir.path().join("main.js")).unwrap(),
      );

      let prebakery = Prebakery::new(
        PrebakeOptions::default(),
        vec![Rc::new(FsFetcher::new())],
        FixtureParser::new(vec![
          ("one", leaf_program()),
          ("two", leaf_program()),
        ]),
        Rc::new(IdentityInstrumenter),
        Diagnostics::new(),
      );
      let output = prebakery.prebake_glob("*.js", &base).await.unwrap();

      assert_eq!(output.entries.len(), 2);
      for module in output.modules.modules() {
        assert_eq!(module.stage(), Stage::Rewritten);
      }
    })
    .await;
}

#[tokio::test]
async fn builtin_specifiers_resolve_without_fetching_files() {
  tokio::task::LocalSet::new()
    .run_until(async {
      let dir = tempfile::tempdir().unwrap();
      std::fs::write(dir.path().join("entry.js"), "import 'fs'\n").unwrap();
      let base = ModuleId::tentative(
        Url::from_file_path(dir.path().join("main.js")).unwrap(),
      );

      let options = PrebakeOptions {
        builtin_modules: vec!["fs".to_string()],
        ..PrebakeOptions::default()
      };
      let prebakery = Prebakery::new(
        options,
        vec![Rc::new(FsFetcher::new())],
        FixtureParser::new(vec![("import 'fs'", import_program("fs"))]),
        Rc::new(IdentityInstrumenter),
        Diagnostics::new(),
      );
      let output = prebakery.prebake(&["./entry.js"], &base).await;

      // The builtin id entered the set; the filesystem provider cannot
      // claim it, so it surfaces as an error module rather than a file
      // read, and the entry fails on its dependency.
      let builtin = output
        .modules
        .get(&ModuleId::tentative(Url::parse("builtin:fs").unwrap()))
        .unwrap();
      assert!(builtin.is_error());
      let entry = output
        .modules
        .get(output.entry_id("./entry.js").unwrap())
        .unwrap();
      assert!(entry.is_error());
    })
    .await;
}
