// Copyright 2026 the Prebake authors. MIT license.

//! Drives parse, link and transform for each resolved module. Per
//! canonical id the driver keeps a job that moves
//! `unstarted -> started -> satisfied -> complete`, with `error` as the
//! absorbing state; completion is a cycle-tolerant transitive walk over
//! the job's dependencies.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::rc::Rc;

use async_trait::async_trait;

use crate::analyzer;
use crate::analyzer::Finding;
use crate::ast;
use crate::ast::Program;
use crate::ast::SourceParser;
use crate::diagnostics::Diagnostic;
use crate::diagnostics::Diagnostics;
use crate::diagnostics::Level;
use crate::graph::ModuleSet;
use crate::module::ErrorModule;
use crate::module::FetchContext;
use crate::module::Module;
use crate::module::ResolvedModule;
use crate::module::Stage;
use crate::specifier::ModuleId;
use crate::AnyError;

/// What the external instrumentation transform hands back: the
/// rewritten program and the swiss program with marked holes.
pub struct Instrumented {
  pub rewritten: Program,
  pub swiss: Program,
}

/// The external instrumentation peer. The pipeline suspends at
/// transform calls.
#[async_trait(?Send)]
pub trait Instrumenter {
  async fn instrument(
    &self,
    module: &ResolvedModule,
    original: &Program,
    findings: &[Finding],
  ) -> Result<Instrumented, AnyError>;
}

/// Passes the original program through unchanged; useful for hosts that
/// run their own transform downstream.
pub struct IdentityInstrumenter;

#[async_trait(?Send)]
impl Instrumenter for IdentityInstrumenter {
  async fn instrument(
    &self,
    _module: &ResolvedModule,
    original: &Program,
    _findings: &[Finding],
  ) -> Result<Instrumented, AnyError> {
    Ok(Instrumented {
      rewritten: original.clone(),
      swiss: original.clone(),
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
  Unstarted,
  Started,
  Satisfied,
  Complete,
  Error,
}

/// An outgoing specifier that has not yet published a module. Entries
/// are matched by the identity of the literal collected during
/// extraction (its finding index) and spliced out as they resolve.
#[derive(Debug, Clone)]
struct PendingSpecifier {
  finding_index: usize,
  specifier: ast::StrLit,
}

struct Job {
  id: ModuleId,
  state: JobState,
  module: Rc<Module>,
  original: Option<Rc<Program>>,
  findings: Vec<Finding>,
  pending: Vec<PendingSpecifier>,
  deps: HashSet<String>,
  progress: Vec<String>,
  recursively_depends_on_self: bool,
}

impl Job {
  fn new(id: ModuleId, module: Rc<Module>) -> Self {
    Self {
      id,
      state: JobState::Unstarted,
      module,
      original: None,
      findings: Vec::new(),
      pending: Vec::new(),
      deps: HashSet::new(),
      progress: Vec::new(),
      recursively_depends_on_self: false,
    }
  }
}

#[derive(Default)]
struct Inner {
  jobs: HashMap<String, Job>,
  rev_deps: HashMap<String, HashSet<String>>,
}

#[derive(Clone)]
pub struct Rewriter {
  inner: Rc<RefCell<Inner>>,
  module_set: ModuleSet,
  parser: Rc<dyn SourceParser>,
  instrumenter: Rc<dyn Instrumenter>,
  diagnostics: Diagnostics,
  analyze_require: bool,
}

impl Rewriter {
  /// Subscribes to resolved-module events on `module_set`; promotions
  /// are processed in the order the bus delivers them.
  pub fn spawn(
    module_set: &ModuleSet,
    parser: Rc<dyn SourceParser>,
    instrumenter: Rc<dyn Instrumenter>,
    analyze_require: bool,
    diagnostics: Diagnostics,
  ) -> Self {
    let rewriter = Self {
      inner: Rc::default(),
      module_set: module_set.clone(),
      parser,
      instrumenter,
      diagnostics,
      analyze_require,
    };
    let subscription = rewriter.clone();
    module_set.on_any_promoted_to(
      Stage::Resolved,
      Rc::new(move |module| {
        let rewriter = subscription.clone();
        tokio::task::spawn_local(async move {
          rewriter.drive(module).await;
        });
        Ok(())
      }),
    );
    // External supervision can force a stuck module into the error
    // state by submitting an error module through the bus; the job
    // follows it there.
    let supervision = rewriter.clone();
    module_set.on_any_promoted_to(
      Stage::Error,
      Rc::new(move |module| {
        let key = module.id().key().to_string();
        supervision.fail_job(
          &key,
          None,
          "module entered the error state".to_string(),
        );
        Ok(())
      }),
    );
    rewriter
  }

  pub fn job_state(&self, id: &ModuleId) -> Option<JobState> {
    let inner = self.inner.borrow();
    inner.jobs.get(id.key().as_str()).map(|job| job.state)
  }

  pub fn recursively_depends_on_self(&self, id: &ModuleId) -> bool {
    let inner = self.inner.borrow();
    inner
      .jobs
      .get(id.key().as_str())
      .map(|job| job.recursively_depends_on_self)
      .unwrap_or(false)
  }

  pub fn progress(&self, id: &ModuleId) -> Vec<String> {
    let inner = self.inner.borrow();
    inner
      .jobs
      .get(id.key().as_str())
      .map(|job| job.progress.clone())
      .unwrap_or_default()
  }

  async fn drive(&self, module: Rc<Module>) {
    let Module::Resolved(resolved) = &*module else {
      return;
    };
    let key = module.id().key().to_string();
    {
      let mut inner = self.inner.borrow_mut();
      if inner.jobs.contains_key(&key) {
        // Duplicate announcement for a job already in flight.
        return;
      }
      inner
        .jobs
        .insert(key.clone(), Job::new(module.id().clone(), module.clone()));
    }

    // unstarted -> started: parse, extract linkage, submit fetches.
    let program = match self.parser.parse(module.id(), &resolved.source).await
    {
      Ok(program) => Rc::new(program),
      Err(err) => {
        self.fail_job(&key, err.line, err.to_string());
        return;
      }
    };
    let findings = analyzer::analyze(&program, self.analyze_require);
    let pending: Vec<PendingSpecifier> = findings
      .iter()
      .enumerate()
      .filter_map(|(finding_index, finding)| {
        finding.specifier.as_ref().map(|specifier| PendingSpecifier {
          finding_index,
          specifier: specifier.clone(),
        })
      })
      .collect();
    {
      let mut inner = self.inner.borrow_mut();
      let Some(job) = inner.jobs.get_mut(&key) else {
        return;
      };
      job.original = Some(program);
      job.findings = findings;
      job.pending = pending.clone();
      job.state = JobState::Started;
      job
        .progress
        .push(format!("parsed; {} specifier(s) outstanding", pending.len()));
    }

    if pending.is_empty() {
      self.mark_satisfied(&key);
      self.complete_and_cascade(&key).await;
      return;
    }
    for entry in pending {
      let rewriter = self.clone();
      let job_key = key.clone();
      let importer = module.id().clone();
      tokio::task::spawn_local(async move {
        rewriter.link_dep(job_key, importer, entry).await;
      });
    }
  }

  /// Fetches one outgoing specifier, waits until a module has been
  /// published for it, and links it into the job's deps.
  async fn link_dep(
    &self,
    key: String,
    importer: ModuleId,
    entry: PendingSpecifier,
  ) {
    let context = FetchContext::new(importer, entry.specifier.line);
    let dep = self.module_set.fetch(&entry.specifier.value, &context);
    let published = if dep.is_error() {
      dep
    } else {
      match self.module_set.on_promoted_to(&dep, Stage::Resolved).await {
        Ok(module) => module,
        // Already past resolved; whatever occupies the id has published.
        Err(_) => self.module_set.get(dep.id()).unwrap_or(dep),
      }
    };

    if published.is_error() {
      self.fail_job(
        &key,
        Some(entry.specifier.line),
        format!(
          "dependency \"{}\" ({}) failed",
          entry.specifier.value,
          published.id()
        ),
      );
      return;
    }

    let became_satisfied = {
      let mut inner = self.inner.borrow_mut();
      let dep_key = published.id().key().to_string();
      inner
        .rev_deps
        .entry(dep_key.clone())
        .or_default()
        .insert(key.clone());
      let Some(job) = inner.jobs.get_mut(&key) else {
        return;
      };
      if job.state == JobState::Error {
        return;
      }
      job
        .pending
        .retain(|pending| pending.finding_index != entry.finding_index);
      job.deps.insert(dep_key);
      job.progress.push(format!("linked {}", published.id()));
      job.state == JobState::Started && job.pending.is_empty()
    };
    if became_satisfied {
      self.mark_satisfied(&key);
      self.complete_and_cascade(&key).await;
    }
  }

  fn mark_satisfied(&self, key: &str) {
    let mut inner = self.inner.borrow_mut();
    if let Some(job) = inner.jobs.get_mut(key) {
      if job.state == JobState::Started {
        job.state = JobState::Satisfied;
        job.progress.push("satisfied".to_string());
      }
    }
  }

  /// Tries to complete `key`; every completion triggers a bounded
  /// re-check over its reverse deps.
  async fn complete_and_cascade(&self, key: &str) {
    let mut queue = vec![key.to_string()];
    while let Some(key) = queue.pop() {
      if self.try_complete(&key).await {
        let rev = {
          let inner = self.inner.borrow();
          inner.rev_deps.get(&key).cloned().unwrap_or_default()
        };
        queue.extend(rev);
      }
    }
  }

  /// satisfied -> complete, when every dep in the transitive closure is
  /// complete. A dep already on the walk's stack is treated as complete
  /// for the purpose of the walk; the jobs on the cycle get their
  /// `recursively_depends_on_self` flag recorded.
  async fn try_complete(&self, key: &str) -> bool {
    let instrument_input = {
      let mut inner = self.inner.borrow_mut();
      let Some(job) = inner.jobs.get(key) else {
        return false;
      };
      if job.state != JobState::Satisfied {
        return false;
      }
      let mut stack = Vec::new();
      let mut cycle_members = HashSet::new();
      if !deps_complete(&inner.jobs, key, &mut stack, &mut cycle_members) {
        return false;
      }
      let mut newly_flagged = Vec::new();
      for member in cycle_members {
        if let Some(job) = inner.jobs.get_mut(&member) {
          if !job.recursively_depends_on_self {
            job.recursively_depends_on_self = true;
            newly_flagged.push(job.id.clone());
          }
        }
      }
      let job = inner.jobs.get_mut(key).expect("job checked above");
      job.state = JobState::Complete;
      job.progress.push("complete".to_string());
      let resolved = match &*job.module {
        Module::Resolved(resolved) => resolved.clone(),
        _ => return false,
      };
      let original = job.original.clone().expect("started jobs hold an ast");
      (resolved, original, job.findings.clone(), newly_flagged)
    };
    let (resolved, original, findings, newly_flagged) = instrument_input;
    for id in newly_flagged {
      self.diagnostics.report(&Diagnostic::info(
        Some(id),
        "module recursively depends on itself",
      ));
    }

    // The job is complete; run the instrumentation external and publish
    // the rewritten module.
    match self
      .instrumenter
      .instrument(&resolved, &original, &findings)
      .await
    {
      Ok(instrumented) => {
        let rewritten = resolved.rewrite(
          original,
          Rc::new(instrumented.rewritten),
          Rc::new(instrumented.swiss),
        );
        self.module_set.put(Module::Rewritten(rewritten));
        true
      }
      Err(err) => {
        self.fail_job(key, None, format!("instrumentation failed: {:#}", err));
        false
      }
    }
  }

  /// `* -> error`, publishing an error module and propagating to every
  /// reverse-dep job with a secondary diagnostic naming the failing
  /// dependency.
  fn fail_job(&self, key: &str, line: Option<u32>, message: String) {
    let failed = {
      let mut inner = self.inner.borrow_mut();
      let inner = &mut *inner;
      let Some(job) = inner.jobs.get_mut(key) else {
        return;
      };
      if job.state == JobState::Error {
        return;
      }
      job.state = JobState::Error;
      job.progress.push(format!("error: {}", message));
      let id = job.id.clone();
      let rev = inner.rev_deps.get(key).cloned().unwrap_or_default();
      (id, rev)
    };
    let (id, rev_deps) = failed;
    let diagnostic =
      Diagnostic::new(Level::Error, Some(id.clone()), line, message);
    self.diagnostics.report(&diagnostic);
    self
      .module_set
      .put(Module::Error(ErrorModule::new(id.clone(), diagnostic)));
    for rev_key in rev_deps {
      self.fail_job(&rev_key, None, format!("dependency {} failed", id));
    }
  }
}

/// The cycle-tolerant completion walk. Returns whether every dep in the
/// transitive closure (ignoring cycles) is complete; `cycle_members`
/// collects the stack slice of every cycle encountered.
fn deps_complete(
  jobs: &HashMap<String, Job>,
  key: &str,
  stack: &mut Vec<String>,
  cycle_members: &mut HashSet<String>,
) -> bool {
  stack.push(key.to_string());
  let Some(job) = jobs.get(key) else {
    stack.pop();
    return false;
  };
  let mut ok = true;
  for dep in &job.deps {
    if let Some(position) = stack.iter().position(|entry| entry == dep) {
      // On the current walk's stack: treated as complete for this walk.
      cycle_members.extend(stack[position..].iter().cloned());
      continue;
    }
    let Some(dep_job) = jobs.get(dep) else {
      ok = false;
      break;
    };
    match dep_job.state {
      JobState::Complete => {}
      JobState::Satisfied => {
        if !deps_complete(jobs, dep, stack, cycle_members) {
          ok = false;
          break;
        }
      }
      _ => {
        ok = false;
        break;
      }
    }
  }
  stack.pop();
  ok
}
