// Copyright 2026 the Prebake authors. MIT license.

//! The module set: a monotonic store of lifecycle records that doubles
//! as the pipeline's message bus. All mutation goes through [`ModuleSet::put`],
//! which reconciles arrivals under the preserve-error and
//! preserve-later-stage rules and then fans out promotion notifications.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use percent_encoding::utf8_percent_encode;
use percent_encoding::NON_ALPHANUMERIC;
use url::Url;

use crate::diagnostics::Diagnostic;
use crate::diagnostics::Diagnostics;
use crate::errors::anyhow;
use crate::module::ErrorModule;
use crate::module::FetchContext;
use crate::module::Module;
use crate::module::Stage;
use crate::resolver::SpecifierResolver;
use crate::specifier::ModuleId;
use crate::AnyError;

/// A callback registered for modules arriving at a stage. Failures are
/// reported to diagnostics and do not abort dispatch to other callbacks.
pub type ModuleCallback = Rc<dyn Fn(Rc<Module>) -> Result<(), AnyError>>;

#[derive(Debug, thiserror::Error)]
#[error("module {id} is already past stage {stage}")]
pub struct StagePassed {
  pub id: ModuleId,
  pub stage: Stage,
}

struct Waiter {
  stage: Stage,
  sender: oneshot::Sender<Rc<Module>>,
}

#[derive(Default)]
struct Inner {
  /// Modules keyed by their canonical-resolved key. Absolute spellings
  /// of canonically identified modules reach the same entry through
  /// `aliases`.
  modules: HashMap<String, Rc<Module>>,
  aliases: HashMap<String, String>,
  waiters: HashMap<String, Vec<Waiter>>,
  callbacks: HashMap<Stage, Vec<ModuleCallback>>,
  /// `(absolute key, importer key)` pairs `fetch` has already seen.
  fetched: HashSet<(String, String)>,
}

impl Inner {
  fn resolve_key(&self, key: &str) -> String {
    let mut key = key.to_string();
    while let Some(next) = self.aliases.get(&key) {
      key = next.clone();
    }
    key
  }

  /// Drains the waiters under `key` that the module's current stage
  /// satisfies. An error module satisfies every waiter.
  fn take_ripe_waiters(
    &mut self,
    key: &str,
    result: &Rc<Module>,
  ) -> Vec<(oneshot::Sender<Rc<Module>>, Rc<Module>)> {
    let mut sends = Vec::new();
    if let Some(waiters) = self.waiters.remove(key) {
      let mut keep = Vec::new();
      for waiter in waiters {
        if result.is_error() || waiter.stage <= result.stage() {
          sends.push((waiter.sender, result.clone()));
        } else {
          keep.push(waiter);
        }
      }
      if !keep.is_empty() {
        self.waiters.insert(key.to_string(), keep);
      }
    }
    sends
  }
}

struct Notifications {
  announce: Option<(Stage, Rc<Module>)>,
  waiter_sends: Vec<(oneshot::Sender<Rc<Module>>, Rc<Module>)>,
}

/// The central, cheaply cloneable handle over the store.
#[derive(Clone)]
pub struct ModuleSet {
  inner: Rc<RefCell<Inner>>,
  resolver: Rc<SpecifierResolver>,
  diagnostics: Diagnostics,
}

impl ModuleSet {
  pub fn new(resolver: Rc<SpecifierResolver>, diagnostics: Diagnostics) -> Self {
    Self {
      inner: Rc::new(RefCell::new(Inner::default())),
      resolver,
      diagnostics,
    }
  }

  /// Reconciles `module` into the store and returns the module that now
  /// occupies its id: the incoming module, an existing error module
  /// with merged diagnostics, or an existing later-stage module.
  pub fn put(&self, module: Module) -> Rc<Module> {
    let incoming = Rc::new(module);
    let (result, notifications) = {
      let mut inner = self.inner.borrow_mut();
      reconcile(&mut inner, incoming)
    };
    self.dispatch(notifications);
    result
  }

  pub fn get(&self, id: &ModuleId) -> Option<Rc<Module>> {
    let inner = self.inner.borrow();
    let key = inner.resolve_key(id.key().as_str());
    inner.modules.get(&key).cloned()
  }

  /// The number of distinct modules in the set; aliased spellings of
  /// one module count once.
  pub fn len(&self) -> usize {
    self.inner.borrow().modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.borrow().modules.is_empty()
  }

  pub fn modules(&self) -> Vec<Rc<Module>> {
    self.inner.borrow().modules.values().cloned().collect()
  }

  /// Registers interest in any module arriving at `stage`.
  pub fn on_any_promoted_to(&self, stage: Stage, callback: ModuleCallback) {
    self
      .inner
      .borrow_mut()
      .callbacks
      .entry(stage)
      .or_default()
      .push(callback);
  }

  /// New-module callbacks fire for every unresolved arrival.
  pub fn on_new_module(&self, callback: ModuleCallback) {
    self.on_any_promoted_to(Stage::Unresolved, callback);
  }

  /// A one-shot future completing with the module when it reaches
  /// `stage`, or with an error module when it fails. Completes
  /// immediately when the module is already at `stage` (or errored) and
  /// fails immediately when it is already past it.
  pub fn on_promoted_to(
    &self,
    module: &Module,
    stage: Stage,
  ) -> LocalBoxFuture<'static, Result<Rc<Module>, AnyError>> {
    let receiver = {
      let mut inner = self.inner.borrow_mut();
      let key = inner.resolve_key(module.id().key().as_str());
      if let Some(current) = inner.modules.get(&key).cloned() {
        if current.is_error() || current.stage() == stage {
          return futures::future::ready(Ok(current)).boxed_local();
        }
        if current.stage() > stage {
          let err = StagePassed {
            id: current.id().clone(),
            stage,
          };
          return futures::future::ready(Err(err.into())).boxed_local();
        }
      }
      let (sender, receiver) = oneshot::channel();
      inner
        .waiters
        .entry(key)
        .or_default()
        .push(Waiter { stage, sender });
      receiver
    };
    receiver
      .map(|result| {
        result.map_err(|_| anyhow!("module set dropped before promotion"))
      })
      .boxed_local()
  }

  /// Resolves `specifier` relative to the fetch context's importer and
  /// puts a fresh unresolved module, unless one is already present
  /// under the same absolute key and importer. Returns the module that
  /// occupies the id; specifier resolution failure yields an error
  /// module under a synthesized id.
  pub fn fetch(
    &self,
    specifier: &str,
    fetch_context: &FetchContext,
  ) -> Rc<Module> {
    let base = fetch_context.importer.key().clone();
    let abs = match self.resolver.resolve(specifier, &base) {
      Ok(url) => url,
      Err(err) => {
        let pseudo = Url::parse(&format!(
          "unresolved:{}",
          utf8_percent_encode(specifier, NON_ALPHANUMERIC)
        ))
        .expect("percent-encoded specifier always parses");
        let diagnostic = Diagnostic::error_at(
          Some(fetch_context.importer.clone()),
          fetch_context.line,
          err.to_string(),
        );
        return self.put(Module::Error(ErrorModule::new(
          ModuleId::tentative(pseudo),
          diagnostic,
        )));
      }
    };
    let abs_key = abs.to_string();
    let importer_key = fetch_context.importer.key().to_string();
    let existing = {
      let mut inner = self.inner.borrow_mut();
      if !inner.fetched.insert((abs_key.clone(), importer_key)) {
        let key = inner.resolve_key(&abs_key);
        inner.modules.get(&key).cloned()
      } else {
        None
      }
    };
    if let Some(existing) = existing {
      return existing;
    }
    self.put(Module::unresolved(
      ModuleId::tentative(abs),
      fetch_context.clone(),
    ))
  }

  /// Aliases a tentative spelling onto its canonical key without
  /// announcing anything; canonicalization alone is enough to fold the
  /// module into an existing entry.
  pub(crate) fn link_canonical(&self, id: &ModuleId) {
    let Some(canon) = id.canon() else {
      return;
    };
    let sends = {
      let mut inner = self.inner.borrow_mut();
      let abs_slot = inner.resolve_key(id.abs().as_str());
      let canon_slot = inner.resolve_key(canon.as_str());
      if abs_slot == canon_slot {
        return;
      }
      let displaced = inner.modules.remove(&abs_slot);
      let resident = inner.modules.get(&canon_slot).cloned();
      inner.aliases.insert(abs_slot.clone(), canon_slot.clone());
      // On a tie the canonical occupant keeps the slot.
      let winner = [displaced, resident]
        .into_iter()
        .flatten()
        .max_by_key(|m| m.stage());
      let moved = inner.waiters.remove(&abs_slot).unwrap_or_default();
      inner
        .waiters
        .entry(canon_slot.clone())
        .or_default()
        .extend(moved);
      match winner {
        Some(winner) => {
          inner.modules.insert(canon_slot.clone(), winner.clone());
          inner.take_ripe_waiters(&canon_slot, &winner)
        }
        None => Vec::new(),
      }
    };
    for (sender, module) in sends {
      let _ = sender.send(module);
    }
  }

  fn dispatch(&self, notifications: Notifications) {
    for (sender, module) in notifications.waiter_sends {
      let _ = sender.send(module);
    }
    if let Some((stage, module)) = notifications.announce {
      let callbacks = {
        let inner = self.inner.borrow();
        inner.callbacks.get(&stage).cloned().unwrap_or_default()
      };
      for callback in callbacks {
        if let Err(err) = callback(module.clone()) {
          self.diagnostics.report(&Diagnostic::error(
            Some(module.id().clone()),
            format!("module callback failed: {:#}", err),
          ));
        }
      }
    }
  }
}

/// Applies the put rules, in order: preserve-error, error absorption,
/// preserve-later-stage, store-incoming. The winner is indexed under
/// both of the incoming module's keys.
fn reconcile(
  inner: &mut Inner,
  incoming: Rc<Module>,
) -> (Rc<Module>, Notifications) {
  let abs_slot = inner.resolve_key(incoming.id().abs().as_str());
  let canon_slot = incoming
    .id()
    .canon()
    .map(|canon| inner.resolve_key(canon.as_str()));

  let occ_abs = inner.modules.get(&abs_slot).cloned();
  let occ_canon = canon_slot
    .as_ref()
    .and_then(|key| inner.modules.get(key).cloned());

  let primary = canon_slot.clone().unwrap_or_else(|| abs_slot.clone());
  if let Some(canon_slot) = &canon_slot {
    if *canon_slot != abs_slot {
      inner.modules.remove(&abs_slot);
      inner.aliases.insert(abs_slot.clone(), canon_slot.clone());
      let moved = inner.waiters.remove(&abs_slot).unwrap_or_default();
      inner
        .waiters
        .entry(canon_slot.clone())
        .or_default()
        .extend(moved);
    }
  }

  let mut announce = None;
  let resident_error = occ_abs
    .iter()
    .chain(occ_canon.iter())
    .find(|module| module.is_error())
    .cloned();

  let result = if let Some(error) = resident_error {
    // An error module never leaves the error state; fold the arrival's
    // diagnostics into it.
    let merged = match (&*error, incoming.errors()) {
      (Module::Error(resident), Some(diagnostics)) => {
        let mut resident = resident.clone();
        resident.merge_errors(diagnostics);
        Rc::new(Module::Error(resident))
      }
      _ => error,
    };
    inner.modules.insert(primary.clone(), merged.clone());
    if incoming.is_error() {
      announce = Some((Stage::Error, merged.clone()));
    }
    merged
  } else if incoming.is_error() {
    inner.modules.insert(primary.clone(), incoming.clone());
    announce = Some((Stage::Error, incoming.clone()));
    incoming
  } else {
    let resident = [occ_abs, occ_canon]
      .into_iter()
      .flatten()
      .max_by_key(|module| module.stage());
    match resident {
      Some(resident) if resident.stage() > incoming.stage() => {
        inner.modules.insert(primary.clone(), resident.clone());
        resident
      }
      Some(resident)
        if resident.stage() == incoming.stage()
          && incoming.id().is_canonical() =>
      {
        // A canonically identified occupant is not displaced by an
        // equal arrival; listeners see the occupant again.
        inner.modules.insert(primary.clone(), resident.clone());
        announce = Some((resident.stage(), resident.clone()));
        resident
      }
      _ => {
        inner.modules.insert(primary.clone(), incoming.clone());
        announce = Some((incoming.stage(), incoming.clone()));
        incoming
      }
    }
  };

  let waiter_sends = inner.take_ripe_waiters(&primary, &result);
  (
    result,
    Notifications {
      announce,
      waiter_sends,
    },
  )
}
