// Copyright 2026 the Prebake authors. MIT license.

//! Listens for unresolved modules, canonicalizes and fetches them
//! through the fetcher chain, and publishes resolved or error modules.
//! Overlapping fetches are deduplicated on the
//! `(importer-abs, importer-canon, target-abs, target-canon)` quadruple.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::diagnostics::Diagnostic;
use crate::diagnostics::Diagnostics;
use crate::file_fetcher::FetcherChain;
use crate::file_fetcher::Outcome;
use crate::graph::ModuleSet;
use crate::module::ErrorModule;
use crate::module::Module;
use crate::module::ResolvedModule;

type FetchKey = (String, Option<String>, String, Option<String>);

pub struct Gatherer {
  seen: Rc<RefCell<HashSet<FetchKey>>>,
}

impl Gatherer {
  /// Subscribes to new-module events on `module_set`; each unresolved
  /// module triggers one in-flight canonicalize-and-fetch task.
  pub fn spawn(
    module_set: &ModuleSet,
    fetchers: FetcherChain,
    diagnostics: Diagnostics,
  ) -> Self {
    let seen: Rc<RefCell<HashSet<FetchKey>>> = Rc::default();
    let subscription_seen = seen.clone();
    let subscription_set = module_set.clone();
    module_set.on_new_module(Rc::new(move |module| {
      let module_set = subscription_set.clone();
      let fetchers = fetchers.clone();
      let diagnostics = diagnostics.clone();
      let seen = subscription_seen.clone();
      tokio::task::spawn_local(async move {
        gather_one(module_set, fetchers, diagnostics, seen, module).await;
      });
      Ok(())
    }));
    Self { seen }
  }

  /// How many distinct fetch quadruples have been issued; test support.
  pub fn fetches_issued(&self) -> usize {
    self.seen.borrow().len()
  }
}

async fn gather_one(
  module_set: ModuleSet,
  fetchers: FetcherChain,
  diagnostics: Diagnostics,
  seen: Rc<RefCell<HashSet<FetchKey>>>,
  module: Rc<Module>,
) {
  let Some(context) = module.fetch_context().cloned() else {
    return;
  };
  let importer = context.importer.clone();

  // 1. Canonicalize; a non-canonical outcome is an error module under
  //    the tentative id.
  let canon_id = match fetchers.canonicalize(module.id().abs(), &importer).await
  {
    Ok(Outcome::Understood(id)) => id,
    Ok(Outcome::NotUnderstood) => {
      publish_error(
        &module_set,
        &diagnostics,
        &module,
        format!(
          "no fetcher understood \"{}\" (imported from {})",
          module.id(),
          importer
        ),
        context.line,
      );
      return;
    }
    Err(err) => {
      publish_error(
        &module_set,
        &diagnostics,
        &module,
        format!(
          "cannot canonicalize \"{}\" (imported from {}): {:#}",
          module.id(),
          importer,
          err
        ),
        context.line,
      );
      return;
    }
  };

  // 2. Deduplicate. Canonicalization alone is enough to alias the
  //    module into the existing entry.
  let key = (
    importer.abs().to_string(),
    importer.canon().map(|url| url.to_string()),
    module.id().abs().to_string(),
    canon_id.canon().map(|url| url.to_string()),
  );
  if !seen.borrow_mut().insert(key) {
    module_set.link_canonical(&canon_id);
    return;
  }

  // 3. Fetch.
  match fetchers.fetch(&canon_id, &importer).await {
    Ok(Outcome::Understood(fetched)) => {
      log::debug!("gathered {}", canon_id);
      module_set.put(Module::Resolved(ResolvedModule {
        id: canon_id,
        metadata: fetched.metadata,
        source: fetched.source,
      }));
    }
    Ok(Outcome::NotUnderstood) => {
      publish_error(
        &module_set,
        &diagnostics,
        &module,
        format!(
          "no fetcher understood fetch of \"{}\" (imported from {})",
          canon_id, importer
        ),
        context.line,
      );
    }
    Err(err) => {
      publish_error(
        &module_set,
        &diagnostics,
        &module,
        format!(
          "cannot fetch \"{}\" (imported from {}): {:#}",
          canon_id, importer, err
        ),
        context.line,
      );
    }
  }
}

fn publish_error(
  module_set: &ModuleSet,
  diagnostics: &Diagnostics,
  module: &Rc<Module>,
  message: String,
  line: u32,
) {
  let diagnostic =
    Diagnostic::error_at(Some(module.id().clone()), line, message);
  diagnostics.report(&diagnostic);
  module_set.put(Module::Error(ErrorModule::new(
    module.id().clone(),
    diagnostic,
  )));
}
