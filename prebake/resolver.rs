// Copyright 2026 the Prebake authors. MIT license.

//! Resolves module specifier strings against a base URL: built-in
//! lookup first, then a `node_modules`-style walk up the importer's
//! path, then plain URL resolution.

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use url::Url;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
  #[error("Unable to resolve dependency specifier.\n  Specifier: {specifier}\n    from {base}")]
  Unresolved { specifier: String, base: String },
  #[error("invalid base for specifier resolution: {0}")]
  InvalidBase(String),
}

pub struct SpecifierResolver {
  builtins: HashSet<String>,
  probe: Box<dyn Fn(&Path) -> bool>,
}

impl SpecifierResolver {
  pub fn new(builtins: impl IntoIterator<Item = String>) -> Self {
    Self::with_probe(builtins, Box::new(|path| path.exists()))
  }

  /// A resolver with a custom existence probe, so tests need no real
  /// module tree on disk.
  pub fn with_probe(
    builtins: impl IntoIterator<Item = String>,
    probe: Box<dyn Fn(&Path) -> bool>,
  ) -> Self {
    Self {
      builtins: builtins.into_iter().collect(),
      probe,
    }
  }

  pub fn resolve(
    &self,
    specifier: &str,
    base: &Url,
  ) -> Result<Url, ResolveError> {
    if specifier.is_empty() {
      return Err(ResolveError::Unresolved {
        specifier: specifier.to_string(),
        base: base.to_string(),
      });
    }
    if !should_be_treated_as_relative_or_absolute_path(specifier) {
      if let Ok(url) = Url::parse(specifier) {
        return Ok(url);
      }
      // Bare specifier: built-ins win, then the node_modules walk.
      if self.builtins.contains(specifier) {
        return Url::parse(&format!("builtin:{}", specifier)).map_err(|_| {
          ResolveError::Unresolved {
            specifier: specifier.to_string(),
            base: base.to_string(),
          }
        });
      }
      if let Some(url) = self.node_modules_resolve(specifier, base) {
        return Ok(url);
      }
    }
    base
      .join(specifier)
      .map_err(|_| ResolveError::Unresolved {
        specifier: specifier.to_string(),
        base: base.to_string(),
      })
  }

  /// Walks the importer's directory chain upward, probing
  /// `<dir>/node_modules/<specifier>` with the usual file and
  /// `index` candidates.
  fn node_modules_resolve(&self, specifier: &str, base: &Url) -> Option<Url> {
    if base.scheme() != "file" {
      return None;
    }
    let base_path = base.to_file_path().ok()?;
    let mut dir = base_path.parent();
    while let Some(current) = dir {
      let root = current.join("node_modules").join(specifier);
      for candidate in module_candidates(&root) {
        if (self.probe)(&candidate) {
          return Url::from_file_path(candidate).ok();
        }
      }
      dir = current.parent();
    }
    None
  }
}

fn module_candidates(root: &Path) -> Vec<PathBuf> {
  vec![
    root.to_path_buf(),
    root.with_extension("js"),
    root.join("index.js"),
  ]
}

fn should_be_treated_as_relative_or_absolute_path(specifier: &str) -> bool {
  if specifier.is_empty() {
    return false;
  }
  if specifier.starts_with('/') {
    return true;
  }
  is_relative_specifier(specifier)
}

fn is_relative_specifier(specifier: &str) -> bool {
  let mut chars = specifier.chars();
  if chars.next() != Some('.') {
    return false;
  }
  match chars.next() {
    None | Some('/') => true,
    Some('.') => matches!(chars.next(), None | Some('/')),
    Some(_) => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn resolver_with_paths(paths: &[&str]) -> SpecifierResolver {
    let present: HashSet<PathBuf> =
      paths.iter().map(PathBuf::from).collect();
    SpecifierResolver::with_probe(
      vec!["fs".to_string(), "path".to_string()],
      Box::new(move |path| present.contains(path)),
    )
  }

  fn base() -> Url {
    Url::parse("file:///proj/src/main.js").unwrap()
  }

  #[test]
  fn relative_specifiers_join_against_base() {
    let resolver = resolver_with_paths(&[]);
    let url = resolver.resolve("./util.js", &base()).unwrap();
    assert_eq!(url.as_str(), "file:///proj/src/util.js");
    let url = resolver.resolve("../lib/a.js", &base()).unwrap();
    assert_eq!(url.as_str(), "file:///proj/lib/a.js");
  }

  #[test]
  fn builtins_win_over_node_modules() {
    let resolver =
      resolver_with_paths(&["/proj/src/node_modules/fs/index.js"]);
    let url = resolver.resolve("fs", &base()).unwrap();
    assert_eq!(url.as_str(), "builtin:fs");
  }

  #[test]
  fn bare_specifier_walks_node_modules_upward() {
    let resolver = resolver_with_paths(&["/proj/node_modules/left-pad.js"]);
    let url = resolver.resolve("left-pad", &base()).unwrap();
    assert_eq!(url.as_str(), "file:///proj/node_modules/left-pad.js");
  }

  #[test]
  fn nearer_node_modules_wins() {
    let resolver = resolver_with_paths(&[
      "/proj/src/node_modules/dep/index.js",
      "/proj/node_modules/dep/index.js",
    ]);
    let url = resolver.resolve("dep", &base()).unwrap();
    assert_eq!(url.as_str(), "file:///proj/src/node_modules/dep/index.js");
  }

  #[test]
  fn full_urls_pass_through() {
    let resolver = resolver_with_paths(&[]);
    let url = resolver
      .resolve("https://example.com/mod.js", &base())
      .unwrap();
    assert_eq!(url.as_str(), "https://example.com/mod.js");
  }

  #[test]
  fn unmatched_bare_specifier_falls_back_to_url_resolution() {
    let resolver = resolver_with_paths(&[]);
    let url = resolver.resolve("sibling.js", &base()).unwrap();
    assert_eq!(url.as_str(), "file:///proj/src/sibling.js");
  }

  #[test]
  fn empty_specifier_fails() {
    let resolver = resolver_with_paths(&[]);
    assert!(resolver.resolve("", &base()).is_err());
  }
}
