// Copyright 2026 the Prebake authors. MIT license.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

use serde::Serialize;
use url::Url;

/// Identifies a module by its absolute URL and, once the fetcher chain
/// has canonicalized it, by the canonical URL that decides module
/// identity. Ids are immutable once created.
///
/// Two ids are equal when their keys are equal: the canonical URL when
/// present, the absolute URL otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleId {
  abs: Url,
  canon: Option<Url>,
}

impl ModuleId {
  /// An id whose canonical URL is not yet known.
  pub fn tentative(abs: Url) -> Self {
    Self { abs, canon: None }
  }

  pub fn canonical(abs: Url, canon: Url) -> Self {
    Self {
      abs,
      canon: Some(canon),
    }
  }

  pub fn abs(&self) -> &Url {
    &self.abs
  }

  pub fn canon(&self) -> Option<&Url> {
    self.canon.as_ref()
  }

  pub fn is_canonical(&self) -> bool {
    self.canon.is_some()
  }

  /// The equality key: the canonical URL when present, the absolute URL
  /// otherwise.
  pub fn key(&self) -> &Url {
    self.canon.as_ref().unwrap_or(&self.abs)
  }
}

impl PartialEq for ModuleId {
  fn eq(&self, other: &Self) -> bool {
    self.key() == other.key()
  }
}

impl Eq for ModuleId {}

impl Hash for ModuleId {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.key().as_str().hash(state);
  }
}

impl fmt::Display for ModuleId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.key())
  }
}
