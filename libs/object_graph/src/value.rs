// Copyright 2026 the Prebake authors. MIT license.

use serde::Serialize;

/// Identity of a live object inside the recorder's store.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
)]
pub struct ObjectId(pub(crate) usize);

/// Identity of a wrapper handed to early code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WrapperId(pub(crate) usize);

/// Identity of a recorded symbol recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SymbolId(pub(crate) usize);

/// The structurally transparent interposition value the recorder hands
/// back in place of an object. Early code can clone and compare it, and
/// must route every operation on it through the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
  pub(crate) id: WrapperId,
}

/// A value as early code sees it. Non-objects pass through unwrapped;
/// objects and functions are always behind a [`Handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  Str(String),
  Symbol(SymbolId),
  Object(Handle),
}

impl Value {
  pub fn is_object(&self) -> bool {
    matches!(self, Value::Object(_))
  }

  pub fn as_handle(&self) -> Option<&Handle> {
    match self {
      Value::Object(handle) => Some(handle),
      _ => None,
    }
  }

  pub fn str(value: impl Into<String>) -> Self {
    Value::Str(value.into())
  }
}
