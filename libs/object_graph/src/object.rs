// Copyright 2026 the Prebake authors. MIT license.

//! The live-object store the recorder owns. Property maps keep
//! insertion order so replay observes the same enumeration order.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::events::SourceHandle;
use crate::recorder::Recorder;
use crate::GraphError;
use crate::ObjectId;
use crate::SymbolId;
use crate::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PropertyKey {
  Str(String),
  Symbol(SymbolId),
}

impl PropertyKey {
  pub fn string(key: impl Into<String>) -> Self {
    PropertyKey::Str(key.into())
  }
}

impl From<&str> for PropertyKey {
  fn from(key: &str) -> Self {
    PropertyKey::Str(key.to_string())
  }
}

impl fmt::Display for PropertyKey {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      PropertyKey::Str(key) => write!(f, "{}", key),
      PropertyKey::Symbol(id) => write!(f, "@@symbol({})", id.0),
    }
  }
}

/// A property slot: plain data or an accessor pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertySlot {
  Data { value: Value },
  Accessor {
    getter: Option<Value>,
    setter: Option<Value>,
  },
}

/// The caller-facing descriptor for `define_property`. A getter or
/// setter makes the slot an accessor; otherwise `value` (defaulting to
/// undefined) makes it data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Descriptor {
  pub value: Option<Value>,
  pub getter: Option<Value>,
  pub setter: Option<Value>,
}

impl Descriptor {
  pub fn data(value: Value) -> Self {
    Self {
      value: Some(value),
      ..Self::default()
    }
  }

  pub fn accessor(getter: Option<Value>, setter: Option<Value>) -> Self {
    Self {
      getter,
      setter,
      ..Self::default()
    }
  }

  pub fn is_accessor(&self) -> bool {
    self.getter.is_some() || self.setter.is_some()
  }
}

/// What a native behavior hands back to a trap: an existing (already
/// wrapped) value, or an object it created out of whole cloth, which
/// the trap then wraps with the call event as its origin.
pub enum NativeOutcome {
  Existing(Value),
  Created(ObjectId),
}

pub type NativeFn =
  Rc<dyn Fn(&mut Recorder, &Value, &[Value]) -> Result<NativeOutcome, GraphError>>;

/// How an object behaves when invoked.
#[derive(Clone)]
pub enum Behavior {
  /// An ordinary, non-callable object.
  Plain,
  Native {
    call: Option<NativeFn>,
    construct: Option<NativeFn>,
  },
  /// A function early code created by closing over lexical state. The
  /// recorder keeps the source handle opaque; the reknitter regenerates
  /// equivalent code from it.
  Bound {
    source: SourceHandle,
    frames: Vec<Value>,
  },
}

impl fmt::Debug for Behavior {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Behavior::Plain => write!(f, "Plain"),
      Behavior::Native { call, construct } => write!(
        f,
        "Native {{ call: {}, construct: {} }}",
        call.is_some(),
        construct.is_some()
      ),
      Behavior::Bound { source, frames } => {
        write!(f, "Bound {{ source: {:?}, frames: {} }}", source, frames.len())
      }
    }
  }
}

#[derive(Debug, Clone)]
pub struct LiveObject {
  pub properties: IndexMap<PropertyKey, PropertySlot>,
  pub prototype: Option<ObjectId>,
  pub extensible: bool,
  pub behavior: Behavior,
}

impl LiveObject {
  pub fn plain(prototype: Option<ObjectId>) -> Self {
    Self {
      properties: IndexMap::new(),
      prototype,
      extensible: true,
      behavior: Behavior::Plain,
    }
  }

  pub fn function(behavior: Behavior) -> Self {
    Self {
      properties: IndexMap::new(),
      prototype: None,
      extensible: true,
      behavior,
    }
  }

  pub fn is_callable(&self) -> bool {
    matches!(
      &self.behavior,
      Behavior::Native { call: Some(_), .. } | Behavior::Bound { .. }
    )
  }
}

/// Shared-key symbols replay through the registry; fresh symbols replay
/// as new symbols with the recorded description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SymbolRecipe {
  Registered(String),
  Fresh(Option<String>),
}

/// The arena of live objects, owned by the recorder for its lifetime.
#[derive(Debug, Default)]
pub struct ObjectStore {
  objects: Vec<LiveObject>,
}

impl ObjectStore {
  pub fn alloc(&mut self, object: LiveObject) -> ObjectId {
    let id = ObjectId(self.objects.len());
    self.objects.push(object);
    id
  }

  pub fn get(&self, id: ObjectId) -> &LiveObject {
    &self.objects[id.0]
  }

  pub fn get_mut(&mut self, id: ObjectId) -> &mut LiveObject {
    &mut self.objects[id.0]
  }
}
