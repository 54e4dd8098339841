// Copyright 2026 the Prebake authors. MIT license.

//! Event records. Events are plain values with no hidden inheritance;
//! object operands are held by pool identity, primitives inline.

use serde::Serialize;

use crate::object::PropertyKey;
use crate::ObjectId;
use crate::SymbolId;

pub type Seq = u64;

/// An opaque token stored with a `code-bind` origin. The recorder
/// threads it through unchanged; the reknitter uses it to regenerate
/// equivalent code for the bound function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceHandle(pub String);

impl SourceHandle {
  pub fn new(token: impl Into<String>) -> Self {
    Self(token.into())
  }
}

/// An operand as recorded in an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventValue {
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  Str(String),
  Symbol(SymbolId),
  Object(ObjectId),
}

impl EventValue {
  pub fn object_id(&self) -> Option<ObjectId> {
    match self {
      EventValue::Object(id) => Some(*id),
      _ => None,
    }
  }
}

/// The descriptor captured by a `define-property` event, including the
/// accessor pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptorRecord {
  pub value: Option<EventValue>,
  pub getter: Option<EventValue>,
  pub setter: Option<EventValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EventKind {
  // Origins.
  GetGlobal,
  Get {
    target: ObjectId,
    key: PropertyKey,
  },
  Apply {
    callee: ObjectId,
    this: EventValue,
    args: Vec<EventValue>,
  },
  Construct {
    callee: ObjectId,
    args: Vec<EventValue>,
  },
  CodeBind {
    source: SourceHandle,
    frames: Vec<EventValue>,
  },
  GetPrototypeOf {
    target: ObjectId,
  },
  GetOwnPropertyDescriptor {
    target: ObjectId,
    key: PropertyKey,
  },
  // Changes.
  Set {
    target: ObjectId,
    key: PropertyKey,
    value: EventValue,
  },
  Delete {
    target: ObjectId,
    key: PropertyKey,
  },
  DefineProperty {
    target: ObjectId,
    key: PropertyKey,
    descriptor: DescriptorRecord,
  },
  SetPrototypeOf {
    target: ObjectId,
    value: EventValue,
  },
  PreventExtensions {
    target: ObjectId,
  },
}

/// One recorded event, stamped at trap dispatch with a sequence number
/// that totally orders all events across all traps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
  pub seq: Seq,
  #[serde(flatten)]
  pub kind: EventKind,
}
