// Copyright 2026 the Prebake authors. MIT license.

//! Records the origin and mutation of every live value early code
//! touches, in one total order, and can later emit the minimal event
//! list needed to recreate any chosen subgraph.
//!
//! Early code never touches objects directly: it holds [`Handle`]
//! wrappers and routes every operation (`get`, `set`, `apply`,
//! `construct`, ...) through the [`Recorder`], which performs the
//! underlying operation on the live object it owns and records an
//! event stamped with a strictly increasing sequence number.

mod events;
mod object;
mod recorder;
mod replay;
mod serialize;
mod value;

pub use events::DescriptorRecord;
pub use events::Event;
pub use events::EventKind;
pub use events::EventValue;
pub use events::Seq;
pub use events::SourceHandle;
pub use object::Behavior;
pub use object::Descriptor;
pub use object::LiveObject;
pub use object::NativeFn;
pub use object::NativeOutcome;
pub use object::PropertyKey;
pub use object::PropertySlot;
pub use object::SymbolRecipe;
pub use recorder::Recorder;
pub use replay::Replayed;
pub use serialize::Recreation;
pub use serialize::ReplayStep;
pub use value::Handle;
pub use value::ObjectId;
pub use value::SymbolId;
pub use value::Value;

/// Failures of the recorder. Presenting never-wrapped values or foreign
/// wrappers is a programmer error of the caller and fails fast.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
  #[error("value was never wrapped by this recorder")]
  NotWrapped,
  #[error("unknown wrapper; object history was never created")]
  UnknownWrapper,
  #[error("{op} requires an object operand")]
  NotAnObject { op: &'static str },
  #[error("value is not callable: {0}")]
  NotCallable(&'static str),
  #[error("value is not a constructor")]
  NotConstructible,
  #[error("cannot add a property to a non-extensible object")]
  NotExtensible,
  #[error("cannot assign through an accessor without a setter")]
  NoSetter,
  #[error("stack frames must be wrapped objects")]
  FrameNotAnObject,
  #[error("replay references an operand no earlier step produced")]
  ReplayUnresolved,
  #[error("malformed JSON input: {0}")]
  Json(#[from] serde_json::Error),
}
