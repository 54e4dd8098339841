// Copyright 2026 the Prebake authors. MIT license.

//! The recorder: one wrapper per distinct live object, every access
//! trapped, every event stamped from one monotonic counter at trap
//! dispatch.

use std::collections::HashMap;
use std::rc::Rc;

use crate::events::DescriptorRecord;
use crate::events::Event;
use crate::events::EventKind;
use crate::events::EventValue;
use crate::events::Seq;
use crate::events::SourceHandle;
use crate::object::Behavior;
use crate::object::Descriptor;
use crate::object::LiveObject;
use crate::object::NativeFn;
use crate::object::NativeOutcome;
use crate::object::ObjectStore;
use crate::object::PropertyKey;
use crate::object::PropertySlot;
use crate::object::SymbolRecipe;
use crate::value::WrapperId;
use crate::GraphError;
use crate::Handle;
use crate::ObjectId;
use crate::SymbolId;
use crate::Value;

/// The global bindings wrapped eagerly at construction, so every object
/// a replayer could need is reachable through a deterministic access
/// path.
const WELL_KNOWN_CONSTRUCTORS: &[&str] = &[
  "Object", "Array", "Function", "Number", "String", "Boolean", "Symbol",
  "Error",
];

pub(crate) struct ObjectHistory {
  pub origin: Event,
  pub changes: Vec<Event>,
  pub wrapper: Handle,
}

pub struct Recorder {
  store: ObjectStore,
  /// object -> history; every wrapped object has exactly one entry.
  pub(crate) histories: HashMap<ObjectId, ObjectHistory>,
  /// wrapper -> object; wrappers pin their backing object, which the
  /// recorder owns for its own lifetime anyway.
  wrappers: HashMap<WrapperId, ObjectId>,
  next_wrapper: usize,
  next_seq: Seq,
  pub(crate) symbols: Vec<SymbolRecipe>,
  global: ObjectId,
  global_handle: Handle,
  object_proto: ObjectId,
  array_proto: ObjectId,
  object_ctor: ObjectId,
  array_ctor: ObjectId,
}

impl Default for Recorder {
  fn default() -> Self {
    Self::new()
  }
}

impl Recorder {
  pub fn new() -> Self {
    let mut store = ObjectStore::default();
    let global = store.alloc(LiveObject::plain(None));
    let object_proto = store.alloc(LiveObject::plain(None));
    let array_proto = store.alloc(LiveObject::plain(Some(object_proto)));
    let mut recorder = Self {
      store,
      histories: HashMap::new(),
      wrappers: HashMap::new(),
      next_wrapper: 0,
      next_seq: 0,
      symbols: Vec::new(),
      global,
      global_handle: Handle { id: WrapperId(0) },
      object_proto,
      array_proto,
      object_ctor: global,
      array_ctor: global,
    };
    // The root of every access path.
    let seq = recorder.alloc_seq();
    recorder.global_handle =
      recorder.wrap_new(global, EventKind::GetGlobal, seq);
    for name in WELL_KNOWN_CONSTRUCTORS {
      let behavior = match *name {
        "Object" => constructor_of(Recorder::alloc_plain),
        "Array" => constructor_of(Recorder::alloc_array),
        _ => opaque_constructor(),
      };
      let ctor = recorder.store.alloc(LiveObject::function(behavior));
      let seq = recorder.alloc_seq();
      let handle = recorder.wrap_new(
        ctor,
        EventKind::Get {
          target: global,
          key: PropertyKey::string(*name),
        },
        seq,
      );
      recorder.store.get_mut(global).properties.insert(
        PropertyKey::string(*name),
        PropertySlot::Data {
          value: Value::Object(handle),
        },
      );
      match *name {
        "Object" => recorder.object_ctor = ctor,
        "Array" => recorder.array_ctor = ctor,
        _ => {}
      }
    }
    recorder
  }

  /// The wrapper over the global object.
  pub fn global(&self) -> Handle {
    self.global_handle
  }

  /// Installs a host-provided native function as a global binding; the
  /// binding is wrapped immediately so it stays reachable through a
  /// deterministic access path.
  pub fn define_global_function(&mut self, name: &str, call: NativeFn) -> Value {
    let func = self.store.alloc(LiveObject::function(Behavior::Native {
      call: Some(call),
      construct: None,
    }));
    let seq = self.alloc_seq();
    let handle = self.wrap_new(
      func,
      EventKind::Get {
        target: self.global,
        key: PropertyKey::string(name),
      },
      seq,
    );
    let value = Value::Object(handle);
    self.store.get_mut(self.global).properties.insert(
      PropertyKey::string(name),
      PropertySlot::Data {
        value: value.clone(),
      },
    );
    value
  }

  // Traps ----------------------------------------------------------

  /// Read a property. Data reads record nothing; a user-defined getter
  /// may mutate, so the access itself is recorded before the getter
  /// runs.
  pub fn get(
    &mut self,
    target: &Handle,
    key: &PropertyKey,
  ) -> Result<Value, GraphError> {
    let object = self.object_of(target)?;
    match self.find_slot(object, key) {
      None => Ok(Value::Undefined),
      Some(PropertySlot::Data { value }) => Ok(value),
      Some(PropertySlot::Accessor { getter: None, .. }) => {
        Ok(Value::Undefined)
      }
      Some(PropertySlot::Accessor {
        getter: Some(getter),
        ..
      }) => {
        let seq = self.alloc_seq();
        self.record_change(
          object,
          Event {
            seq,
            kind: EventKind::Get {
              target: object,
              key: key.clone(),
            },
          },
        )?;
        let getter = *getter
          .as_handle()
          .ok_or(GraphError::NotCallable("getter is not a function"))?;
        self.apply(&getter, Value::Object(*target), Vec::new())
      }
    }
  }

  pub fn set(
    &mut self,
    target: &Handle,
    key: PropertyKey,
    value: Value,
  ) -> Result<(), GraphError> {
    let seq = self.alloc_seq();
    let object = self.object_of(target)?;
    let recorded = EventKind::Set {
      target: object,
      key: key.clone(),
      value: self.event_value(&value)?,
    };
    self.record_change(object, Event { seq, kind: recorded })?;

    let own = self.store.get(object).properties.get(&key).cloned();
    match own {
      Some(PropertySlot::Accessor { setter, .. }) => {
        let Some(setter) = setter else {
          return Err(GraphError::NoSetter);
        };
        let setter = *setter
          .as_handle()
          .ok_or(GraphError::NotCallable("setter is not a function"))?;
        self.apply(&setter, Value::Object(*target), vec![value])?;
        Ok(())
      }
      Some(PropertySlot::Data { .. }) => {
        self
          .store
          .get_mut(object)
          .properties
          .insert(key, PropertySlot::Data { value });
        Ok(())
      }
      None => {
        // An inherited accessor still intercepts the write.
        if let Some(proto) = self.store.get(object).prototype {
          if let Some(PropertySlot::Accessor { setter, .. }) =
            self.find_slot(proto, &key)
          {
            let Some(setter) = setter else {
              return Err(GraphError::NoSetter);
            };
            let setter = *setter
              .as_handle()
              .ok_or(GraphError::NotCallable("setter is not a function"))?;
            self.apply(&setter, Value::Object(*target), vec![value])?;
            return Ok(());
          }
        }
        if !self.store.get(object).extensible {
          return Err(GraphError::NotExtensible);
        }
        self
          .store
          .get_mut(object)
          .properties
          .insert(key, PropertySlot::Data { value });
        Ok(())
      }
    }
  }

  pub fn delete(
    &mut self,
    target: &Handle,
    key: PropertyKey,
  ) -> Result<(), GraphError> {
    let seq = self.alloc_seq();
    let object = self.object_of(target)?;
    self.record_change(
      object,
      Event {
        seq,
        kind: EventKind::Delete {
          target: object,
          key: key.clone(),
        },
      },
    )?;
    self.store.get_mut(object).properties.shift_remove(&key);
    Ok(())
  }

  pub fn define_property(
    &mut self,
    target: &Handle,
    key: PropertyKey,
    descriptor: Descriptor,
  ) -> Result<(), GraphError> {
    let seq = self.alloc_seq();
    let object = self.object_of(target)?;
    let record = DescriptorRecord {
      value: self.maybe_event_value(descriptor.value.as_ref())?,
      getter: self.maybe_event_value(descriptor.getter.as_ref())?,
      setter: self.maybe_event_value(descriptor.setter.as_ref())?,
    };
    self.record_change(
      object,
      Event {
        seq,
        kind: EventKind::DefineProperty {
          target: object,
          key: key.clone(),
          descriptor: record,
        },
      },
    )?;
    let is_new = !self.store.get(object).properties.contains_key(&key);
    if is_new && !self.store.get(object).extensible {
      return Err(GraphError::NotExtensible);
    }
    let slot = if descriptor.is_accessor() {
      PropertySlot::Accessor {
        getter: descriptor.getter,
        setter: descriptor.setter,
      }
    } else {
      PropertySlot::Data {
        value: descriptor.value.unwrap_or(Value::Undefined),
      }
    };
    self.store.get_mut(object).properties.insert(key, slot);
    Ok(())
  }

  pub fn get_own_property_descriptor(
    &mut self,
    target: &Handle,
    key: &PropertyKey,
  ) -> Result<Option<Descriptor>, GraphError> {
    let object = self.object_of(target)?;
    Ok(self.store.get(object).properties.get(key).cloned().map(
      |slot| match slot {
        PropertySlot::Data { value } => Descriptor::data(value),
        PropertySlot::Accessor { getter, setter } => {
          Descriptor::accessor(getter, setter)
        }
      },
    ))
  }

  /// Read the prototype. No change is recorded; a prototype object seen
  /// for the first time gets a `get-prototype-of` origin.
  pub fn get_prototype_of(
    &mut self,
    target: &Handle,
  ) -> Result<Value, GraphError> {
    let object = self.object_of(target)?;
    match self.store.get(object).prototype {
      None => Ok(Value::Null),
      Some(proto) => {
        if let Some(history) = self.histories.get(&proto) {
          return Ok(Value::Object(history.wrapper));
        }
        let seq = self.alloc_seq();
        let handle =
          self.wrap_new(proto, EventKind::GetPrototypeOf { target: object }, seq);
        Ok(Value::Object(handle))
      }
    }
  }

  pub fn set_prototype_of(
    &mut self,
    target: &Handle,
    value: Value,
  ) -> Result<(), GraphError> {
    let seq = self.alloc_seq();
    let object = self.object_of(target)?;
    let prototype = match &value {
      Value::Null => None,
      Value::Object(handle) => Some(self.object_of(handle)?),
      _ => {
        return Err(GraphError::NotAnObject {
          op: "set_prototype_of",
        })
      }
    };
    let recorded = EventKind::SetPrototypeOf {
      target: object,
      value: self.event_value(&value)?,
    };
    self.record_change(object, Event { seq, kind: recorded })?;
    self.store.get_mut(object).prototype = prototype;
    Ok(())
  }

  /// Recorded unconditionally before the underlying operation.
  pub fn prevent_extensions(
    &mut self,
    target: &Handle,
  ) -> Result<(), GraphError> {
    let seq = self.alloc_seq();
    let object = self.object_of(target)?;
    self.record_change(
      object,
      Event {
        seq,
        kind: EventKind::PreventExtensions { target: object },
      },
    )?;
    self.store.get_mut(object).extensible = false;
    Ok(())
  }

  /// Call a function. The call is recorded as the origin of the value
  /// it returns, when that value is an object created by the call.
  pub fn apply(
    &mut self,
    callee: &Handle,
    this: Value,
    args: Vec<Value>,
  ) -> Result<Value, GraphError> {
    let seq = self.alloc_seq();
    let callee_object = self.object_of(callee)?;
    let call = match &self.store.get(callee_object).behavior {
      Behavior::Native { call: Some(call), .. } => call.clone(),
      Behavior::Bound { .. } => {
        // Executing rewritten code is the sandbox's job; the recorder
        // only carries the handle.
        return Err(GraphError::NotCallable(
          "code-bound function has no native behavior",
        ));
      }
      _ => return Err(GraphError::NotCallable("object is not a function")),
    };
    match call(self, &this, &args)? {
      NativeOutcome::Existing(value) => Ok(value),
      NativeOutcome::Created(object) => {
        let kind = EventKind::Apply {
          callee: callee_object,
          this: self.event_value(&this)?,
          args: self.event_values(&args)?,
        };
        let handle = self.wrap_new(object, kind, seq);
        Ok(Value::Object(handle))
      }
    }
  }

  pub fn construct(
    &mut self,
    callee: &Handle,
    args: Vec<Value>,
  ) -> Result<Value, GraphError> {
    let seq = self.alloc_seq();
    let callee_object = self.object_of(callee)?;
    let construct = match &self.store.get(callee_object).behavior {
      Behavior::Native {
        construct: Some(construct),
        ..
      } => construct.clone(),
      _ => return Err(GraphError::NotConstructible),
    };
    match construct(self, &Value::Undefined, &args)? {
      NativeOutcome::Existing(value) => Ok(value),
      NativeOutcome::Created(object) => {
        let kind = EventKind::Construct {
          callee: callee_object,
          args: self.event_values(&args)?,
        };
        let handle = self.wrap_new(object, kind, seq);
        Ok(Value::Object(handle))
      }
    }
  }

  /// Records a function early code created by closing over mutable
  /// lexical state. The source handle is threaded through unchanged;
  /// the stack frames must already be wrapped.
  pub fn bind_code(
    &mut self,
    source: SourceHandle,
    frames: Vec<Value>,
  ) -> Result<Value, GraphError> {
    let seq = self.alloc_seq();
    let mut frame_values = Vec::with_capacity(frames.len());
    for frame in &frames {
      match frame {
        Value::Object(handle) => {
          frame_values.push(EventValue::Object(self.object_of(handle)?))
        }
        _ => return Err(GraphError::FrameNotAnObject),
      }
    }
    let function = self.store.alloc(LiveObject::function(Behavior::Bound {
      source: source.clone(),
      frames,
    }));
    let handle = self.wrap_new(
      function,
      EventKind::CodeBind {
        source,
        frames: frame_values,
      },
      seq,
    );
    Ok(Value::Object(handle))
  }

  /// Wraps a symbol as a recipe for its re-creation.
  pub fn make_symbol(&mut self, recipe: SymbolRecipe) -> Value {
    let id = SymbolId(self.symbols.len());
    self.symbols.push(recipe);
    Value::Symbol(id)
  }

  pub fn symbol_recipe(&self, id: SymbolId) -> Option<&SymbolRecipe> {
    self.symbols.get(id.0)
  }

  /// The platform's string-to-object deserializer, intercepted: every
  /// materialized object and array enters the graph through synthesized
  /// `construct` and `define-property` events instead of slipping past
  /// interposition. Any other value faucet must use the same technique.
  pub fn parse_json(&mut self, text: &str) -> Result<Value, GraphError> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    self.materialize_json(&json)
  }

  fn materialize_json(
    &mut self,
    json: &serde_json::Value,
  ) -> Result<Value, GraphError> {
    match json {
      serde_json::Value::Null => Ok(Value::Null),
      serde_json::Value::Bool(value) => Ok(Value::Bool(*value)),
      serde_json::Value::Number(value) => {
        Ok(Value::Number(value.as_f64().unwrap_or(f64::NAN)))
      }
      serde_json::Value::String(value) => Ok(Value::str(value)),
      serde_json::Value::Array(items) => {
        let seq = self.alloc_seq();
        let object = self.alloc_array();
        let kind = EventKind::Construct {
          callee: self.array_ctor,
          args: Vec::new(),
        };
        let handle = self.wrap_new(object, kind, seq);
        for (index, item) in items.iter().enumerate() {
          let value = self.materialize_json(item)?;
          self.define_property(
            &handle,
            PropertyKey::string(index.to_string()),
            Descriptor::data(value),
          )?;
        }
        Ok(Value::Object(handle))
      }
      serde_json::Value::Object(entries) => {
        let seq = self.alloc_seq();
        let object = self.alloc_plain();
        let kind = EventKind::Construct {
          callee: self.object_ctor,
          args: Vec::new(),
        };
        let handle = self.wrap_new(object, kind, seq);
        for (key, item) in entries {
          let value = self.materialize_json(item)?;
          self.define_property(
            &handle,
            PropertyKey::string(key),
            Descriptor::data(value),
          )?;
        }
        Ok(Value::Object(handle))
      }
    }
  }

  // Internals ------------------------------------------------------

  fn alloc_seq(&mut self) -> Seq {
    let seq = self.next_seq;
    self.next_seq += 1;
    seq
  }

  fn alloc_plain(&mut self) -> ObjectId {
    let proto = self.object_proto;
    self.store.alloc(LiveObject::plain(Some(proto)))
  }

  fn alloc_array(&mut self) -> ObjectId {
    let proto = self.array_proto;
    self.store.alloc(LiveObject::plain(Some(proto)))
  }

  /// Creates the one wrapper an object ever gets, with its origin
  /// event. Wrapping an already-wrapped object is a programmer error of
  /// the core.
  fn wrap_new(
    &mut self,
    object: ObjectId,
    origin: EventKind,
    seq: Seq,
  ) -> Handle {
    assert!(
      !self.histories.contains_key(&object),
      "object already has a wrapper"
    );
    let wrapper = WrapperId(self.next_wrapper);
    self.next_wrapper += 1;
    let handle = Handle { id: wrapper };
    self.wrappers.insert(wrapper, object);
    self.histories.insert(
      object,
      ObjectHistory {
        origin: Event { seq, kind: origin },
        changes: Vec::new(),
        wrapper: handle,
      },
    );
    handle
  }

  pub(crate) fn object_of(
    &self,
    handle: &Handle,
  ) -> Result<ObjectId, GraphError> {
    self
      .wrappers
      .get(&handle.id)
      .copied()
      .ok_or(GraphError::UnknownWrapper)
  }

  fn record_change(
    &mut self,
    object: ObjectId,
    event: Event,
  ) -> Result<(), GraphError> {
    let history = self
      .histories
      .get_mut(&object)
      .ok_or(GraphError::UnknownWrapper)?;
    history.changes.push(event);
    Ok(())
  }

  fn find_slot(
    &self,
    object: ObjectId,
    key: &PropertyKey,
  ) -> Option<PropertySlot> {
    let mut current = Some(object);
    while let Some(id) = current {
      let live = self.store.get(id);
      if let Some(slot) = live.properties.get(key) {
        return Some(slot.clone());
      }
      current = live.prototype;
    }
    None
  }

  fn event_value(&self, value: &Value) -> Result<EventValue, GraphError> {
    Ok(match value {
      Value::Undefined => EventValue::Undefined,
      Value::Null => EventValue::Null,
      Value::Bool(value) => EventValue::Bool(*value),
      Value::Number(value) => EventValue::Number(*value),
      Value::Str(value) => EventValue::Str(value.clone()),
      Value::Symbol(id) => EventValue::Symbol(*id),
      Value::Object(handle) => EventValue::Object(self.object_of(handle)?),
    })
  }

  fn event_values(
    &self,
    values: &[Value],
  ) -> Result<Vec<EventValue>, GraphError> {
    values.iter().map(|value| self.event_value(value)).collect()
  }

  fn maybe_event_value(
    &self,
    value: Option<&Value>,
  ) -> Result<Option<EventValue>, GraphError> {
    value.map(|value| self.event_value(value)).transpose()
  }
}

fn constructor_of(
  alloc: fn(&mut Recorder) -> ObjectId,
) -> Behavior {
  let call: NativeFn =
    Rc::new(move |recorder, _this, _args| Ok(NativeOutcome::Created(alloc(recorder))));
  let construct: NativeFn =
    Rc::new(move |recorder, _this, _args| Ok(NativeOutcome::Created(alloc(recorder))));
  Behavior::Native {
    call: Some(call),
    construct: Some(construct),
  }
}

/// The remaining well-known constructors only need to exist and be
/// reachable; calling them returns undefined, constructing yields a
/// plain object.
fn opaque_constructor() -> Behavior {
  let call: NativeFn =
    Rc::new(|_recorder, _this, _args| Ok(NativeOutcome::Existing(Value::Undefined)));
  let construct: NativeFn = Rc::new(|recorder, _this, _args| {
    Ok(NativeOutcome::Created(recorder.alloc_plain()))
  });
  Behavior::Native {
    call: Some(call),
    construct: Some(construct),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn global_binding(recorder: &mut Recorder, name: &str) -> Handle {
    let global = recorder.global();
    let value = recorder.get(&global, &name.into()).unwrap();
    *value.as_handle().expect("well-known bindings are objects")
  }

  #[test]
  fn well_known_bindings_are_wrapped_eagerly() {
    let mut recorder = Recorder::new();
    let object_a = global_binding(&mut recorder, "Object");
    let object_b = global_binding(&mut recorder, "Object");
    // One wrapper per distinct object: repeated reads return the same
    // handle, and no new events are recorded by data reads.
    assert_eq!(object_a, object_b);
  }

  #[test]
  fn construct_and_mutate_records_in_order() {
    let mut recorder = Recorder::new();
    let object_ctor = global_binding(&mut recorder, "Object");
    let created = recorder.construct(&object_ctor, Vec::new()).unwrap();
    let handle = *created.as_handle().unwrap();
    recorder
      .set(&handle, "x".into(), Value::Number(1.0))
      .unwrap();
    recorder.set(&handle, "y".into(), Value::str("str")).unwrap();
    let got = recorder.get(&handle, &"x".into()).unwrap();
    assert_eq!(got, Value::Number(1.0));
    let deleted = recorder.delete(&handle, "x".into());
    assert!(deleted.is_ok());
    assert_eq!(recorder.get(&handle, &"x".into()).unwrap(), Value::Undefined);
  }

  #[test]
  fn sequence_numbers_strictly_increase_across_traps() {
    let mut recorder = Recorder::new();
    let object_ctor = global_binding(&mut recorder, "Object");
    let a = recorder.construct(&object_ctor, Vec::new()).unwrap();
    let b = recorder.construct(&object_ctor, Vec::new()).unwrap();
    let a = *a.as_handle().unwrap();
    let b = *b.as_handle().unwrap();
    recorder.set(&a, "p".into(), Value::Bool(true)).unwrap();
    recorder.set(&b, "q".into(), Value::Bool(false)).unwrap();
    recorder.set(&a, "r".into(), Value::Null).unwrap();
    let object_a = recorder.object_of(&a).unwrap();
    let object_b = recorder.object_of(&b).unwrap();
    let mut seqs: Vec<Seq> = Vec::new();
    for object in [object_a, object_b] {
      let history = recorder.histories.get(&object).unwrap();
      seqs.push(history.origin.seq);
      seqs.extend(history.changes.iter().map(|event| event.seq));
    }
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), seqs.len(), "no two events share a seq");
  }

  #[test]
  fn user_defined_getter_records_an_access() {
    let mut recorder = Recorder::new();
    let getter = recorder.define_global_function(
      "answer",
      Rc::new(|_recorder, _this, _args| {
        Ok(NativeOutcome::Existing(Value::Number(42.0)))
      }),
    );
    let object_ctor = global_binding(&mut recorder, "Object");
    let created = recorder.construct(&object_ctor, Vec::new()).unwrap();
    let handle = *created.as_handle().unwrap();
    recorder
      .define_property(
        &handle,
        "lazy".into(),
        Descriptor::accessor(Some(getter), None),
      )
      .unwrap();
    let value = recorder.get(&handle, &"lazy".into()).unwrap();
    assert_eq!(value, Value::Number(42.0));
    let object = recorder.object_of(&handle).unwrap();
    let history = recorder.histories.get(&object).unwrap();
    let kinds: Vec<_> = history
      .changes
      .iter()
      .map(|event| std::mem::discriminant(&event.kind))
      .collect();
    // define-property, then the recorded getter access.
    assert_eq!(kinds.len(), 2);
    assert!(matches!(
      history.changes[1].kind,
      EventKind::Get { .. }
    ));
  }

  #[test]
  fn prevent_extensions_is_recorded_before_the_operation() {
    let mut recorder = Recorder::new();
    let object_ctor = global_binding(&mut recorder, "Object");
    let created = recorder.construct(&object_ctor, Vec::new()).unwrap();
    let handle = *created.as_handle().unwrap();
    recorder.prevent_extensions(&handle).unwrap();
    let err = recorder
      .set(&handle, "late".into(), Value::Bool(true))
      .expect_err("frozen object rejects new properties");
    assert!(matches!(err, GraphError::NotExtensible));
    let object = recorder.object_of(&handle).unwrap();
    let history = recorder.histories.get(&object).unwrap();
    assert!(matches!(
      history.changes[0].kind,
      EventKind::PreventExtensions { .. }
    ));
    // The failed set still recorded its event, after the freeze.
    assert!(matches!(history.changes[1].kind, EventKind::Set { .. }));
  }

  #[test]
  fn prototype_read_wraps_lazily_with_an_origin() {
    let mut recorder = Recorder::new();
    let object_ctor = global_binding(&mut recorder, "Object");
    let created = recorder.construct(&object_ctor, Vec::new()).unwrap();
    let handle = *created.as_handle().unwrap();
    let proto = recorder.get_prototype_of(&handle).unwrap();
    let proto_handle = *proto.as_handle().expect("plain objects have a proto");
    let proto_object = recorder.object_of(&proto_handle).unwrap();
    let history = recorder.histories.get(&proto_object).unwrap();
    assert!(matches!(
      history.origin.kind,
      EventKind::GetPrototypeOf { .. }
    ));
    // The second read returns the same wrapper.
    let again = recorder.get_prototype_of(&handle).unwrap();
    assert_eq!(again.as_handle(), Some(&proto_handle));
  }

  #[test]
  fn foreign_wrapper_fails_fast() {
    let mut first = Recorder::new();
    let mut second = Recorder::new();
    let object_ctor = global_binding(&mut first, "Object");
    let foreign = first.construct(&object_ctor, Vec::new()).unwrap();
    // `second` never wrapped this object.
    let err = second
      .set(
        foreign.as_handle().unwrap(),
        "x".into(),
        Value::Undefined,
      )
      .expect_err("foreign wrappers are rejected");
    assert!(matches!(err, GraphError::UnknownWrapper));
  }

  #[test]
  fn parse_json_materializes_through_events() {
    let mut recorder = Recorder::new();
    let value = recorder
      .parse_json(r#"{"name":"demo","tags":["a","b"],"count":2}"#)
      .unwrap();
    let handle = *value.as_handle().unwrap();
    assert_eq!(
      recorder.get(&handle, &"name".into()).unwrap(),
      Value::str("demo")
    );
    assert_eq!(
      recorder.get(&handle, &"count".into()).unwrap(),
      Value::Number(2.0)
    );
    let tags = recorder.get(&handle, &"tags".into()).unwrap();
    let tags = *tags.as_handle().unwrap();
    assert_eq!(recorder.get(&tags, &"1".into()).unwrap(), Value::str("b"));
    // The materialized object's origin is a synthesized construct.
    let object = recorder.object_of(&handle).unwrap();
    let history = recorder.histories.get(&object).unwrap();
    assert!(matches!(history.origin.kind, EventKind::Construct { .. }));
    assert_eq!(history.changes.len(), 3, "one define-property per key");
  }

  #[test]
  fn bind_code_requires_wrapped_frames() {
    let mut recorder = Recorder::new();
    let err = recorder
      .bind_code(SourceHandle::new("fn#1"), vec![Value::Number(1.0)])
      .expect_err("primitive frames are rejected");
    assert!(matches!(err, GraphError::FrameNotAnObject));

    let object_ctor = global_binding(&mut recorder, "Object");
    let frame = recorder.construct(&object_ctor, Vec::new()).unwrap();
    let bound = recorder
      .bind_code(SourceHandle::new("fn#1"), vec![frame])
      .unwrap();
    let handle = *bound.as_handle().unwrap();
    let object = recorder.object_of(&handle).unwrap();
    let history = recorder.histories.get(&object).unwrap();
    assert!(matches!(history.origin.kind, EventKind::CodeBind { .. }));
    // Code-bound functions are the sandbox's to execute, not ours.
    let err = recorder
      .apply(&handle, Value::Undefined, Vec::new())
      .expect_err("bound functions have no native behavior");
    assert!(matches!(err, GraphError::NotCallable(_)));
  }

  #[test]
  fn symbols_record_a_recreation_recipe() {
    let mut recorder = Recorder::new();
    let shared =
      recorder.make_symbol(SymbolRecipe::Registered("app.key".to_string()));
    let fresh = recorder.make_symbol(SymbolRecipe::Fresh(None));
    let Value::Symbol(shared_id) = shared else {
      panic!("expected a symbol");
    };
    let Value::Symbol(fresh_id) = fresh else {
      panic!("expected a symbol");
    };
    assert_eq!(
      recorder.symbol_recipe(shared_id),
      Some(&SymbolRecipe::Registered("app.key".to_string()))
    );
    assert_eq!(
      recorder.symbol_recipe(fresh_id),
      Some(&SymbolRecipe::Fresh(None))
    );
  }
}
