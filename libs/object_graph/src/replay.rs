// Copyright 2026 the Prebake authors. MIT license.

//! Replays a recreation script into a recorder, performing the steps in
//! sequence order so the resulting object graph matches the recorded
//! one. The destination recorder records the replay like any other
//! early execution, so a replayed graph can itself be serialized again.

use std::collections::HashMap;

use crate::events::EventKind;
use crate::events::EventValue;
use crate::object::Descriptor;
use crate::object::PropertyKey;
use crate::recorder::Recorder;
use crate::serialize::Recreation;
use crate::GraphError;
use crate::Handle;
use crate::ObjectId;
use crate::SymbolId;
use crate::Value;

/// The live values a replay produced, keyed by the recorded pool
/// identity.
pub struct Replayed {
  pub objects: HashMap<ObjectId, Value>,
  pub symbols: HashMap<SymbolId, Value>,
}

impl Replayed {
  pub fn value_of(&self, recorded: ObjectId) -> Option<&Value> {
    self.objects.get(&recorded)
  }
}

impl Recorder {
  /// Performs `recreation` against this recorder. Every step resolves
  /// its operands through the bindings produced by earlier steps; the
  /// recorded access paths guarantee an operand's origin sorts before
  /// its first use.
  pub fn replay(
    &mut self,
    recreation: &Recreation,
  ) -> Result<Replayed, GraphError> {
    let mut objects: HashMap<ObjectId, Value> = HashMap::new();
    let mut symbols: HashMap<SymbolId, Value> = HashMap::new();
    for (id, recipe) in &recreation.symbols {
      symbols.insert(*id, self.make_symbol(recipe.clone()));
    }

    for step in &recreation.steps {
      let subject = step.subject;
      match &step.event.kind {
        EventKind::GetGlobal => {
          objects.insert(subject, Value::Object(self.global()));
        }
        EventKind::Get { target, key } => {
          let target = handle_of(&objects, *target)?;
          let key = replay_key(key, &symbols)?;
          let value = self.get(&target, &key)?;
          // An origin binds the value it produced; a recorded getter
          // access replays for its side effects only.
          objects.entry(subject).or_insert(value);
        }
        EventKind::Apply { callee, this, args } => {
          let callee = handle_of(&objects, *callee)?;
          let this = replay_value(this, &objects, &symbols)?;
          let args = replay_values(args, &objects, &symbols)?;
          let value = self.apply(&callee, this, args)?;
          objects.insert(subject, value);
        }
        EventKind::Construct { callee, args } => {
          let callee = handle_of(&objects, *callee)?;
          let args = replay_values(args, &objects, &symbols)?;
          let value = self.construct(&callee, args)?;
          objects.insert(subject, value);
        }
        EventKind::CodeBind { source, frames } => {
          let frames = replay_values(frames, &objects, &symbols)?;
          let value = self.bind_code(source.clone(), frames)?;
          objects.insert(subject, value);
        }
        EventKind::GetPrototypeOf { target } => {
          let target = handle_of(&objects, *target)?;
          let value = self.get_prototype_of(&target)?;
          objects.insert(subject, value);
        }
        EventKind::GetOwnPropertyDescriptor { target, key } => {
          let target = handle_of(&objects, *target)?;
          let key = replay_key(key, &symbols)?;
          self.get_own_property_descriptor(&target, &key)?;
        }
        EventKind::Set { target, key, value } => {
          let target = handle_of(&objects, *target)?;
          let key = replay_key(key, &symbols)?;
          let value = replay_value(value, &objects, &symbols)?;
          self.set(&target, key, value)?;
        }
        EventKind::Delete { target, key } => {
          let target = handle_of(&objects, *target)?;
          let key = replay_key(key, &symbols)?;
          self.delete(&target, key)?;
        }
        EventKind::DefineProperty {
          target,
          key,
          descriptor,
        } => {
          let target = handle_of(&objects, *target)?;
          let key = replay_key(key, &symbols)?;
          let descriptor = Descriptor {
            value: descriptor
              .value
              .as_ref()
              .map(|value| replay_value(value, &objects, &symbols))
              .transpose()?,
            getter: descriptor
              .getter
              .as_ref()
              .map(|value| replay_value(value, &objects, &symbols))
              .transpose()?,
            setter: descriptor
              .setter
              .as_ref()
              .map(|value| replay_value(value, &objects, &symbols))
              .transpose()?,
          };
          self.define_property(&target, key, descriptor)?;
        }
        EventKind::SetPrototypeOf { target, value } => {
          let target = handle_of(&objects, *target)?;
          let value = replay_value(value, &objects, &symbols)?;
          self.set_prototype_of(&target, value)?;
        }
        EventKind::PreventExtensions { target } => {
          let target = handle_of(&objects, *target)?;
          self.prevent_extensions(&target)?;
        }
      }
    }
    Ok(Replayed { objects, symbols })
  }
}

fn handle_of(
  objects: &HashMap<ObjectId, Value>,
  recorded: ObjectId,
) -> Result<Handle, GraphError> {
  match objects.get(&recorded) {
    Some(Value::Object(handle)) => Ok(*handle),
    _ => Err(GraphError::ReplayUnresolved),
  }
}

fn replay_value(
  value: &EventValue,
  objects: &HashMap<ObjectId, Value>,
  symbols: &HashMap<SymbolId, Value>,
) -> Result<Value, GraphError> {
  Ok(match value {
    EventValue::Undefined => Value::Undefined,
    EventValue::Null => Value::Null,
    EventValue::Bool(value) => Value::Bool(*value),
    EventValue::Number(value) => Value::Number(*value),
    EventValue::Str(value) => Value::str(value),
    EventValue::Symbol(id) => symbols
      .get(id)
      .cloned()
      .ok_or(GraphError::ReplayUnresolved)?,
    EventValue::Object(id) => objects
      .get(id)
      .cloned()
      .ok_or(GraphError::ReplayUnresolved)?,
  })
}

fn replay_values(
  values: &[EventValue],
  objects: &HashMap<ObjectId, Value>,
  symbols: &HashMap<SymbolId, Value>,
) -> Result<Vec<Value>, GraphError> {
  values
    .iter()
    .map(|value| replay_value(value, objects, symbols))
    .collect()
}

fn replay_key(
  key: &PropertyKey,
  symbols: &HashMap<SymbolId, Value>,
) -> Result<PropertyKey, GraphError> {
  match key {
    PropertyKey::Str(key) => Ok(PropertyKey::Str(key.clone())),
    PropertyKey::Symbol(id) => match symbols.get(id) {
      Some(Value::Symbol(new_id)) => Ok(PropertyKey::Symbol(*new_id)),
      _ => Err(GraphError::ReplayUnresolved),
    },
  }
}
