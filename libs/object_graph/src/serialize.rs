// Copyright 2026 the Prebake authors. MIT license.

//! Compaction: given a set of root objects, collect the events needed
//! to recreate them, merge-sorted by sequence number so a replayer
//! performing them in order reproduces the same observable graph.

use std::collections::VecDeque;

use indexmap::IndexMap;
use indexmap::IndexSet;
use serde::Serialize;

use crate::events::DescriptorRecord;
use crate::events::Event;
use crate::events::EventKind;
use crate::events::EventValue;
use crate::object::PropertyKey;
use crate::object::SymbolRecipe;
use crate::recorder::Recorder;
use crate::GraphError;
use crate::ObjectId;
use crate::SymbolId;
use crate::Value;

/// One entry of a replay script: the event plus the pool identity of
/// the object whose history it came from. For an origin event the
/// subject is the object the event brought into existence; for a
/// change event it coincides with the event's target.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayStep {
  pub subject: ObjectId,
  #[serde(flatten)]
  pub event: Event,
}

/// The minimal replay script for a chosen root set: the steps in
/// sequence order, the object pool by identity (discovery order), and
/// the recipes of every symbol the events mention.
#[derive(Debug, Clone, Serialize)]
pub struct Recreation {
  pub steps: Vec<ReplayStep>,
  pub pool: Vec<ObjectId>,
  pub symbols: IndexMap<SymbolId, SymbolRecipe>,
}

impl Recorder {
  /// Collects the recreation script for `roots`. Every root must be a
  /// wrapper this recorder handed out; anything else is an error.
  pub fn recreation_for(
    &self,
    roots: &[Value],
  ) -> Result<Recreation, GraphError> {
    let mut queue = VecDeque::new();
    for root in roots {
      match root {
        Value::Object(handle) => queue.push_back(self.object_of(handle)?),
        _ => return Err(GraphError::NotWrapped),
      }
    }

    let mut pool: IndexSet<ObjectId> = IndexSet::new();
    let mut steps: Vec<ReplayStep> = Vec::new();
    let mut symbols: IndexMap<SymbolId, SymbolRecipe> = IndexMap::new();

    while let Some(object) = queue.pop_front() {
      if !pool.insert(object) {
        continue;
      }
      // Objects with no recorded history still appear by identity in
      // the pool; the replayer reaches them through the access paths
      // recorded for their descendants.
      let Some(history) = self.histories.get(&object) else {
        continue;
      };
      for event in
        std::iter::once(&history.origin).chain(history.changes.iter())
      {
        collect_operands(&event.kind, &mut queue, &mut |id| {
          if let Some(recipe) = self.symbol_recipe(id) {
            symbols.entry(id).or_insert_with(|| recipe.clone());
          }
        });
        steps.push(ReplayStep {
          subject: object,
          event: event.clone(),
        });
      }
    }

    steps.sort_by_key(|step| step.event.seq);
    Ok(Recreation {
      steps,
      pool: pool.into_iter().collect(),
      symbols,
    })
  }
}

/// Enqueues every object-typed operand of an event and reports every
/// symbol operand.
fn collect_operands(
  kind: &EventKind,
  queue: &mut VecDeque<ObjectId>,
  on_symbol: &mut dyn FnMut(SymbolId),
) {
  match kind {
    EventKind::GetGlobal => {}
    EventKind::Get { target, key }
    | EventKind::GetOwnPropertyDescriptor { target, key }
    | EventKind::Delete { target, key } => {
      queue.push_back(*target);
      push_key(key, on_symbol);
    }
    EventKind::Apply { callee, this, args } => {
      queue.push_back(*callee);
      push_value(this, queue, on_symbol);
      for arg in args {
        push_value(arg, queue, on_symbol);
      }
    }
    EventKind::Construct { callee, args } => {
      queue.push_back(*callee);
      for arg in args {
        push_value(arg, queue, on_symbol);
      }
    }
    EventKind::CodeBind { frames, .. } => {
      for frame in frames {
        push_value(frame, queue, on_symbol);
      }
    }
    EventKind::GetPrototypeOf { target }
    | EventKind::PreventExtensions { target } => {
      queue.push_back(*target);
    }
    EventKind::Set { target, key, value } => {
      queue.push_back(*target);
      push_key(key, on_symbol);
      push_value(value, queue, on_symbol);
    }
    EventKind::DefineProperty {
      target,
      key,
      descriptor,
    } => {
      queue.push_back(*target);
      push_key(key, on_symbol);
      let DescriptorRecord {
        value,
        getter,
        setter,
      } = descriptor;
      for operand in [value, getter, setter].into_iter().flatten() {
        push_value(operand, queue, on_symbol);
      }
    }
    EventKind::SetPrototypeOf { target, value } => {
      queue.push_back(*target);
      push_value(value, queue, on_symbol);
    }
  }
}

fn push_value(
  value: &EventValue,
  queue: &mut VecDeque<ObjectId>,
  on_symbol: &mut dyn FnMut(SymbolId),
) {
  match value {
    EventValue::Object(id) => queue.push_back(*id),
    EventValue::Symbol(id) => on_symbol(*id),
    _ => {}
  }
}

fn push_key(key: &PropertyKey, on_symbol: &mut dyn FnMut(SymbolId)) {
  if let PropertyKey::Symbol(id) = key {
    on_symbol(*id);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::object::Descriptor;
  use crate::object::PropertyKey;
  use pretty_assertions::assert_eq;

  fn global_binding(recorder: &mut Recorder, name: &str) -> Value {
    let global = recorder.global();
    recorder.get(&global, &name.into()).unwrap()
  }

  fn kinds(recreation: &Recreation) -> Vec<&'static str> {
    recreation
      .steps
      .iter()
      .map(|step| match &step.event.kind {
        EventKind::GetGlobal => "get-global",
        EventKind::Get { .. } => "get",
        EventKind::Apply { .. } => "apply",
        EventKind::Construct { .. } => "construct",
        EventKind::CodeBind { .. } => "code-bind",
        EventKind::GetPrototypeOf { .. } => "get-prototype-of",
        EventKind::GetOwnPropertyDescriptor { .. } => {
          "get-own-property-descriptor"
        }
        EventKind::Set { .. } => "set",
        EventKind::Delete { .. } => "delete",
        EventKind::DefineProperty { .. } => "define-property",
        EventKind::SetPrototypeOf { .. } => "set-prototype-of",
        EventKind::PreventExtensions { .. } => "prevent-extensions",
      })
      .collect()
  }

  #[test]
  fn reachability_is_minimal() {
    let mut recorder = Recorder::new();
    let _object = global_binding(&mut recorder, "Object");
    let _array = global_binding(&mut recorder, "Array");
    let number = global_binding(&mut recorder, "Number");
    let recreation = recorder.recreation_for(&[number]).unwrap();
    // Exactly the bootstrap get-global and the one access path that
    // reaches Number; Object and Array do not ride along.
    assert_eq!(kinds(&recreation), vec!["get-global", "get"]);
    assert_eq!(recreation.pool.len(), 2);
  }

  #[test]
  fn construct_and_set_history_replays_in_order() {
    let mut recorder = Recorder::new();
    let object_ctor = global_binding(&mut recorder, "Object");
    let created = recorder
      .construct(object_ctor.as_handle().unwrap(), Vec::new())
      .unwrap();
    let handle = *created.as_handle().unwrap();
    recorder
      .set(&handle, "x".into(), Value::Number(1.0))
      .unwrap();
    recorder.set(&handle, "y".into(), Value::str("str")).unwrap();
    let recreation = recorder.recreation_for(&[created]).unwrap();
    assert_eq!(
      kinds(&recreation),
      vec!["get-global", "get", "construct", "set", "set"]
    );
    let seqs: Vec<_> = recreation
      .steps
      .iter()
      .map(|step| step.event.seq)
      .collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted, "events are merge-sorted by sequence");
  }

  #[test]
  fn unwrapped_roots_are_an_error() {
    let recorder = Recorder::new();
    let err = recorder
      .recreation_for(&[Value::Number(7.0)])
      .expect_err("primitives were never wrapped");
    assert!(matches!(err, GraphError::NotWrapped));
  }

  #[test]
  fn operands_of_every_event_enter_the_pool() {
    let mut recorder = Recorder::new();
    let object_ctor = global_binding(&mut recorder, "Object");
    let ctor_handle = *object_ctor.as_handle().unwrap();
    let holder = recorder.construct(&ctor_handle, Vec::new()).unwrap();
    let payload = recorder.construct(&ctor_handle, Vec::new()).unwrap();
    let holder_handle = *holder.as_handle().unwrap();
    recorder
      .set(&holder_handle, "payload".into(), payload.clone())
      .unwrap();
    let recreation = recorder.recreation_for(&[holder]).unwrap();
    // holder, payload, Object, global.
    assert_eq!(recreation.pool.len(), 4);
    // The payload's construct event rides along through the set operand.
    assert_eq!(
      kinds(&recreation),
      vec!["get-global", "get", "construct", "construct", "set"]
    );
  }

  #[test]
  fn symbol_keys_carry_their_recipes() {
    let mut recorder = Recorder::new();
    let object_ctor = global_binding(&mut recorder, "Object");
    let created = recorder
      .construct(object_ctor.as_handle().unwrap(), Vec::new())
      .unwrap();
    let handle = *created.as_handle().unwrap();
    let symbol = recorder
      .make_symbol(SymbolRecipe::Registered("app.tag".to_string()));
    let Value::Symbol(symbol_id) = symbol else {
      panic!("expected a symbol");
    };
    recorder
      .define_property(
        &handle,
        PropertyKey::Symbol(symbol_id),
        Descriptor::data(Value::Bool(true)),
      )
      .unwrap();
    let recreation = recorder.recreation_for(&[created]).unwrap();
    assert_eq!(
      recreation.symbols.get(&symbol_id),
      Some(&SymbolRecipe::Registered("app.tag".to_string()))
    );
  }

  #[test]
  fn json_materialization_serializes_to_a_replay_script() {
    let mut recorder = Recorder::new();
    let value = recorder.parse_json(r#"{"inner":[true]}"#).unwrap();
    let recreation = recorder.recreation_for(&[value]).unwrap();
    let kinds = kinds(&recreation);
    // Root construct, one define per key, nested array construct and
    // its element define. The access path of %Object% and %Array% comes
    // along so the replayer can resolve the callees.
    assert!(kinds.contains(&"construct"));
    assert!(kinds.contains(&"define-property"));
    assert!(kinds.contains(&"get-global"));
    let serialized = serde_json::to_string(&recreation).unwrap();
    assert!(serialized.contains("\"construct\""));
  }
}
