//! Run-scoped workflow state and its merge rules.
//!
//! Fields come in two kinds. A scalar holds one value and has exactly one
//! writer. An accumulator is a collection keyed by entity id that grows by
//! set-union, so merging deltas in any order yields the same collection.
//! The kind is carried in the field's type (`Field<Scalar<T>>` vs
//! `Field<Accumulator<T>>`), which keeps nodes from appending to a scalar
//! or overwriting an accumulator.

use crate::{GraphError, NodeError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Scalar,
    Accumulator,
}

/// Untyped declaration of a field, used in node read and write sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Marker for a single-writer, last-write-wins field holding a `T`.
pub struct Scalar<T>(PhantomData<fn() -> T>);

/// Marker for an id-keyed, union-merged collection of `T`.
pub struct Accumulator<T>(PhantomData<fn() -> T>);

pub trait Kind {
    const KIND: FieldKind;
}

impl<T> Kind for Scalar<T> {
    const KIND: FieldKind = FieldKind::Scalar;
}

impl<T> Kind for Accumulator<T> {
    const KIND: FieldKind = FieldKind::Accumulator;
}

/// Entity id of an accumulator element.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Typed handle to a named state field.
pub struct Field<K> {
    name: &'static str,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for Field<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Field<K> {}

impl<K> fmt::Debug for Field<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

impl<K: Kind> Field<K> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _kind: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn spec(&self) -> FieldSpec {
        FieldSpec {
            name: self.name,
            kind: K::KIND,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
enum Slot {
    Scalar(Value),
    Accumulator(BTreeMap<String, Value>),
}

impl Slot {
    fn kind(&self) -> FieldKind {
        match self {
            Slot::Scalar(_) => FieldKind::Scalar,
            Slot::Accumulator(_) => FieldKind::Accumulator,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Update {
    Replace(Value),
    Append(Vec<(String, Value)>),
}

/// Partial update produced by one node execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeResult {
    updates: BTreeMap<&'static str, Update>,
}

impl NodeResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a scalar field.
    pub fn set<T: Serialize>(&mut self, field: Field<Scalar<T>>, value: &T) -> Result<(), NodeError> {
        let value = encode(field.name, value)?;
        self.updates.insert(field.name, Update::Replace(value));
        Ok(())
    }

    /// Append one entry to an accumulator delta.
    pub fn push<T: Serialize + Keyed>(
        &mut self,
        field: Field<Accumulator<T>>,
        item: &T,
    ) -> Result<(), NodeError> {
        let entry = (item.key().to_string(), encode(field.name, item)?);
        match self
            .updates
            .entry(field.name)
            .or_insert_with(|| Update::Append(Vec::new()))
        {
            Update::Append(entries) => {
                entries.push(entry);
                Ok(())
            }
            Update::Replace(_) => Err(GraphError::FieldKindMismatch {
                field: field.name.to_string(),
            }
            .into()),
        }
    }

    /// Append many entries to an accumulator delta. An empty iterator still
    /// records the field as written.
    pub fn extend<'a, T, I>(&mut self, field: Field<Accumulator<T>>, items: I) -> Result<(), NodeError>
    where
        T: Serialize + Keyed + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        self.updates
            .entry(field.name)
            .or_insert_with(|| Update::Append(Vec::new()));
        for item in items {
            self.push(field, item)?;
        }
        Ok(())
    }

    /// Names of the fields this result touches.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.updates.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Number of accumulator entries carried for `name`.
    pub fn entry_count(&self, name: &str) -> usize {
        match self.updates.get(name) {
            Some(Update::Append(entries)) => entries.len(),
            _ => 0,
        }
    }
}

/// The business state of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WorkflowState {
    slots: BTreeMap<String, Slot>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial update.
    ///
    /// The whole partial is checked before anything is written, so a
    /// rejected partial leaves the state untouched.
    pub fn apply(&mut self, partial: NodeResult) -> Result<(), GraphError> {
        for (name, update) in &partial.updates {
            self.check(name, update)?;
        }

        for (name, update) in partial.updates {
            match update {
                Update::Replace(value) => {
                    self.slots.insert(name.to_string(), Slot::Scalar(value));
                }
                Update::Append(entries) => {
                    let slot = self
                        .slots
                        .entry(name.to_string())
                        .or_insert_with(|| Slot::Accumulator(BTreeMap::new()));
                    if let Slot::Accumulator(map) = slot {
                        for (id, value) in entries {
                            map.entry(id).or_insert(value);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check(&self, name: &str, update: &Update) -> Result<(), GraphError> {
        let existing = self.slots.get(name);
        match (update, existing) {
            (Update::Replace(_), Some(slot)) if slot.kind() != FieldKind::Scalar => {
                Err(GraphError::FieldKindMismatch {
                    field: name.to_string(),
                })
            }
            (Update::Append(_), Some(slot)) if slot.kind() != FieldKind::Accumulator => {
                Err(GraphError::FieldKindMismatch {
                    field: name.to_string(),
                })
            }
            (Update::Replace(value), Some(Slot::Scalar(current))) if current != value => {
                Err(GraphError::ScalarConflict {
                    field: name.to_string(),
                })
            }
            (Update::Append(entries), existing) => {
                let current = match existing {
                    Some(Slot::Accumulator(map)) => Some(map),
                    _ => None,
                };
                let mut incoming: BTreeMap<&str, &Value> = BTreeMap::new();
                for (id, value) in entries {
                    let clash = current
                        .and_then(|map| map.get(id))
                        .or_else(|| incoming.get(id.as_str()).copied())
                        .is_some_and(|prior| prior != value);
                    if clash {
                        return Err(GraphError::AccumulatorConflict {
                            field: name.to_string(),
                            id: id.clone(),
                        });
                    }
                    incoming.entry(id.as_str()).or_insert(value);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Consistent copy of the requested fields only.
    pub fn read(&self, fields: &[FieldSpec]) -> StateSnapshot {
        let slots = fields
            .iter()
            .filter_map(|spec| {
                self.slots
                    .get(spec.name)
                    .map(|slot| (spec.name.to_string(), slot.clone()))
            })
            .collect();
        StateSnapshot { slots }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn get<T: DeserializeOwned>(&self, field: Field<Scalar<T>>) -> Result<Option<T>, NodeError> {
        decode_scalar(&self.slots, field)
    }

    pub fn entries<T: DeserializeOwned>(&self, field: Field<Accumulator<T>>) -> Result<Vec<T>, NodeError> {
        decode_entries(&self.slots, field)
    }

    /// Ids held by an accumulator, in key order.
    pub fn ids(&self, name: &str) -> Vec<String> {
        match self.slots.get(name) {
            Some(Slot::Accumulator(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Read-only view handed to a node at launch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    slots: BTreeMap<String, Slot>,
}

impl StateSnapshot {
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn get<T: DeserializeOwned>(&self, field: Field<Scalar<T>>) -> Result<Option<T>, NodeError> {
        decode_scalar(&self.slots, field)
    }

    /// Like [`get`](Self::get) but a missing field is an error.
    pub fn require<T: DeserializeOwned>(&self, field: Field<Scalar<T>>) -> Result<T, NodeError> {
        self.get(field)?
            .ok_or_else(|| NodeError::MissingField(field.name().to_string()))
    }

    /// Accumulator entries ordered by id; a missing field reads as empty.
    pub fn entries<T: DeserializeOwned>(&self, field: Field<Accumulator<T>>) -> Result<Vec<T>, NodeError> {
        decode_entries(&self.slots, field)
    }
}

fn encode<T: Serialize>(field: &str, value: &T) -> Result<Value, NodeError> {
    serde_json::to_value(value).map_err(|e| NodeError::InvalidField {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(field: &str, value: &Value) -> Result<T, NodeError> {
    T::deserialize(value).map_err(|e| NodeError::InvalidField {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn decode_scalar<T: DeserializeOwned>(
    slots: &BTreeMap<String, Slot>,
    field: Field<Scalar<T>>,
) -> Result<Option<T>, NodeError> {
    match slots.get(field.name()) {
        None => Ok(None),
        Some(Slot::Scalar(value)) => decode(field.name(), value).map(Some),
        Some(Slot::Accumulator(_)) => Err(GraphError::FieldKindMismatch {
            field: field.name().to_string(),
        }
        .into()),
    }
}

fn decode_entries<T: DeserializeOwned>(
    slots: &BTreeMap<String, Slot>,
    field: Field<Accumulator<T>>,
) -> Result<Vec<T>, NodeError> {
    match slots.get(field.name()) {
        None => Ok(Vec::new()),
        Some(Slot::Accumulator(map)) => map.values().map(|v| decode(field.name(), v)).collect(),
        Some(Slot::Scalar(_)) => Err(GraphError::FieldKindMismatch {
            field: field.name().to_string(),
        }
        .into()),
    }
}
