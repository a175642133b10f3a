/*
    entity.rs - A positioned, collaboratively-edited canvas object

    Each field is an independent LWW register; the tombstone is a boolean
    register of its own. Bounds are never stored separately: they are read
    back from the x/y/w/h registers whenever the index needs them.
*/

use super::operation::Operation;
use super::types::{fields, EntityId, FieldValue, Rect};
use crate::core_canvas::crdt::{Crdt, LWWRegister, LogicalClock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    fields: BTreeMap<String, LWWRegister<FieldValue>>,
    tombstone: LWWRegister<bool>,
}

impl Entity {
    pub fn new(id: EntityId) -> Self {
        Entity { id, fields: BTreeMap::new(), tombstone: LWWRegister::new() }
    }

    /// Write a field (or the tombstone); returns whether the value changed
    ///
    /// The tombstone field only accepts booleans; callers validate before
    /// getting here, anything else is ignored.
    pub fn write(&mut self, field: &str, value: FieldValue, stamp: LogicalClock) -> bool {
        if field == fields::TOMBSTONE {
            return match value.as_bool() {
                Some(deleted) => self.tombstone.set(deleted, stamp),
                None => false,
            };
        }
        self.fields.entry(field.to_string()).or_default().set(value, stamp)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).and_then(|reg| reg.get())
    }

    pub fn register(&self, field: &str) -> Option<&LWWRegister<FieldValue>> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().filter_map(|(name, reg)| reg.get().map(|v| (name.as_str(), v)))
    }

    pub fn is_tombstoned(&self) -> bool {
        self.tombstone.get().copied().unwrap_or(false)
    }

    /// Stamp of the write that decided the tombstone, if any
    pub fn tombstone_stamp(&self) -> Option<LogicalClock> {
        self.tombstone.stamp()
    }

    /// Bounds derived from the positional registers
    ///
    /// Present only when `x` and `y` hold finite numbers; a missing or
    /// non-numeric `w`/`h` counts as 0.
    pub fn bounds(&self) -> Option<Rect> {
        let number = |field: &str| self.get(field).and_then(FieldValue::as_number);
        let x = number(fields::X)?;
        let y = number(fields::Y)?;
        let w = number(fields::WIDTH).unwrap_or(0.0);
        let h = number(fields::HEIGHT).unwrap_or(0.0);
        let rect = Rect::new(x, y, w, h);
        rect.is_finite().then_some(rect)
    }

    /// Bounds the spatial index should hold for this entity right now
    pub fn indexable_bounds(&self) -> Option<Rect> {
        if self.is_tombstoned() {
            None
        } else {
            self.bounds()
        }
    }
}

impl Crdt for Entity {
    type Operation = Operation;
    type Value = BTreeMap<String, FieldValue>;

    fn apply(&mut self, op: Operation) -> bool {
        self.write(&op.field, op.value, op.stamp)
    }

    fn merge(&mut self, other: &Self) {
        for (name, reg) in &other.fields {
            self.fields.entry(name.clone()).or_default().merge(reg);
        }
        self.tombstone.merge(&other.tombstone);
    }

    fn value(&self) -> Self::Value {
        self.fields().map(|(name, value)| (name.to_string(), value.clone())).collect()
    }
}
