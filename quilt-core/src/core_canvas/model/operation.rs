/*
    operation.rs - The unit of replication

    An Operation writes one value into one field register of one entity.
    Operations are self-contained: applying one never requires another to
    have been applied first.
*/

use super::types::{fields, EntityId, FieldValue};
use crate::core_canvas::crdt::LogicalClock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub entity_id: EntityId,
    pub field: String,
    pub value: FieldValue,
    pub stamp: LogicalClock,
}

impl Operation {
    pub fn new(
        entity_id: EntityId,
        field: impl Into<String>,
        value: FieldValue,
        stamp: LogicalClock,
    ) -> Self {
        Operation { entity_id, field: field.into(), value, stamp }
    }

    pub fn is_tombstone(&self) -> bool {
        self.field == fields::TOMBSTONE
    }
}
