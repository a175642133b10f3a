/*
    entity_store.rs - Authoritative replicated entity set

    Holds every entity this replica knows about (tombstoned ones included),
    the log of every operation seen, and the per-site high-water marks.

    Invariant: for any two stores that have applied the same set of
    operations, in any order and with any duplication, `entities`, `log` and
    `summary` are identical.
*/

use crate::core_canvas::crdt::{OpLog, VersionSummary};
use crate::core_canvas::model::{Entity, EntityId, Operation};
use std::collections::HashMap;

/// What applying one operation did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyOutcome {
    /// First time this stamp was seen
    pub logged: bool,

    /// The target register's value changed
    pub changed: bool,

    /// The entity did not exist before this operation
    pub created: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStore {
    entities: HashMap<EntityId, Entity>,
    log: OpLog,
    summary: VersionSummary,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an already validated operation under LWW semantics
    pub fn apply(&mut self, op: Operation) -> ApplyOutcome {
        if !self.log.append(op.clone()) {
            // Seen before: its register write already happened (or lost).
            return ApplyOutcome::default();
        }
        self.summary.observe(&op.stamp);

        let created = !self.entities.contains_key(&op.entity_id);
        let entity = self.entities.entry(op.entity_id).or_insert_with(|| Entity::new(op.entity_id));
        let changed = entity.write(&op.field, op.value, op.stamp);

        ApplyOutcome { logged: true, changed, created }
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// All entities, tombstoned ones included
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Entities not marked deleted
    pub fn live_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| !e.is_tombstoned())
    }

    pub fn tombstoned(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| e.is_tombstoned())
    }

    pub fn log(&self) -> &OpLog {
        &self.log
    }

    /// Current per-site high-water marks
    pub fn snapshot(&self) -> VersionSummary {
        self.summary.clone()
    }

    pub fn summary(&self) -> &VersionSummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
