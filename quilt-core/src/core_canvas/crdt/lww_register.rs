/*
    lww_register.rs - Last-Write-Wins Register CRDT

    Holds a single value together with the stamp of the write that produced it.
    A write is accepted only when its stamp is strictly greater than the
    stored one, so the stored stamp is always the maximum ever observed and
    re-applying an old or duplicate write is a no-op.

    Use cases:
    - Entity fields (x, y, fill, label, ...)
    - The entity tombstone flag
*/

use super::clock::LogicalClock;
use super::traits::Crdt;
use serde::{Deserialize, Serialize};

/// Last-Write-Wins Register CRDT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LWWRegister<T: Clone> {
    /// Current value and the stamp that wrote it
    entry: Option<(T, LogicalClock)>,
}

impl<T: Clone> LWWRegister<T> {
    /// Create a new empty register
    pub fn new() -> Self {
        LWWRegister { entry: None }
    }

    /// Create a register holding `value` written at `stamp`
    pub fn with_value(value: T, stamp: LogicalClock) -> Self {
        LWWRegister { entry: Some((value, stamp)) }
    }

    /// Write `value` if `stamp` wins; returns whether the register was updated
    pub fn set(&mut self, value: T, stamp: LogicalClock) -> bool {
        if !self.should_update(&stamp) {
            return false;
        }
        self.entry = Some((value, stamp));
        true
    }

    fn should_update(&self, stamp: &LogicalClock) -> bool {
        match &self.entry {
            Some((_, current)) => stamp > current,
            None => true,
        }
    }

    /// Get the current value
    pub fn get(&self) -> Option<&T> {
        self.entry.as_ref().map(|(value, _)| value)
    }

    /// Stamp of the winning write
    pub fn stamp(&self) -> Option<LogicalClock> {
        self.entry.as_ref().map(|(_, stamp)| *stamp)
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}

impl<T: Clone> Crdt for LWWRegister<T> {
    type Operation = (T, LogicalClock);
    type Value = Option<T>;

    fn apply(&mut self, (value, stamp): Self::Operation) -> bool {
        self.set(value, stamp)
    }

    fn merge(&mut self, other: &Self) {
        if let Some((value, stamp)) = &other.entry {
            self.set(value.clone(), *stamp);
        }
    }

    fn value(&self) -> Self::Value {
        self.get().cloned()
    }
}

impl<T: Clone> Default for LWWRegister<T> {
    fn default() -> Self {
        Self::new()
    }
}
