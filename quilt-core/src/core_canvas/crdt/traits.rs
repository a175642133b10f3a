/*
    traits.rs - Core CRDT trait definitions

    Every replicated structure in the canvas document supports:
    - Applying a single stamped operation
    - State-based merge with another replica's copy
    - Reading its current value
*/

/// Core trait shared by the canvas CRDTs
pub trait Crdt: Clone {
    /// The type of operations this CRDT accepts
    type Operation;

    /// The type of value this CRDT represents
    type Value;

    /// Apply one operation, returning whether the observable value changed
    fn apply(&mut self, op: Self::Operation) -> bool;

    /// Merge another replica's state into this one
    fn merge(&mut self, other: &Self);

    /// Get the current value
    fn value(&self) -> Self::Value;
}
