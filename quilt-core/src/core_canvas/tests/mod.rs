/*
    Scenario tests for the canvas engine

    Test suite covering:
    - Convergence under reordering and duplication
    - Tombstone behaviour under concurrent edits
    - Spatial index agreement with a full scan
    - Reconciliation deltas
    - Presence expiry
*/

pub mod reconciliation_tests;
pub mod tombstone_tests;
