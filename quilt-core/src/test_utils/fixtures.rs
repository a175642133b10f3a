//! Test fixtures and builders
//!
//! Ready-made sites, operations and replica sets for tests and benches.
//! Workload generators live in `simulate` and are re-exported here.

use super::deterministic_rng::deterministic_site;
use crate::core_canvas::crdt::{LogicalClock, Site};
use crate::core_canvas::model::{EntityId, FieldValue, Operation};
use crate::core_canvas::replica::Replica;
use crate::simulate::generate_edits;
use rand::Rng;
use uuid::Uuid;

pub use crate::simulate::{random_rect, shuffled_with_duplicates};

/// Site with a fixed, ordered id; `site(1) < site(2)`
pub fn site(n: u128) -> Site {
    Site(Uuid::from_u128(n))
}

pub fn entity(n: u128) -> EntityId {
    EntityId(Uuid::from_u128(n))
}

/// `count` distinct sites from `rng`
pub fn random_sites(rng: &mut impl Rng, count: usize) -> Vec<Site> {
    (0..count).map(|_| deterministic_site(rng)).collect()
}

/// Operation with an explicit stamp
pub fn op_at(id: EntityId, field: &str, value: impl Into<FieldValue>, counter: u64, origin: Site) -> Operation {
    Operation::new(id, field, value.into(), LogicalClock::new(counter, origin))
}

/// `count` replicas with sites drawn from `rng`
pub fn replica_set(rng: &mut impl Rng, count: usize) -> Vec<Replica> {
    random_sites(rng, count).into_iter().map(Replica::new).collect()
}

/// Apply `count` random local edits across `replicas`; panics if an edit is rejected
pub fn random_edits(rng: &mut impl Rng, replicas: &mut [Replica], entities: usize, count: usize) -> Vec<Operation> {
    match generate_edits(rng, replicas, entities, count) {
        Ok(ops) => ops,
        Err(err) => panic!("fixture produced an invalid edit: {err}"),
    }
}
