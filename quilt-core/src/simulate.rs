/*
    simulate.rs - Randomized multi-replica convergence run

    Drives N replicas through M random local edits, then delivers every
    operation to every other replica in a shuffled order with extra
    duplicate deliveries. Afterwards all replicas must hold identical
    stores, every spatial index must agree with its store, and the same
    region queries must return the same ids everywhere.

    Everything is seeded, so a report can be reproduced from its config.
*/

use crate::core_canvas::crdt::Site;
use crate::core_canvas::model::{fields, EntityId, FieldValue, Operation, Rect};
use crate::core_canvas::replica::{Replica, ReplicaOptions};
use crate::core_canvas::store::{StoreError, StoreResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub replicas: usize,
    pub ops: usize,
    pub seed: u64,

    /// Extra duplicate deliveries per replica
    pub duplicates: usize,

    /// Size of the entity id pool edits draw from
    pub entities: usize,

    /// Region queries compared across replicas
    pub queries: usize,

    pub options: ReplicaOptions,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            replicas: 3,
            ops: 500,
            seed: 42,
            duplicates: 50,
            entities: 32,
            queries: 16,
            options: ReplicaOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub replicas: usize,
    pub ops_generated: usize,
    pub deliveries: usize,
    pub converged: bool,
    pub index_consistent: bool,
    pub queries_agree: bool,
    pub entities: usize,
    pub live_entities: usize,
    pub indexed_entities: usize,
    pub index_rebuilds: u64,
    pub elapsed_ms: f64,
}

impl SimulationReport {
    pub fn passed(&self) -> bool {
        self.converged && self.index_consistent && self.queries_agree
    }

    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// Rectangle inside `[0, extent)` on both axes, sides up to `max_side`
pub fn random_rect(rng: &mut impl Rng, extent: f64, max_side: f64) -> Rect {
    Rect::new(
        rng.random_range(0.0..extent),
        rng.random_range(0.0..extent),
        rng.random_range(0.0..max_side),
        rng.random_range(0.0..max_side),
    )
}

/// A random field write: mostly positional, some styling, a few deletes
pub fn random_field_value(rng: &mut impl Rng) -> (&'static str, FieldValue) {
    const COLORS: [&str; 4] = ["red", "teal", "amber", "slate"];
    match rng.random_range(0..10) {
        0 | 1 => (fields::X, FieldValue::Number(rng.random_range(0.0..1000.0))),
        2 | 3 => (fields::Y, FieldValue::Number(rng.random_range(0.0..1000.0))),
        4 => (fields::WIDTH, FieldValue::Number(rng.random_range(-50.0..100.0))),
        5 => (fields::HEIGHT, FieldValue::Number(rng.random_range(-50.0..100.0))),
        6 | 7 => ("fill", FieldValue::Text(COLORS[rng.random_range(0..COLORS.len())].to_string())),
        _ => (fields::TOMBSTONE, FieldValue::Bool(rng.random_bool(0.7))),
    }
}

/// Apply `count` random local edits across `replicas`, touching a pool of
/// `entities` ids; returns every produced operation
pub fn generate_edits(
    rng: &mut impl Rng,
    replicas: &mut [Replica],
    entities: usize,
    count: usize,
) -> StoreResult<Vec<Operation>> {
    let pool: Vec<EntityId> = (0..entities.max(1)).map(|_| EntityId(Uuid::from_u128(rng.random()))).collect();
    let mut ops = Vec::with_capacity(count);
    if replicas.is_empty() {
        return Ok(ops);
    }
    for _ in 0..count {
        let author = rng.random_range(0..replicas.len());
        let id = pool[rng.random_range(0..pool.len())];
        let (field, value) = random_field_value(rng);
        ops.push(replicas[author].apply_local(id, field, value)?);
    }
    Ok(ops)
}

/// `ops` plus `duplicates` re-sent copies, shuffled
pub fn shuffled_with_duplicates(rng: &mut impl Rng, ops: &[Operation], duplicates: usize) -> Vec<Operation> {
    let mut delivery = ops.to_vec();
    if !ops.is_empty() {
        for _ in 0..duplicates {
            delivery.push(ops[rng.random_range(0..ops.len())].clone());
        }
    }
    delivery.shuffle(rng);
    delivery
}

pub fn run(config: &SimulationConfig) -> StoreResult<SimulationReport> {
    let started = Instant::now();
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut replicas: Vec<Replica> = (0..config.replicas.max(1))
        .map(|_| Replica::with_options(Site(Uuid::from_u128(rng.random())), config.options.clone()))
        .collect();

    let ops = generate_edits(&mut rng, &mut replicas, config.entities, config.ops)?;
    info!(replicas = replicas.len(), ops = ops.len(), "generated local edits");

    let mut deliveries = 0;
    for replica in replicas.iter_mut() {
        let site = replica.site();
        let foreign: Vec<_> = ops.iter().filter(|op| op.stamp.site != site).cloned().collect();
        for op in shuffled_with_duplicates(&mut rng, &foreign, config.duplicates) {
            replica.apply_remote(op)?;
            deliveries += 1;
        }
        debug!(%site, applied = replica.log().len(), "delivery complete");
    }

    let converged = replicas.windows(2).all(|pair| pair[0].store() == pair[1].store());
    if !converged {
        warn!(seed = config.seed, "replicas diverged");
    }

    let index_consistent = replicas.iter().all(|replica| match replica.check_index() {
        Ok(()) => true,
        Err(err) => {
            warn!(site = %replica.site(), error = %err, "index inconsistent");
            false
        }
    });

    let regions: Vec<Rect> = (0..config.queries).map(|_| random_rect(&mut rng, 1000.0, 400.0)).collect();
    let queries_agree = regions.iter().all(|region| {
        let results: Vec<BTreeSet<EntityId>> =
            replicas.iter().map(|replica| replica.query(*region).iter().collect()).collect();
        results.windows(2).all(|pair| pair[0] == pair[1])
    });

    let first = &replicas[0];
    let report = SimulationReport {
        seed: config.seed,
        replicas: replicas.len(),
        ops_generated: ops.len(),
        deliveries,
        converged,
        index_consistent,
        queries_agree,
        entities: first.store().len(),
        live_entities: first.live_entities().count(),
        indexed_entities: first.index().len(),
        index_rebuilds: replicas.iter().map(|r| r.stats().index_rebuilds).sum(),
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    };
    info!(passed = report.passed(), "simulation finished");
    Ok(report)
}
