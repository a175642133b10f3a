//! Custom assertions for replica tests

use crate::core_canvas::model::{EntityId, Rect};
use crate::core_canvas::replica::Replica;
use std::collections::BTreeSet;

/// Assert every replica holds the same entities, log and summary
pub fn assert_converged(replicas: &[Replica]) {
    let Some((first, rest)) = replicas.split_first() else {
        return;
    };
    for (i, other) in rest.iter().enumerate() {
        if first.store() != other.store() {
            panic!(
                "replica {} diverged from replica 0: {} vs {} entities, {} vs {} ops",
                i + 1,
                other.store().len(),
                first.store().len(),
                other.log().len(),
                first.log().len(),
            );
        }
    }
}

/// Assert the replica's index agrees with its store
pub fn assert_index_consistent(replica: &Replica) {
    if let Err(err) = replica.check_index() {
        panic!("index inconsistent on {}: {err}", replica.site());
    }
}

/// Live entities whose bounds intersect `region`, by full scan
pub fn brute_force_query(replica: &Replica, region: Rect) -> BTreeSet<EntityId> {
    replica
        .live_entities()
        .filter_map(|entity| entity.bounds().filter(|b| b.intersects(&region)).map(|_| entity.id))
        .collect()
}

/// Assert `query(region)` matches a full scan
pub fn assert_query_matches_scan(replica: &Replica, region: Rect) {
    let indexed: BTreeSet<EntityId> = replica.query(region).iter().collect();
    let scanned = brute_force_query(replica, region);
    assert_eq!(indexed, scanned, "query {region} disagrees with full scan");
}
