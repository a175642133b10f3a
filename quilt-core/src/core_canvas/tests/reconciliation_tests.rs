/*
    Reconciliation tests

    The delta for a peer is exactly the logged operations its summary does
    not cover, and interrupted sessions lose nothing.
*/

use crate::core_canvas::crdt::VersionSummary;
use crate::core_canvas::replica::Replica;
use crate::core_canvas::sync::{compute_delta, SyncReconciler, SyncState};
use crate::core_canvas::store::StoreError;
use crate::test_utils::{assert_converged, entity, site};

fn replica_with_ten_ops() -> Replica {
    let mut a = Replica::new(site(1));
    let e = entity(1);
    for i in 1..=10 {
        a.apply_local(e, "x", i as f64).unwrap();
    }
    a
}

#[test]
fn test_delta_is_exactly_the_uncovered_tail() {
    let a = replica_with_ten_ops();
    let b_summary: VersionSummary = [(site(1), 5)].into_iter().collect();

    let delta = compute_delta(a.log(), &b_summary);
    let counters: Vec<u64> = delta.iter().map(|op| op.stamp.counter).collect();
    assert_eq!(counters, vec![6, 7, 8, 9, 10]);
}

#[test]
fn test_unknown_site_means_everything() {
    let a = replica_with_ten_ops();
    assert_eq!(a.delta_for(&VersionSummary::new()).len(), 10);

    let ahead: VersionSummary = [(site(1), 10), (site(7), 3)].into_iter().collect();
    assert!(a.delta_for(&ahead).is_empty());
}

#[test]
fn test_interrupted_stream_recovers_on_renegotiation() {
    let a = replica_with_ten_ops();
    let mut b = Replica::new(site(2));

    let mut reconciler = SyncReconciler::new();
    reconciler.connect().unwrap();
    reconciler.on_peer_summary(b.snapshot(), a.log()).unwrap();

    // three operations make it across, then the link drops
    for _ in 0..3 {
        let op = reconciler.next_outbound().unwrap();
        b.apply_remote(op).unwrap();
    }
    let lost = reconciler.on_transport_failure(&StoreError::TransportFailure("link down".into()));
    assert_eq!(lost, 7);
    assert_eq!(reconciler.state(), SyncState::Idle);

    reconciler.connect().unwrap();
    assert_eq!(reconciler.on_peer_summary(b.snapshot(), a.log()).unwrap(), 7);
    while let Some(op) = reconciler.next_outbound() {
        b.apply_remote(op).unwrap();
    }

    // b has no local ops, so the stores must match
    assert_converged(&[a, b]);
}

#[test]
fn test_bidirectional_deltas_converge() {
    let mut a = replica_with_ten_ops();
    let mut b = Replica::new(site(2));
    let e = entity(2);
    for i in 0..4 {
        b.apply_local(e, "fill", format!("c{i}")).unwrap();
    }

    let to_b = a.delta_for(&b.snapshot());
    let to_a = b.delta_for(&a.snapshot());
    assert_eq!((to_b.len(), to_a.len()), (10, 4));

    for op in to_b {
        b.apply_remote(op).unwrap();
    }
    for op in to_a {
        a.apply_remote(op).unwrap();
    }
    assert_converged(&[a, b]);
}
