/*
    reconciler.rs - Per-peer sync state machine

    Idle -> Negotiating -> Streaming -> Idle

    - connect: Idle -> Negotiating. The caller sends our VersionSummary.
    - on_peer_summary: Negotiating -> Streaming. Everything in our log the
      peer's summary does not cover is queued, oldest stamp first.
    - push: while Streaming, newly logged operations join the queue unless
      the peer already has them.
    - disconnect / on_transport_failure: back to Idle, queue dropped.

    Dropping the queue loses nothing: every queued operation is still in
    the log and lands in the next negotiation's delta.

    The reconciler does no IO; `SyncSession` drives it over a transport.
*/

use crate::core_canvas::crdt::{OpLog, VersionSummary};
use crate::core_canvas::model::Operation;
use crate::core_canvas::store::{StoreError, StoreResult};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Negotiating,
    Streaming,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Negotiating => "negotiating",
            SyncState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// Operations in `log` that a peer holding `peer` lacks, sorted by stamp
pub fn compute_delta(log: &OpLog, peer: &VersionSummary) -> Vec<Operation> {
    log.ops_since(peer).cloned().collect()
}

#[derive(Debug)]
pub struct SyncReconciler {
    state: SyncState,

    /// What the peer has, plus everything already queued for it
    known: VersionSummary,

    outbound: VecDeque<Operation>,
}

impl Default for SyncReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncReconciler {
    pub fn new() -> Self {
        SyncReconciler { state: SyncState::Idle, known: VersionSummary::new(), outbound: VecDeque::new() }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Channel established
    pub fn connect(&mut self) -> StoreResult<()> {
        self.expect_state(SyncState::Idle, "connect")?;
        self.transition(SyncState::Negotiating);
        Ok(())
    }

    /// The peer's summary arrived; queue the backlog and start streaming.
    /// Returns the backlog size.
    pub fn on_peer_summary(&mut self, peer: VersionSummary, log: &OpLog) -> StoreResult<usize> {
        self.expect_state(SyncState::Negotiating, "peer summary")?;

        let delta = compute_delta(log, &peer);
        self.known = peer;
        for op in &delta {
            self.known.observe(&op.stamp);
        }
        let backlog = delta.len();
        self.outbound.extend(delta);

        self.transition(SyncState::Streaming);
        info!(backlog, "sync negotiated");
        Ok(backlog)
    }

    /// A later summary from the peer while streaming; raises what we assume
    /// it holds
    pub fn on_peer_progress(&mut self, peer: &VersionSummary) {
        for (site, counter) in peer.iter() {
            self.known.set(*site, *counter);
        }
    }

    /// A newly logged operation; returns whether it was queued
    pub fn push(&mut self, op: Operation) -> bool {
        if self.state != SyncState::Streaming || self.known.covers(&op.stamp) {
            return false;
        }
        self.known.observe(&op.stamp);
        self.outbound.push_back(op);
        true
    }

    /// The peer sent us this operation, so it never needs it back
    pub fn note_received(&mut self, op: &Operation) {
        self.known.observe(&op.stamp);
    }

    pub fn next_outbound(&mut self) -> Option<Operation> {
        self.outbound.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    /// Channel closed; returns how many queued operations were not sent
    pub fn disconnect(&mut self) -> usize {
        let undelivered = self.outbound.len();
        self.outbound.clear();
        self.known = VersionSummary::new();
        if self.state != SyncState::Idle {
            self.transition(SyncState::Idle);
        }
        if undelivered > 0 {
            debug!(undelivered, "unsent operations left for next negotiation");
        }
        undelivered
    }

    pub fn on_transport_failure(&mut self, err: &StoreError) -> usize {
        warn!(error = %err, state = %self.state, "sync transport failed");
        self.disconnect()
    }

    fn expect_state(&self, expected: SyncState, event: &str) -> StoreResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(StoreError::InvalidOperation(format!("{event} while {}, expected {expected}", self.state)))
        }
    }

    fn transition(&mut self, next: SyncState) {
        info!(from = %self.state, to = %next, "sync state change");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_canvas::crdt::{LogicalClock, Site};
    use crate::core_canvas::model::{EntityId, FieldValue};
    use uuid::Uuid;

    fn site(n: u128) -> Site {
        Site(Uuid::from_u128(n))
    }

    fn op(counter: u64, origin: u128) -> Operation {
        Operation::new(EntityId::new(Uuid::from_u128(99)), "x", FieldValue::Number(counter as f64), LogicalClock::new(counter, site(origin)))
    }

    fn log_with(ops: &[Operation]) -> OpLog {
        let mut log = OpLog::new();
        for op in ops {
            log.append(op.clone());
        }
        log
    }

    #[test]
    fn test_state_transitions() {
        let mut reconciler = SyncReconciler::new();
        assert_eq!(reconciler.state(), SyncState::Idle);
        reconciler.connect().unwrap();
        assert_eq!(reconciler.state(), SyncState::Negotiating);
        reconciler.on_peer_summary(VersionSummary::new(), &OpLog::new()).unwrap();
        assert_eq!(reconciler.state(), SyncState::Streaming);
        reconciler.disconnect();
        assert_eq!(reconciler.state(), SyncState::Idle);
        reconciler.connect().unwrap();
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut reconciler = SyncReconciler::new();
        let err = reconciler.on_peer_summary(VersionSummary::new(), &OpLog::new()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));
        reconciler.connect().unwrap();
        assert!(reconciler.connect().is_err());
    }

    #[test]
    fn test_delta_covers_missing_sites() {
        let log = log_with(&[op(1, 1), op(2, 1), op(1, 2), op(3, 3)]);
        let peer: VersionSummary = [(site(1), 1)].into_iter().collect();
        let stamps: Vec<_> = compute_delta(&log, &peer).into_iter().map(|o| o.stamp).collect();
        assert_eq!(
            stamps,
            vec![LogicalClock::new(1, site(2)), LogicalClock::new(2, site(1)), LogicalClock::new(3, site(3))]
        );
    }

    #[test]
    fn test_push_skips_queued_and_received() {
        let log = log_with(&[op(1, 1), op(2, 1)]);
        let mut reconciler = SyncReconciler::new();
        reconciler.connect().unwrap();
        assert_eq!(reconciler.on_peer_summary(VersionSummary::new(), &log).unwrap(), 2);

        // already in the backlog
        assert!(!reconciler.push(op(2, 1)));

        // came from the peer
        let theirs = op(5, 2);
        reconciler.note_received(&theirs);
        assert!(!reconciler.push(theirs));

        assert!(reconciler.push(op(3, 1)));
        let drained: Vec<_> = std::iter::from_fn(|| reconciler.next_outbound()).map(|o| o.stamp.counter).collect();
        assert_eq!(drained, vec![1, 2, 3]);
    }

    #[test]
    fn test_push_ignored_unless_streaming() {
        let mut reconciler = SyncReconciler::new();
        assert!(!reconciler.push(op(1, 1)));
        reconciler.connect().unwrap();
        assert!(!reconciler.push(op(1, 1)));
        assert_eq!(reconciler.pending(), 0);
    }

    #[test]
    fn test_failure_returns_to_idle_and_reports_undelivered() {
        let log = log_with(&[op(1, 1), op(2, 1), op(3, 1)]);
        let mut reconciler = SyncReconciler::new();
        reconciler.connect().unwrap();
        reconciler.on_peer_summary(VersionSummary::new(), &log).unwrap();
        reconciler.next_outbound();

        let undelivered = reconciler.on_transport_failure(&StoreError::TransportFailure("reset".into()));
        assert_eq!(undelivered, 2);
        assert_eq!(reconciler.state(), SyncState::Idle);
        assert_eq!(reconciler.pending(), 0);
    }
}
