/*
    replica.rs - Merge engine facade for one replica

    Owns the clock, the entity store, the spatial index and the change
    broadcasters, and keeps them consistent on every operation:

    1. Validate the operation
    2. Advance the clock (remote stamps are observed, local ones issued)
    3. Apply to the entity store (dedup by stamp, LWW per register)
    4. If a bounds field or the tombstone changed, move the index entry
    5. Emit a change event, and an op notification for sync sessions

    A replica is plain `&mut self` state. Async tasks share one through
    `SharedReplica` and never hold the lock across an await.
*/

use crate::core_canvas::crdt::{Clock, OpExport, OpLog, Site, VersionSummary};
use crate::core_canvas::events::{ChangeBroadcaster, ChangeEvent, ChangeOrigin};
use crate::core_canvas::model::{fields, Entity, EntityId, FieldValue, Operation, Rect};
use crate::core_canvas::spatial::{IndexConfig, RegionQuery, SpatialIndex};
use crate::core_canvas::store::{
    ApplyOutcome, EntityStore, OperationValidator, StoreError, StoreResult, ValidationRules,
};
use crate::core_canvas::sync::compute_delta;
use crate::metrics::{self, MetricsCollector, MetricsSnapshot, Timer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// Replica shared between sync sessions and the embedding application
pub type SharedReplica = Arc<Mutex<Replica>>;

fn handle_poison<T>(_err: PoisonError<T>) -> StoreError {
    StoreError::InvalidOperation("Lock poisoned: a thread panicked while holding the replica lock".to_string())
}

fn clock_exhausted() -> StoreError {
    StoreError::InvalidOperation("logical clock exhausted".to_string())
}

/// Lock a shared replica, mapping poisoning to a store error
pub fn lock_replica(replica: &SharedReplica) -> StoreResult<MutexGuard<'_, Replica>> {
    replica.lock().map_err(handle_poison)
}

/// Construction options for a replica
#[derive(Debug, Clone)]
pub struct ReplicaOptions {
    pub index: IndexConfig,
    pub validation: ValidationRules,

    /// Buffered change events per subscriber
    pub change_capacity: usize,

    /// Buffered op notifications per sync session
    pub op_capacity: usize,

    /// Forward operations received from one peer to every other session
    pub relay_remote_ops: bool,
}

impl Default for ReplicaOptions {
    fn default() -> Self {
        ReplicaOptions {
            index: IndexConfig::default(),
            validation: ValidationRules::default(),
            change_capacity: 1024,
            op_capacity: 4096,
            relay_remote_ops: true,
        }
    }
}

/// Outcome of hydrating from an exported log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub applied: usize,
    pub duplicates: usize,
    pub malformed: usize,
}

pub struct Replica {
    clock: Clock,
    store: EntityStore,
    index: SpatialIndex,
    validator: OperationValidator,
    changes: ChangeBroadcaster,
    ops: broadcast::Sender<Operation>,
    relay_remote_ops: bool,
    stats: MetricsCollector,
}

impl Replica {
    pub fn new(site: Site) -> Self {
        Self::with_options(site, ReplicaOptions::default())
    }

    pub fn with_options(site: Site, options: ReplicaOptions) -> Self {
        let (ops, _rx) = broadcast::channel(options.op_capacity.max(1));
        Replica {
            clock: Clock::new(site),
            store: EntityStore::new(),
            index: SpatialIndex::new(options.index),
            validator: OperationValidator::new(options.validation),
            changes: ChangeBroadcaster::new(options.change_capacity),
            ops,
            relay_remote_ops: options.relay_remote_ops,
            stats: MetricsCollector::new(),
        }
    }

    /// Wrap for sharing with sync sessions
    pub fn into_shared(self) -> SharedReplica {
        Arc::new(Mutex::new(self))
    }

    pub fn site(&self) -> Site {
        self.clock.site()
    }

    /// Highest counter issued or observed
    pub fn clock(&self) -> u64 {
        self.clock.current()
    }

    /// Write one field locally; returns the operation to transmit
    pub fn apply_local(
        &mut self,
        entity_id: EntityId,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> StoreResult<Operation> {
        let next = self.clock.peek().ok_or_else(clock_exhausted)?;
        let op = Operation::new(entity_id, field, value.into(), next);
        self.validator.validate(&op)?;

        let stamp = self.clock.tick().ok_or_else(clock_exhausted)?;
        debug_assert_eq!(stamp, next);

        self.integrate(op.clone(), ChangeOrigin::Local);
        self.stats.inc_local_ops();
        let _ = self.ops.send(op.clone());
        Ok(op)
    }

    /// Apply an operation from a peer; returns whether a register changed
    ///
    /// Malformed operations are logged and dropped, and reported as
    /// `MalformedOperation`.
    ///
    /// Any order is safe for convergence, but the version summary keeps only
    /// the highest counter seen per site. Deliver each origin's operations in
    /// stamp order (as sync sessions do), or a skipped earlier operation is
    /// treated as seen and never appears in a later `delta_for`.
    pub fn apply_remote(&mut self, op: Operation) -> StoreResult<bool> {
        self.apply_foreign(op, self.relay_remote_ops)
    }

    /// Create an entity at `bounds`; returns its id and the operations
    pub fn create(&mut self, bounds: Rect) -> StoreResult<(EntityId, Vec<Operation>)> {
        let id = EntityId::generate();
        let ops = self.place(id, bounds)?;
        Ok((id, ops))
    }

    /// Write all four positional fields of an entity
    pub fn place(&mut self, id: EntityId, bounds: Rect) -> StoreResult<Vec<Operation>> {
        Ok(vec![
            self.apply_local(id, fields::X, bounds.x)?,
            self.apply_local(id, fields::Y, bounds.y)?,
            self.apply_local(id, fields::WIDTH, bounds.w)?,
            self.apply_local(id, fields::HEIGHT, bounds.h)?,
        ])
    }

    /// Mark an entity deleted
    pub fn delete(&mut self, id: EntityId) -> StoreResult<Operation> {
        if !self.store.contains(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.apply_local(id, fields::TOMBSTONE, true)
    }

    /// Undo a deletion with a newer stamp
    pub fn restore(&mut self, id: EntityId) -> StoreResult<Operation> {
        if !self.store.contains(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.apply_local(id, fields::TOMBSTONE, false)
    }

    /// Current per-site high-water marks
    pub fn snapshot(&self) -> VersionSummary {
        self.store.snapshot()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.store.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.store.entities()
    }

    pub fn live_entities(&self) -> impl Iterator<Item = &Entity> {
        self.store.live_entities()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn log(&self) -> &OpLog {
        self.store.log()
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Lazy, restartable set of live entities intersecting `region`
    pub fn query(&self, region: Rect) -> RegionQuery<'_> {
        self.index.query(region)
    }

    /// Run a query to completion, recording its duration
    pub fn query_ids(&self, region: Rect) -> Vec<EntityId> {
        let timer = Timer::new(metrics::INDEX_QUERY_DURATION);
        let ids = self.index.query(region).iter().collect();
        timer.stop();
        ids
    }

    /// Changes to one entity from now on
    pub fn on_change(&self, entity_id: EntityId) -> impl Stream<Item = ChangeEvent> + Send + Unpin + 'static {
        self.changes.on_change(entity_id)
    }

    /// Changes to every entity from now on
    pub fn changes(&self) -> impl Stream<Item = ChangeEvent> + Send + Unpin + 'static {
        self.changes.changes()
    }

    /// Operations newly logged from now on: every local one, and remote
    /// ones when relaying is enabled
    pub fn subscribe_ops(&self) -> broadcast::Receiver<Operation> {
        self.ops.subscribe()
    }

    /// Operations a peer holding `peer` lacks, sorted by stamp
    pub fn delta_for(&self, peer: &VersionSummary) -> Vec<Operation> {
        compute_delta(self.store.log(), peer)
    }

    /// The full log, oldest stamp first
    pub fn export_ops(&self) -> OpExport<'_> {
        self.store.log().export()
    }

    /// The part of the log not covered by `since`
    pub fn export_ops_since(&self, since: &VersionSummary) -> OpExport<'_> {
        self.store.log().export_since(since.clone())
    }

    /// Hydrate from a previously exported log
    ///
    /// Operations are applied like remote ones but never relayed. Malformed
    /// entries are skipped and counted.
    pub fn import_ops<I>(&mut self, ops: I) -> ImportReport
    where
        I: IntoIterator<Item = Operation>,
    {
        let mut report = ImportReport::default();
        for op in ops {
            let already = self.store.log().contains(&op.stamp);
            match self.apply_foreign(op, false) {
                Ok(_) if already => report.duplicates += 1,
                Ok(_) => report.applied += 1,
                Err(_) => report.malformed += 1,
            }
        }
        info!(applied = report.applied, duplicates = report.duplicates, malformed = report.malformed, "imported operations");
        report
    }

    /// Compare the index against the bounds the store implies
    pub fn check_index(&self) -> StoreResult<()> {
        let expected = self.expected_bounds();
        let mut missing = 0;
        let mut moved = 0;
        for (id, rect) in &expected {
            match self.index.get(id) {
                None => missing += 1,
                Some(indexed) if indexed != *rect => moved += 1,
                Some(_) => {}
            }
        }
        let stale = self.index.entries().filter(|(id, _)| !expected.contains_key(id)).count();

        if missing + stale + moved == 0 {
            Ok(())
        } else {
            Err(StoreError::IndexInconsistency { missing, stale, moved })
        }
    }

    /// Rebuild the index from the store
    pub fn rebuild_index(&mut self) {
        let expected = self.expected_bounds();
        self.index.rebuild(expected);
        self.stats.inc_index_rebuilds();
        metrics::record_gauge(metrics::INDEX_ENTRIES, self.index.len() as f64);
        info!(entries = self.index.len(), "spatial index rebuilt");
    }

    /// Tombstoned entities every listed peer has seen deleted
    ///
    /// Only reports eligibility; the engine never removes entities.
    pub fn collectable_tombstones(&self, peer_summaries: &[VersionSummary]) -> Vec<EntityId> {
        self.store
            .tombstoned()
            .filter_map(|entity| {
                let stamp = entity.tombstone_stamp()?;
                peer_summaries.iter().all(|peer| peer.covers(&stamp)).then_some(entity.id)
            })
            .collect()
    }

    pub fn stats(&self) -> MetricsSnapshot {
        self.stats.snapshot()
    }

    /// Count an operation that failed to decode before reaching the replica
    pub fn record_malformed(&self) {
        self.stats.inc_malformed();
    }

    pub(crate) fn add_ops_sent(&self, count: u64) {
        self.stats.add_ops_sent(count);
    }

    #[cfg(test)]
    pub(crate) fn index_mut(&mut self) -> &mut SpatialIndex {
        &mut self.index
    }

    fn apply_foreign(&mut self, op: Operation, relay: bool) -> StoreResult<bool> {
        if let Err(err) = self.validator.validate(&op) {
            warn!(stamp = %op.stamp, entity = %op.entity_id, error = %err, "dropping malformed operation");
            self.stats.inc_malformed();
            return Err(err);
        }

        self.clock.observe(&op.stamp);
        let outcome = self.integrate(op.clone(), ChangeOrigin::Remote);
        if !outcome.logged {
            self.stats.inc_remote_ignored();
            return Ok(false);
        }

        self.stats.inc_remote_applied();
        if relay {
            let _ = self.ops.send(op);
        }
        Ok(outcome.changed)
    }

    fn integrate(&mut self, op: Operation, origin: ChangeOrigin) -> ApplyOutcome {
        let outcome = self.store.apply(op.clone());
        debug!(
            stamp = %op.stamp,
            entity = %op.entity_id,
            field = %op.field,
            logged = outcome.logged,
            changed = outcome.changed,
            "applied operation"
        );
        if !outcome.changed {
            return outcome;
        }

        if fields::affects_index(&op.field) {
            self.sync_index(op.entity_id);
        }
        self.changes.emit(ChangeEvent {
            entity_id: op.entity_id,
            field: op.field,
            value: op.value,
            stamp: op.stamp,
            origin,
        });
        outcome
    }

    fn sync_index(&mut self, id: EntityId) {
        let rebuilds = self.index.rebuilds();
        match self.store.get(&id).and_then(Entity::indexable_bounds) {
            Some(rect) => {
                if self.index.get(&id) != Some(rect) {
                    self.index.insert(id, rect);
                }
            }
            None => {
                self.index.remove(&id);
            }
        }
        if self.index.rebuilds() > rebuilds {
            self.stats.inc_index_rebuilds();
        }
        metrics::record_gauge(metrics::INDEX_ENTRIES, self.index.len() as f64);
    }

    fn expected_bounds(&self) -> HashMap<EntityId, Rect> {
        self.store
            .live_entities()
            .filter_map(|entity| entity.bounds().map(|rect| (entity.id, rect)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_canvas::crdt::LogicalClock;
    use std::time::Duration;
    use tokio_stream::StreamExt;
    use uuid::Uuid;

    fn site(n: u128) -> Site {
        Site(Uuid::from_u128(n))
    }

    #[test]
    fn test_apply_local_stamps_and_indexes() {
        let mut replica = Replica::new(site(1));
        let (id, ops) = replica.create(Rect::new(10.0, 10.0, 5.0, 5.0)).unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[3].stamp, LogicalClock::new(4, site(1)));
        assert_eq!(replica.query_ids(Rect::new(0.0, 0.0, 12.0, 12.0)), vec![id]);
        replica.check_index().unwrap();
    }

    #[test]
    fn test_invalid_local_write_does_not_tick() {
        let mut replica = Replica::new(site(1));
        let id = EntityId::generate();
        assert!(replica.apply_local(id, "", 1.0).is_err());
        assert_eq!(replica.clock(), 0);
        assert!(replica.log().is_empty());
    }

    #[test]
    fn test_remote_op_advances_clock() {
        let mut a = Replica::new(site(1));
        let id = EntityId::generate();
        let remote = Operation::new(id, "x", FieldValue::Number(1.0), LogicalClock::new(40, site(2)));
        assert!(a.apply_remote(remote.clone()).unwrap());
        assert!(!a.apply_remote(remote).unwrap());
        let op = a.apply_local(id, "x", 2.0).unwrap();
        assert_eq!(op.stamp.counter, 41);

        let stats = a.stats();
        assert_eq!(stats.remote_applied, 1);
        assert_eq!(stats.remote_ignored, 1);
    }

    #[test]
    fn test_top_counter_remote_cannot_block_local_writes() {
        let mut replica = Replica::new(site(1));
        let id = EntityId::generate();
        let hostile = Operation::new(id, "x", FieldValue::Number(1.0), LogicalClock::new(u64::MAX, site(2)));
        assert!(matches!(replica.apply_remote(hostile), Err(StoreError::MalformedOperation(_))));
        assert_eq!(replica.clock(), 0);

        let near = Operation::new(id, "x", FieldValue::Number(2.0), LogicalClock::new(u64::MAX - 2, site(2)));
        assert!(replica.apply_remote(near).unwrap());
        let op = replica.apply_local(id, "fill", "red").unwrap();
        assert_eq!(op.stamp.counter, u64::MAX - 1);

        // The next counter would be the reserved one
        assert!(replica.apply_local(id, "fill", "blue").is_err());
        assert_eq!(replica.clock(), u64::MAX - 1);
    }

    #[test]
    fn test_malformed_remote_is_dropped() {
        let mut replica = Replica::new(site(1));
        let bad = Operation::new(EntityId::generate(), "x", FieldValue::Number(f64::NAN), LogicalClock::new(1, site(2)));
        assert!(matches!(replica.apply_remote(bad), Err(StoreError::MalformedOperation(_))));
        assert!(replica.log().is_empty());
        assert_eq!(replica.stats().malformed, 1);
    }

    #[test]
    fn test_delete_removes_from_index_and_restore_returns() {
        let mut replica = Replica::new(site(1));
        let (id, _) = replica.create(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        replica.delete(id).unwrap();
        assert!(replica.query_ids(Rect::new(0.0, 0.0, 1.0, 1.0)).is_empty());
        assert!(replica.get(&id).unwrap().is_tombstoned());

        replica.restore(id).unwrap();
        assert_eq!(replica.query_ids(Rect::new(0.0, 0.0, 1.0, 1.0)), vec![id]);
        assert!(matches!(replica.delete(EntityId::generate()), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_check_index_detects_drift_and_rebuild_fixes_it() {
        let mut replica = Replica::new(site(1));
        let (a, _) = replica.create(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        replica.create(Rect::new(5.0, 5.0, 1.0, 1.0)).unwrap();

        replica.index_mut().remove(&a);
        replica.index_mut().insert(EntityId::generate(), Rect::new(9.0, 9.0, 1.0, 1.0));

        match replica.check_index() {
            Err(StoreError::IndexInconsistency { missing, stale, moved }) => {
                assert_eq!((missing, stale, moved), (1, 1, 0));
            }
            other => panic!("expected inconsistency, got {other:?}"),
        }
        replica.rebuild_index();
        replica.check_index().unwrap();
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut a = Replica::new(site(1));
        let (id, _) = a.create(Rect::new(1.0, 2.0, 3.0, 4.0)).unwrap();
        a.apply_local(id, "fill", "red").unwrap();

        let mut b = Replica::new(site(2));
        let report = b.import_ops(a.export_ops().iter().cloned());
        assert_eq!(report, ImportReport { applied: 5, duplicates: 0, malformed: 0 });
        assert_eq!(b.store().get(&id), a.store().get(&id));

        let again = b.import_ops(a.export_ops().iter().cloned());
        assert_eq!(again.duplicates, 5);
        assert_eq!(b.snapshot(), a.snapshot());
    }

    #[test]
    fn test_export_since_returns_tail() {
        let mut a = Replica::new(site(1));
        let id = EntityId::generate();
        for i in 0..6 {
            a.apply_local(id, "x", i as f64).unwrap();
        }
        let seen: VersionSummary = [(site(1), 4)].into_iter().collect();
        let tail: Vec<_> = a.export_ops_since(&seen).iter().map(|op| op.stamp.counter).collect();
        assert_eq!(tail, vec![5, 6]);
        assert_eq!(a.delta_for(&seen).len(), 2);
    }

    #[test]
    fn test_delta_completeness_needs_origin_order() {
        let mut a = Replica::new(site(1));
        let id = EntityId::generate();
        let ops: Vec<_> = (0..5).map(|i| a.apply_local(id, "x", i as f64).unwrap()).collect();

        let mut skipped = Replica::new(site(2));
        skipped.apply_remote(ops[4].clone()).unwrap();
        assert!(a.delta_for(&skipped.snapshot()).is_empty());

        let mut ordered = Replica::new(site(3));
        for op in &ops[..2] {
            ordered.apply_remote(op.clone()).unwrap();
        }
        assert_eq!(a.delta_for(&ordered.snapshot()), ops[2..].to_vec());
    }

    #[test]
    fn test_collectable_tombstones_require_every_peer() {
        let mut a = Replica::new(site(1));
        let (id, _) = a.create(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        let delete = a.delete(id).unwrap();

        let caught_up: VersionSummary = [(site(1), delete.stamp.counter)].into_iter().collect();
        let behind: VersionSummary = [(site(1), delete.stamp.counter - 1)].into_iter().collect();

        assert_eq!(a.collectable_tombstones(&[caught_up.clone()]), vec![id]);
        assert!(a.collectable_tombstones(&[caught_up, behind]).is_empty());
    }

    #[tokio::test]
    async fn test_on_change_reports_local_and_remote() {
        let mut replica = Replica::new(site(1));
        let id = EntityId::generate();
        let mut stream = replica.on_change(id);

        replica.apply_local(id, "fill", "blue").unwrap();
        replica
            .apply_remote(Operation::new(id, "fill", FieldValue::Text("green".into()), LogicalClock::new(9, site(2))))
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), stream.next()).await.unwrap().unwrap();
        assert_eq!(first.origin, ChangeOrigin::Local);
        let second = tokio::time::timeout(Duration::from_secs(1), stream.next()).await.unwrap().unwrap();
        assert_eq!(second.origin, ChangeOrigin::Remote);
        assert_eq!(second.value, FieldValue::Text("green".into()));
    }

    #[tokio::test]
    async fn test_op_notifications_respect_relay_option() {
        let options = ReplicaOptions { relay_remote_ops: false, ..Default::default() };
        let mut replica = Replica::with_options(site(1), options);
        let mut ops = replica.subscribe_ops();

        let id = EntityId::generate();
        replica
            .apply_remote(Operation::new(id, "x", FieldValue::Number(1.0), LogicalClock::new(3, site(2))))
            .unwrap();
        let local = replica.apply_local(id, "x", 2.0).unwrap();

        assert_eq!(ops.recv().await.unwrap(), local);
        assert!(ops.try_recv().is_err());
    }
}
