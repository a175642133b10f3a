/*
    oplog.rs - Append-only operation log

    Stores every operation this replica has seen, local or remote, keyed by
    its stamp. A stamp is unique per operation (each site ticks once per
    edit), so the stamp doubles as the deduplication key.

    Iteration order is stamp order, which is also a valid replay order: the
    registers do not care, and replaying oldest-first keeps hydration cheap.

    The log is the source of truth for:
    - Sync deltas (everything above a peer's VersionSummary)
    - Export to the persistence collaborator
*/

use super::clock::{LogicalClock, Site};
use super::version_summary::VersionSummary;
use crate::core_canvas::model::Operation;
use std::collections::btree_map::{self, BTreeMap};
use tracing::warn;

/// Append-only operation log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpLog {
    entries: BTreeMap<LogicalClock, Operation>,
}

impl OpLog {
    pub fn new() -> Self {
        OpLog { entries: BTreeMap::new() }
    }

    /// Record an operation; returns false if its stamp was already logged
    pub fn append(&mut self, op: Operation) -> bool {
        match self.entries.entry(op.stamp) {
            btree_map::Entry::Occupied(existing) => {
                if existing.get() != &op {
                    warn!(stamp = %op.stamp, "conflicting payload for an already logged stamp, keeping first");
                }
                false
            }
            btree_map::Entry::Vacant(slot) => {
                slot.insert(op);
                true
            }
        }
    }

    pub fn contains(&self, stamp: &LogicalClock) -> bool {
        self.entries.contains_key(stamp)
    }

    pub fn get(&self, stamp: &LogicalClock) -> Option<&Operation> {
        self.entries.get(stamp)
    }

    /// Operations the holder of `summary` has not seen, in stamp order
    pub fn ops_since<'a>(
        &'a self,
        summary: &'a VersionSummary,
    ) -> impl Iterator<Item = &'a Operation> + 'a {
        self.entries.values().filter(move |op| !summary.covers(&op.stamp))
    }

    /// Operations originated by one site, in counter order
    pub fn by_site(&self, site: &Site) -> Vec<&Operation> {
        self.entries.values().filter(|op| op.stamp.site == *site).collect()
    }

    /// Restartable view over the whole log
    pub fn export(&self) -> OpExport<'_> {
        OpExport { log: self, since: None }
    }

    /// Restartable view over the tail not covered by `summary`
    pub fn export_since(&self, summary: VersionSummary) -> OpExport<'_> {
        OpExport { log: self, since: Some(summary) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Finite, restartable sequence of logged operations
///
/// Each call to `iter` (or each `for op in &export`) starts from the oldest
/// matching operation again.
pub struct OpExport<'a> {
    log: &'a OpLog,
    since: Option<VersionSummary>,
}

impl<'a> OpExport<'a> {
    pub fn iter(&self) -> OpExportIter<'_> {
        OpExportIter { values: self.log.entries.values(), since: self.since.as_ref() }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<'e, 'a> IntoIterator for &'e OpExport<'a> {
    type Item = &'e Operation;
    type IntoIter = OpExportIter<'e>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct OpExportIter<'e> {
    values: btree_map::Values<'e, LogicalClock, Operation>,
    since: Option<&'e VersionSummary>,
}

impl<'e> Iterator for OpExportIter<'e> {
    type Item = &'e Operation;

    fn next(&mut self) -> Option<Self::Item> {
        let since = self.since;
        self.values.by_ref().find(|op| since.map_or(true, |summary| !summary.covers(&op.stamp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_canvas::model::{EntityId, FieldValue};
    use uuid::Uuid;

    fn site(n: u128) -> Site {
        Site(Uuid::from_u128(n))
    }

    fn op(entity: EntityId, counter: u64, origin: u128) -> Operation {
        Operation::new(
            entity,
            "x",
            FieldValue::Number(counter as f64),
            LogicalClock::new(counter, site(origin)),
        )
    }

    #[test]
    fn test_oplog_creation() {
        let log = OpLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn test_oplog_deduplicates_by_stamp() {
        let mut log = OpLog::new();
        let entity = EntityId::generate();
        assert!(log.append(op(entity, 1, 1)));
        assert!(!log.append(op(entity, 1, 1)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_oplog_iterates_in_stamp_order() {
        let mut log = OpLog::new();
        let entity = EntityId::generate();
        log.append(op(entity, 3, 1));
        log.append(op(entity, 1, 2));
        log.append(op(entity, 1, 1));

        let stamps: Vec<_> = log.export().iter().map(|o| o.stamp).collect();
        assert_eq!(
            stamps,
            vec![
                LogicalClock::new(1, site(1)),
                LogicalClock::new(1, site(2)),
                LogicalClock::new(3, site(1)),
            ]
        );
    }

    #[test]
    fn test_ops_since_summary() {
        let mut log = OpLog::new();
        let entity = EntityId::generate();
        for counter in 1..=5 {
            log.append(op(entity, counter, 1));
        }
        log.append(op(entity, 2, 2));

        let summary: VersionSummary = [(site(1), 3)].into_iter().collect();
        let missing: Vec<_> = log.ops_since(&summary).map(|o| o.stamp).collect();
        assert_eq!(
            missing,
            vec![
                LogicalClock::new(2, site(2)),
                LogicalClock::new(4, site(1)),
                LogicalClock::new(5, site(1)),
            ]
        );
    }

    #[test]
    fn test_export_is_restartable() {
        let mut log = OpLog::new();
        let entity = EntityId::generate();
        for counter in 1..=4 {
            log.append(op(entity, counter, 1));
        }
        let export = log.export_since([(site(1), 2)].into_iter().collect());

        let first: Vec<_> = export.iter().collect();
        let second: Vec<_> = (&export).into_iter().collect();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_oplog_by_site() {
        let mut log = OpLog::new();
        let entity = EntityId::generate();
        log.append(op(entity, 1, 1));
        log.append(op(entity, 2, 1));
        log.append(op(entity, 1, 2));
        assert_eq!(log.by_site(&site(1)).len(), 2);
        assert_eq!(log.by_site(&site(2)).len(), 1);
        assert!(log.by_site(&site(3)).is_empty());
    }
}
