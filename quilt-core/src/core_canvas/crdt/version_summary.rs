/*
    version_summary.rs - Per-site high-water marks

    A VersionSummary records, for every origin site, the highest counter this
    replica has seen from it. Two replicas exchange summaries to work out which
    operations the other side is missing without shipping full state.

    Sites that never appear read as counter 0.
*/

use super::clock::{LogicalClock, Site};
use super::traits::Crdt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Map from origin site to highest counter seen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    entries: BTreeMap<Site, u64>,
}

impl VersionSummary {
    pub fn new() -> Self {
        VersionSummary { entries: BTreeMap::new() }
    }

    /// Highest counter seen from `site`, 0 when unknown
    pub fn get(&self, site: &Site) -> u64 {
        self.entries.get(site).copied().unwrap_or(0)
    }

    /// Raise the mark for `stamp.site` to at least `stamp.counter`
    pub fn observe(&mut self, stamp: &LogicalClock) -> bool {
        let current = self.entries.entry(stamp.site).or_insert(0);
        if stamp.counter > *current {
            *current = stamp.counter;
            true
        } else {
            false
        }
    }

    /// Raise the mark for `site`; never lowers an existing mark
    pub fn set(&mut self, site: Site, counter: u64) {
        let current = self.entries.entry(site).or_insert(0);
        *current = (*current).max(counter);
    }

    /// Whether an operation with this stamp has already been seen
    pub fn covers(&self, stamp: &LogicalClock) -> bool {
        stamp.counter <= self.get(&stamp.site)
    }

    /// True when every mark in `other` is matched or exceeded here
    pub fn dominates(&self, other: &VersionSummary) -> bool {
        other.entries.iter().all(|(site, &counter)| self.get(site) >= counter)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Site, &u64)> {
        self.entries.iter()
    }

    pub fn sites(&self) -> Vec<Site> {
        self.entries.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Crdt for VersionSummary {
    type Operation = LogicalClock;
    type Value = BTreeMap<Site, u64>;

    fn apply(&mut self, stamp: Self::Operation) -> bool {
        self.observe(&stamp)
    }

    fn merge(&mut self, other: &Self) {
        for (site, &counter) in &other.entries {
            self.set(*site, counter);
        }
    }

    fn value(&self) -> Self::Value {
        self.entries.clone()
    }
}

impl FromIterator<(Site, u64)> for VersionSummary {
    fn from_iter<I: IntoIterator<Item = (Site, u64)>>(iter: I) -> Self {
        let mut summary = VersionSummary::new();
        for (site, counter) in iter {
            summary.set(site, counter);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn site(n: u128) -> Site {
        Site(Uuid::from_u128(n))
    }

    #[test]
    fn test_unknown_site_reads_zero() {
        let summary = VersionSummary::new();
        assert_eq!(summary.get(&site(1)), 0);
        assert!(summary.is_empty());
    }

    #[test]
    fn test_observe_is_monotonic() {
        let mut summary = VersionSummary::new();
        assert!(summary.observe(&LogicalClock::new(5, site(1))));
        assert!(!summary.observe(&LogicalClock::new(3, site(1))));
        assert_eq!(summary.get(&site(1)), 5);
    }

    #[test]
    fn test_set_never_lowers() {
        let mut summary = VersionSummary::new();
        summary.set(site(1), 9);
        summary.set(site(1), 2);
        assert_eq!(summary.get(&site(1)), 9);
    }

    #[test]
    fn test_merge_takes_maximum() {
        let mut a: VersionSummary = [(site(1), 3), (site(2), 1)].into_iter().collect();
        let b: VersionSummary = [(site(1), 2), (site(2), 4), (site(3), 1)].into_iter().collect();
        a.merge(&b);
        assert_eq!(a.get(&site(1)), 3);
        assert_eq!(a.get(&site(2)), 4);
        assert_eq!(a.get(&site(3)), 1);
    }

    #[test]
    fn test_covers_and_dominates() {
        let a: VersionSummary = [(site(1), 5)].into_iter().collect();
        let b: VersionSummary = [(site(1), 3)].into_iter().collect();
        assert!(a.covers(&LogicalClock::new(5, site(1))));
        assert!(!a.covers(&LogicalClock::new(6, site(1))));
        assert!(!a.covers(&LogicalClock::new(1, site(2))));
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
    }
}
