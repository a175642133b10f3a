/*
    clock.rs - Site identity and Lamport-style logical clocks

    Every replica owns a Site (128-bit, generated once) and a Clock that
    stamps the operations it originates. Stamps are totally ordered:
    counter first, then site as the tiebreaker.

    The clock also observes remote stamps so that a local edit made after
    seeing a remote edit always carries a larger counter.
*/

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Stable identifier of one replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Site(pub Uuid);

impl Site {
    /// Width of a site identifier on the wire
    pub const WIDTH: usize = 16;

    pub fn new(id: Uuid) -> Self {
        Site(id)
    }

    pub fn generate() -> Self {
        Site(Uuid::new_v4())
    }

    /// Build a site from raw wire bytes, `None` if the width is wrong
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Uuid::from_slice(bytes).ok().map(Site)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `(counter, site)` stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalClock {
    pub counter: u64,
    pub site: Site,
}

impl LogicalClock {
    pub fn new(counter: u64, site: Site) -> Self {
        LogicalClock { counter, site }
    }
}

impl Ord for LogicalClock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter.cmp(&other.counter).then_with(|| self.site.cmp(&other.site))
    }
}

impl PartialOrd for LogicalClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.counter, self.site)
    }
}

/// Per-site stamp generator
#[derive(Debug, Clone)]
pub struct Clock {
    site: Site,
    counter: u64,
}

impl Clock {
    pub fn new(site: Site) -> Self {
        Clock { site, counter: 0 }
    }

    pub fn site(&self) -> Site {
        self.site
    }

    /// Highest counter issued or observed so far
    pub fn current(&self) -> u64 {
        self.counter
    }

    /// The stamp `tick` would issue, `None` once the counter is exhausted
    pub fn peek(&self) -> Option<LogicalClock> {
        self.counter.checked_add(1).map(|counter| LogicalClock::new(counter, self.site))
    }

    /// Issue the next stamp for a local operation, `None` once the counter is exhausted
    pub fn tick(&mut self) -> Option<LogicalClock> {
        let stamp = self.peek()?;
        self.counter = stamp.counter;
        Some(stamp)
    }

    /// Fold in a stamp seen from any site (including our own, e.g. after hydration)
    pub fn observe(&mut self, stamp: &LogicalClock) {
        if stamp.counter > self.counter {
            self.counter = stamp.counter;
        }
    }
}
