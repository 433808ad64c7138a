// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Causality clocks: which events a replica has incorporated.
//!
//! A causality clock maps each site to the highest *contiguous* counter
//! observed from that site, plus an explicit exception set for events
//! delivered out of local order. The exception set is what separates
//! this from a plain vector clock: update groups may arrive from remote
//! sites in any order, so a clock must be able to include counter 5
//! before counters 3 and 4.
//!
//! Invariants:
//! - `merge` is commutative, associative, and idempotent.
//! - Clocks only grow. There is no operation that removes an inclusion.
//! - Exceptions are always strictly above the frontier; recording the
//!   successor of the frontier absorbs any now-contiguous exceptions.
//!
//! Complexity:
//! - includes: O(1)
//! - record: O(k) where k is the run of absorbed exceptions
//! - merge, compare: O(sites + exceptions)

use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde::Serialize;

use super::SiteId;
use super::Timestamp;
use super::TripleTimestamp;

/// Relation between two causality clocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockOrdering {
    /// Both clocks include exactly the same events.
    Equal,
    /// This clock includes everything the other does, and more.
    Dominates,
    /// The other clock includes everything this one does, and more.
    IsDominated,
    /// Each clock includes events the other does not.
    Concurrent,
}

impl ClockOrdering {
    /// True if this relation is any of the given ones.
    pub fn is_any_of(&self, relations: &[ClockOrdering]) -> bool {
        return relations.contains(self);
    }
}

/// Per-site inclusion state: a contiguous frontier plus exceptions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SiteEntry {
    /// Every counter in 1..=frontier is included.
    frontier: u64,
    /// Included counters strictly above the frontier.
    exceptions: FxHashSet<u64>,
}

impl SiteEntry {
    fn includes(&self, counter: u64) -> bool {
        return counter <= self.frontier || self.exceptions.contains(&counter);
    }

    fn record(&mut self, counter: u64) {
        if counter <= self.frontier {
            return;
        }
        if counter == self.frontier + 1 {
            self.frontier = counter;
            // Absorb any exceptions that became contiguous.
            while self.exceptions.remove(&(self.frontier + 1)) {
                self.frontier += 1;
            }
        } else {
            self.exceptions.insert(counter);
        }
    }

    fn merge(&mut self, other: &SiteEntry) {
        if other.frontier > self.frontier {
            // Everything up to the other frontier is contiguous there;
            // our old exceptions at or below it are subsumed.
            self.exceptions.retain(|c| *c > other.frontier);
            self.frontier = other.frontier;
        }
        for counter in &other.exceptions {
            if *counter > self.frontier {
                self.exceptions.insert(*counter);
            }
        }
        while self.exceptions.remove(&(self.frontier + 1)) {
            self.frontier += 1;
        }
    }

    /// True if every counter included here is also included in `other`.
    fn subset_of(&self, other: &SiteEntry) -> bool {
        if self.frontier > other.frontier {
            // The gap (other.frontier, self.frontier] must be covered by
            // the other side's exceptions.
            for counter in (other.frontier + 1)..=self.frontier {
                if !other.exceptions.contains(&counter) {
                    return false;
                }
            }
        }
        for counter in &self.exceptions {
            if !other.includes(*counter) {
                return false;
            }
        }
        return true;
    }

    fn is_empty(&self) -> bool {
        return self.frontier == 0 && self.exceptions.is_empty();
    }
}

/// Tracks which timestamped events a replica has incorporated.
///
/// Used everywhere a snapshot point or a known version must be compared
/// or merged: transaction snapshots, update-group dependencies, managed
/// object state, and prune points.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CausalityClock {
    entries: rustc_hash::FxHashMap<SiteId, SiteEntry>,
}

impl CausalityClock {
    /// Create an empty clock that includes no events.
    pub fn new() -> CausalityClock {
        return CausalityClock::default();
    }

    /// True if the clock includes the given event.
    pub fn includes(&self, ts: &Timestamp) -> bool {
        return match self.entries.get(&ts.site) {
            Some(entry) => entry.includes(ts.counter),
            None => false,
        };
    }

    /// True if the clock includes the base event of an update id.
    ///
    /// Sub-operations of a transaction become visible atomically, so
    /// inclusion is defined on the shared base timestamp.
    pub fn includes_triple(&self, ts: &TripleTimestamp) -> bool {
        return self.includes(&ts.base());
    }

    /// Record one event into the clock.
    pub fn record(&mut self, ts: &Timestamp) {
        self.entries.entry(ts.site.clone()).or_default().record(ts.counter);
    }

    /// Highest contiguous counter observed from a site.
    pub fn frontier_of(&self, site: &SiteId) -> u64 {
        return self.entries.get(site).map(|e| e.frontier).unwrap_or(0);
    }

    /// Union the other clock into this one.
    ///
    /// Returns the relation of `self` to `other` *before* merging, so
    /// callers can tell whether the merge brought in new events (the
    /// relation was `Concurrent` or `IsDominated`).
    pub fn merge(&mut self, other: &CausalityClock) -> ClockOrdering {
        let relation = self.compare(other);
        for (site, entry) in &other.entries {
            match self.entries.get_mut(site) {
                Some(own) => own.merge(entry),
                None => {
                    self.entries.insert(site.clone(), entry.clone());
                }
            }
        }
        return relation;
    }

    /// True if every event included in `other` is included in `self`.
    pub fn includes_all_of(&self, other: &CausalityClock) -> bool {
        let empty = SiteEntry::default();
        for (site, entry) in &other.entries {
            if entry.is_empty() {
                continue;
            }
            let own = self.entries.get(site).unwrap_or(&empty);
            if !entry.subset_of(own) {
                return false;
            }
        }
        return true;
    }

    /// Compare two clocks by mutual inclusion.
    ///
    /// Two clocks are `Concurrent` iff neither includes all of the
    /// other's recorded events.
    pub fn compare(&self, other: &CausalityClock) -> ClockOrdering {
        let forward = self.includes_all_of(other);
        let backward = other.includes_all_of(self);
        return match (forward, backward) {
            (true, true) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Dominates,
            (false, true) => ClockOrdering::IsDominated,
            (false, false) => ClockOrdering::Concurrent,
        };
    }

    /// True if no events are included.
    pub fn is_empty(&self) -> bool {
        return self.entries.values().all(|e| e.is_empty());
    }

    /// Number of sites with at least one included event.
    pub fn site_count(&self) -> usize {
        return self.entries.values().filter(|e| !e.is_empty()).count();
    }
}

impl PartialEq for CausalityClock {
    fn eq(&self, other: &Self) -> bool {
        return self.compare(other) == ClockOrdering::Equal;
    }
}

impl Eq for CausalityClock {}

impl std::fmt::Display for CausalityClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        let mut sites: Vec<&SiteId> = self.entries.keys().collect();
        sites.sort();
        for (i, site) in sites.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let entry = &self.entries[*site];
            write!(f, "{}:{}", site, entry.frontier)?;
            if !entry.exceptions.is_empty() {
                let mut exceptions: Vec<u64> = entry.exceptions.iter().copied().collect();
                exceptions.sort_unstable();
                write!(f, "+{:?}", exceptions)?;
            }
        }
        return write!(f, "}}");
    }
}
