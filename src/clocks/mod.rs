// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Identifiers for sites, events, and individual downstream updates.
//!
//! # Identifier Hierarchy
//!
//! - `SiteId`: names a participant (a client session or a datacenter).
//! - `Timestamp`: identifies one event in a site's local sequence,
//!   as a `(site, counter)` pair. Globally unique per site.
//! - `TripleTimestamp`: identifies one downstream update. A single
//!   transaction may emit several updates sharing the same base
//!   `(site, counter)`; the `sub` counter distinguishes them.
//!
//! IDs are designed to be:
//! - Globally unique: counters increase monotonically per site
//! - Totally ordered: can be compared deterministically
//! - Hashable: can be used as map keys

use std::cmp::Ordering;

use serde::Deserialize;
use serde::Serialize;

pub mod causality;
pub mod mapping;

pub use causality::CausalityClock;
pub use causality::ClockOrdering;
pub use mapping::TimestampMapping;

/// Identifier of a site: a client session or a datacenter surrogate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteId(String);

impl SiteId {
    /// Create a new site identifier. The name must be non-empty.
    pub fn new(name: impl Into<String>) -> SiteId {
        let name = name.into();
        assert!(!name.is_empty(), "site id must be non-empty");
        return SiteId(name);
    }

    /// The site name as a string slice.
    pub fn as_str(&self) -> &str {
        return &self.0;
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}", self.0);
    }
}

/// An event identifier: one position in a site's local event sequence.
///
/// Counters start at 1; counter 0 never names an event, which lets an
/// empty causality clock mean "nothing from this site".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub site: SiteId,
    pub counter: u64,
}

impl Timestamp {
    /// Create a new timestamp. The counter must be non-zero.
    pub fn new(site: SiteId, counter: u64) -> Timestamp {
        assert!(counter > 0, "timestamp counters start at 1");
        return Timestamp { site, counter };
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare by site first, then by counter
        match self.site.cmp(&other.site) {
            Ordering::Equal => self.counter.cmp(&other.counter),
            other => other,
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}:{}", self.site, self.counter);
    }
}

/// Identifier of a single downstream update.
///
/// All updates of one transaction share the `(site, counter)` base; the
/// `sub` counter distinguishes individual updates within it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripleTimestamp {
    pub site: SiteId,
    pub counter: u64,
    pub sub: u64,
}

impl TripleTimestamp {
    /// Create a new triple timestamp.
    pub fn new(site: SiteId, counter: u64, sub: u64) -> TripleTimestamp {
        assert!(counter > 0, "timestamp counters start at 1");
        return TripleTimestamp { site, counter, sub };
    }

    /// The base timestamp shared by all updates of the transaction.
    pub fn base(&self) -> Timestamp {
        return Timestamp {
            site: self.site.clone(),
            counter: self.counter,
        };
    }
}

impl PartialOrd for TripleTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for TripleTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare by site, then counter, then sub
        match self.site.cmp(&other.site) {
            Ordering::Equal => match self.counter.cmp(&other.counter) {
                Ordering::Equal => self.sub.cmp(&other.sub),
                other => other,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for TripleTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}:{}.{}", self.site, self.counter, self.sub);
    }
}

/// Issues fresh `TripleTimestamp`s over a fixed base timestamp.
///
/// One generator exists per transaction; `sub` counters are dense and
/// start at 0.
#[derive(Clone, Debug)]
pub struct TimestampSource {
    base: Timestamp,
    next_sub: u64,
}

impl TimestampSource {
    /// Create a generator rooted at the given base timestamp.
    pub fn new(base: Timestamp) -> TimestampSource {
        return TimestampSource { base, next_sub: 0 };
    }

    /// Generate the next unused triple timestamp.
    pub fn generate(&mut self) -> TripleTimestamp {
        let ts = TripleTimestamp {
            site: self.base.site.clone(),
            counter: self.base.counter,
            sub: self.next_sub,
        };
        self.next_sub += 1;
        return ts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_ordering() {
        let a = Timestamp::new(SiteId::new("alice"), 1);
        let b = Timestamp::new(SiteId::new("alice"), 2);
        let c = Timestamp::new(SiteId::new("bob"), 1);

        assert!(a < b);
        assert!(a < c); // "alice" < "bob"
        assert!(b < c);
    }

    #[test]
    fn triple_base() {
        let ts = TripleTimestamp::new(SiteId::new("alice"), 42, 5);
        assert_eq!(ts.base(), Timestamp::new(SiteId::new("alice"), 42));
    }

    #[test]
    fn source_is_dense() {
        let mut source = TimestampSource::new(Timestamp::new(SiteId::new("alice"), 7));
        let a = source.generate();
        let b = source.generate();

        assert_eq!(a.sub, 0);
        assert_eq!(b.sub, 1);
        assert_eq!(a.base(), b.base());
    }

    #[test]
    #[should_panic]
    fn zero_counter_rejected() {
        Timestamp::new(SiteId::new("alice"), 0);
    }
}
