// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Mapping between client and system timestamps.
//!
//! A transaction commits twice: first locally under a client timestamp,
//! then globally under a system timestamp assigned by a sequencer. One
//! client timestamp may accumulate several system timestamps when a
//! commit is retried against more than one datacenter. The mapping
//! travels with every update group so replicas can recognize the same
//! transaction under any of its names.

use serde::Deserialize;
use serde::Serialize;
use smallvec::SmallVec;

use super::CausalityClock;
use super::Timestamp;

/// A client timestamp plus the system timestamps assigned to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampMapping {
    client: Timestamp,
    /// System timestamps, in assignment order. Usually zero or one.
    system: SmallVec<[Timestamp; 2]>,
}

impl TimestampMapping {
    /// Create a mapping with no system timestamps assigned yet.
    pub fn new(client: Timestamp) -> TimestampMapping {
        return TimestampMapping {
            client,
            system: SmallVec::new(),
        };
    }

    /// The client timestamp the transaction committed locally under.
    pub fn client_timestamp(&self) -> &Timestamp {
        return &self.client;
    }

    /// System timestamps assigned at global commit, if any.
    pub fn system_timestamps(&self) -> &[Timestamp] {
        return &self.system;
    }

    /// True once at least one system timestamp has been assigned.
    pub fn is_globally_committed(&self) -> bool {
        return !self.system.is_empty();
    }

    /// Record a system timestamp assigned by a sequencer.
    pub fn add_system_timestamp(&mut self, ts: Timestamp) {
        if !self.system.contains(&ts) {
            self.system.push(ts);
        }
    }

    /// All names of this transaction: the client timestamp followed by
    /// every system timestamp.
    pub fn timestamps(&self) -> impl Iterator<Item = &Timestamp> {
        return std::iter::once(&self.client).chain(self.system.iter());
    }

    /// True if the clock includes this transaction under any name.
    pub fn any_included_in(&self, clock: &CausalityClock) -> bool {
        return self.timestamps().any(|ts| clock.includes(ts));
    }

    /// Record every name of this transaction into the clock.
    pub fn record_into(&self, clock: &mut CausalityClock) {
        for ts in self.timestamps() {
            clock.record(ts);
        }
    }
}

impl std::fmt::Display for TimestampMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.client)?;
        for ts in &self.system {
            write!(f, "->{}", ts)?;
        }
        return Ok(());
    }
}
