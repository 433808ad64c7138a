// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Store interfaces: what the engine needs from its surroundings.
//!
//! Two contracts, both logical. `ObjectStore` is the request/reply
//! channel a session speaks to a datacenter over: fetch a version,
//! commit update groups, ask for the latest clock. Byte framing and
//! transport are someone else's problem; the types here define the
//! fields and their causal semantics. `SnapshotStore` is the durable
//! key/value backend a datacenter parks encoded managed objects in:
//! durable, linearizable per key, opaque to CRDT semantics.
//!
//! `MemoryStore` is the in-process reference implementation of
//! `ObjectStore`, with a built-in sequencer. It doubles as the
//! embedded single-process mode and the test surrogate.

use crate::clocks::CausalityClock;
use crate::clocks::SiteId;
use crate::clocks::Timestamp;
use crate::crdt::CrdtIdentifier;
use crate::crdt::group::AnyGroup;
use crate::error::Result;
use crate::managed::AnyVersion;
use crate::shard::query::AnyQuery;

pub mod memory;

pub use memory::MemorySnapshotStore;
pub use memory::MemoryStore;

/// Request for a version of one object.
pub struct FetchRequest {
    /// Which object.
    pub id: CrdtIdentifier,
    /// The lowest acceptable cut. The store replies with a version at
    /// a cut including this one, as close to it as it can reconstruct.
    pub min_version: CausalityClock,
    /// Restriction of the reply to a fraction of the state.
    pub query: Box<dyn AnyQuery>,
    /// Ask the store to push future updates of this object. Delivery
    /// of such notifications is transport-defined.
    pub subscribe: bool,
}

/// Reply to a fetch: a versioned, possibly restricted state.
pub struct FetchReply {
    pub version: Box<dyn AnyVersion>,
}

/// Request to commit one transaction's update groups atomically.
pub struct CommitRequest {
    /// The client timestamp all groups share.
    pub base_timestamp: Timestamp,
    /// One group per object the transaction updated.
    pub groups: Vec<Box<dyn AnyGroup>>,
}

/// Acknowledgement of a commit.
pub struct CommitReply {
    /// The system timestamp the sequencer assigned.
    pub system_timestamp: Timestamp,
    /// The store's committed cut after this commit.
    pub committed: CausalityClock,
}

/// The request/reply channel between a session and a store.
pub trait ObjectStore: Send + Sync {
    /// Fetch a (possibly restricted) version of an object.
    ///
    /// Fails with `NoSuchObject` for an object never created, and with
    /// `VersionNotFound` when the requested cut cannot be served.
    fn fetch_object_version(&self, request: FetchRequest) -> Result<FetchReply>;

    /// Sequence and apply one transaction's update groups.
    fn commit_updates(&self, request: CommitRequest) -> Result<CommitReply>;

    /// The store's current committed cut, from the point of view of
    /// the asking client.
    fn latest_known_clock(&self, client: &SiteId) -> Result<CausalityClock>;
}

/// Durable key/value backend for encoded managed-object snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Read the snapshot stored under an identifier, if any.
    fn read(&self, id: &CrdtIdentifier) -> Result<Option<Vec<u8>>>;

    /// Durably store a snapshot under an identifier.
    fn write(&self, id: &CrdtIdentifier, snapshot: &[u8]) -> Result<()>;
}
