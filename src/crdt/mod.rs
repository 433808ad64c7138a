// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! The contract every replicated type implements.
//!
//! Types here are operation-based CRDTs: replicas exchange discrete
//! update descriptions rather than full state, and any two updates
//! generated concurrently must commute. Delivering the same update
//! twice must also be harmless, but that is enforced above the type
//! (the managed object filters duplicates by clock inclusion), so
//! implementations only need commutativity.
//!
//! The contract is split into small orthogonal pieces instead of an
//! inheritance chain:
//!
//! - `Crdt`: value projection, copying, fraction restriction, and
//!   same-version merge for stitching fetched fragments together.
//! - `CrdtUpdate`: one immutable downstream effect, with the set of
//!   particles it may touch.
//! - `Particle`: the unit of partial replication, an addressable
//!   sub-element of an object's value (a set element, a voter, a key).

use std::hash::Hash;

use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde::Serialize;

pub mod counter;
pub mod group;
pub mod set;

pub use group::AnyGroup;
pub use group::ObjectUpdatesGroup;

/// Globally unique name of a replicated object: a table and a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrdtIdentifier {
    table: String,
    key: String,
}

impl CrdtIdentifier {
    /// Create an identifier. Both parts must be non-empty.
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> CrdtIdentifier {
        let table = table.into();
        let key = key.into();
        assert!(!table.is_empty(), "identifier table must be non-empty");
        assert!(!key.is_empty(), "identifier key must be non-empty");
        return CrdtIdentifier { table, key };
    }

    /// The table part of the identifier.
    pub fn table(&self) -> &str {
        return &self.table;
    }

    /// The key part of the identifier.
    pub fn key(&self) -> &str {
        return &self.key;
    }
}

impl PartialOrd for CrdtIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for CrdtIdentifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Total order by concatenation of table and key.
        let own = self.table.bytes().chain(self.key.bytes());
        let theirs = other.table.bytes().chain(other.key.bytes());
        return own.cmp(theirs);
    }
}

impl std::fmt::Display for CrdtIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}/{}", self.table, self.key);
    }
}

/// An addressable sub-element of an object's value: the unit of
/// partial replication.
pub trait Particle: Clone + Eq + Ord + Hash + std::fmt::Debug + Send + 'static {}

impl<T: Clone + Eq + Ord + Hash + std::fmt::Debug + Send + 'static> Particle for T {}

/// The particles an update may change.
///
/// `All` is the explicit form of "the whole object"; partial replicas
/// treat such an update as touching state they may not hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AffectedParticles<P: Particle> {
    /// The update may change any part of the object.
    All,
    /// The update only touches the listed particles.
    Set(FxHashSet<P>),
}

impl<P: Particle> AffectedParticles<P> {
    /// An update affecting exactly one particle.
    pub fn one(particle: P) -> AffectedParticles<P> {
        let mut set = FxHashSet::default();
        set.insert(particle);
        return AffectedParticles::Set(set);
    }

    /// True if the update may change the whole object.
    pub fn is_all(&self) -> bool {
        return matches!(self, AffectedParticles::All);
    }
}

/// One immutable downstream effect on a replicated object.
pub trait CrdtUpdate<C: Crdt>: Clone + std::fmt::Debug + Send + 'static {
    /// Apply the effect to an object instance.
    ///
    /// Concurrent updates must commute: if neither update's dependency
    /// clock includes the other's timestamp, applying them in either
    /// order yields the same value.
    fn apply_to(&self, crdt: &mut C);

    /// The particles this update may change.
    fn affected_particles(&self) -> AffectedParticles<C::Particle>;
}

/// An operation-based replicated data type.
///
/// `Default` doubles as the canonical creation constructor: the state
/// of a freshly created object before any update applies.
pub trait Crdt: Clone + Default + std::fmt::Debug + Send + 'static {
    /// Application-visible projection of the state, without metadata.
    type Value;
    /// Unit of partial replication for this type.
    type Particle: Particle;
    /// Downstream update description for this type.
    type Update: CrdtUpdate<Self>;

    /// Observable content of the object, free of metadata.
    fn value(&self) -> Self::Value;

    /// Every particle currently materialized in this copy.
    fn particles(&self) -> Vec<Self::Particle>;

    /// Copy restricted to the given particles.
    fn copy_fraction(&self, particles: &FxHashSet<Self::Particle>) -> Self;

    /// Merge another copy of the *same causal version* but a different
    /// shard into this one, to stitch fetched fragments into a richer
    /// local view. On overlap this copy wins: it may carry local
    /// not-yet-committed changes the other side cannot know about.
    /// Unlike CRDT merge, this assumes version equality, not causal
    /// divergence.
    fn merge_same_version(&mut self, other: &Self);
}
