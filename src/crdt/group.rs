// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Atomic groups of updates on a single object.
//!
//! A group is the unit of replication and of commit: an ordered
//! sequence of updates on one object, all sharing the transaction's
//! base timestamp, together with the timestamp mapping and the
//! dependency clock (the snapshot the updates were issued against).
//! A group may additionally carry a creation state: the initial value
//! of an object created by the transaction.
//!
//! Groups of different CRDT types travel together through transaction
//! buffers and commit requests, so a type-erased `AnyGroup` view is
//! provided alongside the typed struct. Stores downcast back to the
//! typed group; a mismatch surfaces as a wrong-type error.

use std::any::Any;

use serde::Deserialize;
use serde::Serialize;

use crate::clocks::CausalityClock;
use crate::clocks::Timestamp;
use crate::clocks::TimestampMapping;
use crate::crdt::Crdt;
use crate::crdt::CrdtIdentifier;
use crate::crdt::CrdtUpdate;
use crate::managed::AnyManaged;
use crate::managed::ManagedObject;
use crate::shard::Shard;

/// An atomic, ordered sequence of updates for one object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: Serialize, C::Update: Serialize",
    deserialize = "C: serde::de::DeserializeOwned, C::Update: serde::de::DeserializeOwned"
))]
pub struct ObjectUpdatesGroup<C: Crdt> {
    id: CrdtIdentifier,
    mapping: TimestampMapping,
    dependency: CausalityClock,
    operations: Vec<C::Update>,
    creation_state: Option<C>,
}

impl<C: Crdt> ObjectUpdatesGroup<C> {
    /// Create a group with no updates yet.
    pub fn new(
        id: CrdtIdentifier,
        mapping: TimestampMapping,
        creation_state: Option<C>,
        dependency: CausalityClock,
    ) -> ObjectUpdatesGroup<C> {
        return ObjectUpdatesGroup {
            id,
            mapping,
            dependency,
            operations: Vec::new(),
            creation_state,
        };
    }

    /// Identifier of the object the updates target.
    pub fn id(&self) -> &CrdtIdentifier {
        return &self.id;
    }

    /// Base timestamp shared by every update in the group.
    pub fn base_timestamp(&self) -> &Timestamp {
        return self.mapping.client_timestamp();
    }

    /// Timestamp mapping of the owning transaction.
    pub fn mapping(&self) -> &TimestampMapping {
        return &self.mapping;
    }

    /// Causal dependencies of this group: the snapshot the updates
    /// were issued against.
    pub fn dependency(&self) -> &CausalityClock {
        return &self.dependency;
    }

    /// Updates in issue order.
    pub fn operations(&self) -> &[C::Update] {
        return &self.operations;
    }

    /// Append the next update of the transaction.
    pub fn append(&mut self, update: C::Update) {
        self.operations.push(update);
    }

    /// True if this group creates the object.
    pub fn has_creation_state(&self) -> bool {
        return self.creation_state.is_some();
    }

    /// Initial object state, when this group creates the object.
    pub fn creation_state(&self) -> Option<&C> {
        return self.creation_state.as_ref();
    }

    /// Install a creation state on an existing group.
    pub fn set_creation_state(&mut self, state: C) {
        self.creation_state = Some(state);
    }

    /// Record a sequencer-assigned system timestamp into the mapping.
    pub fn add_system_timestamp(&mut self, ts: Timestamp) {
        self.mapping.add_system_timestamp(ts);
    }

    /// Record an additional dependency name, after a predecessor
    /// transaction's global timestamp becomes known.
    pub fn record_dependency(&mut self, ts: &Timestamp) {
        self.dependency.record(ts);
    }

    /// True if the group carries neither updates nor a creation state.
    pub fn is_empty(&self) -> bool {
        return self.operations.is_empty() && self.creation_state.is_none();
    }

    /// Apply the group's effects to a value holding the given shard.
    ///
    /// Updates touching only missing particles are skipped: the value
    /// cannot represent their effect. Returns true when every update
    /// was fully covered by the shard; a false return means the group
    /// must be reapplied after the shard widens.
    pub fn apply_visible(&self, value: &mut C, shard: &Shard<C::Particle>) -> bool {
        if let Some(state) = &self.creation_state {
            // Creation states are initial values; folding one into a
            // default-initialized copy is a plain same-version merge.
            value.merge_same_version(state);
        }
        let mut fully_applied = true;
        for update in &self.operations {
            let affected = update.affected_particles();
            if shard.contains_any(&affected) {
                update.apply_to(value);
            }
            if !shard.contains_all(&affected) {
                fully_applied = false;
            }
        }
        return fully_applied;
    }
}

/// Type-erased view of an `ObjectUpdatesGroup`, for buffers and commit
/// requests that span CRDT types.
pub trait AnyGroup: Send {
    /// Identifier of the object the updates target.
    fn id(&self) -> &CrdtIdentifier;
    /// Base timestamp shared by every update in the group.
    fn base_timestamp(&self) -> &Timestamp;
    /// Timestamp mapping of the owning transaction.
    fn mapping(&self) -> &TimestampMapping;
    /// Causal dependencies of this group.
    fn dependency(&self) -> &CausalityClock;
    /// Number of updates in the group.
    fn op_count(&self) -> usize;
    /// True if this group creates the object.
    fn has_creation_state(&self) -> bool;
    /// Record a sequencer-assigned system timestamp into the mapping.
    fn add_system_timestamp(&mut self, ts: Timestamp);
    /// Record an additional dependency name, after a predecessor
    /// transaction's global timestamp becomes known.
    fn record_dependency(&mut self, ts: &Timestamp);
    /// A fresh, empty managed object of the group's concrete type.
    fn new_managed(&self) -> Box<dyn AnyManaged>;
    /// The group as `Any`, for downcasting to the typed form.
    fn as_any(&self) -> &dyn Any;
    /// The group as mutable `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Clone behind the trait object.
    fn clone_box(&self) -> Box<dyn AnyGroup>;
}

impl<C: Crdt> AnyGroup for ObjectUpdatesGroup<C> {
    fn id(&self) -> &CrdtIdentifier {
        return &self.id;
    }

    fn base_timestamp(&self) -> &Timestamp {
        return self.mapping.client_timestamp();
    }

    fn mapping(&self) -> &TimestampMapping {
        return &self.mapping;
    }

    fn dependency(&self) -> &CausalityClock {
        return &self.dependency;
    }

    fn op_count(&self) -> usize {
        return self.operations.len();
    }

    fn has_creation_state(&self) -> bool {
        return self.creation_state.is_some();
    }

    fn add_system_timestamp(&mut self, ts: Timestamp) {
        self.mapping.add_system_timestamp(ts);
    }

    fn record_dependency(&mut self, ts: &Timestamp) {
        self.dependency.record(ts);
    }

    fn new_managed(&self) -> Box<dyn AnyManaged> {
        return Box::new(ManagedObject::<C>::new(self.id.clone()));
    }

    fn as_any(&self) -> &dyn Any {
        return self;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        return self;
    }

    fn clone_box(&self) -> Box<dyn AnyGroup> {
        return Box::new(self.clone());
    }
}

impl Clone for Box<dyn AnyGroup> {
    fn clone(&self) -> Box<dyn AnyGroup> {
        return self.clone_box();
    }
}
