// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Managed objects: the durable per-object operation log.
//!
//! A managed object owns the authoritative history of one replicated
//! object: a checkpoint value plus the ordered update groups applied
//! since. Any causally valid snapshot at or above the prune point can
//! be reconstructed by replaying the groups included in the requested
//! cut over the checkpoint; order among concurrent groups is irrelevant
//! because concurrent updates commute.
//!
//! Convergence under concurrent delivery needs no coordination:
//! duplicate delivery is suppressed by a clock-inclusion check before
//! any group is admitted, and everything else commutes. Each call is
//! atomic over a single object; there is no cross-object locking.
//!
//! Pruning folds groups below a pruning point into the checkpoint,
//! bounding log growth. The checkpoint itself is the summarizing
//! baseline, so reconstruction of any version at or above the prune
//! point keeps working; versions below it are gone for good.

use std::any::Any;

use log::debug;
use log::trace;
use serde::Deserialize;
use serde::Serialize;

use crate::clocks::CausalityClock;
use crate::crdt::Crdt;
use crate::crdt::CrdtIdentifier;
use crate::crdt::group::AnyGroup;
use crate::crdt::group::ObjectUpdatesGroup;
use crate::error::Error;
use crate::error::Result;
use crate::shard::Shard;
use crate::shard::ShardQuery;
use crate::shard::query::AnyQuery;

/// How `execute` treats a group's declared dependencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependencyPolicy {
    /// Verify the group's dependency clock is already included in the
    /// object's history; reject the group otherwise. Use when groups
    /// arrive directly from another replica of this object and the
    /// dependency clock speaks about this object's own causal chain.
    Check,
    /// Trust the caller to have verified dependencies against a wider
    /// clock (a store-level committed clock, say) before delivery.
    Trust,
}

/// A reconstructed version of an object, as shipped to a replica.
#[derive(Clone, Debug)]
pub struct VersionedState<C: Crdt> {
    /// The value, restricted to `shard`.
    pub state: C,
    /// The causal cut this version reflects.
    pub clock: CausalityClock,
    /// The point below which the source can no longer separate history.
    pub prune_clock: CausalityClock,
    /// Which particles `state` materializes.
    pub shard: Shard<C::Particle>,
}

/// Type-erased versioned state, for the store interface.
pub trait AnyVersion: Send {
    /// The causal cut this version reflects.
    fn clock(&self) -> &CausalityClock;
    /// The version as `Any`, for downcasting by reference.
    fn as_any(&self) -> &dyn Any;
    /// The version as owned `Any`, for downcasting by value.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<C: Crdt> AnyVersion for VersionedState<C> {
    fn clock(&self) -> &CausalityClock {
        return &self.clock;
    }

    fn as_any(&self) -> &dyn Any {
        return self;
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        return self;
    }
}

/// Server-side durable structure owning one object's history.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: Serialize, C::Update: Serialize, C::Particle: Serialize",
    deserialize = "C: serde::de::DeserializeOwned, C::Update: serde::de::DeserializeOwned, \
                   C::Particle: serde::de::DeserializeOwned"
))]
pub struct ManagedObject<C: Crdt> {
    id: CrdtIdentifier,
    /// Folded value of every group at or below the prune point.
    checkpoint: C,
    /// Cut below which individual group history is no longer separable.
    prune_clock: CausalityClock,
    /// Groups applied since the checkpoint, in delivery order.
    log: Vec<ObjectUpdatesGroup<C>>,
    /// Union of all applied group timestamps. Never shrinks.
    clock: CausalityClock,
    /// Which particles this copy materializes.
    shard: Shard<C::Particle>,
    /// True once a group carrying a creation payload was applied.
    created: bool,
}

impl<C: Crdt> ManagedObject<C> {
    /// A fresh, uncreated object with an empty history.
    pub fn new(id: CrdtIdentifier) -> ManagedObject<C> {
        return ManagedObject {
            id,
            checkpoint: C::default(),
            prune_clock: CausalityClock::new(),
            log: Vec::new(),
            clock: CausalityClock::new(),
            shard: Shard::Full,
            created: false,
        };
    }

    /// Identifier of the object.
    pub fn id(&self) -> &CrdtIdentifier {
        return &self.id;
    }

    /// Union of all applied group timestamps.
    pub fn clock(&self) -> &CausalityClock {
        return &self.clock;
    }

    /// Cut below which history has been folded into the checkpoint.
    pub fn prune_clock(&self) -> &CausalityClock {
        return &self.prune_clock;
    }

    /// Which particles this copy materializes.
    pub fn shard(&self) -> &Shard<C::Particle> {
        return &self.shard;
    }

    /// True once a creation payload has been applied.
    pub fn is_created(&self) -> bool {
        return self.created;
    }

    /// Number of groups still individually separable in the log.
    pub fn log_len(&self) -> usize {
        return self.log.len();
    }

    /// The groups still individually separable, in delivery order.
    /// This is what ships when another replica catches up from us.
    pub fn groups(&self) -> &[ObjectUpdatesGroup<C>] {
        return &self.log;
    }

    /// Fold one update group into the object's history.
    ///
    /// Returns `Ok(false)` when the group was already included under
    /// any of its timestamps (duplicate delivery is a no-op). With
    /// `DependencyPolicy::Check`, a group whose dependency clock is not
    /// yet included is rejected: the caller must deliver the missing
    /// causal predecessors first, no gaps are tolerated.
    pub fn execute(
        &mut self,
        group: ObjectUpdatesGroup<C>,
        policy: DependencyPolicy,
    ) -> Result<bool> {
        if group.mapping().any_included_in(&self.clock) {
            trace!("{}: duplicate group {}, skipped", self.id, group.mapping());
            return Ok(false);
        }
        if policy == DependencyPolicy::Check && !self.clock.includes_all_of(group.dependency()) {
            return Err(Error::version_not_found(
                &self.id,
                format!(
                    "group {} depends on {} which is not yet included in {}",
                    group.mapping(),
                    group.dependency(),
                    self.clock
                ),
            ));
        }
        if group.has_creation_state() && !self.created {
            self.created = true;
        }
        group.mapping().record_into(&mut self.clock);
        debug!(
            "{}: applied group {} ({} updates), clock now {}",
            self.id,
            group.mapping(),
            group.op_count(),
            self.clock
        );
        self.log.push(group);
        return Ok(true);
    }

    /// Record additional names (system timestamps) for a group already
    /// in the log, identified by its base timestamp.
    pub fn merge_group_mapping(&mut self, mapping: &crate::clocks::TimestampMapping) {
        for group in &mut self.log {
            if group.base_timestamp() == mapping.client_timestamp() {
                for ts in mapping.system_timestamps() {
                    group.add_system_timestamp(ts.clone());
                    self.clock.record(ts);
                }
            }
        }
    }

    /// Reconstruct the value visible at the causal cut `clock`.
    ///
    /// Starts from the checkpoint and replays every logged group with
    /// a timestamp included in the cut. Fails when the cut does not
    /// cover the prune point: that history is no longer separable.
    pub fn get_version(&self, clock: &CausalityClock) -> Result<C> {
        if !clock.includes_all_of(&self.prune_clock) {
            return Err(Error::version_not_found(
                &self.id,
                format!(
                    "requested cut {} is below the prune point {}",
                    clock, self.prune_clock
                ),
            ));
        }
        let mut value = self.checkpoint.clone();
        for group in &self.log {
            if group.mapping().any_included_in(clock) {
                group.apply_visible(&mut value, &self.shard);
            }
        }
        return Ok(value);
    }

    /// The value at the object's own clock. Always reconstructible.
    pub fn latest(&self) -> C {
        let mut value = self.checkpoint.clone();
        for group in &self.log {
            group.apply_visible(&mut value, &self.shard);
        }
        return value;
    }

    /// A versioned, query-restricted copy of the value at `cut`, ready
    /// to ship to a replica.
    pub fn version_for(
        &self,
        cut: &CausalityClock,
        query: &ShardQuery<C::Particle>,
    ) -> Result<VersionedState<C>> {
        let full = self.get_version(cut)?;
        return Ok(VersionedState {
            state: query.execute_at(&full),
            clock: cut.clone(),
            prune_clock: self.prune_clock.clone(),
            shard: query.result_shard(),
        });
    }

    /// Fold every group included in `point` into the checkpoint and
    /// drop it from the log. Versions at or above `point` remain
    /// reconstructible; versions below it are gone.
    pub fn prune(&mut self, point: &CausalityClock) {
        let mut kept = Vec::with_capacity(self.log.len());
        let mut folded = 0usize;
        for group in self.log.drain(..) {
            if group.mapping().any_included_in(point) {
                group.apply_visible(&mut self.checkpoint, &self.shard);
                folded += 1;
            } else {
                kept.push(group);
            }
        }
        self.log = kept;
        self.prune_clock.merge(point);
        debug!(
            "{}: pruned {} groups, {} separable, prune point {}",
            self.id,
            folded,
            self.log.len(),
            self.prune_clock
        );
    }

    /// A copy restricted to the given query, for shipping to a replica
    /// that wants only a fraction of the state. The caller must have
    /// checked the query is available in this copy's shard.
    pub fn apply_shard_query(&self, query: &ShardQuery<C::Particle>) -> ManagedObject<C> {
        return ManagedObject {
            id: self.id.clone(),
            checkpoint: query.execute_at(&self.checkpoint),
            prune_clock: self.prune_clock.clone(),
            log: self.log.clone(),
            clock: self.clock.clone(),
            shard: query.result_shard(),
            created: self.created,
        };
    }
}

/// Type-erased managed object, so a store can hold objects of mixed
/// CRDT types. Type mismatches surface as `WrongType`.
pub trait AnyManaged: Send {
    /// Identifier of the object.
    fn id(&self) -> &CrdtIdentifier;
    /// Union of all applied group timestamps.
    fn clock(&self) -> &CausalityClock;
    /// Cut below which history has been folded away.
    fn prune_clock(&self) -> &CausalityClock;
    /// True once a creation payload has been applied.
    fn is_created(&self) -> bool;
    /// See [`ManagedObject::execute`].
    fn execute_any(&mut self, group: &dyn AnyGroup, policy: DependencyPolicy) -> Result<bool>;
    /// See [`ManagedObject::version_for`].
    fn version_any(
        &self,
        cut: &CausalityClock,
        query: &dyn AnyQuery,
    ) -> Result<Box<dyn AnyVersion>>;
    /// See [`ManagedObject::prune`].
    fn prune_any(&mut self, point: &CausalityClock);
    /// The object as `Any`, for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<C: Crdt> AnyManaged for ManagedObject<C> {
    fn id(&self) -> &CrdtIdentifier {
        return &self.id;
    }

    fn clock(&self) -> &CausalityClock {
        return &self.clock;
    }

    fn prune_clock(&self) -> &CausalityClock {
        return &self.prune_clock;
    }

    fn is_created(&self) -> bool {
        return self.created;
    }

    fn execute_any(&mut self, group: &dyn AnyGroup, policy: DependencyPolicy) -> Result<bool> {
        let typed = group
            .as_any()
            .downcast_ref::<ObjectUpdatesGroup<C>>()
            .ok_or_else(|| {
                Error::wrong_type(&self.id, "update group type differs from the stored type")
            })?;
        return self.execute(typed.clone(), policy);
    }

    fn version_any(
        &self,
        cut: &CausalityClock,
        query: &dyn AnyQuery,
    ) -> Result<Box<dyn AnyVersion>> {
        let typed = query
            .as_any()
            .downcast_ref::<ShardQuery<C::Particle>>()
            .ok_or_else(|| {
                Error::wrong_type(&self.id, "shard query type differs from the stored type")
            })?;
        return Ok(Box::new(self.version_for(cut, typed)?));
    }

    fn prune_any(&mut self, point: &CausalityClock) {
        self.prune(point);
    }

    fn as_any(&self) -> &dyn Any {
        return self;
    }
}
