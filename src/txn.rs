// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Transaction handles: snapshot isolation over replicated objects.
//!
//! A transaction reads every object at one causal snapshot (the global
//! clock known at begin, extended with the client's own locally
//! committed predecessors, so a session always reads its own writes),
//! buffers updates per object, and commits in two phases: a fast local
//! commit that unblocks the caller, then a global commit when a
//! sequencer assigns a system timestamp. Commit listeners may fire from
//! a different execution context than the one that committed.
//!
//! Handles are small and cheap to share; the mutable state sits behind
//! a mutex. Mutating a handle outside the `Pending` state is a
//! programming error and panics; it is never an `Err`.
//!
//! Views hand out type-specific operation surfaces (`add`, `vote`, and
//! friends) as inherent impls on `TxnView<ConcreteType>`; the generic
//! entry points for custom types are [`TxnView::read`],
//! [`TxnView::register_with`], and [`TxnView::fetch`].

use std::any::Any;
use std::sync::Arc;
use std::sync::Mutex;

use log::debug;
use rustc_hash::FxHashMap;

use crate::clocks::CausalityClock;
use crate::clocks::Timestamp;
use crate::clocks::TimestampMapping;
use crate::clocks::TimestampSource;
use crate::clocks::TripleTimestamp;
use crate::crdt::Crdt;
use crate::crdt::CrdtIdentifier;
use crate::crdt::CrdtUpdate;
use crate::crdt::group::AnyGroup;
use crate::crdt::group::ObjectUpdatesGroup;
use crate::error::Error;
use crate::error::Result;
use crate::session::SessionInner;
use crate::shard::Shard;
use crate::shard::ShardQuery;

/// Lifecycle of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnStatus {
    /// Open: reads and updates are accepted.
    Pending,
    /// Accepted by the local coordinator, awaiting global sequencing.
    CommittedLocal,
    /// Assigned a system timestamp; terminal.
    CommittedGlobal,
    /// Rolled back; terminal.
    Cancelled,
}

impl TxnStatus {
    /// True for states no transition leaves.
    pub fn is_terminal(&self) -> bool {
        return matches!(self, TxnStatus::CommittedGlobal | TxnStatus::Cancelled);
    }
}

/// How a transaction picks the snapshot it reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    /// Refresh the session's known global clock from the store when
    /// the transaction begins. One round trip, freshest snapshot.
    MostRecent,
    /// Begin from whatever clock the session already knows. No round
    /// trip; the snapshot may lag the store.
    Cached,
}

/// Mutable transaction state, behind the handle's mutex.
pub(crate) struct TxnCore {
    pub(crate) mapping: TimestampMapping,
    /// Snapshot plus everything read so far; only grows.
    pub(crate) dependency: CausalityClock,
    /// The globally committed part of the snapshot, fixed at begin.
    pub(crate) snapshot_global: CausalityClock,
    /// Locally committed transactions this one can see, oldest first.
    /// Entries leave the list as their global timestamps become known.
    pub(crate) predecessors: Vec<Arc<TxnShared>>,
    /// Buffered update groups, one per touched object.
    pub(crate) groups: FxHashMap<CrdtIdentifier, Box<dyn AnyGroup>>,
    /// Cached views, one per object; values are `Arc<Mutex<ViewState>>`.
    pub(crate) views: FxHashMap<CrdtIdentifier, Box<dyn Any + Send>>,
    pub(crate) status: TxnStatus,
    pub(crate) source: TimestampSource,
    pub(crate) listener: Option<Box<dyn FnOnce(&Timestamp) + Send>>,
}

impl TxnCore {
    pub(crate) fn assert_status(&self, expected: TxnStatus) {
        assert!(
            self.status == expected,
            "unexpected transaction status: was {:?}, expected {:?}",
            self.status,
            expected,
        );
    }

    /// Drop a resolved predecessor and record its global name into the
    /// dependency edges. Predecessors resolve strictly in order.
    pub(crate) fn resolve_predecessor(
        &mut self,
        pred: &Arc<TxnShared>,
        system_ts: Option<&Timestamp>,
    ) {
        let Some(position) = self
            .predecessors
            .iter()
            .position(|p| Arc::ptr_eq(p, pred))
        else {
            return;
        };
        assert!(
            position == 0,
            "predecessor transactions must resolve in commit order"
        );
        self.predecessors.remove(0);
        // The predecessor is no longer folded in at read time, so the
        // read cut must keep covering it: the store now knows it under
        // both names, and materializations reconstruct from the store.
        self.snapshot_global.record(&pred.client_timestamp);
        if let Some(ts) = system_ts {
            self.snapshot_global.record(ts);
            self.dependency.record(ts);
            for group in self.groups.values_mut() {
                group.record_dependency(ts);
            }
        }
    }
}

/// State shared between a handle, its views, and the session.
pub struct TxnShared {
    /// The transaction's base timestamp. Immutable.
    pub(crate) client_timestamp: Timestamp,
    pub(crate) core: Mutex<TxnCore>,
}

impl TxnShared {
    /// Current lifecycle state.
    pub fn status(&self) -> TxnStatus {
        return self.core.lock().unwrap().status;
    }
}

/// Client-side unit of interaction with the store.
///
/// Created by [`crate::session::Session::begin`]; destroyed by commit
/// or rollback. Cloning shares the underlying transaction.
#[derive(Clone)]
pub struct TxnHandle {
    pub(crate) shared: Arc<TxnShared>,
    pub(crate) session: Arc<SessionInner>,
}

/// One object's state as seen by a transaction.
pub(crate) struct ViewState<C: Crdt> {
    pub(crate) crdt: C,
    /// The causal cut this view reflects, including locally committed
    /// predecessors folded into it.
    pub(crate) clock: CausalityClock,
    /// The store-reconstructible part of `clock`: the cut the state
    /// was fetched at. Fetches for missing particles go to this cut;
    /// local effects are folded into the fragment afterwards.
    pub(crate) base_clock: CausalityClock,
    /// Which particles the view materializes.
    pub(crate) shard: Shard<C::Particle>,
    /// Complex queries already satisfied, for subsumption checks.
    pub(crate) queries: Vec<ShardQuery<C::Particle>>,
    /// Own updates whose affected particles were not fully covered by
    /// the shard when registered; re-applied as the shard widens.
    pub(crate) parked: Vec<C::Update>,
}

/// A typed local view of one object at the transaction's snapshot.
///
/// Cheap to clone; clones alias the same view.
pub struct TxnView<C: Crdt> {
    pub(crate) id: CrdtIdentifier,
    pub(crate) txn: Arc<TxnShared>,
    pub(crate) session: Arc<SessionInner>,
    pub(crate) state: Arc<Mutex<ViewState<C>>>,
}

impl<C: Crdt> Clone for TxnView<C> {
    fn clone(&self) -> TxnView<C> {
        return TxnView {
            id: self.id.clone(),
            txn: self.txn.clone(),
            session: self.session.clone(),
            state: self.state.clone(),
        };
    }
}

impl TxnHandle {
    /// The transaction's base timestamp.
    pub fn client_timestamp(&self) -> &Timestamp {
        return &self.shared.client_timestamp;
    }

    /// Current lifecycle state.
    pub fn status(&self) -> TxnStatus {
        return self.shared.status();
    }

    /// A typed view of an object at this transaction's snapshot.
    ///
    /// The first call per object materializes the view (fetching from
    /// the store if needed); later calls return the same cached view.
    /// With `create`, a missing object is created locally and its
    /// creation ships with the commit.
    pub fn get<C: Crdt>(&self, id: &CrdtIdentifier, create: bool) -> Result<TxnView<C>> {
        return self.get_with(id, create, &ShardQuery::Full);
    }

    /// Like [`TxnHandle::get`] but materializes no state up front.
    ///
    /// The view starts hollow; reads and updates pull in the particles
    /// they touch. Useful for blind updates to large objects.
    pub fn get_lazy<C: Crdt>(&self, id: &CrdtIdentifier, create: bool) -> Result<TxnView<C>> {
        return self.get_with(id, create, &ShardQuery::Hollow);
    }

    /// Views over several objects of one type, keyed by identifier.
    pub fn bulk_get<C: Crdt>(
        &self,
        ids: impl IntoIterator<Item = CrdtIdentifier>,
    ) -> Result<FxHashMap<CrdtIdentifier, TxnView<C>>> {
        let mut views = FxHashMap::default();
        for id in ids {
            let view = self.get::<C>(&id, false)?;
            views.insert(id, view);
        }
        return Ok(views);
    }

    fn get_with<C: Crdt>(
        &self,
        id: &CrdtIdentifier,
        create: bool,
        query: &ShardQuery<C::Particle>,
    ) -> Result<TxnView<C>> {
        loop {
            let min_version = {
                let core = self.shared.core.lock().unwrap();
                core.assert_status(TxnStatus::Pending);
                if let Some(view) =
                    Self::cached_view::<C>(&core, id, &self.shared, &self.session)?
                {
                    return Ok(view);
                }
                core.snapshot_global.clone()
            };

            // Materialize outside the lock: the fetch may block on the
            // network.
            let fetched = match self.session.fetch_version::<C>(id, &min_version, query) {
                Ok(version) => Some(version),
                Err(Error::NoSuchObject(_)) => None,
                Err(error) => return Err(error),
            };

            let mut core = self.shared.core.lock().unwrap();
            core.assert_status(TxnStatus::Pending);
            // Another thread may have materialized the view meanwhile.
            if let Some(view) = Self::cached_view::<C>(&core, id, &self.shared, &self.session)? {
                return Ok(view);
            }
            // A predecessor may have resolved mid-fetch, widening the
            // read cut past what was fetched; go around and refetch at
            // the wider cut.
            if !min_version.includes_all_of(&core.snapshot_global) {
                continue;
            }

            let (crdt, clock, shard, created_locally) = match fetched {
                Some(version) => (version.state, version.clock, version.shard, false),
                None => {
                    // The store has never seen the object, but this
                    // session may have created it in a transaction that
                    // is still waiting for its global commit.
                    let buffered = Self::buffered_creation(&core, id)
                        || core.predecessors.iter().any(|pred| {
                            Self::buffered_creation(&pred.core.lock().unwrap(), id)
                        });
                    if !buffered && !create {
                        return Err(Error::NoSuchObject(id.clone()));
                    }
                    (C::default(), min_version.clone(), Shard::Full, !buffered)
                }
            };

            let mut state = ViewState {
                crdt,
                base_clock: clock.clone(),
                clock,
                shard,
                queries: Vec::new(),
                parked: Vec::new(),
            };

            // Read-your-writes: fold in the locally committed
            // predecessors and anything this transaction already
            // buffered for the id.
            let predecessors = core.predecessors.clone();
            for pred in &predecessors {
                let pred_core = pred.core.lock().unwrap();
                Self::apply_buffered::<C>(&pred_core.groups, id, &mut state)?;
            }
            Self::apply_buffered::<C>(&core.groups, id, &mut state)?;

            core.dependency.merge(&state.clock);

            if created_locally && !core.groups.contains_key(id) {
                // The creation payload travels with the commit.
                let group = ObjectUpdatesGroup::<C>::new(
                    id.clone(),
                    core.mapping.clone(),
                    Some(C::default()),
                    core.dependency.clone(),
                );
                core.groups.insert(id.clone(), Box::new(group));
            }

            let state = Arc::new(Mutex::new(state));
            core.views.insert(id.clone(), Box::new(state.clone()));
            return Ok(TxnView {
                id: id.clone(),
                txn: self.shared.clone(),
                session: self.session.clone(),
                state,
            });
        }
    }

    fn buffered_creation(core: &TxnCore, id: &CrdtIdentifier) -> bool {
        return core
            .groups
            .get(id)
            .map(|group| group.has_creation_state())
            .unwrap_or(false);
    }

    fn cached_view<C: Crdt>(
        core: &TxnCore,
        id: &CrdtIdentifier,
        shared: &Arc<TxnShared>,
        session: &Arc<SessionInner>,
    ) -> Result<Option<TxnView<C>>> {
        let Some(entry) = core.views.get(id) else {
            return Ok(None);
        };
        let state = entry
            .downcast_ref::<Arc<Mutex<ViewState<C>>>>()
            .ok_or_else(|| {
                Error::wrong_type(id, "view was materialized with a different CRDT type")
            })?
            .clone();
        return Ok(Some(TxnView {
            id: id.clone(),
            txn: shared.clone(),
            session: session.clone(),
            state,
        }));
    }

    fn apply_buffered<C: Crdt>(
        groups: &FxHashMap<CrdtIdentifier, Box<dyn AnyGroup>>,
        id: &CrdtIdentifier,
        state: &mut ViewState<C>,
    ) -> Result<()> {
        let recorded = apply_groups_to(groups, id, &mut state.crdt, &state.shard)?;
        for ts in recorded {
            state.clock.record(&ts);
        }
        return Ok(());
    }

    /// Commit, blocking until the global commit completes.
    ///
    /// On a transient network failure the transaction stays locally
    /// committed and the error is returned; retry with
    /// [`crate::session::Session::flush_commits`].
    pub fn commit(&self) -> Result<()> {
        self.commit_async(|_| {});
        return self.session.flush(false);
    }

    /// Commit locally and return; `listener` fires on global commit
    /// with the assigned timestamp, possibly from another execution
    /// context. Prefer this form to keep wide-area latency off the
    /// caller.
    pub fn commit_async<F>(&self, listener: F)
    where
        F: FnOnce(&Timestamp) + Send + 'static,
    {
        {
            let mut core = self.shared.core.lock().unwrap();
            core.assert_status(TxnStatus::Pending);
            core.listener = Some(Box::new(listener));
            core.status = TxnStatus::CommittedLocal;
        }
        debug!("{}: committed locally", self.shared.client_timestamp);
        self.session.enqueue_local(&self.shared);
        if let Err(error) = self.session.flush(true) {
            // Left queued; a later flush retries.
            log::warn!(
                "{}: global commit deferred: {}",
                self.shared.client_timestamp,
                error
            );
        }
    }

    /// Discard the transaction and everything it buffered. Legal only
    /// while `Pending`; other transactions are unaffected.
    pub fn rollback(&self) {
        {
            let mut core = self.shared.core.lock().unwrap();
            core.assert_status(TxnStatus::Pending);
            core.status = TxnStatus::Cancelled;
            core.groups.clear();
            core.views.clear();
            core.listener = None;
        }
        debug!("{}: rolled back", self.shared.client_timestamp);
        self.session.forget(&self.shared);
    }
}

impl<C: Crdt> TxnView<C> {
    /// Identifier of the object this view reflects.
    pub fn id(&self) -> &CrdtIdentifier {
        return &self.id;
    }

    /// Application-visible value of the materialized fraction.
    pub fn value(&self) -> C::Value {
        return self.state.lock().unwrap().crdt.value();
    }

    /// Which particles the view materializes.
    pub fn shard(&self) -> Shard<C::Particle> {
        return self.state.lock().unwrap().shard.clone();
    }

    /// The causal cut the view reflects.
    pub fn clock(&self) -> CausalityClock {
        return self.state.lock().unwrap().clock.clone();
    }

    /// Read through the typed state. The extension point for
    /// type-specific read surfaces.
    pub fn read<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        return f(&self.state.lock().unwrap().crdt);
    }

    /// Complete the local state so `query` can be answered, fetching
    /// missing particles from the store if necessary. A no-op when the
    /// shard already covers the query or an earlier query subsumes it.
    pub fn fetch(&self, query: &ShardQuery<C::Particle>) -> Result<()> {
        loop {
            let at = {
                let state = self.state.lock().unwrap();
                if query.is_available_in(&state.shard) {
                    return Ok(());
                }
                if state.queries.iter().any(|q| query.is_subquery_of(q)) {
                    return Ok(());
                }
                state.base_clock.clone()
            };
            // Fetch at a cut that also covers predecessors already
            // resolved out of the fold-in list: the store knows those,
            // the view was materialized before they were sequenced.
            let at = {
                let core = self.txn.core.lock().unwrap();
                core.assert_status(TxnStatus::Pending);
                let mut at = at;
                at.merge(&core.snapshot_global);
                at
            };

            let version = self.session.fetch_version::<C>(&self.id, &at, query)?;

            // The fragment is at the store cut; fold the local effects
            // (predecessors, own buffered updates) into it before the
            // same-version merge so new particles carry them too.
            let mut fragment = version.state;
            let mut recorded = Vec::new();
            {
                let core = self.txn.core.lock().unwrap();
                // A predecessor resolved mid-fetch; refetch at the
                // wider cut so the fragment includes it.
                if !at.includes_all_of(&core.snapshot_global) {
                    continue;
                }
                let predecessors = core.predecessors.clone();
                for pred in &predecessors {
                    let pred_core = pred.core.lock().unwrap();
                    recorded.extend(apply_groups_to(
                        &pred_core.groups,
                        &self.id,
                        &mut fragment,
                        &version.shard,
                    )?);
                }
                recorded.extend(apply_groups_to(
                    &core.groups,
                    &self.id,
                    &mut fragment,
                    &version.shard,
                )?);
            }

            let mut state = self.state.lock().unwrap();
            state.crdt.merge_same_version(&fragment);
            let shard = std::mem::replace(&mut state.shard, Shard::hollow());
            state.shard = shard.union(version.shard);
            state.base_clock.merge(&version.clock);
            state.clock.merge(&version.clock);
            for ts in recorded {
                state.clock.record(&ts);
            }
            if !query.is_state_independent() && !query.is_available_in(&state.shard) {
                // Remember complex queries the shard cannot express.
                state.queries.push(query.clone());
            }

            // Parked updates covered by the widened shard were folded
            // in through the buffered group above; stop tracking them.
            let shard = state.shard.clone();
            state
                .parked
                .retain(|update| !shard.contains_all(&update.affected_particles()));
            return Ok(());
        }
    }

    /// Issue one update: `prepare` builds it against the current state
    /// and a fresh update timestamp, without mutating; the update is
    /// then applied to this view and buffered for commit. Returning
    /// `None` from `prepare` issues nothing. The extension point for
    /// type-specific write surfaces.
    pub fn register_with(
        &self,
        prepare: impl FnOnce(&C, TripleTimestamp) -> Option<C::Update>,
    ) -> Result<()> {
        let mut core = self.txn.core.lock().unwrap();
        core.assert_status(TxnStatus::Pending);
        let ts = core.source.generate();

        let mut state = self.state.lock().unwrap();
        let Some(update) = prepare(&state.crdt, ts) else {
            return Ok(());
        };

        // Dependency clock of the group is fixed at the first touch of
        // the object within this transaction.
        let mapping = core.mapping.clone();
        let dependency = core.dependency.clone();
        let group = core.groups.entry(self.id.clone()).or_insert_with(|| {
            Box::new(ObjectUpdatesGroup::<C>::new(
                self.id.clone(),
                mapping,
                None,
                dependency,
            ))
        });
        let typed = group
            .as_any_mut()
            .downcast_mut::<ObjectUpdatesGroup<C>>()
            .ok_or_else(|| {
                Error::wrong_type(&self.id, "buffered updates use a different CRDT type")
            })?;
        typed.append(update.clone());

        // Read-your-writes on this view; park what the shard cannot
        // yet represent.
        let affected = update.affected_particles();
        if state.shard.contains_any(&affected) {
            update.apply_to(&mut state.crdt);
        }
        if !state.shard.contains_all(&affected) {
            state.parked.push(update);
        }
        return Ok(());
    }
}

/// Apply the buffered group for `id`, if any, to a value holding the
/// given shard. Returns the timestamps under which the group commits.
fn apply_groups_to<C: Crdt>(
    groups: &FxHashMap<CrdtIdentifier, Box<dyn AnyGroup>>,
    id: &CrdtIdentifier,
    crdt: &mut C,
    shard: &Shard<C::Particle>,
) -> Result<Vec<Timestamp>> {
    let Some(group) = groups.get(id) else {
        return Ok(Vec::new());
    };
    let typed = group
        .as_any()
        .downcast_ref::<ObjectUpdatesGroup<C>>()
        .ok_or_else(|| Error::wrong_type(id, "buffered updates use a different CRDT type"))?;
    typed.apply_visible(crdt, shard);
    return Ok(typed.mapping().timestamps().cloned().collect());
}
