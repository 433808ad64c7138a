// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Client sessions: the runtime a transaction handle runs inside.
//!
//! A session owns the connection to a store, issues client timestamps,
//! tracks the global clock it knows about, and drives the second phase
//! of commit: locally committed transactions queue up in order and are
//! handed to the sequencer one at a time. A transaction only reaches
//! the sequencer once every predecessor it depends on has its system
//! timestamp, which the queue order guarantees; as each predecessor
//! resolves, its dependents' dependency edges are rewritten to include
//! the newly assigned global name.
//!
//! Transient commit failures leave the transaction locally committed
//! and queued; `flush_commits` retries. Nothing in the session retries
//! by itself.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use log::debug;
use rustc_hash::FxHashMap;

use crate::clocks::CausalityClock;
use crate::clocks::SiteId;
use crate::clocks::Timestamp;
use crate::clocks::TimestampMapping;
use crate::clocks::TimestampSource;
use crate::crdt::Crdt;
use crate::crdt::CrdtIdentifier;
use crate::error::Error;
use crate::error::Result;
use crate::managed::VersionedState;
use crate::shard::ShardQuery;
use crate::store::CommitRequest;
use crate::store::FetchRequest;
use crate::store::ObjectStore;
use crate::txn::CachePolicy;
use crate::txn::TxnCore;
use crate::txn::TxnHandle;
use crate::txn::TxnShared;
use crate::txn::TxnStatus;

/// A client session: issues transactions against one store.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    site: SiteId,
    store: Arc<dyn ObjectStore>,
    state: Mutex<SessionState>,
    /// Serializes the commit drain so global commits stay in order.
    drain: Mutex<()>,
}

struct SessionState {
    next_counter: u64,
    /// The globally committed cut this session knows about.
    committed: CausalityClock,
    /// Locally committed transactions awaiting global commit, oldest
    /// first.
    pending: VecDeque<Arc<TxnShared>>,
    /// Every live transaction, for dependency rewrites.
    active: Vec<Weak<TxnShared>>,
}

impl Session {
    /// Open a session against a store, learning its latest clock.
    pub fn new(site: SiteId, store: Arc<dyn ObjectStore>) -> Result<Session> {
        let committed = store.latest_known_clock(&site)?;
        return Ok(Session {
            inner: Arc::new(SessionInner {
                site,
                store,
                state: Mutex::new(SessionState {
                    next_counter: 0,
                    committed,
                    pending: VecDeque::new(),
                    active: Vec::new(),
                }),
                drain: Mutex::new(()),
            }),
        });
    }

    /// The site this session commits under.
    pub fn site(&self) -> &SiteId {
        return &self.inner.site;
    }

    /// The globally committed cut this session knows about.
    pub fn committed_clock(&self) -> CausalityClock {
        return self.inner.state.lock().unwrap().committed.clone();
    }

    /// Begin a transaction at the freshest snapshot the store knows.
    pub fn begin(&self) -> Result<TxnHandle> {
        return self.begin_with(CachePolicy::MostRecent);
    }

    /// Begin a transaction under the given snapshot policy.
    pub fn begin_with(&self, policy: CachePolicy) -> Result<TxnHandle> {
        if policy == CachePolicy::MostRecent {
            let latest = self.inner.store.latest_known_clock(&self.inner.site)?;
            self.inner.state.lock().unwrap().committed.merge(&latest);
        }

        let (client_timestamp, snapshot_global, predecessors) = {
            let mut state = self.inner.state.lock().unwrap();
            state.next_counter += 1;
            let ts = Timestamp::new(self.inner.site.clone(), state.next_counter);
            let predecessors: Vec<Arc<TxnShared>> = state.pending.iter().cloned().collect();
            (ts, state.committed.clone(), predecessors)
        };

        // Read-only transactions in the queue impose no dependency:
        // the store never learns their timestamps. Locally committed
        // groups are frozen, so the check is stable.
        let predecessors: Vec<Arc<TxnShared>> = predecessors
            .into_iter()
            .filter(|pred| {
                let core = pred.core.lock().unwrap();
                core.groups
                    .values()
                    .any(|group| group.op_count() > 0 || group.has_creation_state())
            })
            .collect();

        // The snapshot covers the known global cut plus every locally
        // committed transaction of this session, for session
        // guarantees: later transactions read earlier writes.
        let mut dependency = snapshot_global.clone();
        for pred in &predecessors {
            dependency.record(&pred.client_timestamp);
        }

        let shared = Arc::new(TxnShared {
            client_timestamp: client_timestamp.clone(),
            core: Mutex::new(TxnCore {
                mapping: TimestampMapping::new(client_timestamp.clone()),
                dependency,
                snapshot_global,
                predecessors: predecessors.clone(),
                groups: FxHashMap::default(),
                views: FxHashMap::default(),
                status: TxnStatus::Pending,
                source: TimestampSource::new(client_timestamp.clone()),
                listener: None,
            }),
        });

        {
            let mut state = self.inner.state.lock().unwrap();
            state.active.retain(|weak| weak.strong_count() > 0);
            state.active.push(Arc::downgrade(&shared));
        }

        // A predecessor may have committed globally between the
        // snapshot and our registration; resolve those right away.
        for pred in &predecessors {
            let resolved = {
                let pred_core = pred.core.lock().unwrap();
                match pred_core.status {
                    TxnStatus::CommittedGlobal => {
                        Some(pred_core.mapping.system_timestamps().first().cloned())
                    }
                    _ => None,
                }
            };
            if let Some(system_ts) = resolved {
                shared
                    .core
                    .lock()
                    .unwrap()
                    .resolve_predecessor(pred, system_ts.as_ref());
            }
        }

        debug!("{}: began transaction", client_timestamp);
        return Ok(TxnHandle {
            shared,
            session: self.inner.clone(),
        });
    }

    /// Drive every queued local commit through global sequencing.
    ///
    /// Stops at the first failure, leaving that transaction and its
    /// successors queued; call again to retry after a transient error.
    pub fn flush_commits(&self) -> Result<()> {
        return self.inner.flush(false);
    }

    /// Number of locally committed transactions awaiting global
    /// commit.
    pub fn pending_commits(&self) -> usize {
        return self.inner.state.lock().unwrap().pending.len();
    }
}

impl SessionInner {
    /// Fetch a typed version of an object from the store.
    pub(crate) fn fetch_version<C: Crdt>(
        &self,
        id: &CrdtIdentifier,
        min_version: &CausalityClock,
        query: &ShardQuery<C::Particle>,
    ) -> Result<VersionedState<C>> {
        let reply = self.store.fetch_object_version(FetchRequest {
            id: id.clone(),
            min_version: min_version.clone(),
            query: Box::new(query.clone()),
            subscribe: false,
        })?;
        let version = reply
            .version
            .into_any()
            .downcast::<VersionedState<C>>()
            .map_err(|_| {
                Error::wrong_type(id, "stored object has a different CRDT type")
            })?;
        return Ok(*version);
    }

    /// Queue a locally committed transaction for global sequencing.
    pub(crate) fn enqueue_local(&self, txn: &Arc<TxnShared>) {
        let mut state = self.state.lock().unwrap();
        state.pending.push_back(txn.clone());
    }

    /// Drop a rolled-back transaction from the active list.
    pub(crate) fn forget(&self, txn: &Arc<TxnShared>) {
        let mut state = self.state.lock().unwrap();
        state
            .active
            .retain(|weak| weak.upgrade().map(|t| !Arc::ptr_eq(&t, txn)).unwrap_or(false));
    }

    /// Drain the local-commit queue in order.
    ///
    /// With `best_effort`, a transient failure leaves the queue as is
    /// and reports success; structural failures always surface.
    pub(crate) fn flush(&self, best_effort: bool) -> Result<()> {
        let _serialized = self.drain.lock().unwrap();
        loop {
            let Some(head) = self.state.lock().unwrap().pending.front().cloned() else {
                return Ok(());
            };

            // Build the commit request. By queue order, every
            // predecessor of the head has already resolved.
            let (groups, read_only) = {
                let core = head.core.lock().unwrap();
                core.assert_status(TxnStatus::CommittedLocal);
                assert!(
                    core.predecessors.is_empty(),
                    "head of the commit queue still has unresolved predecessors"
                );
                let groups: Vec<_> = core
                    .groups
                    .values()
                    .filter(|g| g.op_count() > 0 || g.has_creation_state())
                    .cloned()
                    .collect();
                let read_only = groups.is_empty();
                (groups, read_only)
            };

            let system_ts = if read_only {
                // Nothing to sequence; the transaction is trivially
                // globally committed.
                None
            } else {
                let request = CommitRequest {
                    base_timestamp: head.client_timestamp.clone(),
                    groups,
                };
                match self.store.commit_updates(request) {
                    Ok(reply) => {
                        let mut state = self.state.lock().unwrap();
                        state.committed.merge(&reply.committed);
                        Some(reply.system_timestamp)
                    }
                    Err(error) if best_effort && error.is_transient() => {
                        debug!(
                            "{}: commit deferred on transient failure: {}",
                            head.client_timestamp, error
                        );
                        return Ok(());
                    }
                    Err(error) => return Err(error),
                }
            };

            // Transition to globally committed and detach the
            // listener.
            let listener = {
                let mut core = head.core.lock().unwrap();
                if let Some(ts) = &system_ts {
                    core.mapping.add_system_timestamp(ts.clone());
                    for group in core.groups.values_mut() {
                        group.add_system_timestamp(ts.clone());
                    }
                }
                core.status = TxnStatus::CommittedGlobal;
                core.listener.take()
            };

            let dependents = {
                let mut state = self.state.lock().unwrap();
                state.pending.pop_front();
                if let Some(ts) = &system_ts {
                    // The store now knows the transaction under both
                    // names; a read-only transaction under neither.
                    state.committed.record(&head.client_timestamp);
                    state.committed.record(ts);
                }
                state
                    .active
                    .iter()
                    .filter_map(Weak::upgrade)
                    .collect::<Vec<_>>()
            };

            // Rewrite dependency edges from the client timestamp to
            // the global one, each under the dependent's own lock.
            for dependent in dependents {
                if Arc::ptr_eq(&dependent, &head) {
                    continue;
                }
                let mut core = dependent.core.lock().unwrap();
                if !core.status.is_terminal() {
                    core.resolve_predecessor(&head, system_ts.as_ref());
                }
            }

            debug!(
                "{}: committed globally as {:?}",
                head.client_timestamp, system_ts
            );
            if let Some(listener) = listener {
                let name = system_ts
                    .clone()
                    .unwrap_or_else(|| head.client_timestamp.clone());
                listener(&name);
            }
        }
    }
}
