// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! In-memory object store with a built-in sequencer.
//!
//! Objects live behind one lock each; commits touch only the objects
//! they update, so unrelated objects never contend. The store-wide
//! state (the committed cut and the sequencer counter) sits behind its
//! own small lock, held only around clock reads and counter bumps,
//! never across object application. A fetch that races a commit sees
//! either the cut from before the commit or the one after, both
//! causally consistent: group timestamps enter the committed cut only
//! after the groups are applied.

use std::sync::Arc;
use std::sync::Mutex;

use log::debug;
use rustc_hash::FxHashMap;

use crate::clocks::CausalityClock;
use crate::clocks::SiteId;
use crate::clocks::Timestamp;
use crate::crdt::Crdt;
use crate::crdt::CrdtIdentifier;
use crate::error::Error;
use crate::error::Result;
use crate::managed::AnyManaged;
use crate::managed::DependencyPolicy;
use crate::managed::ManagedObject;
use crate::store::CommitReply;
use crate::store::CommitRequest;
use crate::store::FetchReply;
use crate::store::FetchRequest;
use crate::store::ObjectStore;

type SharedObject = Arc<Mutex<Box<dyn AnyManaged>>>;

/// An in-process store: managed objects plus a sequencer.
pub struct MemoryStore {
    site: SiteId,
    objects: Mutex<FxHashMap<CrdtIdentifier, SharedObject>>,
    state: Mutex<StoreState>,
}

struct StoreState {
    /// Every timestamp this store has sequenced, client and system.
    committed: CausalityClock,
    next_counter: u64,
}

impl MemoryStore {
    /// Create an empty store sequencing under the given site.
    pub fn new(site: SiteId) -> MemoryStore {
        return MemoryStore {
            site,
            objects: Mutex::new(FxHashMap::default()),
            state: Mutex::new(StoreState {
                committed: CausalityClock::new(),
                next_counter: 0,
            }),
        };
    }

    /// The site this store sequences under.
    pub fn site(&self) -> &SiteId {
        return &self.site;
    }

    fn object(&self, id: &CrdtIdentifier) -> Option<SharedObject> {
        return self.objects.lock().unwrap().get(id).cloned();
    }

    /// Fold old history of one object into its checkpoint. Versions
    /// below `point` become unreconstructible.
    pub fn prune_object(&self, id: &CrdtIdentifier, point: &CausalityClock) -> Result<()> {
        let object = self
            .object(id)
            .ok_or_else(|| Error::NoSuchObject(id.clone()))?;
        object.lock().unwrap().prune_any(point);
        return Ok(());
    }

    /// Run a closure over the typed managed object stored under `id`.
    /// The hook for typed maintenance: snapshot encoding, inspection.
    pub fn with_object<C: Crdt, R>(
        &self,
        id: &CrdtIdentifier,
        f: impl FnOnce(&ManagedObject<C>) -> R,
    ) -> Result<R> {
        let object = self
            .object(id)
            .ok_or_else(|| Error::NoSuchObject(id.clone()))?;
        let guard = object.lock().unwrap();
        let typed = guard
            .as_any()
            .downcast_ref::<ManagedObject<C>>()
            .ok_or_else(|| Error::wrong_type(id, "stored object has a different CRDT type"))?;
        return Ok(f(typed));
    }

    /// Install a managed object wholesale, replacing any existing one.
    /// The hook for loading decoded snapshots at startup.
    pub fn install_object<C: Crdt>(&self, object: ManagedObject<C>) {
        {
            let mut state = self.state.lock().unwrap();
            state.committed.merge(object.clock());
        }
        let id = object.id().clone();
        self.objects
            .lock()
            .unwrap()
            .insert(id, Arc::new(Mutex::new(Box::new(object))));
    }
}

/// In-memory snapshot backend: a map behind a lock. Linearizable per
/// key and durable for exactly as long as the process.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<FxHashMap<CrdtIdentifier, Vec<u8>>>,
}

impl MemorySnapshotStore {
    /// Create an empty snapshot store.
    pub fn new() -> MemorySnapshotStore {
        return MemorySnapshotStore::default();
    }
}

impl crate::store::SnapshotStore for MemorySnapshotStore {
    fn read(&self, id: &CrdtIdentifier) -> Result<Option<Vec<u8>>> {
        return Ok(self.snapshots.lock().unwrap().get(id).cloned());
    }

    fn write(&self, id: &CrdtIdentifier, snapshot: &[u8]) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap()
            .insert(id.clone(), snapshot.to_vec());
        return Ok(());
    }
}

impl ObjectStore for MemoryStore {
    fn fetch_object_version(&self, request: FetchRequest) -> Result<FetchReply> {
        let object = self
            .object(&request.id)
            .ok_or_else(|| Error::NoSuchObject(request.id.clone()))?;

        let committed = self.state.lock().unwrap().committed.clone();
        if !committed.includes_all_of(&request.min_version) {
            return Err(Error::version_not_found(
                &request.id,
                format!(
                    "requested cut {} is ahead of the committed cut {}",
                    request.min_version, committed
                ),
            ));
        }

        let guard = object.lock().unwrap();
        if !guard.is_created() {
            return Err(Error::NoSuchObject(request.id.clone()));
        }
        let version = guard.version_any(&request.min_version, request.query.as_ref())?;
        return Ok(FetchReply { version });
    }

    fn commit_updates(&self, request: CommitRequest) -> Result<CommitReply> {
        // Check dependencies and claim a system timestamp under the
        // store lock; apply to objects outside it.
        let system_timestamp = {
            let mut state = self.state.lock().unwrap();
            for group in &request.groups {
                if !state.committed.includes_all_of(group.dependency()) {
                    return Err(Error::version_not_found(
                        group.id(),
                        format!(
                            "group {} depends on {} which is not yet committed",
                            group.base_timestamp(),
                            group.dependency()
                        ),
                    ));
                }
            }
            state.next_counter += 1;
            Timestamp::new(self.site.clone(), state.next_counter)
        };

        for group in &request.groups {
            let shared = {
                let mut objects = self.objects.lock().unwrap();
                objects
                    .entry(group.id().clone())
                    .or_insert_with(|| Arc::new(Mutex::new(group.new_managed())))
                    .clone()
            };
            let mut sealed = group.clone_box();
            sealed.add_system_timestamp(system_timestamp.clone());
            // Dependencies were verified against the committed cut;
            // per-object checks would reject cross-object references.
            shared
                .lock()
                .unwrap()
                .execute_any(sealed.as_ref(), DependencyPolicy::Trust)?;
        }

        let committed = {
            let mut state = self.state.lock().unwrap();
            state.committed.record(&request.base_timestamp);
            state.committed.record(&system_timestamp);
            state.committed.clone()
        };
        debug!(
            "sequenced {} as {} ({} groups)",
            request.base_timestamp,
            system_timestamp,
            request.groups.len()
        );
        return Ok(CommitReply {
            system_timestamp,
            committed,
        });
    }

    fn latest_known_clock(&self, _client: &SiteId) -> Result<CausalityClock> {
        return Ok(self.state.lock().unwrap().committed.clone());
    }
}
