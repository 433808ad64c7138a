// model = "claude-opus-4-5"
// created = "2026-08-04"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! End-to-end transaction scenarios against an in-memory store.
//!
//! Covers the two-phase commit protocol (local then global, with
//! dependent transactions held back until their predecessors are
//! sequenced), snapshot isolation with read-your-writes, rollback,
//! the error taxonomy, and the reference CRDT behaviors running
//! through the full stack.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;

use tandem::clocks::SiteId;
use tandem::crdt::CrdtIdentifier;
use tandem::crdt::counter::{VoteCounter, VoteDirection};
use tandem::crdt::set::AddWinsSet;
use tandem::error::{Error, Result};
use tandem::session::Session;
use tandem::store::{
    CommitReply, CommitRequest, FetchReply, FetchRequest, MemoryStore, ObjectStore,
};
use tandem::txn::TxnStatus;

// =============================================================================
// Test store: a memory store whose sequencer can be unplugged
// =============================================================================

/// Wraps a store and fails commits with a network error while
/// unplugged. Fetches always pass through.
struct PartitionedStore {
    inner: MemoryStore,
    unplugged: Mutex<bool>,
}

impl PartitionedStore {
    fn new() -> PartitionedStore {
        return PartitionedStore {
            inner: MemoryStore::new(SiteId::new("dc")),
            unplugged: Mutex::new(false),
        };
    }

    fn set_unplugged(&self, unplugged: bool) {
        *self.unplugged.lock().unwrap() = unplugged;
    }
}

impl ObjectStore for PartitionedStore {
    fn fetch_object_version(&self, request: FetchRequest) -> Result<FetchReply> {
        return self.inner.fetch_object_version(request);
    }

    fn commit_updates(&self, request: CommitRequest) -> Result<CommitReply> {
        if *self.unplugged.lock().unwrap() {
            return Err(Error::Network("sequencer unreachable".to_string()));
        }
        return self.inner.commit_updates(request);
    }

    fn latest_known_clock(&self, client: &SiteId) -> Result<tandem::clocks::CausalityClock> {
        return self.inner.latest_known_clock(client);
    }
}

fn set_id(key: &str) -> CrdtIdentifier {
    return CrdtIdentifier::new("sets", key);
}

// =============================================================================
// Basic write/read and session guarantees
// =============================================================================

#[test]
fn write_then_read_across_transactions() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store).unwrap();
    let id = set_id("s1");

    let txn = session.begin().unwrap();
    let view = txn.get::<AddWinsSet<String>>(&id, true).unwrap();
    view.add("x".to_string()).unwrap();
    txn.commit().unwrap();
    assert_eq!(txn.status(), TxnStatus::CommittedGlobal);

    let txn = session.begin().unwrap();
    let view = txn.get::<AddWinsSet<String>>(&id, false).unwrap();
    assert!(view.lookup(&"x".to_string()).unwrap());
}

#[test]
fn reads_within_a_transaction_see_own_writes() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store).unwrap();
    let id = set_id("s1");

    let txn = session.begin().unwrap();
    let view = txn.get::<AddWinsSet<String>>(&id, true).unwrap();
    assert!(!view.lookup(&"x".to_string()).unwrap());
    view.add("x".to_string()).unwrap();
    assert!(view.lookup(&"x".to_string()).unwrap());

    // Repeated get returns the same cached view.
    let again = txn.get::<AddWinsSet<String>>(&id, false).unwrap();
    assert!(again.lookup(&"x".to_string()).unwrap());
    txn.rollback();
}

#[test]
fn later_transaction_reads_local_predecessor() {
    let store = Arc::new(PartitionedStore::new());
    let session = Session::new(SiteId::new("client"), store.clone()).unwrap();
    let id = set_id("s1");

    // T1 commits while the sequencer is unreachable: local only.
    store.set_unplugged(true);
    let t1 = session.begin().unwrap();
    t1.get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("x".to_string())
        .unwrap();
    t1.commit_async(|_| {});
    assert_eq!(t1.status(), TxnStatus::CommittedLocal);

    // T2 still reads T1's write.
    let t2 = session.begin().unwrap();
    let view = t2.get::<AddWinsSet<String>>(&id, false).unwrap();
    assert!(view.lookup(&"x".to_string()).unwrap());
    t2.rollback();

    store.set_unplugged(false);
    session.flush_commits().unwrap();
    assert_eq!(t1.status(), TxnStatus::CommittedGlobal);
}

#[test]
fn first_read_after_predecessor_resolves_sees_its_write() {
    let store = Arc::new(PartitionedStore::new());
    let session = Session::new(SiteId::new("client"), store.clone()).unwrap();
    let id = set_id("s1");

    // T1 creates and writes the object, but only commits locally.
    store.set_unplugged(true);
    let t1 = session.begin().unwrap();
    t1.get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("x".to_string())
        .unwrap();
    t1.commit_async(|_| {});

    // T2 opens with T1 as a local predecessor, but reads nothing yet.
    let t2 = session.begin().unwrap();

    // T1 is driven to global commit while T2 is still pending; its
    // dependency edge leaves T2's fold-in list.
    store.set_unplugged(false);
    session.flush_commits().unwrap();
    assert_eq!(t1.status(), TxnStatus::CommittedGlobal);
    assert_eq!(t2.status(), TxnStatus::Pending);

    // T2's first materialization of the object still shows T1's
    // write: the read cut followed the resolved predecessor.
    let view = t2.get::<AddWinsSet<String>>(&id, false).unwrap();
    assert!(view.lookup(&"x".to_string()).unwrap());
    t2.commit().unwrap();
}

#[test]
fn widening_fetch_carries_a_resolved_predecessor() {
    let store = Arc::new(PartitionedStore::new());
    let session = Session::new(SiteId::new("client"), store.clone()).unwrap();
    let id = set_id("s1");

    // Seed the object globally.
    let seed = session.begin().unwrap();
    seed.get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("old".to_string())
        .unwrap();
    seed.commit().unwrap();

    // T1 adds another element, locally committed only.
    store.set_unplugged(true);
    let t1 = session.begin().unwrap();
    t1.get::<AddWinsSet<String>>(&id, false)
        .unwrap()
        .add("mid".to_string())
        .unwrap();
    t1.commit_async(|_| {});

    // T2 materializes a hollow view while T1 is still local.
    let t2 = session.begin().unwrap();
    let view = t2.get_lazy::<AddWinsSet<String>>(&id, false).unwrap();
    assert!(view.shard().is_hollow());

    // T1 resolves while T2 is still pending.
    store.set_unplugged(false);
    session.flush_commits().unwrap();
    assert_eq!(t1.status(), TxnStatus::CommittedGlobal);
    assert_eq!(t2.status(), TxnStatus::Pending);

    // Widening the view pulls new particles at a cut that still
    // includes the resolved predecessor.
    assert!(view.lookup(&"mid".to_string()).unwrap());
    assert!(view.lookup(&"old".to_string()).unwrap());
    t2.rollback();
}

// =============================================================================
// Two-phase commit ordering
// =============================================================================

#[test]
fn dependent_commits_wait_for_their_predecessors() {
    let store = Arc::new(PartitionedStore::new());
    let session = Session::new(SiteId::new("client"), store.clone()).unwrap();
    let id = set_id("s1");

    let (events_tx, events_rx) = mpsc::channel::<&'static str>();

    store.set_unplugged(true);

    let t1 = session.begin().unwrap();
    t1.get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("one".to_string())
        .unwrap();
    let tx = events_tx.clone();
    t1.commit_async(move |_| tx.send("t1").unwrap());

    let t2 = session.begin().unwrap();
    t2.get::<AddWinsSet<String>>(&id, false)
        .unwrap()
        .add("two".to_string())
        .unwrap();
    let tx = events_tx.clone();
    t2.commit_async(move |_| tx.send("t2").unwrap());

    // Both are stuck at local commit while the sequencer is away.
    assert_eq!(t1.status(), TxnStatus::CommittedLocal);
    assert_eq!(t2.status(), TxnStatus::CommittedLocal);
    assert_eq!(session.pending_commits(), 2);
    assert!(events_rx.try_recv().is_err());

    store.set_unplugged(false);
    session.flush_commits().unwrap();

    // Global commits happened in dependency order.
    assert_eq!(t1.status(), TxnStatus::CommittedGlobal);
    assert_eq!(t2.status(), TxnStatus::CommittedGlobal);
    assert_eq!(events_rx.recv().unwrap(), "t1");
    assert_eq!(events_rx.recv().unwrap(), "t2");

    // T2's group was sequenced with its dependency rewritten to T1's
    // system timestamp, not just T1's client name.
    let t1_system = store
        .inner
        .latest_known_clock(&SiteId::new("client"))
        .unwrap()
        .includes(&tandem::clocks::Timestamp::new(SiteId::new("dc"), 1));
    assert!(t1_system);
    store
        .inner
        .with_object::<AddWinsSet<String>, _>(&id, |object| {
            let t2_group = object
                .groups()
                .iter()
                .find(|g| g.base_timestamp().counter == 2)
                .expect("t2's group reached the store");
            assert!(t2_group
                .dependency()
                .includes(&tandem::clocks::Timestamp::new(SiteId::new("dc"), 1)));
        })
        .unwrap();
}

#[test]
fn listener_fires_on_global_commit_with_the_system_name() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store).unwrap();
    let id = set_id("s1");

    let (tx, rx) = mpsc::channel();
    let txn = session.begin().unwrap();
    txn.get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("x".to_string())
        .unwrap();
    txn.commit_async(move |ts| tx.send(ts.clone()).unwrap());

    let name = rx.recv().unwrap();
    assert_eq!(name.site, SiteId::new("dc"));
    assert_eq!(txn.status(), TxnStatus::CommittedGlobal);
}

#[test]
fn transient_commit_failure_is_retryable() {
    let store = Arc::new(PartitionedStore::new());
    let session = Session::new(SiteId::new("client"), store.clone()).unwrap();
    let id = set_id("s1");

    store.set_unplugged(true);
    let txn = session.begin().unwrap();
    txn.get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("x".to_string())
        .unwrap();

    // The synchronous commit surfaces the network failure; the
    // transaction stays locally committed.
    let error = txn.commit().unwrap_err();
    assert!(error.is_transient());
    assert_eq!(txn.status(), TxnStatus::CommittedLocal);

    store.set_unplugged(false);
    session.flush_commits().unwrap();
    assert_eq!(txn.status(), TxnStatus::CommittedGlobal);
}

// =============================================================================
// Concurrent sessions: the CRDT semantics end to end
// =============================================================================

#[test]
fn concurrent_add_wins_over_remove_across_sessions() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let alice = Session::new(SiteId::new("alice"), store.clone()).unwrap();
    let bob = Session::new(SiteId::new("bob"), store.clone()).unwrap();
    let id = set_id("s1");

    // Seed: the element exists.
    let txn = alice.begin().unwrap();
    txn.get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("x".to_string())
        .unwrap();
    txn.commit().unwrap();

    // Both open their transactions before either commits: the remove
    // and the re-add are concurrent.
    let remove_txn = alice.begin().unwrap();
    let add_txn = bob.begin().unwrap();

    remove_txn
        .get::<AddWinsSet<String>>(&id, false)
        .unwrap()
        .remove(&"x".to_string())
        .unwrap();
    add_txn
        .get::<AddWinsSet<String>>(&id, false)
        .unwrap()
        .add("x".to_string())
        .unwrap();

    remove_txn.commit().unwrap();
    add_txn.commit().unwrap();

    // The concurrent add wins.
    let check = alice.begin().unwrap();
    let view = check.get::<AddWinsSet<String>>(&id, false).unwrap();
    assert!(view.lookup(&"x".to_string()).unwrap());
}

#[test]
fn causally_ordered_remove_wins_across_sessions() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let alice = Session::new(SiteId::new("alice"), store.clone()).unwrap();
    let bob = Session::new(SiteId::new("bob"), store.clone()).unwrap();
    let id = set_id("s1");

    let txn = alice.begin().unwrap();
    txn.get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("x".to_string())
        .unwrap();
    txn.commit().unwrap();

    // Bob's remove begins after the add committed: it observes it.
    let txn = bob.begin().unwrap();
    txn.get::<AddWinsSet<String>>(&id, false)
        .unwrap()
        .remove(&"x".to_string())
        .unwrap();
    txn.commit().unwrap();

    let check = alice.begin().unwrap();
    let view = check.get::<AddWinsSet<String>>(&id, false).unwrap();
    assert!(!view.lookup(&"x".to_string()).unwrap());
}

#[test]
fn concurrent_equal_time_votes_resolve_upward() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let a = Session::new(SiteId::new("replica-a"), store.clone()).unwrap();
    let b = Session::new(SiteId::new("replica-b"), store.clone()).unwrap();
    let id = CrdtIdentifier::new("votes", "post-1");

    // Create the counter first so both votes run against it.
    let txn = a.begin().unwrap();
    txn.get::<VoteCounter<String>>(&id, true).unwrap();
    txn.commit().unwrap();

    // Alice votes up on one replica and down on the other, both from
    // the same snapshot: her per-voter time is 1 in both updates.
    let up_txn = a.begin().unwrap();
    let down_txn = b.begin().unwrap();
    up_txn
        .get::<VoteCounter<String>>(&id, false)
        .unwrap()
        .vote("alice".to_string(), VoteDirection::Up)
        .unwrap();
    down_txn
        .get::<VoteCounter<String>>(&id, false)
        .unwrap()
        .vote("alice".to_string(), VoteDirection::Down)
        .unwrap();

    up_txn.commit().unwrap();
    down_txn.commit().unwrap();

    // Up wins the tie.
    let check = b.begin().unwrap();
    let view = check.get::<VoteCounter<String>>(&id, false).unwrap();
    assert_eq!(
        view.vote_of(&"alice".to_string()).unwrap(),
        VoteDirection::Up
    );
    assert_eq!(view.score().unwrap(), 1);
}

// =============================================================================
// Lazy views and partial state
// =============================================================================

#[test]
fn lazy_view_parks_blind_updates_until_fetched() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store).unwrap();
    let id = set_id("s1");

    // Seed some state.
    let txn = session.begin().unwrap();
    let view = txn.get::<AddWinsSet<String>>(&id, true).unwrap();
    view.add("old".to_string()).unwrap();
    txn.commit().unwrap();

    // A lazy view starts hollow; a blind add works without a fetch.
    let txn = session.begin().unwrap();
    let view = txn.get_lazy::<AddWinsSet<String>>(&id, false).unwrap();
    assert!(view.shard().is_hollow());
    view.add_blind("new".to_string()).unwrap();

    // The lookup pulls in the touched particles and folds the blind
    // update back in.
    assert!(view.lookup(&"new".to_string()).unwrap());
    assert!(view.lookup(&"old".to_string()).unwrap());
    txn.commit().unwrap();

    let check = session.begin().unwrap();
    let view = check.get::<AddWinsSet<String>>(&id, false).unwrap();
    assert!(view.lookup(&"new".to_string()).unwrap());
    assert!(view.lookup(&"old".to_string()).unwrap());
}

// =============================================================================
// Rollback and error taxonomy
// =============================================================================

#[test]
fn rollback_discards_buffered_updates() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store).unwrap();
    let id = set_id("s1");

    let txn = session.begin().unwrap();
    txn.get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("x".to_string())
        .unwrap();
    txn.rollback();
    assert_eq!(txn.status(), TxnStatus::Cancelled);

    // Nothing was created or written.
    let check = session.begin().unwrap();
    let missing = check.get::<AddWinsSet<String>>(&id, false);
    assert!(matches!(missing, Err(Error::NoSuchObject(_))));
}

#[test]
fn rollback_leaves_other_transactions_alone() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store).unwrap();
    let id = set_id("s1");

    let keeper = session.begin().unwrap();
    keeper
        .get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("kept".to_string())
        .unwrap();

    let doomed = session.begin().unwrap();
    doomed
        .get::<AddWinsSet<String>>(&set_id("s2"), true)
        .unwrap()
        .add("dropped".to_string())
        .unwrap();
    doomed.rollback();

    keeper.commit().unwrap();

    let check = session.begin().unwrap();
    let view = check.get::<AddWinsSet<String>>(&id, false).unwrap();
    assert!(view.lookup(&"kept".to_string()).unwrap());
    assert!(matches!(
        check.get::<AddWinsSet<String>>(&set_id("s2"), false),
        Err(Error::NoSuchObject(_))
    ));
}

#[test]
fn wrong_type_is_surfaced_structurally() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store).unwrap();
    let id = set_id("s1");

    let txn = session.begin().unwrap();
    txn.get::<AddWinsSet<String>>(&id, true)
        .unwrap()
        .add("x".to_string())
        .unwrap();
    txn.commit().unwrap();

    let txn = session.begin().unwrap();
    let result = txn.get::<VoteCounter<String>>(&id, false);
    let error = result.err().unwrap();
    assert!(matches!(error, Error::WrongType { .. }));
    assert!(!error.is_transient());
}

#[test]
fn missing_object_without_create_is_surfaced() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store).unwrap();

    let txn = session.begin().unwrap();
    let result = txn.get::<AddWinsSet<String>>(&set_id("absent"), false);
    assert!(matches!(result, Err(Error::NoSuchObject(_))));

    // The same transaction can retry with create.
    let view = txn.get::<AddWinsSet<String>>(&set_id("absent"), true).unwrap();
    view.add("x".to_string()).unwrap();
    txn.commit().unwrap();
}

#[test]
#[should_panic(expected = "unexpected transaction status")]
fn mutating_a_committed_transaction_panics() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store).unwrap();
    let id = set_id("s1");

    let txn = session.begin().unwrap();
    let view = txn.get::<AddWinsSet<String>>(&id, true).unwrap();
    view.add("x".to_string()).unwrap();
    txn.commit().unwrap();

    // Any further mutation is a programming error.
    let _ = view.add("y".to_string());
}

#[test]
#[should_panic(expected = "unexpected transaction status")]
fn rolling_back_twice_panics() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store).unwrap();

    let txn = session.begin().unwrap();
    txn.rollback();
    txn.rollback();
}

// =============================================================================
// Multi-object transactions
// =============================================================================

#[test]
fn one_commit_bundles_updates_to_several_objects() {
    let store = Arc::new(MemoryStore::new(SiteId::new("dc")));
    let session = Session::new(SiteId::new("client"), store.clone()).unwrap();

    let txn = session.begin().unwrap();
    txn.get::<AddWinsSet<String>>(&set_id("s1"), true)
        .unwrap()
        .add("x".to_string())
        .unwrap();
    txn.get::<AddWinsSet<String>>(&set_id("s2"), true)
        .unwrap()
        .add("y".to_string())
        .unwrap();
    txn.commit().unwrap();

    // Both objects carry the same base timestamp: one sequencing
    // decision covered the whole transaction.
    let base = txn.client_timestamp().clone();
    for key in ["s1", "s2"] {
        store
            .with_object::<AddWinsSet<String>, _>(&set_id(key), |object| {
                assert!(object
                    .groups()
                    .iter()
                    .any(|g| g.base_timestamp() == &base));
            })
            .unwrap();
    }
}
