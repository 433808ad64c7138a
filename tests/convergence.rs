// model = "claude-opus-4-5"
// created = "2026-08-04"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Convergence properties of the managed-object log.
//!
//! Two replicas of an object that receive the same update groups must
//! agree on the value no matter the delivery order, redelivery must be
//! harmless, and pruning must not change any reconstructible version.

use rustc_hash::FxHashSet;
use tandem::clocks::{CausalityClock, SiteId, Timestamp, TimestampMapping, TripleTimestamp};
use tandem::crdt::counter::{VoteCounter, VoteDirection};
use tandem::crdt::group::ObjectUpdatesGroup;
use tandem::crdt::set::AddWinsSet;
use tandem::crdt::{Crdt, CrdtIdentifier};
use tandem::error::Error;
use tandem::managed::{DependencyPolicy, ManagedObject};
use tandem::shard::ShardQuery;

// =============================================================================
// Helpers
// =============================================================================

fn sid(site: &str) -> SiteId {
    return SiteId::new(site);
}

fn object_id() -> CrdtIdentifier {
    return CrdtIdentifier::new("sets", "s1");
}

/// An update group built against a given base state.
fn set_group(
    id: &CrdtIdentifier,
    site: &str,
    counter: u64,
    dependency: CausalityClock,
    base: &AddWinsSet<String>,
    adds: &[&str],
    removes: &[&str],
) -> ObjectUpdatesGroup<AddWinsSet<String>> {
    let mapping = TimestampMapping::new(Timestamp::new(sid(site), counter));
    let mut group = ObjectUpdatesGroup::new(id.clone(), mapping, None, dependency);
    let mut sub = 0;
    for element in adds {
        group.append(base.prepare_add(
            element.to_string(),
            TripleTimestamp::new(sid(site), counter, sub),
        ));
        sub += 1;
    }
    for element in removes {
        if let Some(update) = base.prepare_remove(&element.to_string()) {
            group.append(update);
        }
    }
    return group;
}

fn fresh_replica(groups: &[ObjectUpdatesGroup<AddWinsSet<String>>]) -> ManagedObject<AddWinsSet<String>> {
    let mut object = ManagedObject::new(object_id());
    for group in groups {
        object.execute(group.clone(), DependencyPolicy::Trust).unwrap();
    }
    return object;
}

// =============================================================================
// Convergence and idempotence
// =============================================================================

#[test]
fn concurrent_groups_commute() {
    let id = object_id();
    let base = AddWinsSet::default();
    let g1 = set_group(&id, "a", 1, CausalityClock::new(), &base, &["x", "y"], &[]);
    let g2 = set_group(&id, "b", 1, CausalityClock::new(), &base, &["y", "z"], &[]);

    let forward = fresh_replica(&[g1.clone(), g2.clone()]);
    let backward = fresh_replica(&[g2, g1]);

    assert_eq!(forward.latest().value(), backward.latest().value());
    assert_eq!(forward.clock(), backward.clock());
}

#[test]
fn redelivery_is_idempotent() {
    let id = object_id();
    let base = AddWinsSet::default();
    let g1 = set_group(&id, "a", 1, CausalityClock::new(), &base, &["x"], &[]);

    let once = fresh_replica(&[g1.clone()]);
    let twice = fresh_replica(&[g1.clone(), g1]);

    assert_eq!(once.latest().value(), twice.latest().value());
    assert_eq!(once.log_len(), twice.log_len());
}

#[test]
fn add_wins_against_concurrent_remove() {
    let id = object_id();

    // Everyone starts from a state where "x" was added by a:1.
    let base_empty = AddWinsSet::default();
    let seed = set_group(&id, "a", 1, CausalityClock::new(), &base_empty, &["x"], &[]);
    let mut seeded = AddWinsSet::default();
    let mut seed_clock = CausalityClock::new();
    seed_clock.record(&Timestamp::new(sid("a"), 1));
    for update in seed.operations() {
        use tandem::crdt::CrdtUpdate;
        update.apply_to(&mut seeded);
    }

    // Concurrently: b removes x, c adds x again.
    let remove = set_group(&id, "b", 1, seed_clock.clone(), &seeded, &[], &["x"]);
    let re_add = set_group(&id, "c", 1, seed_clock.clone(), &seeded, &["x"], &[]);

    let forward = fresh_replica(&[seed.clone(), remove.clone(), re_add.clone()]);
    let backward = fresh_replica(&[seed, re_add, remove]);

    // The concurrent add wins: lookup(x) is true on both replicas.
    assert!(forward.latest().contains(&"x".to_string()));
    assert!(backward.latest().contains(&"x".to_string()));
    assert_eq!(forward.latest().value(), backward.latest().value());
}

#[test]
fn causally_later_remove_wins() {
    let id = object_id();
    let base_empty = AddWinsSet::default();
    let seed = set_group(&id, "a", 1, CausalityClock::new(), &base_empty, &["x"], &[]);

    let mut seeded = AddWinsSet::default();
    for update in seed.operations() {
        use tandem::crdt::CrdtUpdate;
        update.apply_to(&mut seeded);
    }
    let mut seed_clock = CausalityClock::new();
    seed_clock.record(&Timestamp::new(sid("a"), 1));

    // The remove happens after observing the add.
    let remove = set_group(&id, "a", 2, seed_clock, &seeded, &[], &["x"]);

    let replica = fresh_replica(&[seed, remove]);
    assert!(!replica.latest().contains(&"x".to_string()));
}

#[test]
fn concurrent_votes_tie_break_upward() {
    let id = CrdtIdentifier::new("votes", "post-1");
    let base: VoteCounter<String> = VoteCounter::default();

    // Alice votes up on one replica and down on another, both from
    // the empty state, so both updates carry her logical time 1.
    let mut up_group = ObjectUpdatesGroup::new(
        id.clone(),
        TimestampMapping::new(Timestamp::new(sid("a"), 1)),
        None,
        CausalityClock::new(),
    );
    up_group.append(base.prepare_vote("alice".to_string(), VoteDirection::Up));

    let mut down_group = ObjectUpdatesGroup::new(
        id.clone(),
        TimestampMapping::new(Timestamp::new(sid("b"), 1)),
        None,
        CausalityClock::new(),
    );
    down_group.append(base.prepare_vote("alice".to_string(), VoteDirection::Down));

    let mut forward: ManagedObject<VoteCounter<String>> = ManagedObject::new(id.clone());
    forward.execute(up_group.clone(), DependencyPolicy::Trust).unwrap();
    forward.execute(down_group.clone(), DependencyPolicy::Trust).unwrap();

    let mut backward: ManagedObject<VoteCounter<String>> = ManagedObject::new(id);
    backward.execute(down_group, DependencyPolicy::Trust).unwrap();
    backward.execute(up_group, DependencyPolicy::Trust).unwrap();

    // The higher direction wins the tie on both replicas.
    assert_eq!(
        forward.latest().vote_of(&"alice".to_string()),
        VoteDirection::Up
    );
    assert_eq!(
        backward.latest().vote_of(&"alice".to_string()),
        VoteDirection::Up
    );
    assert_eq!(forward.latest().score(), 1);
}

// =============================================================================
// Pruning
// =============================================================================

#[test]
fn prune_preserves_reconstruction_above_the_point() {
    let id = object_id();
    let base = AddWinsSet::default();
    let g1 = set_group(&id, "a", 1, CausalityClock::new(), &base, &["x"], &[]);
    let g2 = set_group(&id, "b", 1, CausalityClock::new(), &base, &["y"], &[]);
    let g3 = set_group(&id, "c", 1, CausalityClock::new(), &base, &["z"], &[]);

    let mut object = fresh_replica(&[g1, g2, g3]);

    // point includes a:1; c1 includes a:1 + b:1; c2 everything.
    let mut point = CausalityClock::new();
    point.record(&Timestamp::new(sid("a"), 1));
    let mut c1 = point.clone();
    c1.record(&Timestamp::new(sid("b"), 1));
    let mut c2 = c1.clone();
    c2.record(&Timestamp::new(sid("c"), 1));

    let before_c1 = object.get_version(&c1).unwrap().value();
    let before_c2 = object.get_version(&c2).unwrap().value();

    object.prune(&point);

    assert_eq!(object.get_version(&c1).unwrap().value(), before_c1);
    assert_eq!(object.get_version(&c2).unwrap().value(), before_c2);

    // Below the point, reconstruction is refused.
    assert!(matches!(
        object.get_version(&CausalityClock::new()),
        Err(Error::VersionNotFound { .. })
    ));
}

#[test]
fn prune_everything_keeps_the_checkpoint_baseline() {
    let id = object_id();
    let base = AddWinsSet::default();
    let g1 = set_group(&id, "a", 1, CausalityClock::new(), &base, &["x"], &[]);
    let mut object = fresh_replica(&[g1]);

    let point = object.clock().clone();
    object.prune(&point);

    assert_eq!(object.log_len(), 0);
    assert!(object.latest().contains(&"x".to_string()));
    assert_eq!(object.get_version(&point).unwrap().value(), object.latest().value());
}

// =============================================================================
// Partial replicas
// =============================================================================

#[test]
fn shard_restricted_copy_serves_its_fraction() {
    let id = object_id();
    let base = AddWinsSet::default();
    let g1 = set_group(&id, "a", 1, CausalityClock::new(), &base, &["x", "y", "z"], &[]);
    let object = fresh_replica(&[g1]);

    let fraction: FxHashSet<String> = ["x".to_string(), "y".to_string()].into_iter().collect();
    let restricted = object.apply_shard_query(&ShardQuery::Fraction(fraction));

    let value = restricted.latest();
    assert!(value.contains(&"x".to_string()));
    assert!(value.contains(&"y".to_string()));
    assert!(!value.contains(&"z".to_string()));
    assert!(!restricted.shard().is_full());
    assert_eq!(restricted.clock(), object.clock());
}

#[test]
fn late_global_name_suppresses_redelivery_under_it() {
    let id = object_id();
    let base = AddWinsSet::default();
    let group = set_group(&id, "a", 1, CausalityClock::new(), &base, &["x"], &[]);

    // Delivered under the client name only.
    let mut object = fresh_replica(&[group]);

    // A cut naming only the system timestamp shows nothing yet.
    let mut cut = CausalityClock::new();
    cut.record(&Timestamp::new(sid("dc"), 9));
    assert!(!object.get_version(&cut).unwrap().contains(&"x".to_string()));

    // The global commit ack arrives later with the system name; the
    // group becomes visible under it.
    let mut mapping = TimestampMapping::new(Timestamp::new(sid("a"), 1));
    mapping.add_system_timestamp(Timestamp::new(sid("dc"), 9));
    object.merge_group_mapping(&mapping);

    assert!(object.clock().includes(&Timestamp::new(sid("dc"), 9)));
    assert!(object.get_version(&cut).unwrap().contains(&"x".to_string()));
}

#[test]
fn creation_state_creates_the_object() {
    let id = object_id();
    let mapping = TimestampMapping::new(Timestamp::new(sid("a"), 1));
    let group: ObjectUpdatesGroup<AddWinsSet<String>> = ObjectUpdatesGroup::new(
        id.clone(),
        mapping,
        Some(AddWinsSet::default()),
        CausalityClock::new(),
    );

    let mut object: ManagedObject<AddWinsSet<String>> = ManagedObject::new(id);
    assert!(!object.is_created());
    object.execute(group, DependencyPolicy::Check).unwrap();
    assert!(object.is_created());
}
