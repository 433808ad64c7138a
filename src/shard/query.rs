// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Shard queries: requests for a restricted view of an object.
//!
//! A query is checked against a shard with `is_available_in` before it
//! is executed; executing a query over missing particles would quietly
//! return wrong data. `is_subquery_of` lets a cache recognize that an
//! earlier, broader query already covers a narrower one, avoiding a
//! redundant fetch. `Full` and `Hollow` are state independent: the
//! shard they produce does not depend on the version they run against,
//! so their results may be cached without a version check. `Fraction`
//! and `Range` are tied to particles whose membership can change and
//! must be revalidated against the current clock.

use std::any::Any;

use rustc_hash::FxHashSet;

use crate::crdt::Crdt;
use crate::crdt::Particle;
use crate::shard::Shard;

/// A request for a restricted view of an object's state.
#[derive(Clone, Debug, PartialEq)]
pub enum ShardQuery<P: Particle> {
    /// Everything.
    Full,
    /// Metadata only, no state.
    Hollow,
    /// An explicit set of particles.
    Fraction(FxHashSet<P>),
    /// Particles in `(from, to]` under the particle order.
    Range(P, P),
}

impl<P: Particle> ShardQuery<P> {
    /// Query for a single particle.
    pub fn particle(particle: P) -> ShardQuery<P> {
        let mut set = FxHashSet::default();
        set.insert(particle);
        return ShardQuery::Fraction(set);
    }

    /// True if the query can be answered from the given shard without
    /// fetching; false if it cannot or if that cannot be decided.
    pub fn is_available_in(&self, shard: &Shard<P>) -> bool {
        return match self {
            ShardQuery::Full => shard.is_full(),
            ShardQuery::Hollow => true,
            ShardQuery::Fraction(particles) => particles.iter().all(|p| shard.contains(p)),
            ShardQuery::Range(from, to) => from >= to || shard.contains_interval(from, to),
        };
    }

    /// True if a result for `other` necessarily covers this query.
    pub fn is_subquery_of(&self, other: &ShardQuery<P>) -> bool {
        return match (self, other) {
            (_, ShardQuery::Full) => true,
            (ShardQuery::Hollow, _) => true,
            (ShardQuery::Fraction(own), ShardQuery::Fraction(theirs)) => own.is_subset(theirs),
            (ShardQuery::Fraction(own), ShardQuery::Range(from, to)) => {
                own.iter().all(|p| from < p && p <= to)
            }
            (ShardQuery::Range(f1, t1), ShardQuery::Range(f2, t2)) => {
                f1 >= t1 || (f2 <= f1 && t1 <= t2)
            }
            // A range against an explicit set cannot be verified.
            (ShardQuery::Range(from, to), ShardQuery::Fraction(_)) => from >= to,
            (ShardQuery::Fraction(own), ShardQuery::Hollow) => own.is_empty(),
            (ShardQuery::Range(from, to), ShardQuery::Hollow) => from >= to,
            (ShardQuery::Full, _) => false,
        };
    }

    /// True if `query(update(x)) == update(query(x))`: the produced
    /// shard does not depend on the version the query runs against.
    /// State-independent results may be cached unconditionally.
    pub fn is_state_independent(&self) -> bool {
        return matches!(self, ShardQuery::Full | ShardQuery::Hollow);
    }

    /// The shard a result of this query materializes.
    pub fn result_shard(&self) -> Shard<P> {
        return match self {
            ShardQuery::Full => Shard::Full,
            ShardQuery::Hollow => Shard::hollow(),
            ShardQuery::Fraction(particles) => Shard::Set(particles.clone()),
            ShardQuery::Range(from, to) => Shard::Interval(from.clone(), to.clone()),
        };
    }

    /// Execute the query against a version, producing a restricted
    /// copy. The caller must have checked `is_available_in` against the
    /// version's shard; running a query over missing particles returns
    /// whatever fraction happens to be present.
    pub fn execute_at<C: Crdt<Particle = P>>(&self, version: &C) -> C {
        return match self {
            ShardQuery::Full => version.clone(),
            ShardQuery::Hollow => version.copy_fraction(&FxHashSet::default()),
            ShardQuery::Fraction(particles) => version.copy_fraction(particles),
            ShardQuery::Range(from, to) => {
                let particles = version
                    .particles()
                    .into_iter()
                    .filter(|p| from < p && p <= to)
                    .collect();
                version.copy_fraction(&particles)
            }
        };
    }
}

/// Type-erased query, for carrying mixed particle types through the
/// store interface. Concrete stores downcast back to `ShardQuery<P>`.
pub trait AnyQuery: Send {
    /// The query as `Any`, for downcasting.
    fn as_any(&self) -> &dyn Any;
    /// See [`ShardQuery::is_state_independent`].
    fn is_state_independent(&self) -> bool;
    /// Clone behind the trait object.
    fn clone_box(&self) -> Box<dyn AnyQuery>;
}

impl<P: Particle> AnyQuery for ShardQuery<P> {
    fn as_any(&self) -> &dyn Any {
        return self;
    }

    fn is_state_independent(&self) -> bool {
        return ShardQuery::is_state_independent(self);
    }

    fn clone_box(&self) -> Box<dyn AnyQuery> {
        return Box::new(self.clone());
    }
}

impl Clone for Box<dyn AnyQuery> {
    fn clone(&self) -> Box<dyn AnyQuery> {
        return self.clone_box();
    }
}
