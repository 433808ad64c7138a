// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Shards: which particles of an object a given copy materializes.
//!
//! A replica may hold only a fraction of an object's state. The shard
//! is the description of that fraction, used to decide whether a read
//! or an update can be served locally or needs a fetch first.
//!
//! `is_subset_of` is a non-strict partial order: `Full` is the top
//! element and `Hollow` (the empty particle set) the bottom. Where
//! membership cannot be decided structurally (an interval against an
//! explicit set, say) the answer is `false`: a spurious fetch is
//! harmless, a spurious "already here" is not.

use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde::Serialize;

use crate::crdt::AffectedParticles;
use crate::crdt::Particle;

pub mod query;

pub use query::ShardQuery;

/// The particles present in one copy of an object. Immutable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shard<P: Particle> {
    /// Every particle is materialized.
    Full,
    /// Exactly the listed particles are materialized. The empty set is
    /// the hollow shard: metadata only, no state.
    Set(FxHashSet<P>),
    /// Particles in the range `(from, to]` under the particle order.
    Interval(P, P),
    /// The union of the member shards.
    Union(Vec<Shard<P>>),
}

impl<P: Particle> Shard<P> {
    /// The shard holding no particles at all.
    pub fn hollow() -> Shard<P> {
        return Shard::Set(FxHashSet::default());
    }

    /// Shard over an explicit particle set.
    pub fn of(particles: impl IntoIterator<Item = P>) -> Shard<P> {
        return Shard::Set(particles.into_iter().collect());
    }

    /// True if every particle is materialized.
    pub fn is_full(&self) -> bool {
        return match self {
            Shard::Full => true,
            Shard::Union(members) => members.iter().any(|m| m.is_full()),
            _ => false,
        };
    }

    /// True if no particle is materialized.
    pub fn is_hollow(&self) -> bool {
        return match self {
            Shard::Full => false,
            Shard::Set(particles) => particles.is_empty(),
            Shard::Interval(from, to) => from >= to,
            Shard::Union(members) => members.iter().all(|m| m.is_hollow()),
        };
    }

    /// True if the given particle is materialized.
    pub fn contains(&self, particle: &P) -> bool {
        return match self {
            Shard::Full => true,
            Shard::Set(particles) => particles.contains(particle),
            Shard::Interval(from, to) => from < particle && particle <= to,
            Shard::Union(members) => members.iter().any(|m| m.contains(particle)),
        };
    }

    /// True if the whole range `(from, to]` is materialized.
    pub fn contains_interval(&self, from: &P, to: &P) -> bool {
        return match self {
            Shard::Full => true,
            // Set membership of a whole range cannot be decided.
            Shard::Set(_) => false,
            Shard::Interval(own_from, own_to) => own_from <= from && to <= own_to,
            Shard::Union(members) => members.iter().any(|m| m.contains_interval(from, to)),
        };
    }

    /// True if every particle an update may touch is materialized.
    pub fn contains_all(&self, affected: &AffectedParticles<P>) -> bool {
        return match affected {
            AffectedParticles::All => self.is_full(),
            AffectedParticles::Set(particles) => particles.iter().all(|p| self.contains(p)),
        };
    }

    /// True if any particle an update may touch is materialized.
    pub fn contains_any(&self, affected: &AffectedParticles<P>) -> bool {
        return match affected {
            AffectedParticles::All => !self.is_hollow(),
            AffectedParticles::Set(particles) => particles.iter().any(|p| self.contains(p)),
        };
    }

    /// True if everything materialized here is also materialized in
    /// `other`. Non-strict: every shard is a subset of itself.
    pub fn is_subset_of(&self, other: &Shard<P>) -> bool {
        if other.is_full() {
            return true;
        }
        if self.is_hollow() {
            return true;
        }
        return match self {
            Shard::Full => false, // other is not full, checked above
            Shard::Set(particles) => particles.iter().all(|p| other.contains(p)),
            Shard::Interval(from, to) => other.contains_interval(from, to),
            Shard::Union(members) => members.iter().all(|m| m.is_subset_of(other)),
        };
    }

    /// The union of two shards.
    // TODO: normalize unions of overlapping intervals into a proper
    // interval set instead of accumulating members.
    pub fn union(self, other: Shard<P>) -> Shard<P> {
        if self.is_full() || other.is_hollow() {
            return self;
        }
        if other.is_full() || self.is_hollow() {
            return other;
        }
        return match (self, other) {
            (Shard::Set(mut left), Shard::Set(right)) => {
                left.extend(right);
                Shard::Set(left)
            }
            (Shard::Interval(f1, t1), Shard::Interval(f2, t2)) => {
                // Merge when the ranges overlap or touch.
                if f1 <= t2 && f2 <= t1 {
                    let from = if f1 < f2 { f1 } else { f2 };
                    let to = if t1 > t2 { t1 } else { t2 };
                    Shard::Interval(from, to)
                } else {
                    Shard::Union(vec![Shard::Interval(f1, t1), Shard::Interval(f2, t2)])
                }
            }
            (Shard::Union(mut left), Shard::Union(right)) => {
                left.extend(right);
                Shard::Union(left)
            }
            (Shard::Union(mut members), single) => {
                members.push(single);
                Shard::Union(members)
            }
            (single, Shard::Union(mut members)) => {
                members.push(single);
                Shard::Union(members)
            }
            (left, right) => Shard::Union(vec![left, right]),
        };
    }
}
