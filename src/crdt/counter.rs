// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Vote counter: last-writer-wins per voter.
//!
//! Each voter holds a register with a per-voter logical timestamp.
//! A newer vote replaces an older one; concurrent votes carry the same
//! timestamp and the numerically higher direction wins the tie
//! (up = 1 beats middle = 0 beats down = -1). The up/down tallies are
//! caches, recomputable from the votes.
//!
//! The voter is the particle, so a partial replica tallies only the
//! voters in its shard.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde::Serialize;

use crate::crdt::AffectedParticles;
use crate::crdt::Crdt;
use crate::crdt::CrdtUpdate;
use crate::crdt::Particle;
use crate::error::Result;
use crate::shard::ShardQuery;
use crate::txn::TxnView;

/// Direction of a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteDirection {
    Up,
    Middle,
    Down,
}

impl VoteDirection {
    /// Numeric weight of the direction; also the tie-break order.
    pub fn weight(&self) -> i64 {
        return match self {
            VoteDirection::Up => 1,
            VoteDirection::Middle => 0,
            VoteDirection::Down => -1,
        };
    }
}

impl Default for VoteDirection {
    fn default() -> VoteDirection {
        return VoteDirection::Middle;
    }
}

/// One voter's register: direction plus per-voter logical time.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Vote {
    direction: VoteDirection,
    timestamp: u64,
}

/// Counts up and down votes of voters of type `V`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "V: Serialize",
    deserialize = "V: serde::de::DeserializeOwned"
))]
pub struct VoteCounter<V: Particle> {
    votes: FxHashMap<V, Vote>,
    /// Tallies cached from `votes`.
    upvotes: u64,
    downvotes: u64,
}

impl<V: Particle> Default for VoteCounter<V> {
    fn default() -> VoteCounter<V> {
        return VoteCounter {
            votes: FxHashMap::default(),
            upvotes: 0,
            downvotes: 0,
        };
    }
}

/// Downstream effect of one vote.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "V: Serialize",
    deserialize = "V: serde::de::DeserializeOwned"
))]
pub struct VoteUpdate<V: Particle> {
    voter: V,
    direction: VoteDirection,
    timestamp: u64,
}

impl<V: Particle> VoteCounter<V> {
    /// The direction a voter currently votes, `Middle` if none.
    pub fn vote_of(&self, voter: &V) -> VoteDirection {
        return self.votes.get(voter).map(|v| v.direction).unwrap_or_default();
    }

    /// Upvotes minus downvotes over the materialized voters.
    pub fn score(&self) -> i64 {
        return self.upvotes as i64 - self.downvotes as i64;
    }

    /// Number of upvotes over the materialized voters.
    pub fn upvotes(&self) -> u64 {
        return self.upvotes;
    }

    /// Number of downvotes over the materialized voters.
    pub fn downvotes(&self) -> u64 {
        return self.downvotes;
    }

    /// Describe a vote by the given voter. The update carries the
    /// voter's next logical time; the state is not modified.
    pub fn prepare_vote(&self, voter: V, direction: VoteDirection) -> VoteUpdate<V> {
        let timestamp = self.votes.get(&voter).map(|v| v.timestamp).unwrap_or(0) + 1;
        return VoteUpdate {
            voter,
            direction,
            timestamp,
        };
    }

    /// Keep the cached tallies in step with a direction change.
    fn retally(&mut self, old: VoteDirection, new: VoteDirection) {
        if old == new {
            return;
        }
        match old {
            VoteDirection::Up => self.upvotes -= 1,
            VoteDirection::Down => self.downvotes -= 1,
            VoteDirection::Middle => {}
        }
        match new {
            VoteDirection::Up => self.upvotes += 1,
            VoteDirection::Down => self.downvotes += 1,
            VoteDirection::Middle => {}
        }
    }

    fn apply_vote(&mut self, voter: &V, direction: VoteDirection, timestamp: u64) {
        let old = self.votes.get(voter);
        if let Some(existing) = old {
            if existing.timestamp > timestamp {
                // The update is older than the current register.
                return;
            }
            if existing.timestamp == timestamp
                && existing.direction.weight() >= direction.weight()
            {
                // Concurrent vote: the higher direction wins the tie.
                return;
            }
        }
        let old_direction = old.map(|v| v.direction).unwrap_or_default();
        self.retally(old_direction, direction);
        self.votes.insert(
            voter.clone(),
            Vote {
                direction,
                timestamp,
            },
        );
    }
}

impl<V: Particle> CrdtUpdate<VoteCounter<V>> for VoteUpdate<V> {
    fn apply_to(&self, crdt: &mut VoteCounter<V>) {
        crdt.apply_vote(&self.voter, self.direction, self.timestamp);
    }

    fn affected_particles(&self) -> AffectedParticles<V> {
        return AffectedParticles::one(self.voter.clone());
    }
}

impl<V: Particle> Crdt for VoteCounter<V> {
    type Value = BTreeMap<V, VoteDirection>;
    type Particle = V;
    type Update = VoteUpdate<V>;

    fn value(&self) -> BTreeMap<V, VoteDirection> {
        return self
            .votes
            .iter()
            .map(|(voter, vote)| (voter.clone(), vote.direction))
            .collect();
    }

    fn particles(&self) -> Vec<V> {
        return self.votes.keys().cloned().collect();
    }

    fn copy_fraction(&self, particles: &FxHashSet<V>) -> VoteCounter<V> {
        let mut fraction = VoteCounter::default();
        for (voter, vote) in &self.votes {
            if particles.contains(voter) {
                fraction.retally(VoteDirection::Middle, vote.direction);
                fraction.votes.insert(voter.clone(), vote.clone());
            }
        }
        return fraction;
    }

    fn merge_same_version(&mut self, other: &VoteCounter<V>) {
        for (voter, vote) in &other.votes {
            if !self.votes.contains_key(voter) {
                // On overlap our copy wins: it may hold local changes.
                self.retally(VoteDirection::Middle, vote.direction);
                self.votes.insert(voter.clone(), vote.clone());
            }
        }
    }
}

/// Transaction-scoped operations on a vote counter view.
impl<V: Particle> TxnView<VoteCounter<V>> {
    /// Cast or change a vote.
    pub fn vote(&self, voter: V, direction: VoteDirection) -> Result<()> {
        self.fetch(&ShardQuery::particle(voter.clone()))?;
        return self.register_with(|counter, _| Some(counter.prepare_vote(voter, direction)));
    }

    /// The direction a voter currently votes.
    pub fn vote_of(&self, voter: &V) -> Result<VoteDirection> {
        self.fetch(&ShardQuery::particle(voter.clone()))?;
        return Ok(self.read(|counter| counter.vote_of(voter)));
    }

    /// Upvotes minus downvotes over the full set of voters.
    pub fn score(&self) -> Result<i64> {
        self.fetch(&ShardQuery::Full)?;
        return Ok(self.read(|counter| counter.score()));
    }
}
