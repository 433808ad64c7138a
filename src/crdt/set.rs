// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Add-wins observed-remove set.
//!
//! Each element maps to the set of update ids ("instances") that added
//! it and have not been removed. An add supersedes the instances it
//! observed; a remove tombstones only the instances it observed. The
//! consequence is the add-wins rule: a remove concurrent with an add
//! cannot have observed the add's instance, so the element survives.
//! A remove that causally follows the add observed its instance and
//! removes it.
//!
//! The element itself is the particle, so a partial replica holds the
//! instance sets of just the elements in its shard.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde::Serialize;

use crate::clocks::TripleTimestamp;
use crate::crdt::AffectedParticles;
use crate::crdt::Crdt;
use crate::crdt::CrdtUpdate;
use crate::crdt::Particle;
use crate::error::Result;
use crate::shard::ShardQuery;
use crate::txn::TxnView;

/// An add-wins set of elements of type `V`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "V: Serialize",
    deserialize = "V: serde::de::DeserializeOwned"
))]
pub struct AddWinsSet<V: Particle> {
    /// Live add instances per element. Entries are never empty: a
    /// fully removed element is absent from the map.
    elements: FxHashMap<V, FxHashSet<TripleTimestamp>>,
}

impl<V: Particle> Default for AddWinsSet<V> {
    fn default() -> AddWinsSet<V> {
        return AddWinsSet {
            elements: FxHashMap::default(),
        };
    }
}

/// Downstream effect of one add or remove.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "V: Serialize",
    deserialize = "V: serde::de::DeserializeOwned"
))]
pub enum AddWinsUpdate<V: Particle> {
    /// Add an instance of an element, superseding the instances the
    /// adder observed.
    Add {
        element: V,
        instance: TripleTimestamp,
        overwritten: FxHashSet<TripleTimestamp>,
    },
    /// Remove the instances of an element the remover observed.
    Remove {
        element: V,
        removed: FxHashSet<TripleTimestamp>,
    },
}

impl<V: Particle> AddWinsSet<V> {
    /// True if the element is present (has at least one live instance).
    pub fn contains(&self, element: &V) -> bool {
        return self.elements.contains_key(element);
    }

    /// Number of present elements.
    pub fn len(&self) -> usize {
        return self.elements.len();
    }

    /// True if no element is present.
    pub fn is_empty(&self) -> bool {
        return self.elements.is_empty();
    }

    /// Describe adding an element, observing the current instances.
    ///
    /// The state is not modified; the returned update carries the full
    /// effect and is applied through the downstream path like any
    /// remote update.
    pub fn prepare_add(&self, element: V, instance: TripleTimestamp) -> AddWinsUpdate<V> {
        let overwritten = self.elements.get(&element).cloned().unwrap_or_default();
        return AddWinsUpdate::Add {
            element,
            instance,
            overwritten,
        };
    }

    /// Describe removing an element. Returns `None` when the element
    /// is absent: there is nothing observed to remove.
    pub fn prepare_remove(&self, element: &V) -> Option<AddWinsUpdate<V>> {
        let removed = self.elements.get(element)?.clone();
        return Some(AddWinsUpdate::Remove {
            element: element.clone(),
            removed,
        });
    }

    fn apply_add(
        &mut self,
        element: &V,
        instance: &TripleTimestamp,
        overwritten: &FxHashSet<TripleTimestamp>,
    ) {
        let instances = self.elements.entry(element.clone()).or_default();
        instances.insert(instance.clone());
        instances.retain(|i| !overwritten.contains(i));
    }

    fn apply_remove(&mut self, element: &V, removed: &FxHashSet<TripleTimestamp>) {
        if let Some(instances) = self.elements.get_mut(element) {
            instances.retain(|i| !removed.contains(i));
            if instances.is_empty() {
                self.elements.remove(element);
            }
        }
    }
}

impl<V: Particle> CrdtUpdate<AddWinsSet<V>> for AddWinsUpdate<V> {
    fn apply_to(&self, crdt: &mut AddWinsSet<V>) {
        match self {
            AddWinsUpdate::Add {
                element,
                instance,
                overwritten,
            } => crdt.apply_add(element, instance, overwritten),
            AddWinsUpdate::Remove { element, removed } => crdt.apply_remove(element, removed),
        }
    }

    fn affected_particles(&self) -> AffectedParticles<V> {
        return match self {
            AddWinsUpdate::Add { element, .. } => AffectedParticles::one(element.clone()),
            AddWinsUpdate::Remove { element, .. } => AffectedParticles::one(element.clone()),
        };
    }
}

impl<V: Particle> Crdt for AddWinsSet<V> {
    type Value = BTreeSet<V>;
    type Particle = V;
    type Update = AddWinsUpdate<V>;

    fn value(&self) -> BTreeSet<V> {
        return self.elements.keys().cloned().collect();
    }

    fn particles(&self) -> Vec<V> {
        return self.elements.keys().cloned().collect();
    }

    fn copy_fraction(&self, particles: &FxHashSet<V>) -> AddWinsSet<V> {
        let elements = self
            .elements
            .iter()
            .filter(|(element, _)| particles.contains(element))
            .map(|(element, instances)| (element.clone(), instances.clone()))
            .collect();
        return AddWinsSet { elements };
    }

    fn merge_same_version(&mut self, other: &AddWinsSet<V>) {
        for (element, instances) in &other.elements {
            // On overlap our copy wins: it may hold local changes.
            self.elements
                .entry(element.clone())
                .or_insert_with(|| instances.clone());
        }
    }
}

/// Transaction-scoped operations on an add-wins set view.
///
/// Reads and writes fetch the touched element's particle first, so a
/// partial replica completes its state before deciding anything.
impl<V: Particle> TxnView<AddWinsSet<V>> {
    /// True if the element is in the set at this snapshot.
    pub fn lookup(&self, element: &V) -> Result<bool> {
        self.fetch(&ShardQuery::particle(element.clone()))?;
        return Ok(self.read(|set| set.contains(element)));
    }

    /// Add an element.
    pub fn add(&self, element: V) -> Result<()> {
        self.fetch(&ShardQuery::particle(element.clone()))?;
        return self.register_with(|set, ts| Some(set.prepare_add(element, ts)));
    }

    /// Add an element without observing its current instances.
    ///
    /// Skips the fetch, so it works on any shard, at the cost of not
    /// garbage-collecting the instances a plain `add` would supersede.
    pub fn add_blind(&self, element: V) -> Result<()> {
        return self.register_with(|_, ts| {
            Some(AddWinsUpdate::Add {
                element,
                instance: ts,
                overwritten: FxHashSet::default(),
            })
        });
    }

    /// Remove an element. A no-op when the element is absent.
    pub fn remove(&self, element: &V) -> Result<()> {
        self.fetch(&ShardQuery::particle(element.clone()))?;
        return self.register_with(|set, _| set.prepare_remove(element));
    }

    /// Every element present, after completing the local state.
    pub fn elements(&self) -> Result<BTreeSet<V>> {
        self.fetch(&ShardQuery::Full)?;
        return Ok(self.read(|set| set.value()));
    }
}
