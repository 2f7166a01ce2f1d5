//! Grouping of simultaneous updates.
//!
//! Two updates belong to the same batch when their footprints (the updated
//! variable plus everything downstream of it) overlap, directly or through
//! other updates. Each batch lists its affected variables once, in
//! topological order, so a shared dependent is recomputed once per batch.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::graph::ReactiveGraph;

/// A write of `value` to `variable`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub variable: String,
    pub value: serde_json::Value,
}

impl Update {
    pub fn new(variable: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            variable: variable.into(),
            value: value.into(),
        }
    }
}

/// Updates applied together, followed by one recomputation of each affected
/// variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    /// In submission order.
    pub updates: Vec<Update>,
    /// Union of the updates' dependents, each once, in topological order.
    pub affected_variables: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Batches {
    /// Ordered by the first submitted update of each batch.
    pub batches: Vec<Batch>,
}

impl Batches {
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// How many times `name` is recomputed across all batches.
    pub fn recomputations(&self, name: &str) -> usize {
        self.batches
            .iter()
            .filter(|b| b.affected_variables.iter().any(|v| v == name))
            .count()
    }
}

/// Group `updates` by overlapping footprints in `graph`.
///
/// Updates to variables the graph does not know have no dependents; they are
/// grouped only with other updates to the same name.
pub fn batch(updates: &[Update], graph: &ReactiveGraph) -> Batches {
    let mut sets = DisjointSets::new(updates.len());
    let mut owner: AHashMap<&str, usize> = AHashMap::new();
    for (i, update) in updates.iter().enumerate() {
        let footprint = std::iter::once(update.variable.as_str())
            .chain(graph.affected(&update.variable));
        for name in footprint {
            match owner.get(name) {
                Some(&j) => sets.union(i, j),
                None => {
                    owner.insert(name, i);
                }
            }
        }
    }

    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for i in 0..updates.len() {
        let root = sets.find(i);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(i),
            None => groups.push((root, vec![i])),
        }
    }

    let batches = groups
        .into_iter()
        .map(|(_, members)| {
            let mut affected: Vec<&str> = Vec::new();
            for &i in &members {
                for name in graph.affected(&updates[i].variable) {
                    if !affected.contains(&name) {
                        affected.push(name);
                    }
                }
            }
            affected.sort_by_key(|name| graph.rank(name).unwrap_or(usize::MAX));
            Batch {
                updates: members.iter().map(|&i| updates[i].clone()).collect(),
                affected_variables: affected.into_iter().map(str::to_string).collect(),
            }
        })
        .collect();

    Batches { batches }
}

struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Merge keeping the smaller index as root.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}
