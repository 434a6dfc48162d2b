//! Collapse verified pairs into disjoint duplicate groups.
//!
//! Items are mapped to a dense arena and joined with a union-find structure,
//! so no traversal depends on recursion depth.

use serde::{Deserialize, Serialize};

use super::verify::VerifiedPair;

/// Connected component of at least two items, members sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup<T> {
    members: Vec<T>,
}

impl<T> DuplicateGroup<T> {
    pub fn members(&self) -> &[T] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn try_map<U, E, F>(self, f: F) -> Result<DuplicateGroup<U>, E>
    where
        U: Ord,
        F: FnMut(T) -> Result<U, E>,
    {
        let mut members = self.members.into_iter().map(f).collect::<Result<Vec<U>, E>>()?;
        members.sort();
        Ok(DuplicateGroup { members })
    }
}

/// Parent-pointer forest with path compression and union by size.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Returns `false` when both were already in the same set.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }
}

/// Groups are ordered by their smallest member.
pub fn build_groups<T: Clone + Ord>(pairs: &[VerifiedPair<T>]) -> Vec<DuplicateGroup<T>> {
    let mut nodes: Vec<&T> = pairs
        .iter()
        .filter(|p| p.first != p.second)
        .flat_map(|p| [&p.first, &p.second])
        .collect();
    nodes.sort();
    nodes.dedup();

    let dense = |id: &T| nodes.binary_search(&id).ok();
    let mut sets = DisjointSet::new(nodes.len());
    for pair in pairs {
        if let (Some(a), Some(b)) = (dense(&pair.first), dense(&pair.second)) {
            sets.union(a, b);
        }
    }

    // Nodes are sorted, so walking them in order yields sorted members and
    // groups ordered by first appearance of their minimum.
    let mut slot_of_root = vec![usize::MAX; nodes.len()];
    let mut groups: Vec<Vec<T>> = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        let root = sets.find(i);
        if slot_of_root[root] == usize::MAX {
            slot_of_root[root] = groups.len();
            groups.push(Vec::new());
        }
        groups[slot_of_root[root]].push((*node).clone());
    }

    groups
        .into_iter()
        .filter(|members| members.len() >= 2)
        .map(|members| DuplicateGroup { members })
        .collect()
}
