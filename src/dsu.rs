//! # Disjoint Set Union (DSU)
//!
//! Array-backed union-find forest over dense internal node ids `[0, n)`.
//!
//! The structure has two phases:
//! - **Construction**: a single owner calls [`DisjointSetStruct::union`] and the
//!   path-compressing [`DisjointSetStruct::find`], both of which take `&mut self`.
//! - **Frozen**: after the last union the structure is only read, either through
//!   `&DisjointSetStruct` (where only [`DisjointSetStruct::find_no_opt`] is
//!   reachable) or by consuming it with [`DisjointSetStruct::freeze`].
//!   Many export workers may call `find_no_opt` concurrently in this phase.
//!
//! Ids outside `[0, n)` are a caller bug and panic.

use crate::model::NodeId;
use rustc_hash::FxHashMap;

/// Read-only root lookup shared by export workers.
pub trait ComponentLookup: Sync {
    /// Number of elements tracked by the structure
    fn node_count(&self) -> usize;

    /// Root of `id`'s set without mutating the forest
    fn find_no_opt(&self, id: NodeId) -> NodeId;
}

/// Union-find forest with union by size and path compression.
#[derive(Debug, Clone)]
pub struct DisjointSetStruct {
    /// Parent pointers; `parent[r] == r` for roots
    parent: Vec<u32>,
    /// Set sizes, only meaningful at roots
    size: Vec<u32>,
    /// Current number of disjoint sets
    set_count: usize,
}

impl DisjointSetStruct {
    /// Create `n` singleton sets.
    pub fn new(n: usize) -> Self {
        assert!(
            n <= u32::MAX as usize,
            "disjoint set capacity {n} exceeds u32 id space"
        );
        Self {
            parent: (0..n as u32).collect(),
            size: vec![1; n],
            set_count: n,
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Number of disjoint sets
    pub fn set_count(&self) -> usize {
        self.set_count
    }

    #[inline]
    fn check(&self, id: NodeId) {
        assert!(
            id.index() < self.parent.len(),
            "node id {} out of range [0, {})",
            id.0,
            self.parent.len()
        );
    }

    /// Find the root of `id`, re-linking every node on the walked path
    /// directly to the root.
    pub fn find(&mut self, id: NodeId) -> NodeId {
        self.check(id);
        let root = walk_to_root(&self.parent, id.0);

        // Second pass: point the whole path at the root
        let mut current = id.0;
        while current != root {
            let next = self.parent[current as usize];
            self.parent[current as usize] = root;
            current = next;
        }

        NodeId(root)
    }

    /// Find the root of `id` without path compression.
    ///
    /// Always returns the same root as [`find`](Self::find) would at this point.
    #[inline]
    pub fn find_no_opt(&self, id: NodeId) -> NodeId {
        self.check(id);
        NodeId(walk_to_root(&self.parent, id.0))
    }

    /// Merge the sets containing `a` and `b`.
    ///
    /// The smaller tree is attached under the root of the larger one; on equal
    /// sizes `b`'s root goes under `a`'s. Returns `false` if they were already
    /// in the same set.
    pub fn union(&mut self, a: NodeId, b: NodeId) -> bool {
        let mut root_a = self.find(a).0;
        let mut root_b = self.find(b).0;
        if root_a == root_b {
            return false;
        }

        if self.size[root_a as usize] < self.size[root_b as usize] {
            std::mem::swap(&mut root_a, &mut root_b);
        }
        self.parent[root_b as usize] = root_a;
        self.size[root_a as usize] += self.size[root_b as usize];
        self.set_count -= 1;
        true
    }

    /// Check if two ids are in the same set (compressing).
    pub fn connected(&mut self, a: NodeId, b: NodeId) -> bool {
        self.find(a) == self.find(b)
    }

    /// Size of the set containing `id`
    pub fn set_size(&self, id: NodeId) -> usize {
        let root = self.find_no_opt(id);
        self.size[root.index()] as usize
    }

    /// Compress every path so that each parent pointer is a root.
    pub fn flatten(&mut self) {
        for i in 0..self.parent.len() as u32 {
            self.find(NodeId(i));
        }
    }

    /// End the construction phase.
    ///
    /// Paths are fully compressed before freezing, so every lookup on the
    /// frozen structure resolves in a single hop.
    pub fn freeze(mut self) -> FrozenDisjointSet {
        self.flatten();
        FrozenDisjointSet {
            parent: self.parent.into_boxed_slice(),
            size: self.size.into_boxed_slice(),
            set_count: self.set_count,
        }
    }

    /// Group all ids by their root.
    pub fn components(&self) -> Components {
        group_components(&self.parent)
    }
}

impl ComponentLookup for DisjointSetStruct {
    fn node_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn find_no_opt(&self, id: NodeId) -> NodeId {
        DisjointSetStruct::find_no_opt(self, id)
    }
}

/// Immutable union-find result, safe to share across export workers.
#[derive(Debug, Clone)]
pub struct FrozenDisjointSet {
    parent: Box<[u32]>,
    size: Box<[u32]>,
    set_count: usize,
}

impl FrozenDisjointSet {
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn set_count(&self) -> usize {
        self.set_count
    }

    #[inline]
    pub fn find_no_opt(&self, id: NodeId) -> NodeId {
        assert!(
            id.index() < self.parent.len(),
            "node id {} out of range [0, {})",
            id.0,
            self.parent.len()
        );
        NodeId(walk_to_root(&self.parent, id.0))
    }

    pub fn set_size(&self, id: NodeId) -> usize {
        let root = self.find_no_opt(id);
        self.size[root.index()] as usize
    }

    pub fn components(&self) -> Components {
        group_components(&self.parent)
    }
}

impl ComponentLookup for FrozenDisjointSet {
    fn node_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn find_no_opt(&self, id: NodeId) -> NodeId {
        FrozenDisjointSet::find_no_opt(self, id)
    }
}

#[inline]
fn walk_to_root(parent: &[u32], start: u32) -> u32 {
    let mut current = start;
    loop {
        let next = parent[current as usize];
        if next == current {
            return current;
        }
        current = next;
    }
}

fn group_components(parent: &[u32]) -> Components {
    let mut by_root: FxHashMap<u32, Vec<NodeId>> = FxHashMap::default();
    for i in 0..parent.len() as u32 {
        let root = walk_to_root(parent, i);
        by_root.entry(root).or_default().push(NodeId(i));
    }

    let mut components: Vec<Component> = by_root
        .into_iter()
        .map(|(root, members)| Component {
            root: NodeId(root),
            members,
        })
        .collect();
    components.sort_by_key(|c| c.root);
    Components { components }
}

/// A single set of the forest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Root identifying the set
    pub root: NodeId,
    /// Members in ascending id order
    pub members: Vec<NodeId>,
}

impl Component {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.members.binary_search(&id).is_ok()
    }
}

/// All sets of a forest, ordered by root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Components {
    components: Vec<Component>,
}

impl Components {
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// Look up the set identified by `root`
    pub fn component_of(&self, root: NodeId) -> Option<&Component> {
        self.components
            .binary_search_by_key(&root, |c| c.root)
            .ok()
            .map(|idx| &self.components[idx])
    }
}
