//! # Id Mapping
//!
//! Translation between dense internal node ids and storage ids. Mappings are
//! read-only once built and are queried concurrently by every export worker.

use crate::model::{NodeId, OriginalId};
use rustc_hash::FxHashMap;

/// Deterministic, read-only translation from internal to original node ids.
pub trait IdMapping: Send + Sync {
    fn to_original_node_id(&self, id: NodeId) -> OriginalId;

    fn to_mapped_node_id(&self, original: OriginalId) -> Option<NodeId>;

    /// Number of mapped nodes; internal ids are `[0, node_count)`
    fn node_count(&self) -> usize;
}

/// Mapping where the original id equals the internal id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityMapping {
    node_count: usize,
}

impl IdentityMapping {
    pub fn new(node_count: usize) -> Self {
        Self { node_count }
    }
}

impl IdMapping for IdentityMapping {
    #[inline]
    fn to_original_node_id(&self, id: NodeId) -> OriginalId {
        OriginalId(u64::from(id.0))
    }

    fn to_mapped_node_id(&self, original: OriginalId) -> Option<NodeId> {
        (original.0 < self.node_count as u64).then(|| NodeId(original.0 as u32))
    }

    fn node_count(&self) -> usize {
        self.node_count
    }
}

/// Array-backed mapping built from a sequence of storage ids.
///
/// Internal ids are assigned in first-seen order; duplicates are ignored.
#[derive(Debug, Clone, Default)]
pub struct ArrayIdMap {
    forward: Vec<OriginalId>,
    reverse: FxHashMap<OriginalId, NodeId>,
}

impl ArrayIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            forward: Vec::with_capacity(capacity),
            reverse: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Map `original`, returning its internal id (existing or newly assigned).
    pub fn add(&mut self, original: OriginalId) -> NodeId {
        if let Some(&id) = self.reverse.get(&original) {
            return id;
        }
        let id = NodeId(self.forward.len() as u32);
        self.forward.push(original);
        self.reverse.insert(original, id);
        id
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

impl FromIterator<OriginalId> for ArrayIdMap {
    fn from_iter<I: IntoIterator<Item = OriginalId>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = Self::with_capacity(iter.size_hint().0);
        for original in iter {
            map.add(original);
        }
        map
    }
}

impl IdMapping for ArrayIdMap {
    /// Panics if `id` was never assigned.
    #[inline]
    fn to_original_node_id(&self, id: NodeId) -> OriginalId {
        self.forward[id.index()]
    }

    fn to_mapped_node_id(&self, original: OriginalId) -> Option<NodeId> {
        self.reverse.get(&original).copied()
    }

    fn node_count(&self) -> usize {
        self.forward.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_mapping() {
        let mapping = IdentityMapping::new(3);
        assert_eq!(mapping.to_original_node_id(NodeId(2)), OriginalId(2));
        assert_eq!(mapping.to_mapped_node_id(OriginalId(2)), Some(NodeId(2)));
        assert_eq!(mapping.to_mapped_node_id(OriginalId(3)), None);
        assert_eq!(mapping.node_count(), 3);
    }

    #[test]
    fn test_array_id_map_dedup_and_order() {
        let mapping: ArrayIdMap = [900, 17, 900, 4_000_000_000]
            .into_iter()
            .map(OriginalId)
            .collect();

        assert_eq!(mapping.node_count(), 3);
        assert_eq!(mapping.to_original_node_id(NodeId(0)), OriginalId(900));
        assert_eq!(mapping.to_original_node_id(NodeId(1)), OriginalId(17));
        assert_eq!(
            mapping.to_original_node_id(NodeId(2)),
            OriginalId(4_000_000_000)
        );
        assert_eq!(mapping.to_mapped_node_id(OriginalId(17)), Some(NodeId(1)));
        assert_eq!(mapping.to_mapped_node_id(OriginalId(18)), None);
    }

    #[test]
    fn test_round_trip_all_ids() {
        let mapping: ArrayIdMap = (0..100u64).map(|i| OriginalId(i * 7 + 3)).collect();
        for i in 0..100u32 {
            let original = mapping.to_original_node_id(NodeId(i));
            assert_eq!(mapping.to_mapped_node_id(original), Some(NodeId(i)));
        }
    }
}
