//! # Data Model
//!
//! Identifier newtypes shared by the union-find structure, the id mapping,
//! the partition planner and the write-back sinks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense internal node identifier in `[0, n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Sparse, storage-assigned node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OriginalId(pub u64);

impl fmt::Display for OriginalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Storage token for a property key name, resolved once per export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyKeyId(pub u32);

impl fmt::Display for PropertyKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K{}", self.0)
    }
}

/// Integer property value written per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyValue(pub i64);

impl From<NodeId> for PropertyValue {
    fn from(id: NodeId) -> Self {
        PropertyValue(i64::from(id.0))
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open range `[start, end)` of internal node ids.
///
/// One range is owned by exactly one export worker for the lifetime of a
/// single export call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdRange {
    pub start: u32,
    pub end: u32,
}

impl IdRange {
    /// Create a new range. Panics if `start > end`.
    pub fn new(start: u32, end: u32) -> Self {
        assert!(start <= end, "invalid id range [{start}, {end})");
        Self { start, end }
    }

    /// Number of ids covered by the range
    #[inline]
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        id.0 >= self.start && id.0 < self.end
    }

    /// Ids of the range in ascending order
    pub fn iter(&self) -> impl Iterator<Item = NodeId> {
        (self.start..self.end).map(NodeId)
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_range_basics() {
        let range = IdRange::new(3, 7);
        assert_eq!(range.len(), 4);
        assert!(!range.is_empty());
        assert!(range.contains(NodeId(3)));
        assert!(!range.contains(NodeId(7)));
        let ids: Vec<u32> = range.iter().map(|id| id.0).collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
        assert_eq!(range.to_string(), "[3, 7)");
    }

    #[test]
    fn test_empty_range() {
        let range = IdRange::new(5, 5);
        assert!(range.is_empty());
        assert_eq!(range.iter().count(), 0);
    }

    #[test]
    #[should_panic(expected = "invalid id range")]
    fn test_inverted_range_panics() {
        let _ = IdRange::new(4, 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeId(12).to_string(), "N12");
        assert_eq!(OriginalId(99).to_string(), "#99");
        assert_eq!(PropertyValue::from(NodeId(4)), PropertyValue(4));
    }
}
