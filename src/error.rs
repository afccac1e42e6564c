//! Error types for dss-export
//!
//! Errors are captured at the partition boundary: a write or transaction
//! failure rolls back only the owning partition and is reported in the
//! aggregate [`ExportReport`](crate::exporter::ExportReport).

use crate::model::{IdRange, NodeId, OriginalId, PropertyKeyId};
use thiserror::Error;

/// Result alias used by the sink and exporter APIs
pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Error, Debug)]
pub enum ExportError {
    /// The sink rejected a single property write
    #[error("write of {key} on node {node} rejected: {reason}")]
    Write {
        node: OriginalId,
        key: PropertyKeyId,
        reason: String,
    },

    /// Opening or committing a partition transaction failed
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The property key name could not be resolved to a storage token
    #[error("cannot resolve property key '{name}': {reason}")]
    PropertyKey { name: String, reason: String },

    /// The value source does not cover the id mapping
    #[error("node count mismatch: value source has {source_len} nodes, id mapping has {mapping_len}")]
    NodeCountMismatch { source_len: usize, mapping_len: usize },

    /// Requested range reaches past the mapped node count
    #[error("range {range} exceeds node count {node_count}")]
    OutOfRange { range: IdRange, node_count: usize },

    /// The worker pool could not be built
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// A worker panicked while processing a partition
    #[error("worker panicked at node {node}: {message}")]
    WorkerPanic { node: NodeId, message: String },

    /// At least one partition did not commit
    #[error("export incomplete: {failed} partition(s) failed, {cancelled} cancelled, {succeeded} committed")]
    PartialFailure {
        succeeded: usize,
        failed: usize,
        cancelled: usize,
        report: Box<crate::exporter::ExportReport>,
    },

    /// RocksDB errors
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Encoding or decoding a stored value failed
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

impl ExportError {
    pub fn write(node: OriginalId, key: PropertyKeyId, reason: impl Into<String>) -> Self {
        Self::Write {
            node,
            key,
            reason: reason.into(),
        }
    }

    pub fn transaction(reason: impl Into<String>) -> Self {
        Self::Transaction(reason.into())
    }

    /// Whether re-running the affected range can succeed.
    ///
    /// Writes are pure overwrites keyed by node, so a range that failed on
    /// I/O can be exported again without changing the end state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Write { .. }
                | Self::Transaction(_)
                | Self::Storage(_)
                | Self::WorkerPanic { .. }
                | Self::PartialFailure { .. }
        )
    }

    /// The aggregate report carried by a partial failure
    pub fn report(&self) -> Option<&crate::exporter::ExportReport> {
        match self {
            Self::PartialFailure { report, .. } => Some(report),
            _ => None,
        }
    }
}
