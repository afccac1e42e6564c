//! # dss-export
//!
//! Parallel write-back of union-find (connected components) results into a
//! transactional node store.
//!
//! The union-find structure is built single-threaded, frozen, and then read
//! concurrently by export workers. Each worker owns one contiguous range of
//! internal node ids and writes it inside its own transaction, so a failure
//! rolls back only that range and the rest of the export still commits.

pub mod config;
pub mod dsu;
pub mod error;
pub mod exporter;
pub mod id_map;
pub mod model;
pub mod partition;
pub mod persistence;
pub mod progress;
pub mod sink;
pub mod store;

// Re-export main types for convenience
pub use config::{ExportConfig, ExportOverrides};
pub use dsu::{ComponentLookup, Components, DisjointSetStruct, FrozenDisjointSet};
pub use error::{ExportError, Result};
pub use exporter::{CancellationToken, ExportReport, ParallelExporter, PartitionFailure, WorkerPool};
pub use id_map::{ArrayIdMap, IdMapping, IdentityMapping};
pub use model::{IdRange, NodeId, OriginalId, PropertyKeyId, PropertyValue};
pub use partition::{divide, PartitionPlanner};
pub use persistence::RocksNodeStore;
pub use sink::{PropertySink, SinkTransaction, TransactionGuard};
pub use store::MemoryNodeStore;

/// Write every node's component root to `property_key`, using `concurrency`
/// workers on a pool built for this call.
///
/// Returns the committed ranges on success. If any partition fails, the error
/// is [`ExportError::PartialFailure`] and carries the full report, including
/// the failed ranges and their causes.
pub fn export_components<M, C, S>(
    id_mapping: &M,
    components: &C,
    sink: &S,
    concurrency: usize,
    property_key: &str,
) -> Result<ExportReport>
where
    M: IdMapping,
    C: ComponentLookup,
    S: PropertySink,
{
    ParallelExporter::new(id_mapping)
        .with_concurrency(concurrency)
        .export_components(sink, property_key, components)
}

/// Write every node's component root to `config.write_property`, with the
/// worker count, batch size and progress logging taken from `config`.
pub fn export_with_config<M, C, S>(
    config: &ExportConfig,
    id_mapping: &M,
    components: &C,
    sink: &S,
) -> Result<ExportReport>
where
    M: IdMapping,
    C: ComponentLookup,
    S: PropertySink,
{
    ParallelExporter::from_config(id_mapping, config).export_components(
        sink,
        &config.write_property,
        components,
    )
}
