//! # Parallel Export
//!
//! Writes one property value per internal node id back into a node store,
//! using a pool of workers that each own a disjoint contiguous id range.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │   PartitionPlanner: [0,n) → ranges     │
//! └────────────────────────────────────────┘
//!           │             │             │
//!           ▼             ▼             ▼
//!      Worker 0       Worker 1       Worker N
//!    (1 transaction) (1 transaction) (1 transaction)
//!           │             │             │
//!           └─────────────┴─────────────┘
//!                         │
//!               ┌─────────▼─────────┐
//!               │    ExportReport    │
//!               │ committed / failed │
//!               └───────────────────┘
//! ```
//!
//! Each partition commits or rolls back on its own. A failure in one partition
//! never stops its siblings; the aggregate report lists which ranges have to be
//! exported again. Writes are pure overwrites, so re-running only those ranges
//! yields the same end state as a clean run.

use crate::config::{ExportConfig, WORKER_THREAD_PREFIX};
use crate::dsu::ComponentLookup;
use crate::error::{ExportError, Result};
use crate::id_map::IdMapping;
use crate::model::{IdRange, NodeId, PropertyKeyId, PropertyValue};
use crate::partition::PartitionPlanner;
use crate::progress::ProgressTracker;
use crate::sink::{PropertySink, TransactionGuard};
use rayon::prelude::*;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Cooperative cancellation flag shared with export workers.
///
/// Workers check it before claiming a partition; an in-flight partition always
/// runs to commit or rollback.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Dedicated worker threads for exports.
///
/// Either built per export call or created once by the caller and injected
/// into several exporters.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("{WORKER_THREAD_PREFIX}-{i}"))
            .build()
            .map_err(|e| ExportError::WorkerPool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        Self::new(config.concurrency)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}

/// A partition whose transaction did not commit
#[derive(Debug)]
pub struct PartitionFailure {
    pub range: IdRange,
    pub error: ExportError,
}

/// Aggregate outcome of one export call. Ranges are ordered by start id.
#[derive(Debug, Default)]
pub struct ExportReport {
    /// Partitions whose transaction committed
    pub succeeded: Vec<IdRange>,
    /// Partitions that were rolled back, with the cause
    pub failed: Vec<PartitionFailure>,
    /// Partitions never claimed because the export was cancelled
    pub cancelled: Vec<IdRange>,
    /// Number of committed property writes
    pub writes_committed: u64,
    pub elapsed: Duration,
}

impl ExportReport {
    /// Every partition committed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    pub fn failed_ranges(&self) -> Vec<IdRange> {
        self.failed.iter().map(|f| f.range).collect()
    }

    /// Ranges that still have to be written: failed and cancelled
    pub fn retry_ranges(&self) -> Vec<IdRange> {
        let mut ranges = self.failed_ranges();
        ranges.extend_from_slice(&self.cancelled);
        ranges.sort_unstable();
        ranges
    }

    /// `Ok` if every partition committed, otherwise a
    /// [`ExportError::PartialFailure`] carrying this report.
    pub fn into_result(self) -> Result<ExportReport> {
        if self.is_complete() {
            return Ok(self);
        }
        Err(ExportError::PartialFailure {
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
            cancelled: self.cancelled.len(),
            report: Box::new(self),
        })
    }
}

enum PartitionOutcome {
    Committed { writes: u64 },
    Failed(ExportError),
    Cancelled,
}

/// Parallel write-back of per-node values.
///
/// The value for each node comes from a caller-supplied function, so the same
/// exporter serves any algorithm result (component roots, community labels,
/// ...) without dynamic dispatch on the per-node path.
pub struct ParallelExporter<'a, M: IdMapping> {
    id_mapping: &'a M,
    planner: PartitionPlanner,
    pool: Option<Arc<WorkerPool>>,
    cancellation: CancellationToken,
    progress_logging: bool,
}

impl<'a, M: IdMapping> ParallelExporter<'a, M> {
    pub fn new(id_mapping: &'a M) -> Self {
        Self::from_config(id_mapping, &ExportConfig::default())
    }

    pub fn from_config(id_mapping: &'a M, config: &ExportConfig) -> Self {
        Self {
            id_mapping,
            planner: PartitionPlanner::from_config(config),
            pool: None,
            cancellation: CancellationToken::new(),
            progress_logging: config.progress_logging,
        }
    }

    /// Number of workers (and upper bound on partitions)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.planner.worker_count = concurrency.max(1);
        self
    }

    pub fn with_min_batch_size(mut self, min_batch_size: usize) -> Self {
        self.planner.min_chunk_size = min_batch_size;
        self
    }

    /// Run on an existing pool instead of building one per call
    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_progress_logging(mut self, enabled: bool) -> Self {
        self.progress_logging = enabled;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn planner(&self) -> PartitionPlanner {
        self.planner
    }

    /// Partition plan for the full id space
    pub fn plan(&self) -> Vec<IdRange> {
        self.planner.divide(self.id_mapping.node_count())
    }

    /// Write `value_fn(i)` to `property_key` on the original node of every
    /// internal id `i` in `[0, node_count)`.
    ///
    /// Fails with [`ExportError::PartialFailure`] if any partition did not
    /// commit; committed partitions stay committed.
    pub fn export<S, F>(&self, sink: &S, property_key: &str, value_fn: F) -> Result<ExportReport>
    where
        S: PropertySink,
        F: Fn(NodeId) -> PropertyValue + Sync,
    {
        let ranges = self.plan();
        self.run(sink, property_key, ranges, &value_fn)?.into_result()
    }

    /// Export only the given ranges, each as one partition.
    ///
    /// Used to repair the ranges of a previous partial failure.
    pub fn export_ranges<S, F>(
        &self,
        sink: &S,
        property_key: &str,
        ranges: &[IdRange],
        value_fn: F,
    ) -> Result<ExportReport>
    where
        S: PropertySink,
        F: Fn(NodeId) -> PropertyValue + Sync,
    {
        let node_count = self.id_mapping.node_count();
        if let Some(range) = ranges.iter().find(|r| r.end as usize > node_count) {
            return Err(ExportError::OutOfRange {
                range: *range,
                node_count,
            });
        }
        let ranges: Vec<IdRange> = ranges.iter().copied().filter(|r| !r.is_empty()).collect();
        self.run(sink, property_key, ranges, &value_fn)?.into_result()
    }

    /// Write each node's component root (see [`ComponentLookup::find_no_opt`]).
    pub fn export_components<S, C>(
        &self,
        sink: &S,
        property_key: &str,
        components: &C,
    ) -> Result<ExportReport>
    where
        S: PropertySink,
        C: ComponentLookup,
    {
        self.check_node_count(components.node_count())?;
        self.export(sink, property_key, |id| {
            PropertyValue::from(components.find_no_opt(id))
        })
    }

    /// [`export_components`](Self::export_components) restricted to `ranges`
    pub fn export_component_ranges<S, C>(
        &self,
        sink: &S,
        property_key: &str,
        components: &C,
        ranges: &[IdRange],
    ) -> Result<ExportReport>
    where
        S: PropertySink,
        C: ComponentLookup,
    {
        self.check_node_count(components.node_count())?;
        self.export_ranges(sink, property_key, ranges, |id| {
            PropertyValue::from(components.find_no_opt(id))
        })
    }

    fn check_node_count(&self, source_len: usize) -> Result<()> {
        let mapping_len = self.id_mapping.node_count();
        if source_len != mapping_len {
            return Err(ExportError::NodeCountMismatch {
                source_len,
                mapping_len,
            });
        }
        Ok(())
    }

    #[instrument(
        skip_all,
        fields(property_key = %property_key, partitions = ranges.len()),
        level = "debug"
    )]
    fn run<S, F>(
        &self,
        sink: &S,
        property_key: &str,
        ranges: Vec<IdRange>,
        value_fn: &F,
    ) -> Result<ExportReport>
    where
        S: PropertySink,
        F: Fn(NodeId) -> PropertyValue + Sync,
    {
        let started = Instant::now();
        let key = sink.property_key_id(property_key)?;
        if ranges.is_empty() {
            return Ok(ExportReport {
                elapsed: started.elapsed(),
                ..ExportReport::default()
            });
        }

        let total: u64 = ranges.iter().map(|r| r.len() as u64).sum();
        let progress = ProgressTracker::new(total, self.progress_logging);

        let local_pool;
        let pool = match &self.pool {
            Some(pool) => pool.as_ref(),
            None => {
                local_pool = WorkerPool::new(self.planner.worker_count.min(ranges.len()))?;
                &local_pool
            }
        };

        let outcomes: Vec<(IdRange, PartitionOutcome)> = pool.install(|| {
            ranges
                .par_iter()
                .map(|range| {
                    let outcome = self.write_partition(sink, key, *range, value_fn, &progress);
                    (*range, outcome)
                })
                .collect()
        });

        let mut report = ExportReport::default();
        for (range, outcome) in outcomes {
            match outcome {
                PartitionOutcome::Committed { writes } => {
                    report.writes_committed += writes;
                    report.succeeded.push(range);
                }
                PartitionOutcome::Failed(error) => {
                    report.failed.push(PartitionFailure { range, error })
                }
                PartitionOutcome::Cancelled => report.cancelled.push(range),
            }
        }
        report.succeeded.sort_unstable();
        report.failed.sort_unstable_by_key(|f| f.range);
        report.cancelled.sort_unstable();
        report.elapsed = started.elapsed();

        info!(
            property_key,
            committed = report.succeeded.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            writes = report.writes_committed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "export finished"
        );
        Ok(report)
    }

    /// Write one partition inside one transaction, ascending by id.
    ///
    /// Progress only advances once the partition has committed.
    fn write_partition<S, F>(
        &self,
        sink: &S,
        key: PropertyKeyId,
        range: IdRange,
        value_fn: &F,
        progress: &ProgressTracker,
    ) -> PartitionOutcome
    where
        S: PropertySink,
        F: Fn(NodeId) -> PropertyValue + Sync,
    {
        if self.cancellation.is_cancelled() {
            debug!(%range, "skipping partition after cancellation");
            return PartitionOutcome::Cancelled;
        }

        let tx = match sink.open() {
            Ok(tx) => tx,
            Err(error) => {
                warn!(%range, %error, "failed to open partition transaction");
                return PartitionOutcome::Failed(error);
            }
        };
        let mut guard = TransactionGuard::new(tx);

        let mut current = NodeId(range.start);
        let written = catch_unwind(AssertUnwindSafe(|| -> Result<()> {
            for id in range.iter() {
                current = id;
                let value = value_fn(id);
                let original = self.id_mapping.to_original_node_id(id);
                guard.set_property(original, key, value)?;
            }
            Ok(())
        }));

        match written {
            Ok(Ok(())) => match guard.commit() {
                Ok(()) => {
                    progress.record(range.len() as u64);
                    debug!(%range, writes = range.len(), "partition committed");
                    PartitionOutcome::Committed {
                        writes: range.len() as u64,
                    }
                }
                Err(error) => {
                    warn!(%range, %error, "partition commit failed");
                    PartitionOutcome::Failed(error)
                }
            },
            Ok(Err(error)) => {
                guard.rollback();
                warn!(%range, node = %current, %error, "partition rolled back");
                PartitionOutcome::Failed(error)
            }
            Err(payload) => {
                guard.rollback();
                let message = panic_message(payload.as_ref());
                warn!(
                    %range,
                    node = %current,
                    panic = %message,
                    "worker panicked, partition rolled back"
                );
                PartitionOutcome::Failed(ExportError::WorkerPanic {
                    node: current,
                    message,
                })
            }
        }
    }
}

impl<'a, M: IdMapping> std::fmt::Debug for ParallelExporter<'a, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExporter")
            .field("node_count", &self.id_mapping.node_count())
            .field("planner", &self.planner)
            .field("pool", &self.pool)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsu::DisjointSetStruct;
    use crate::id_map::IdentityMapping;
    use crate::model::OriginalId;
    use crate::store::MemoryNodeStore;

    fn exporter(
        mapping: &IdentityMapping,
        workers: usize,
    ) -> ParallelExporter<'_, IdentityMapping> {
        ParallelExporter::new(mapping)
            .with_concurrency(workers)
            .with_min_batch_size(1)
            .with_progress_logging(false)
    }

    #[test]
    fn test_export_writes_every_id_once() {
        let mapping = IdentityMapping::new(1_000);
        let store = MemoryNodeStore::new();

        let report = exporter(&mapping, 4)
            .export(&store, "score", |id| PropertyValue(i64::from(id.0) * 2))
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.succeeded.len(), 4);
        assert_eq!(report.writes_committed, 1_000);
        let key = store.property_key_id("score").unwrap();
        let values = store.property_values(key);
        assert_eq!(values.len(), 1_000);
        for (node, value) in values {
            assert_eq!(value.0, node.0 as i64 * 2);
        }
        assert_eq!(store.stats().commits, 4);
    }

    #[test]
    fn test_export_components_scenario() {
        let mut dsu = DisjointSetStruct::new(6);
        dsu.union(NodeId(0), NodeId(1));
        dsu.union(NodeId(1), NodeId(2));
        dsu.union(NodeId(3), NodeId(4));
        let frozen = dsu.freeze();

        let mapping = IdentityMapping::new(6);
        let store = MemoryNodeStore::new();
        let report = exporter(&mapping, 3)
            .export_components(&store, "component", &frozen)
            .unwrap();
        assert_eq!(report.writes_committed, 6);

        let value = |i: u64| {
            store
                .get_property_by_name(OriginalId(i), "component")
                .unwrap()
        };
        assert_eq!(value(0), value(1));
        assert_eq!(value(1), value(2));
        assert_eq!(value(3), value(4));
        assert_ne!(value(0), value(3));
        assert_ne!(value(5), value(0));
        assert_ne!(value(5), value(3));
    }

    #[test]
    fn test_node_count_mismatch_fails_before_writing() {
        let dsu = DisjointSetStruct::new(5);
        let mapping = IdentityMapping::new(6);
        let store = MemoryNodeStore::new();
        let err = exporter(&mapping, 2)
            .export_components(&store, "component", &dsu)
            .unwrap_err();
        assert!(matches!(err, ExportError::NodeCountMismatch { .. }));
        assert_eq!(store.stats().commits, 0);
    }

    #[test]
    fn test_out_of_range_retry_rejected() {
        let mapping = IdentityMapping::new(10);
        let store = MemoryNodeStore::new();
        let err = exporter(&mapping, 2)
            .export_ranges(&store, "x", &[IdRange::new(5, 11)], |_| PropertyValue(0))
            .unwrap_err();
        assert!(matches!(err, ExportError::OutOfRange { .. }));
    }

    #[test]
    fn test_empty_graph() {
        let mapping = IdentityMapping::new(0);
        let store = MemoryNodeStore::new();
        let report = exporter(&mapping, 4)
            .export(&store, "component", |_| PropertyValue(0))
            .unwrap();
        assert!(report.is_complete());
        assert!(report.succeeded.is_empty());
        assert_eq!(report.writes_committed, 0);
    }

    #[test]
    fn test_panicking_value_function_is_isolated() {
        let mapping = IdentityMapping::new(100);
        let store = MemoryNodeStore::new();
        let err = exporter(&mapping, 4)
            .export(&store, "v", |id| {
                if id.0 == 30 {
                    panic!("bad node");
                }
                PropertyValue(1)
            })
            .unwrap_err();

        let report = err.report().unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].range, IdRange::new(25, 50));
        assert!(matches!(
            report.failed[0].error,
            ExportError::WorkerPanic { node: NodeId(30), .. }
        ));
        assert_eq!(report.succeeded.len(), 3);
        assert_eq!(store.property_count(), 75);
        assert_eq!(store.stats().open_transactions, 0);
    }

    #[test]
    fn test_progress_counts_committed_partitions_only() {
        let mapping = IdentityMapping::new(100);
        let store = MemoryNodeStore::new();
        let key = store.property_key_id("v").unwrap();
        let exporter = exporter(&mapping, 2);
        let progress = ProgressTracker::new(100, false);

        let failing = |id: NodeId| {
            if id.0 == 70 {
                panic!("bad node");
            }
            PropertyValue(1)
        };
        let outcome =
            exporter.write_partition(&store, key, IdRange::new(50, 100), &failing, &progress);
        assert!(matches!(outcome, PartitionOutcome::Failed(_)));
        assert_eq!(progress.processed(), 0);

        let outcome =
            exporter.write_partition(&store, key, IdRange::new(0, 50), &failing, &progress);
        assert!(matches!(outcome, PartitionOutcome::Committed { writes: 50 }));
        assert_eq!(progress.processed(), 50);
    }

    #[test]
    fn test_cancelled_before_start() {
        let mapping = IdentityMapping::new(100);
        let store = MemoryNodeStore::new();
        let exporter = exporter(&mapping, 4);
        exporter.cancellation_token().cancel();

        let err = exporter.export(&store, "v", |_| PropertyValue(1)).unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.cancelled.len(), 4);
        assert_eq!(report.retry_ranges().len(), 4);
        assert_eq!(store.property_count(), 0);
    }

    #[test]
    fn test_injected_pool_is_reused() {
        let pool = Arc::new(WorkerPool::new(2).unwrap());
        let mapping = IdentityMapping::new(50);
        let store = MemoryNodeStore::new();
        for key in ["a", "b"] {
            let report = exporter(&mapping, 2)
                .with_pool(Arc::clone(&pool))
                .export(&store, key, |id| PropertyValue(id.0.into()))
                .unwrap();
            assert_eq!(report.writes_committed, 50);
        }
        assert_eq!(pool.threads(), 2);
        assert_eq!(store.property_count(), 100);
    }
}
