//! # Partition Planning
//!
//! Splits the internal id space `[0, n)` into contiguous, disjoint ranges, one
//! per export worker. Partitions never overlap, so workers need no locks
//! between them.
//!
//! ```text
//! n = 10, workers = 4, min_chunk = 1
//!
//! [0,2) [2,4) [4,6) [6,10)
//!                   └─ last range absorbs the remainder
//! ```

use crate::config::ExportConfig;
use crate::model::IdRange;

/// Partition planner configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlanner {
    /// Number of workers the plan is sized for
    pub worker_count: usize,
    /// Smallest range handed to a worker (except when `n` itself is smaller)
    pub min_chunk_size: usize,
}

impl PartitionPlanner {
    pub fn new(worker_count: usize, min_chunk_size: usize) -> Self {
        Self {
            worker_count,
            min_chunk_size,
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.concurrency, config.min_batch_size)
    }

    pub fn divide(&self, n: usize) -> Vec<IdRange> {
        divide(n, self.worker_count, self.min_chunk_size)
    }
}

/// Chunk size for splitting `n` ids over `worker_count` workers.
pub fn chunk_size(n: usize, worker_count: usize, min_chunk_size: usize) -> usize {
    let workers = worker_count.max(1);
    (n / workers).max(min_chunk_size.max(1))
}

/// Split `[0, n)` into at most `worker_count` contiguous ranges.
///
/// All ranges but the last have exactly [`chunk_size`] ids; the last one runs
/// to `n`. If `n` is small compared to `worker_count`, fewer (larger) ranges
/// are produced instead of empty or sub-minimum ones.
pub fn divide(n: usize, worker_count: usize, min_chunk_size: usize) -> Vec<IdRange> {
    assert!(
        n <= u32::MAX as usize,
        "id space {n} exceeds u32 node ids"
    );
    if n == 0 {
        return Vec::new();
    }

    let workers = worker_count.max(1);
    let chunk = chunk_size(n, workers, min_chunk_size);
    let count = (n / chunk).clamp(1, workers);

    let mut ranges = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * chunk;
        let end = if i + 1 == count { n } else { start + chunk };
        ranges.push(IdRange::new(start as u32, end as u32));
    }
    ranges
}
