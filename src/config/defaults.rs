//! Default constants for export configuration.
//!
//! All magic numbers are centralized here with documentation.

// =============================================================================
// Worker Pool Defaults
// =============================================================================

/// Default number of export workers.
/// Uses the available hardware parallelism, falling back to 8.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(8)
}

/// Smallest partition handed to a worker.
/// Below this size the per-transaction overhead dominates the writes.
pub const DEFAULT_MIN_BATCH_SIZE: usize = 10_000;

/// Prefix for worker thread names
pub const WORKER_THREAD_PREFIX: &str = "dss-export";

// =============================================================================
// Write-back Defaults
// =============================================================================

/// Property written when the caller does not name one
pub const DEFAULT_WRITE_PROPERTY: &str = "partition";

/// Progress is logged every time this share of ids (in percent) is written
pub const PROGRESS_LOG_STEP_PERCENT: u64 = 10;

// =============================================================================
// Environment
// =============================================================================

/// Prefix for environment variable overrides, e.g. `DSS_EXPORT_CONCURRENCY=4`
pub const ENV_PREFIX: &str = "DSS_EXPORT_";
