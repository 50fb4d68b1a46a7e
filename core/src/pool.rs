//! The bounded worker pool shared by ingestion and detection.

use crate::error::{AnalysisError, AnalysisResult};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Build a pool with exactly `threads` workers.
pub fn worker_pool(threads: usize) -> AnalysisResult<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("cdr-worker-{i}"))
        .build()
        .map_err(|e| AnalysisError::Other(anyhow::anyhow!("Cannot build worker pool: {e}")))
}
