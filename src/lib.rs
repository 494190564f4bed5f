//! pft - parallel file-type classification.
//!
//! Classifies batches of file paths by fanning them out to a pool of
//! long-lived `file(1)` worker processes. Each worker reads paths on its
//! stdin and writes one type description per line on its stdout; the
//! dispatcher multiplexes reads across the pool and reassembles the
//! interleaved byte streams back into input order. Pooling amortizes
//! process startup across batches, and the pipe fan-out overlaps the
//! classifiers' file I/O.
//!
//! The parent stays single-threaded: all concurrency lives in the worker
//! processes, and the dispatcher simply waits for readiness across their
//! pipes. No operation on [`Pft`] is reentrant or thread-safe; a context
//! must be driven from one thread.
//!
//! # Example
//!
//! ```no_run
//! use pft::Pft;
//!
//! let mut pft = Pft::new();
//! pft.init(4)?;
//! let types = pft.find_types(&["/bin/ls", "/etc/fstab"])?;
//! assert_eq!(types.len(), 2);
//! pft.done()?;
//! # Ok::<(), pft::PftError>(())
//! ```

mod error;
mod pipe;
mod stats;
mod worker;

pub use error::{PftError, Result};
pub use pipe::PipePair;
pub use stats::PftStats;
pub use worker::{FILE_FLAG_FLUSH, FILE_FLAG_STDIN, FILE_PROGRAM, Worker, WorkerConfig, WorkerPool};

use std::time::Instant;

use tracing::debug;

use worker::{dispatch, signals};

// Entry-point labels used in the last-error string.
const FUNC_INIT: &str = "pft_init";
const FUNC_SET_PARA: &str = "setParallelismLevel";
const FUNC_FIND_TYPES: &str = "pft_find_types";
const FUNC_DONE: &str = "pft_done";

/// The library context: one worker pool, its statistics, and the last-error
/// slot.
///
/// A failed entry point leaves the pool torn down; the caller must call
/// [`init`] or [`set_parallelism`] again before the next [`find_types`].
/// The statistics and error accessors never touch the pool.
///
/// [`init`]: Pft::init
/// [`set_parallelism`]: Pft::set_parallelism
/// [`find_types`]: Pft::find_types
pub struct Pft {
    pool: WorkerPool,
    stats: PftStats,
    last_error: String,
}

impl Pft {
    /// Create a context with the default `file(1)` classifier command.
    /// No workers start until [`init`].
    ///
    /// [`init`]: Pft::init
    pub fn new() -> Self {
        Self::with_config(WorkerConfig::default())
    }

    /// Create a context that runs a custom classifier command.
    pub fn with_config(config: WorkerConfig) -> Self {
        Self {
            pool: WorkerPool::new(config),
            stats: PftStats::default(),
            last_error: String::new(),
        }
    }

    /// Bring the pool up with `n` workers.
    ///
    /// Clears statistics and the last-error slot and installs the
    /// worker-death signal handler before spawning.
    pub fn init(&mut self, n: usize) -> Result<()> {
        self.stats.clear();
        self.last_error.clear();
        signals::install();
        self.apply_parallelism(n)
            .map_err(|e| self.fail(FUNC_INIT, e))
    }

    /// Replace the pool with one of `n` workers.
    pub fn set_parallelism(&mut self, n: usize) -> Result<()> {
        self.apply_parallelism(n)
            .map_err(|e| self.fail(FUNC_SET_PARA, e))
    }

    /// Classify every path in `paths`, returning one type string per path,
    /// in input order.
    ///
    /// An empty batch succeeds trivially without touching the pool or the
    /// statistics. If the batch is smaller than the pool, the pool is
    /// resized down to the batch size so no worker sits idle; the new size
    /// is visible through [`parallelism`] afterwards.
    ///
    /// [`parallelism`]: Pft::parallelism
    pub fn find_types<S: AsRef<str>>(&mut self, paths: &[S]) -> Result<Vec<String>> {
        let start = Instant::now();
        match dispatch::run(&mut self.pool, paths) {
            Ok(types) => {
                if !types.is_empty() {
                    let elapsed = start.elapsed();
                    self.stats.record(types.len(), elapsed);
                    debug!(
                        files = types.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "classification batch complete"
                    );
                }
                Ok(types)
            }
            Err(e) => {
                let _ = self.pool.shutdown();
                Err(self.fail(FUNC_FIND_TYPES, e))
            }
        }
    }

    /// Current cumulative statistics.
    pub fn stats(&self) -> PftStats {
        self.stats
    }

    /// Reset both statistics counters to zero.
    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// The most recent failure, formatted `"<function>: <reason>"`.
    /// Empty when no entry point has failed since the last [`init`].
    ///
    /// [`init`]: Pft::init
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Number of live workers; zero when the pool is down.
    pub fn parallelism(&self) -> usize {
        self.pool.len()
    }

    /// Tear the pool down and reap every worker.
    ///
    /// Safe to call repeatedly; tearing down an already-down pool succeeds.
    pub fn done(&mut self) -> Result<()> {
        self.pool
            .shutdown()
            .map_err(|e| self.fail(FUNC_DONE, e))
    }

    // The pool itself guarantees that a failed resize leaves it fully down;
    // a caller that saw a failure can never assume live workers.
    fn apply_parallelism(&mut self, n: usize) -> Result<()> {
        self.pool.resize(n)
    }

    fn fail(&mut self, func: &str, err: PftError) -> PftError {
        self.last_error = format!("{func}: {err}");
        err
    }
}

impl Default for Pft {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat_context() -> Pft {
        Pft::with_config(WorkerConfig {
            program: "cat".to_string(),
            args: vec![],
        })
    }

    #[test]
    fn test_init_zero_sets_prefixed_error() {
        let mut pft = cat_context();
        assert!(pft.init(0).is_err());
        assert!(pft.last_error().starts_with("pft_init: "));
        assert_eq!(pft.parallelism(), 0);
    }

    #[test]
    fn test_set_parallelism_zero_sets_prefixed_error() {
        let mut pft = cat_context();
        pft.init(2).unwrap();
        assert!(pft.set_parallelism(0).is_err());
        assert!(pft.last_error().starts_with("setParallelismLevel: "));
        // A failed call never leaves a partial pool behind.
        assert_eq!(pft.parallelism(), 0);
        pft.done().unwrap();
    }

    #[test]
    fn test_find_types_without_init_fails() {
        let mut pft = cat_context();
        assert!(pft.find_types(&["/tmp/x"]).is_err());
        assert!(pft.last_error().starts_with("pft_find_types: "));
    }

    #[test]
    fn test_init_clears_previous_error() {
        let mut pft = cat_context();
        assert!(pft.init(0).is_err());
        pft.init(1).unwrap();
        assert!(pft.last_error().is_empty());
        pft.done().unwrap();
    }

    #[test]
    fn test_done_is_idempotent() {
        let mut pft = cat_context();
        pft.init(2).unwrap();
        pft.done().unwrap();
        pft.done().unwrap();
        assert_eq!(pft.parallelism(), 0);
    }

    #[test]
    fn test_empty_batch_without_stats_delta() {
        let mut pft = cat_context();
        pft.init(2).unwrap();
        let types = pft.find_types(&[] as &[&str]).unwrap();
        assert!(types.is_empty());
        assert_eq!(pft.stats().file_num, 0);
        pft.done().unwrap();
    }
}
