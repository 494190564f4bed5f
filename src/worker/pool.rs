//! Worker pool lifecycle.

use std::os::unix::io::RawFd;

use tracing::{debug, info};

use super::proc::Worker;
use super::signals;
use super::spawn::{WorkerConfig, spawn_worker};
use crate::error::{PftError, Result};

/// Fixed-size, ordered collection of classifier workers.
///
/// The pool is either fully up at its configured size or fully down; no
/// caller ever observes a partial pool. Resizing tears the old generation
/// down before the new one comes up.
pub struct WorkerPool {
    workers: Vec<Worker>,
    config: WorkerConfig,
}

impl WorkerPool {
    /// Create an empty pool. No processes start until [`spawn`].
    ///
    /// [`spawn`]: WorkerPool::spawn
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            workers: Vec::new(),
            config,
        }
    }

    /// Number of live workers; zero when the pool is down.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// The live workers, in pool order.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Bring `n` workers up in an empty pool.
    ///
    /// If any spawn fails, every worker created so far is torn down and the
    /// original failure is returned.
    pub fn spawn(&mut self, n: usize) -> Result<()> {
        debug_assert!(self.workers.is_empty());
        if n == 0 {
            return Err(PftError::InvalidParallelism(0));
        }
        signals::clear_worker_died();
        for _ in 0..n {
            let siblings: Vec<RawFd> = self
                .workers
                .iter()
                .flat_map(Worker::retained_raw_fds)
                .collect();
            match spawn_worker(&self.config, &siblings) {
                Ok(worker) => self.workers.push(worker),
                Err(e) => {
                    let _ = self.shutdown();
                    return Err(e);
                }
            }
        }
        info!(workers = n, program = %self.config.program, "worker pool ready");
        Ok(())
    }

    /// Close every worker's retained endpoints and reap the children.
    ///
    /// Safe to call on an empty pool. All workers are torn down even when a
    /// close fails; the first close error is reported.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.workers.is_empty() {
            return Ok(());
        }
        debug!(workers = self.workers.len(), "shutting down worker pool");
        let mut first_err = None;
        for mut worker in self.workers.drain(..) {
            if let Err(e) = worker.close_endpoints() {
                first_err.get_or_insert(e);
            }
            worker.reap();
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Tear the pool down and bring it back up with `n` workers.
    ///
    /// On failure the pool is left fully down, never at a partial size.
    /// That holds for a rejected argument too: a live pool survives no
    /// failed resize, not even `resize(0)`.
    pub fn resize(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            let _ = self.shutdown();
            return Err(PftError::InvalidParallelism(0));
        }
        self.shutdown()?;
        self.spawn(n)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn cat_config() -> WorkerConfig {
        WorkerConfig {
            program: "cat".to_string(),
            args: vec![],
        }
    }

    #[test]
    fn test_spawn_and_shutdown() {
        let mut pool = WorkerPool::new(cat_config());
        pool.spawn(3).unwrap();
        assert_eq!(pool.len(), 3);

        let pids: HashSet<_> = pool.workers().iter().map(|w| w.pid()).collect();
        assert_eq!(pids.len(), 3);

        pool.shutdown().unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_shutdown_of_empty_pool_is_ok() {
        let mut pool = WorkerPool::new(cat_config());
        pool.shutdown().unwrap();
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_resize_replaces_workers() {
        let mut pool = WorkerPool::new(cat_config());
        pool.spawn(2).unwrap();
        let old_pids: HashSet<_> = pool.workers().iter().map(|w| w.pid()).collect();

        pool.resize(4).unwrap();
        assert_eq!(pool.len(), 4);
        let new_pids: HashSet<_> = pool.workers().iter().map(|w| w.pid()).collect();
        assert!(old_pids.is_disjoint(&new_pids));

        pool.shutdown().unwrap();
    }

    #[test]
    fn test_zero_workers_is_invalid() {
        let mut pool = WorkerPool::new(cat_config());
        assert!(matches!(
            pool.resize(0),
            Err(PftError::InvalidParallelism(0))
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_resize_to_zero_tears_down_live_pool() {
        let mut pool = WorkerPool::new(cat_config());
        pool.spawn(3).unwrap();

        assert!(matches!(
            pool.resize(0),
            Err(PftError::InvalidParallelism(0))
        ));
        assert!(pool.is_empty());
    }
}
