//! Classifier worker processes and the scheduler that feeds them.
//!
//! Each worker is one running classifier process plus the two pipes that
//! connect it to the parent:
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │  Parent process  │
//!                  │   (dispatcher)   │
//!                  └────────┬─────────┘
//!              paths ↓      │      ↑ type lines
//!            ┌──────────────┼──────────────┐
//!            │              │              │
//!      ┌─────▼─────┐  ┌─────▼─────┐  ┌─────▼─────┐
//!      │ Worker 0  │  │ Worker 1  │  │ Worker N  │
//!      │  file(1)  │  │  file(1)  │  │  file(1)  │
//!      └───────────┘  └───────────┘  └───────────┘
//! ```
//!
//! The parent is single-threaded and cooperative: the only blocking points
//! are the readiness poll and the per-worker pipe reads and writes. The only
//! cross-process signaling is SIGUSR1, raised at the parent by a child whose
//! pipe redirection or exec failed.

pub(crate) mod dispatch;
mod pool;
mod proc;
pub(crate) mod signals;
mod spawn;

pub use pool::WorkerPool;
pub use proc::Worker;
pub use spawn::{FILE_FLAG_FLUSH, FILE_FLAG_STDIN, FILE_PROGRAM, WorkerConfig};
