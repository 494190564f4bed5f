//! Error types for pft.

use nix::errno::Errno;
use thiserror::Error;

/// Main error type for pft.
///
/// OS-level failures carry the `errno` reported by the kernel. Every entry
/// point on [`crate::Pft`] additionally records the failure in the context's
/// last-error slot, prefixed with the entry point's label.
#[derive(Error, Debug)]
pub enum PftError {
    #[error("Invalid parallelism level: {0}")]
    InvalidParallelism(usize),

    #[error("Failed to create pipe: {0}")]
    PipeCreate(#[source] Errno),

    #[error("Fork failed: {0}")]
    Fork(#[source] Errno),

    #[error("Failed to redirect a standard descriptor: {0}")]
    Redirect(#[source] Errno),

    #[error("Failed to close a descriptor: {0}")]
    Close(#[source] Errno),

    #[error("Failed to exec the classifier program: {0}")]
    Exec(#[source] Errno),

    #[error("Pipe read failed: {0}")]
    PipeRead(#[source] Errno),

    #[error("Pipe write failed: {0}")]
    PipeWrite(#[source] Errno),

    #[error("Short write to worker: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Worker closed its pipe with {pending} classifications outstanding")]
    UnexpectedEof { pending: usize },

    #[error("A worker process died unexpectedly")]
    WorkerDied,

    #[error("Worker pool is not running")]
    PoolDown,

    #[error("Path contains an embedded newline: {0:?}")]
    PathWithNewline(String),
}

/// Result type alias for pft operations.
pub type Result<T> = std::result::Result<T, PftError>;
