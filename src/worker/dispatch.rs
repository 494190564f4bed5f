//! The batch scheduler: chunked dispatch, readiness multiplexing, and
//! streaming reassembly of classifier output.
//!
//! Each idle worker is handed a chunk of consecutive input paths in a single
//! pipe write, and the indices of those paths are queued against the worker.
//! The loop then blocks on readiness across every worker's read endpoint,
//! drains whatever arrived, and slots each newline-terminated output line at
//! the index recorded when its chunk was dispatched. Workers may finish in
//! any order; the result vector is deterministically in input order because
//! every line lands at its recorded index.

use std::collections::VecDeque;
use std::os::unix::io::{AsRawFd, BorrowedFd};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::unistd;
use tracing::trace;

use super::pool::WorkerPool;
use super::signals;
use crate::error::{PftError, Result};

/// Upper bound on the number of paths sent to a worker in one write.
///
/// Keeps each chunk well under the pipe buffer, so a dispatch never blocks
/// behind a worker that has yet to drain its input. Small batches are
/// additionally divided by the worker count so they do not all land on
/// worker 0.
pub(crate) const DEFAULT_CHUNK: usize = 50;

/// Bytes drained from a worker per read: one pipe buffer's worth.
const READ_BUF: usize = nix::libc::PIPE_BUF;

/// Classify `paths` across the pool, returning one type string per input
/// path, in input order.
pub(crate) fn run<S: AsRef<str>>(pool: &mut WorkerPool, paths: &[S]) -> Result<Vec<String>> {
    let total = paths.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    for path in paths {
        if path.as_ref().contains('\n') {
            return Err(PftError::PathWithNewline(path.as_ref().to_string()));
        }
    }
    if pool.is_empty() {
        return Err(PftError::PoolDown);
    }
    // Give every worker something to do; the readiness wait must not spin
    // on descriptors that will never produce output.
    if total < pool.len() {
        pool.resize(total)?;
    }

    let workers = pool.workers();
    let n = workers.len();
    let chunk = DEFAULT_CHUNK.min(total / n).max(1);

    let read_fds: Vec<BorrowedFd<'_>> = workers
        .iter()
        .map(|w| w.stdout_fd())
        .collect::<Option<Vec<_>>>()
        .ok_or(PftError::PoolDown)?;
    let write_fds: Vec<BorrowedFd<'_>> = workers
        .iter()
        .map(|w| w.stdin_fd())
        .collect::<Option<Vec<_>>>()
        .ok_or(PftError::PoolDown)?;

    // One slot per input path. Slots hold raw bytes until the batch
    // completes, so a UTF-8 sequence split across two reads cannot be
    // mangled mid-line.
    let mut slots: Vec<Vec<u8>> = vec![Vec::new(); total];
    // Indices dispatched to each worker whose lines have not come back yet.
    let mut pending: Vec<VecDeque<usize>> = (0..n).map(|_| VecDeque::new()).collect();
    let mut poll_fds: Vec<PollFd<'_>> = read_fds
        .iter()
        .map(|fd| PollFd::new(*fd, PollFlags::POLLIN))
        .collect();

    let mut to_write = 0usize;
    let mut remaining = total;

    while remaining > 0 {
        if signals::worker_died() {
            return Err(PftError::WorkerDied);
        }

        // Dispatch: hand a fresh chunk to every worker that has finished
        // its previous one.
        for i in 0..n {
            if to_write >= total {
                break;
            }
            if !pending[i].is_empty() {
                continue;
            }
            let end = total.min(to_write + chunk);
            let mut buf = Vec::with_capacity((end - to_write) * 64);
            for idx in to_write..end {
                buf.extend_from_slice(paths[idx].as_ref().as_bytes());
                buf.push(b'\n');
                pending[i].push_back(idx);
            }
            write_chunk(write_fds[i], &buf)?;
            trace!(worker = i, files = end - to_write, "dispatched chunk");
            to_write = end;
        }

        // Block until at least one worker has output for us.
        match poll(&mut poll_fds, PollTimeout::NONE) {
            Ok(_) => {}
            // Re-check worker liveness before waiting again.
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(PftError::PipeRead(e)),
        }

        // Collect: drain every readable worker, slotting completed lines at
        // the indices recorded at dispatch time. A worker that reports
        // readiness with nothing outstanding is skipped.
        for i in 0..n {
            if remaining == 0 {
                break;
            }
            if pending[i].is_empty() {
                continue;
            }
            let readable = poll_fds[i].revents().is_some_and(|r| {
                r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
            });
            if !readable {
                continue;
            }

            let mut buf = [0u8; READ_BUF];
            let count = read_retry(read_fds[i], &mut buf)?;
            if count == 0 {
                return Err(PftError::UnexpectedEof {
                    pending: pending[i].len(),
                });
            }
            absorb(&buf[..count], &mut pending[i], &mut slots, &mut remaining);
            trace!(worker = i, bytes = count, remaining, "drained worker output");
        }
    }

    Ok(slots
        .into_iter()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .collect())
}

/// Split newline-terminated lines out of `bytes`, appending each to the
/// result slot at the head of `pending` and consuming that head. Trailing
/// bytes after the last newline are a partial line; they are parked in the
/// slot they will complete into on a later read.
fn absorb(
    mut bytes: &[u8],
    pending: &mut VecDeque<usize>,
    slots: &mut [Vec<u8>],
    remaining: &mut usize,
) {
    while *remaining > 0 {
        let Some(pos) = bytes.iter().position(|&b| b == b'\n') else {
            break;
        };
        let Some(&idx) = pending.front() else {
            break;
        };
        slots[idx].extend_from_slice(&bytes[..pos]);
        pending.pop_front();
        *remaining -= 1;
        bytes = &bytes[pos + 1..];
    }
    if !bytes.is_empty()
        && let Some(&idx) = pending.front()
    {
        slots[idx].extend_from_slice(bytes);
    }
}

/// Write one chunk in full. The classifier drains its input promptly, so a
/// chunk-sized write never legitimately comes up short.
fn write_chunk(fd: BorrowedFd<'_>, buf: &[u8]) -> Result<()> {
    let written = loop {
        match unistd::write(fd, buf) {
            Ok(count) => break count,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(PftError::PipeWrite(e)),
        }
    };
    if written != buf.len() {
        return Err(PftError::ShortWrite {
            written,
            expected: buf.len(),
        });
    }
    Ok(())
}

fn read_retry(fd: BorrowedFd<'_>, buf: &mut [u8]) -> Result<usize> {
    loop {
        match unistd::read(fd.as_raw_fd(), buf) {
            Ok(count) => return Ok(count),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(PftError::PipeRead(e)),
        }
    }
}
