//! Process handle for classifier workers.

use std::os::unix::io::{BorrowedFd, RawFd};

use nix::sys::signal::{self, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;

use crate::error::Result;
use crate::pipe::PipePair;

/// Handle to one classifier subprocess and the two pipes connecting it to
/// the parent.
///
/// After spawn the parent retains the write end of `input` and the read end
/// of `output`; the child holds the opposite endpoints as its stdin and
/// stdout. Closing the retained write end EOF-terminates the child's stdin,
/// which makes a well-behaved classifier exit on its own.
pub struct Worker {
    pid: Pid,
    input: PipePair,
    output: PipePair,
    reaped: bool,
}

impl Worker {
    pub(crate) fn new(pid: Pid, input: PipePair, output: PipePair) -> Self {
        Self {
            pid,
            input,
            output,
            reaped: false,
        }
    }

    /// The worker's process ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Parent-side write end feeding the worker's stdin.
    pub fn stdin_fd(&self) -> Option<BorrowedFd<'_>> {
        self.input.write_fd()
    }

    /// Parent-side read end draining the worker's stdout.
    pub fn stdout_fd(&self) -> Option<BorrowedFd<'_>> {
        self.output.read_fd()
    }

    /// Raw parent-retained descriptors, for scrubbing in later-forked
    /// siblings.
    pub(crate) fn retained_raw_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.input
            .write_raw()
            .into_iter()
            .chain(self.output.read_raw())
    }

    /// Close both parent-retained endpoints.
    ///
    /// Both closes are attempted even if the first fails; the first error
    /// wins.
    pub fn close_endpoints(&mut self) -> Result<()> {
        let write = self.input.close_write();
        let read = self.output.close_read();
        write.and(read)
    }

    /// Wait for the worker to exit. Call after [`close_endpoints`] so the
    /// child has seen EOF on its stdin.
    ///
    /// [`close_endpoints`]: Worker::close_endpoints
    pub fn reap(&mut self) {
        if self.reaped {
            return;
        }
        let _ = waitpid(self.pid, None);
        self.reaped = true;
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if !self.reaped {
            // Not reaped through the pool: the child must not outlive us.
            let _ = self.close_endpoints();
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
            self.reaped = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::spawn::{WorkerConfig, spawn_worker};
    use nix::unistd;
    use std::os::unix::io::AsRawFd;

    fn cat_config() -> WorkerConfig {
        WorkerConfig {
            program: "cat".to_string(),
            args: vec![],
        }
    }

    #[test]
    fn test_spawn_echo_roundtrip() {
        let mut worker = spawn_worker(&cat_config(), &[]).expect("failed to spawn cat");

        let sent = unistd::write(worker.stdin_fd().unwrap(), b"hello\n").unwrap();
        assert_eq!(sent, 6);

        let mut buf = [0u8; 64];
        let got = unistd::read(worker.stdout_fd().unwrap().as_raw_fd(), &mut buf).unwrap();
        assert_eq!(&buf[..got], b"hello\n");

        worker.close_endpoints().unwrap();
        worker.reap();
    }

    #[test]
    fn test_eof_terminates_worker() {
        let mut worker = spawn_worker(&cat_config(), &[]).expect("failed to spawn cat");

        worker.close_endpoints().unwrap();
        // cat exits at EOF; reap must not hang.
        worker.reap();
    }

    #[test]
    fn test_drop_reaps_unmanaged_worker() {
        let worker = spawn_worker(&cat_config(), &[]).expect("failed to spawn cat");
        drop(worker);
    }
}
