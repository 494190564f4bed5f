//! Worker subprocess spawning.
//!
//! Forks a child per worker, rebinds the child's stdin and stdout onto the
//! pipe endpoints, scrubs every pipe descriptor the child inherited, and
//! execs the classifier program.

use std::ffi::{CStr, CString};
use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{self, ForkResult};
use tracing::trace;

use super::proc::Worker;
use crate::error::{PftError, Result};
use crate::pipe::PipePair;

/// Default classifier program.
pub const FILE_PROGRAM: &str = "/usr/bin/file";
/// Flag that makes file(1) flush its output after every classification.
pub const FILE_FLAG_FLUSH: &str = "-n";
/// Flag that makes file(1) read the paths to classify from stdin.
pub const FILE_FLAG_STDIN: &str = "-f-";

/// Command line of the external classifier program.
///
/// The program must emit exactly one newline-terminated description per
/// newline-terminated path on stdin, preserve input order, and not wait for
/// stdin to close before producing output. The default is `file -n -f-`.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Program to exec for each worker; resolved through `PATH`.
    pub program: String,
    /// Arguments passed after the program name.
    pub args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: FILE_PROGRAM.to_string(),
            args: vec![FILE_FLAG_FLUSH.to_string(), FILE_FLAG_STDIN.to_string()],
        }
    }
}

impl WorkerConfig {
    /// Materialize the exec argv. Must happen before fork: the child may not
    /// allocate between fork and exec.
    fn to_argv(&self) -> Result<Vec<CString>> {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|arg| CString::new(arg.as_str()).map_err(|_| PftError::Exec(Errno::EINVAL)))
            .collect()
    }
}

/// Spawn one worker process.
///
/// `sibling_fds` lists every parent-retained pipe descriptor of workers
/// spawned earlier; the child inherits them all across the fork and must not
/// keep any.
pub(crate) fn spawn_worker(config: &WorkerConfig, sibling_fds: &[RawFd]) -> Result<Worker> {
    let argv = config.to_argv()?;

    let mut input = PipePair::create()?; // parent writes, child reads
    let mut output = PipePair::create()?; // child writes, parent reads

    // SAFETY: the child branch performs only async-signal-safe calls
    // (dup2, close, execvp, kill, _exit); argv was materialized above.
    match unsafe { unistd::fork() }.map_err(PftError::Fork)? {
        ForkResult::Child => {
            // exec_child returns only on failure. The specific cause cannot
            // cross the process boundary, so the child reports through
            // SIGUSR1 rather than through a pipe the parent is about to
            // tear down.
            let _failure: PftError = exec_child(&input, &output, sibling_fds, &argv);
            let _ = signal::kill(unistd::getppid(), Signal::SIGUSR1);
            unsafe { nix::libc::_exit(127) }
        }
        ForkResult::Parent { child } => {
            if let Err(e) = input.close_read().and(output.close_write()) {
                let _ = signal::kill(child, Signal::SIGKILL);
                let _ = waitpid(child, None);
                return Err(e);
            }
            trace!(pid = child.as_raw(), program = %config.program, "spawned worker");
            Ok(Worker::new(child, input, output))
        }
    }
}

/// Runs in the forked child; returns only if a step failed.
fn exec_child(
    input: &PipePair,
    output: &PipePair,
    sibling_fds: &[RawFd],
    argv: &[CString],
) -> PftError {
    use nix::libc::{STDIN_FILENO, STDOUT_FILENO};

    let Some(stdin_fd) = input.read_raw() else {
        return PftError::Redirect(Errno::EBADF);
    };
    let Some(stdout_fd) = output.write_raw() else {
        return PftError::Redirect(Errno::EBADF);
    };
    if let Err(e) = unistd::dup2(stdin_fd, STDIN_FILENO) {
        return PftError::Redirect(e);
    }
    if let Err(e) = unistd::dup2(stdout_fd, STDOUT_FILENO) {
        return PftError::Redirect(e);
    }

    // Drop every pipe descriptor this child inherited: both ends of its own
    // pair (stdin/stdout keep the dup'd copies) and the parent-retained ends
    // of every sibling worker.
    let own = [
        input.read_raw(),
        input.write_raw(),
        output.read_raw(),
        output.write_raw(),
    ];
    for fd in own.into_iter().flatten() {
        if let Err(e) = unistd::close(fd) {
            return PftError::Close(e);
        }
    }
    for &fd in sibling_fds {
        if let Err(e) = unistd::close(fd) {
            return PftError::Close(e);
        }
    }

    let program: &CStr = &argv[0];
    match unistd::execvp(program, argv) {
        Ok(never) => match never {},
        Err(e) => PftError::Exec(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_file() {
        let config = WorkerConfig::default();
        assert_eq!(config.program, "/usr/bin/file");
        assert_eq!(config.args, vec!["-n", "-f-"]);
    }

    #[test]
    fn test_argv_includes_program_name() {
        let config = WorkerConfig::default();
        let argv = config.to_argv().unwrap();
        assert_eq!(argv.len(), 3);
        assert_eq!(argv[0].to_str().unwrap(), "/usr/bin/file");
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let config = WorkerConfig {
            program: "fi\0le".to_string(),
            args: vec![],
        };
        assert!(matches!(config.to_argv(), Err(PftError::Exec(_))));
    }
}
