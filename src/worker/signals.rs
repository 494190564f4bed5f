//! Worker-death signaling between child processes and the dispatcher.
//!
//! A worker child that fails during pipe redirection or exec has no channel
//! left to report through; it raises SIGUSR1 at the parent instead. The
//! handler records the death in an atomic flag that the dispatch loop polls
//! at the top of every iteration.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::libc::c_int;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction, signal};

static WORKER_DIED: AtomicBool = AtomicBool::new(false);

/// Async-signal-safe: a single flag store and nothing else.
extern "C" fn on_worker_death(_sig: c_int) {
    WORKER_DIED.store(true, Ordering::Relaxed);
}

/// Install the process-wide signal dispositions the pool relies on:
/// a SIGUSR1 handler for worker-death reports, and SIGPIPE set to ignore so
/// a write to a dead worker surfaces as EPIPE instead of killing the caller.
///
/// Idempotent; safe to call before every pool bring-up.
pub(crate) fn install() {
    let action = SigAction::new(
        SigHandler::Handler(on_worker_death),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGUSR1, &action).ok();
        signal(Signal::SIGPIPE, SigHandler::SigIgn).ok();
    }
}

/// Has any worker died since the flag was last cleared?
pub(crate) fn worker_died() -> bool {
    WORKER_DIED.load(Ordering::Relaxed)
}

/// Forget recorded deaths. Called when a fresh pool comes up, so reports
/// from a torn-down generation of workers cannot fail the new one.
pub(crate) fn clear_worker_died() {
    WORKER_DIED.store(false, Ordering::Relaxed);
}
