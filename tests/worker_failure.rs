//! Failure-path tests: misbehaving and dying classifiers.
//!
//! These live in their own test binary because a dying worker raises
//! SIGUSR1 at the whole test process; healthy-pool tests must not share a
//! process with them. Within this binary the tests serialize on a shared
//! mutex for the same reason: the death flag is process-global, and a
//! worker killed by one test must not be observed by another mid-batch.

use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use pft::{Pft, WorkerConfig};

static SERIAL: Mutex<()> = Mutex::new(());

fn serialized() -> MutexGuard<'static, ()> {
    // A test that panicked while holding the lock has still released its
    // workers; the remaining tests can proceed.
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn context_running(script: &str) -> Pft {
    Pft::with_config(WorkerConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
    })
}

#[test]
fn init_rejects_zero_parallelism() {
    let _guard = serialized();
    let mut pft = Pft::new();
    assert!(pft.init(0).is_err());
    assert!(pft.last_error().starts_with("pft_init: "));
    assert_eq!(pft.parallelism(), 0);
}

#[test]
fn classifier_that_stops_reading_fails_the_batch() {
    let _guard = serialized();
    let mut pft = context_running("read line; exit 0");
    pft.init(1).unwrap();

    let err = pft.find_types(&["/tmp/a", "/tmp/b", "/tmp/c"]);
    assert!(err.is_err());
    assert!(pft.last_error().starts_with("pft_find_types: "));

    // The failed call left the pool fully down; teardown stays idempotent.
    assert_eq!(pft.parallelism(), 0);
    pft.done().unwrap();
    pft.done().unwrap();
}

#[test]
fn classifier_that_exits_immediately_fails_the_batch() {
    let _guard = serialized();
    let mut pft = context_running("exit 0");
    pft.init(2).unwrap();

    assert!(pft.find_types(&["/tmp/a", "/tmp/b"]).is_err());
    assert!(pft.last_error().starts_with("pft_find_types: "));
    assert_eq!(pft.parallelism(), 0);
}

#[test]
fn unrunnable_classifier_fails_the_batch() {
    let _guard = serialized();
    let mut pft = Pft::with_config(WorkerConfig {
        program: "/nonexistent/classifier-binary".to_string(),
        args: vec![],
    });
    // fork succeeds; the exec failure is reported asynchronously by the
    // dying children.
    pft.init(2).unwrap();
    thread::sleep(Duration::from_millis(200));

    assert!(pft.find_types(&["/tmp/a", "/tmp/b", "/tmp/c"]).is_err());
    assert!(pft.last_error().starts_with("pft_find_types: "));
    assert_eq!(pft.parallelism(), 0);
    pft.done().unwrap();
}

#[test]
fn pool_recovers_after_a_failed_generation() {
    let _guard = serialized();
    let mut pft = context_running("exit 0");
    pft.init(1).unwrap();
    assert!(pft.find_types(&["/tmp/a"]).is_err());

    // A fresh generation comes up cleanly even after the old one died.
    pft.set_parallelism(2).unwrap();
    assert_eq!(pft.parallelism(), 2);
    pft.done().unwrap();
}
