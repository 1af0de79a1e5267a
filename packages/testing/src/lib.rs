#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for tests, benchmarks and demos in the `loop_timing` workspace.

use std::hint::black_box;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs a test on a separate thread and fails it if it does not complete in time.
///
/// The timeout is 10 seconds, or 60 seconds under Miri, where synchronization is much slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test runs directly on the calling thread, so mutation testing can detect mutants that
/// hang.
///
/// # Panics
///
/// Panics if the test exceeds the timeout. A panic inside the test is resumed on the calling
/// thread.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        // The receiver is gone if the watchdog already fired.
        drop(tx.send(test_fn()));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_thread.join().expect("test thread completed after sending its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded the watchdog timeout of {timeout:?}");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread exited without producing a result"),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}

/// Keeps the current thread busy on the processor for at least `duration` of wall time.
///
/// Unlike sleeping, this consumes processor time, which makes it useful for checking that
/// processor time is measured.
#[cfg_attr(test, mutants::skip)] // Only the elapsed time is observable.
pub fn burn_processor_time(duration: Duration) {
    let started = Instant::now();
    let mut counter = 0_u64;

    while started.elapsed() < duration {
        for _ in 0..1_000 {
            counter = black_box(counter.wrapping_add(1));
        }
    }

    black_box(counter);
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn watchdog_returns_test_result() {
        let result = with_watchdog(|| "hello world");

        assert_eq!(result, "hello world");
    }

    #[test]
    #[should_panic(expected = "from inside the test")]
    fn watchdog_resumes_test_panic() {
        with_watchdog(|| assert_eq!(1 + 1, 3, "from inside the test"));
    }

    #[test]
    fn burn_takes_at_least_requested_time() {
        let started = Instant::now();

        burn_processor_time(Duration::from_millis(5));

        assert!(started.elapsed() >= Duration::from_millis(5));
    }
}
