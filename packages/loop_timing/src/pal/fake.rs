use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::pal::abstractions::Platform;

const ERR_POISONED_LOCK: &str = "FakePlatform state lock should not be poisoned";

#[derive(Debug, Default)]
struct FakePlatformState {
    monotonic_time: Duration,
    process_time: Duration,
    thread_time: Duration,
}

/// Clocks that only move when a test moves them.
///
/// Clones share the same state, so a test can keep one clone and advance time while the code
/// under test holds another, for example from inside a mocked poller call.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakePlatform {
    state: Arc<Mutex<FakePlatformState>>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_monotonic_time(&self, time: Duration) {
        self.state.lock().expect(ERR_POISONED_LOCK).monotonic_time = time;
    }

    pub(crate) fn set_process_time(&self, time: Duration) {
        self.state.lock().expect(ERR_POISONED_LOCK).process_time = time;
    }

    pub(crate) fn set_thread_time(&self, time: Duration) {
        self.state.lock().expect(ERR_POISONED_LOCK).thread_time = time;
    }

    /// Simulates blocking: wall-clock time passes, no processor time is consumed.
    pub(crate) fn advance_idle(&self, duration: Duration) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.monotonic_time = state.monotonic_time.saturating_add(duration);
    }

    /// Simulates computation on the current thread: wall-clock time and processor time
    /// both pass.
    pub(crate) fn advance_busy(&self, duration: Duration) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.monotonic_time = state.monotonic_time.saturating_add(duration);
        state.process_time = state.process_time.saturating_add(duration);
        state.thread_time = state.thread_time.saturating_add(duration);
    }
}

impl Platform for FakePlatform {
    fn monotonic_time(&self) -> Duration {
        self.state.lock().expect(ERR_POISONED_LOCK).monotonic_time
    }

    fn process_time(&self) -> Duration {
        self.state.lock().expect(ERR_POISONED_LOCK).process_time
    }

    fn thread_time(&self) -> Duration {
        self.state.lock().expect(ERR_POISONED_LOCK).thread_time
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let platform = FakePlatform::new();

        assert_eq!(platform.monotonic_time(), Duration::ZERO);
        assert_eq!(platform.process_time(), Duration::ZERO);
        assert_eq!(platform.thread_time(), Duration::ZERO);
    }

    #[test]
    fn advance_idle_moves_only_the_wall_clock() {
        let platform = FakePlatform::new();
        platform.advance_idle(Duration::from_millis(100));

        assert_eq!(platform.monotonic_time(), Duration::from_millis(100));
        assert_eq!(platform.process_time(), Duration::ZERO);
        assert_eq!(platform.thread_time(), Duration::ZERO);
    }

    #[test]
    fn advance_busy_moves_every_clock() {
        let platform = FakePlatform::new();
        platform.advance_busy(Duration::from_millis(50));

        assert_eq!(platform.monotonic_time(), Duration::from_millis(50));
        assert_eq!(platform.process_time(), Duration::from_millis(50));
        assert_eq!(platform.thread_time(), Duration::from_millis(50));
    }

    #[test]
    fn clones_share_state() {
        let platform1 = FakePlatform::new();
        let platform2 = platform1.clone();

        platform1.set_process_time(Duration::from_millis(200));
        platform2.advance_idle(Duration::from_millis(10));

        assert_eq!(platform2.process_time(), Duration::from_millis(200));
        assert_eq!(platform1.monotonic_time(), Duration::from_millis(10));
    }
}
