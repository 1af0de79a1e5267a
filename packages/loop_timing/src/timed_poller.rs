//! Poller wrapper that accumulates the time spent in timed waits.

use std::cell::Cell;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use scopeguard::guard;

use crate::pal::{Platform, PlatformFacade};
use crate::{Event, Interest, Poller, RawSource, Token};

/// Shared handle to the poll time accumulated by one [`TimedPoller`].
///
/// The runtime owns the poller, so measuring code cannot reach it directly. Instead it holds
/// one of these handles, obtained from [`TimedPoller::accumulator()`] before the poller is
/// installed. All clones observe and reset the same value.
///
/// The handle is single-threaded, like the event loop the poller belongs to.
///
/// # Examples
///
/// ```
/// use loop_timing::PollAccumulator;
///
/// let accumulator = PollAccumulator::new();
/// let observer = accumulator.clone();
///
/// accumulator.reset();
/// assert!(observer.accumulated().is_zero());
/// ```
#[derive(Clone, Default)]
pub struct PollAccumulator {
    total: Rc<Cell<Duration>>,
}

impl PollAccumulator {
    /// Creates an accumulator that has not accumulated anything yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the accumulated time back to zero.
    ///
    /// A wait that is already in progress is not affected. Its duration is added when it ends.
    pub fn reset(&self) {
        self.total.set(Duration::ZERO);
    }

    /// Returns the time accumulated since creation or since the last reset.
    #[must_use]
    pub fn accumulated(&self) -> Duration {
        self.total.get()
    }

    pub(crate) fn add(&self, duration: Duration) {
        self.total.set(
            self.total
                .get()
                .checked_add(duration)
                .expect("accumulated poll time overflows Duration - this indicates an unrealistic scenario"),
        );
    }
}

impl fmt::Debug for PollAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollAccumulator")
            .field("accumulated", &self.accumulated())
            .finish()
    }
}

/// A [`Poller`] that measures how long the event loop is blocked in the poller it wraps.
///
/// Only waits with a non-zero timeout are measured:
///
/// * A zero timeout is a readiness check, not a wait.
/// * A wait without a timeout only returns when something becomes ready, so it would be
///   indistinguishable from the loop being idle.
///
/// Every other call is timed and its duration is added to the [`PollAccumulator`], whether the
/// wrapped poller returns successfully, fails or panics. Results and errors of the wrapped
/// poller are passed through untouched. Registration calls are forwarded without timing.
///
/// # Examples
///
/// ```
/// # #[cfg(unix)]
/// # fn main() -> std::io::Result<()> {
/// use std::time::Duration;
///
/// use loop_timing::{Poller, SystemPoller, TimedPoller};
///
/// let mut poller = TimedPoller::new(SystemPoller::new());
/// let mut events = Vec::new();
///
/// poller.poll_and_wait(&mut events, Some(Duration::from_millis(20)))?;
/// assert!(poller.accumulated() >= Duration::from_millis(20));
///
/// poller.reset();
/// poller.poll_and_wait(&mut events, Some(Duration::ZERO))?;
/// assert!(poller.accumulated().is_zero());
/// # Ok(())
/// # }
/// # #[cfg(not(unix))]
/// # fn main() {}
/// ```
pub struct TimedPoller<P> {
    inner: P,
    accumulator: PollAccumulator,
    platform: PlatformFacade,
}

impl<P: Poller> TimedPoller<P> {
    /// Wraps `inner` with a fresh accumulator.
    #[must_use]
    pub fn new(inner: P) -> Self {
        Self::with_platform(inner, PlatformFacade::real())
    }

    pub(crate) fn with_platform(inner: P, platform: PlatformFacade) -> Self {
        Self {
            inner,
            accumulator: PollAccumulator::new(),
            platform,
        }
    }

    /// Returns a handle to the accumulator that this poller adds its wait time to.
    #[must_use]
    pub fn accumulator(&self) -> PollAccumulator {
        self.accumulator.clone()
    }

    /// Sets the accumulated poll time back to zero.
    pub fn reset(&self) {
        self.accumulator.reset();
    }

    /// Returns the poll time accumulated since creation or since the last reset.
    #[must_use]
    pub fn accumulated(&self) -> Duration {
        self.accumulator.accumulated()
    }

    /// Returns the wrapped poller.
    #[must_use]
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Unwraps the poller, discarding the timing state.
    #[must_use]
    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: Poller> Poller for TimedPoller<P> {
    fn register(&mut self, token: Token, source: RawSource, interest: Interest) -> io::Result<()> {
        self.inner.register(token, source, interest)
    }

    fn deregister(&mut self, token: Token) -> io::Result<()> {
        self.inner.deregister(token)
    }

    fn poll_and_wait(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let Some(wait) = timeout.filter(|wait| !wait.is_zero()) else {
            return self.inner.poll_and_wait(events, timeout);
        };

        let platform = &self.platform;
        let accumulator = &self.accumulator;

        // Runs on every exit path, including unwinding out of the wrapped poller.
        let _record = guard(platform.monotonic_time(), |started| {
            accumulator.add(platform.monotonic_time().saturating_sub(started));
        });

        self.inner.poll_and_wait(events, Some(wait))
    }
}

impl<P> fmt::Debug for TimedPoller<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedPoller")
            .field("accumulator", &self.accumulator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::MockPoller;
    use crate::pal::FakePlatform;

    fn timed_mock(inner: MockPoller, platform: &FakePlatform) -> TimedPoller<MockPoller> {
        TimedPoller::with_platform(inner, PlatformFacade::fake(platform.clone()))
    }

    /// A mock poller whose single wait takes `duration` of fake wall-clock time.
    fn waiting_mock(platform: &FakePlatform, duration: Duration) -> MockPoller {
        let platform = platform.clone();
        let mut inner = MockPoller::new();
        inner.expect_poll_and_wait().once().returning(move |_, _| {
            platform.advance_idle(duration);
            Ok(())
        });
        inner
    }

    #[test]
    fn timed_wait_adds_its_duration() {
        let platform = FakePlatform::new();
        let mut poller = timed_mock(waiting_mock(&platform, Duration::from_millis(100)), &platform);

        poller
            .poll_and_wait(&mut Vec::new(), Some(Duration::from_millis(250)))
            .unwrap();

        assert_eq!(poller.accumulated(), Duration::from_millis(100));
    }

    #[test]
    fn consecutive_waits_accumulate() {
        let platform = FakePlatform::new();
        let mut inner = MockPoller::new();
        let fake = platform.clone();
        inner.expect_poll_and_wait().times(3).returning(move |_, _| {
            fake.advance_idle(Duration::from_millis(10));
            Ok(())
        });
        let mut poller = timed_mock(inner, &platform);

        for _ in 0..3 {
            poller
                .poll_and_wait(&mut Vec::new(), Some(Duration::from_secs(1)))
                .unwrap();
        }

        assert_eq!(poller.accumulated(), Duration::from_millis(30));
    }

    #[test]
    fn wait_without_timeout_is_not_timed() {
        let platform = FakePlatform::new();
        let mut poller = timed_mock(waiting_mock(&platform, Duration::from_millis(100)), &platform);

        poller.poll_and_wait(&mut Vec::new(), None).unwrap();

        assert_eq!(poller.accumulated(), Duration::ZERO);
    }

    #[test]
    fn zero_timeout_is_not_timed() {
        let platform = FakePlatform::new();
        let mut poller = timed_mock(waiting_mock(&platform, Duration::from_millis(3)), &platform);

        poller
            .poll_and_wait(&mut Vec::new(), Some(Duration::ZERO))
            .unwrap();

        assert_eq!(poller.accumulated(), Duration::ZERO);
    }

    #[test]
    fn smallest_non_zero_timeout_is_timed_and_forwarded_unchanged() {
        let platform = FakePlatform::new();
        let fake = platform.clone();
        let mut inner = MockPoller::new();
        inner
            .expect_poll_and_wait()
            .withf(|_, timeout| *timeout == Some(Duration::from_nanos(1)))
            .once()
            .returning(move |_, _| {
                fake.advance_idle(Duration::from_millis(1));
                Ok(())
            });
        let mut poller = timed_mock(inner, &platform);

        poller
            .poll_and_wait(&mut Vec::new(), Some(Duration::from_nanos(1)))
            .unwrap();

        assert_eq!(poller.accumulated(), Duration::from_millis(1));
    }

    #[test]
    fn untimed_waits_are_still_forwarded() {
        let platform = FakePlatform::new();
        let mut inner = MockPoller::new();
        inner
            .expect_poll_and_wait()
            .withf(|_, timeout| timeout.is_none())
            .once()
            .returning(|events, _| {
                events.push(Event::new(Token(4), false, true));
                Ok(())
            });
        let mut poller = timed_mock(inner, &platform);
        let mut events = Vec::new();

        poller.poll_and_wait(&mut events, None).unwrap();

        assert_eq!(events, vec![Event::new(Token(4), false, true)]);
    }

    #[test]
    fn error_is_propagated_after_time_is_recorded() {
        let platform = FakePlatform::new();
        let fake = platform.clone();
        let mut inner = MockPoller::new();
        inner.expect_poll_and_wait().once().returning(move |_, _| {
            fake.advance_idle(Duration::from_millis(40));
            Err(io::Error::new(io::ErrorKind::Interrupted, "signal arrived"))
        });
        let mut poller = timed_mock(inner, &platform);

        let error = poller
            .poll_and_wait(&mut Vec::new(), Some(Duration::from_millis(100)))
            .unwrap_err();

        assert_eq!(error.kind(), io::ErrorKind::Interrupted);
        assert_eq!(error.to_string(), "signal arrived");
        assert_eq!(poller.accumulated(), Duration::from_millis(40));
    }

    /// Takes some fake wall-clock time, then panics.
    #[derive(Debug)]
    struct PanickingPoller {
        platform: FakePlatform,
    }

    impl Poller for PanickingPoller {
        fn register(&mut self, _: Token, _: RawSource, _: Interest) -> io::Result<()> {
            Ok(())
        }

        fn deregister(&mut self, _: Token) -> io::Result<()> {
            Ok(())
        }

        fn poll_and_wait(&mut self, _: &mut Vec<Event>, _: Option<Duration>) -> io::Result<()> {
            self.platform.advance_idle(Duration::from_millis(15));
            panic!("poller exploded");
        }
    }

    #[test]
    fn panic_in_wrapped_poller_still_records_time() {
        let platform = FakePlatform::new();
        let inner = PanickingPoller {
            platform: platform.clone(),
        };
        let mut poller =
            TimedPoller::with_platform(inner, PlatformFacade::fake(platform.clone()));

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            poller.poll_and_wait(&mut Vec::new(), Some(Duration::from_millis(100)))
        }));

        assert!(outcome.is_err());
        assert_eq!(poller.accumulated(), Duration::from_millis(15));
    }

    #[test]
    fn reset_yields_exactly_zero() {
        let platform = FakePlatform::new();
        let mut poller = timed_mock(waiting_mock(&platform, Duration::from_millis(70)), &platform);

        poller
            .poll_and_wait(&mut Vec::new(), Some(Duration::from_millis(70)))
            .unwrap();
        assert_ne!(poller.accumulated(), Duration::ZERO);

        poller.reset();

        assert_eq!(poller.accumulated(), Duration::ZERO);
    }

    #[test]
    fn accumulator_handles_observe_the_poller() {
        let platform = FakePlatform::new();
        let mut poller = timed_mock(waiting_mock(&platform, Duration::from_millis(25)), &platform);
        let accumulator = poller.accumulator();

        poller
            .poll_and_wait(&mut Vec::new(), Some(Duration::from_millis(25)))
            .unwrap();
        assert_eq!(accumulator.accumulated(), Duration::from_millis(25));

        accumulator.reset();
        assert_eq!(poller.accumulated(), Duration::ZERO);
    }

    #[test]
    fn registration_is_forwarded_untimed() {
        let platform = FakePlatform::new();
        let fake = platform.clone();
        let mut inner = MockPoller::new();
        inner
            .expect_register()
            .once()
            .returning(move |_, _, _| {
                fake.advance_idle(Duration::from_millis(5));
                Ok(())
            });
        inner
            .expect_deregister()
            .once()
            .returning(|_| Err(io::Error::from(io::ErrorKind::NotFound)));
        let mut poller = timed_mock(inner, &platform);

        poller.register(Token(1), 0, Interest::Readable).unwrap();
        let error = poller.deregister(Token(1)).unwrap_err();

        assert_eq!(error.kind(), io::ErrorKind::NotFound);
        assert_eq!(poller.accumulated(), Duration::ZERO);
    }

    #[test]
    fn into_inner_returns_wrapped_poller() {
        let platform = FakePlatform::new();
        let mut inner = MockPoller::new();
        inner.expect_deregister().once().returning(|_| Ok(()));
        let poller = timed_mock(inner, &platform);

        let mut inner = poller.into_inner();

        inner.deregister(Token(9)).unwrap();
    }
}
