use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{self, Poll, Waker};
use std::time::Instant;

use crate::runtime::Shared;

pub(crate) type TimerKey = (Instant, u64);

/// Pending timers, ordered by deadline.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    last_id: u64,
    wakers: BTreeMap<TimerKey, Waker>,
}

impl TimerQueue {
    pub(crate) fn insert(&mut self, deadline: Instant, waker: Waker) -> TimerKey {
        self.last_id = self.last_id.wrapping_add(1);
        let key = (deadline, self.last_id);
        self.wakers.insert(key, waker);
        key
    }

    pub(crate) fn update(&mut self, key: TimerKey, waker: &Waker) {
        if let Some(existing) = self.wakers.get_mut(&key) {
            if !existing.will_wake(waker) {
                existing.clone_from(waker);
            }
        }
    }

    pub(crate) fn remove(&mut self, key: TimerKey) {
        self.wakers.remove(&key);
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.wakers.first_key_value().map(|((deadline, _), _)| *deadline)
    }

    /// Removes every timer whose deadline is not after `now` and returns their wakers.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<Waker> {
        let mut expired = Vec::new();

        while let Some(entry) = self.wakers.first_entry() {
            if entry.key().0 > now {
                break;
            }

            expired.push(entry.remove());
        }

        expired
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.wakers.is_empty()
    }
}

/// Completes once a deadline has passed. Created by [`Handle::sleep()`][crate::Handle::sleep]
/// and [`Handle::sleep_until()`][crate::Handle::sleep_until].
///
/// While pending, the runtime passes the time until the earliest deadline as the timeout of
/// its poller, so sleeping shows up as poll time.
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    shared: Rc<Shared>,

    // `None` is a deadline beyond the range of `Instant`, which is never reached.
    deadline: Option<Instant>,
    key: Option<TimerKey>,
}

impl Sleep {
    pub(crate) fn new(shared: Rc<Shared>, deadline: Option<Instant>) -> Self {
        Self {
            shared,
            deadline,
            key: None,
        }
    }

    /// The instant this sleep completes at, or `None` if it never completes.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let Some(deadline) = this.deadline else {
            return Poll::Pending;
        };

        let mut timers = this.shared.timers.borrow_mut();

        if Instant::now() >= deadline {
            if let Some(key) = this.key.take() {
                timers.remove(key);
            }

            return Poll::Ready(());
        }

        match this.key {
            Some(key) => timers.update(key, cx.waker()),
            None => this.key = Some(timers.insert(deadline, cx.waker().clone())),
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.shared.timers.borrow_mut().remove(key);
        }
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .field("registered", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use futures::task::noop_waker;

    use super::*;

    #[test]
    fn expired_timers_are_taken_in_deadline_order() {
        let now = Instant::now();
        let mut timers = TimerQueue::default();
        timers.insert(now + Duration::from_millis(30), noop_waker());
        timers.insert(now + Duration::from_millis(10), noop_waker());
        timers.insert(now + Duration::from_millis(20), noop_waker());

        assert_eq!(timers.next_deadline(), Some(now + Duration::from_millis(10)));

        let expired = timers.take_expired(now + Duration::from_millis(20));

        assert_eq!(expired.len(), 2);
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_millis(30)));
    }

    #[test]
    fn timers_with_equal_deadlines_coexist() {
        let now = Instant::now();
        let mut timers = TimerQueue::default();
        let first = timers.insert(now, noop_waker());
        let second = timers.insert(now, noop_waker());

        assert_ne!(first, second);

        timers.remove(first);
        assert!(!timers.is_empty());

        assert_eq!(timers.take_expired(now).len(), 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn nothing_expires_before_its_deadline() {
        let now = Instant::now();
        let mut timers = TimerQueue::default();
        timers.insert(now + Duration::from_secs(60), noop_waker());

        assert!(timers.take_expired(now).is_empty());
        assert!(!timers.is_empty());
    }
}
