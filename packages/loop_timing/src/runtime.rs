//! Single-threaded cooperative executor that blocks in a replaceable [`Poller`].

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::num::NonZero;
use std::pin::pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

mod handle;
mod io_source;
mod task;
mod timer;

pub use handle::*;
pub use io_source::Readiness;
pub use timer::Sleep;

use crate::runtime::io_source::IoRegistry;
use crate::runtime::task::{ReadyQueue, TaskId, TaskSet, waker_for};
use crate::runtime::timer::TimerQueue;
#[cfg(unix)]
use crate::SystemPoller;
use crate::{Error, Event, PollAccumulator, Poller, Result, TimedPoller, TimingReporter};

const DEFAULT_TASKS_PER_TICK: NonZero<usize> = NonZero::new(64).expect("64 is not zero");

/// State shared between the runtime, its [`Handle`]s and the futures they create.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) ready: Arc<ReadyQueue>,
    pub(crate) tasks: RefCell<TaskSet>,
    pub(crate) timers: RefCell<TimerQueue>,
    pub(crate) io: RefCell<IoRegistry>,
}

impl Shared {
    fn run_task(&self, id: TaskId) {
        // Already completed, or woken more than once before being polled.
        let Some(mut task) = self.tasks.borrow_mut().take(id) else {
            return;
        };

        let mut cx = Context::from_waker(&task.waker);

        if task.future.as_mut().poll(&mut cx).is_pending() {
            self.tasks.borrow_mut().put_back(id, task);
        }
    }

    fn fire_expired_timers(&self, now: Instant) {
        let expired = self.timers.borrow_mut().take_expired(now);

        for waker in expired {
            waker.wake();
        }
    }

    fn dispatch_events(&self, events: impl IntoIterator<Item = Event>) {
        let wakers = self.io.borrow_mut().dispatch(events);

        for waker in wakers {
            waker.wake();
        }
    }
}

/// A single-threaded cooperative executor.
///
/// Tasks run until they suspend. When no task is ready to run, the runtime blocks in its
/// [`Poller`] until an I/O source becomes ready or the earliest timer is due. That wait is the
/// only place the runtime blocks its thread, which is what makes it possible to measure how much
/// time the event loop spends waiting, by installing a [`TimedPoller`].
///
/// Each turn of the loop:
///
/// 1. Runs ready tasks, up to the configured number of tasks per tick.
/// 2. Applies pending I/O registrations to the poller.
/// 3. Waits in the poller: with a zero timeout if tasks are still ready, until the earliest
///    timer deadline if there is one, or without a timeout if only I/O sources are pending.
/// 4. Wakes the tasks whose I/O sources or timers are ready.
///
/// Wakers may be used from other threads, but such wake-ups do not interrupt a wait that is
/// already in progress. They are noticed when the poller next returns.
///
/// # Examples
///
/// ```
/// # #[cfg(unix)]
/// # fn main() -> loop_timing::Result<()> {
/// use std::time::Duration;
///
/// use loop_timing::LocalRuntime;
///
/// let mut runtime = LocalRuntime::timed();
/// let handle = runtime.handle();
///
/// runtime.block_on(handle.sleep(Duration::from_millis(15)))?;
///
/// assert!(runtime.poll_accumulator().accumulated() >= Duration::from_millis(15));
/// # Ok(())
/// # }
/// # #[cfg(not(unix))]
/// # fn main() {}
/// ```
pub struct LocalRuntime<P> {
    poller: P,
    shared: Rc<Shared>,
    events: Vec<Event>,
    tasks_per_tick: NonZero<usize>,
}

impl<P: Poller> LocalRuntime<P> {
    /// Creates a runtime that blocks in `poller`.
    #[must_use]
    pub fn new(poller: P) -> Self {
        Self::builder(poller).build()
    }

    /// Starts configuring a runtime that blocks in `poller`.
    pub fn builder(poller: P) -> RuntimeBuilder<P> {
        RuntimeBuilder::new(poller)
    }

    /// Returns a handle for spawning tasks and creating timers and I/O futures.
    #[must_use]
    pub fn handle(&self) -> Handle {
        Handle::new(Rc::clone(&self.shared))
    }

    /// Returns the poller the runtime blocks in.
    #[must_use]
    pub fn poller(&self) -> &P {
        &self.poller
    }

    /// Runs `future` to completion, driving spawned tasks while it is pending.
    ///
    /// Spawned tasks that have not completed when `future` completes stay in the runtime and
    /// continue the next time `block_on()` is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Poll`] or [`Error::Register`] if the poller fails, with the poller's
    /// error as the source. Interrupted waits are retried. Returns [`Error::Stalled`] if
    /// `future` is pending and nothing could ever wake it.
    ///
    /// # Panics
    ///
    /// Panics raised by `future` or by spawned tasks propagate out of this call.
    pub fn block_on<F: Future>(&mut self, future: F) -> Result<F::Output> {
        let mut future = pin!(future);
        let main_waker = waker_for(TaskId::MAIN, &self.shared.ready);
        self.shared.ready.push(TaskId::MAIN);

        loop {
            for _ in 0..self.tasks_per_tick.get() {
                let Some(id) = self.shared.ready.pop() else {
                    break;
                };

                if id == TaskId::MAIN {
                    let mut cx = Context::from_waker(&main_waker);

                    if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                        return Ok(output);
                    }
                } else {
                    self.shared.run_task(id);
                }
            }

            self.turn()?;
        }
    }

    /// Waits in the poller once and wakes whatever became ready.
    fn turn(&mut self) -> Result<()> {
        let shared = &self.shared;

        shared.fire_expired_timers(Instant::now());

        let timeout = if !shared.ready.is_empty() {
            Some(Duration::ZERO)
        } else if let Some(deadline) = shared.timers.borrow().next_deadline() {
            Some(deadline.saturating_duration_since(Instant::now()))
        } else if shared.io.borrow().has_sources() {
            None
        } else {
            debug!(
                pending_tasks = shared.tasks.borrow().len(),
                "runtime stalled with nothing to wait for"
            );
            return Err(Error::Stalled);
        };

        shared
            .io
            .borrow_mut()
            .apply(&mut self.poller)
            .map_err(|source| Error::Register { source })?;

        trace!(?timeout, "waiting for readiness");

        self.events.clear();
        match self.poller.poll_and_wait(&mut self.events, timeout) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                trace!("readiness wait interrupted, retrying");
            }
            Err(source) => return Err(Error::Poll { source }),
        }

        shared.dispatch_events(self.events.drain(..));
        shared.fire_expired_timers(Instant::now());

        Ok(())
    }
}

impl<P: Poller> LocalRuntime<TimedPoller<P>> {
    /// Returns a handle to the poll time accumulated by the runtime's [`TimedPoller`].
    #[must_use]
    pub fn poll_accumulator(&self) -> PollAccumulator {
        self.poller.accumulator()
    }

    /// Creates a [`TimingReporter`] with default settings that reads poll time from this
    /// runtime's [`TimedPoller`].
    #[must_use]
    pub fn timing_reporter(&self) -> TimingReporter {
        TimingReporter::new(self.poll_accumulator())
    }
}

#[cfg(unix)]
impl LocalRuntime<TimedPoller<SystemPoller>> {
    /// Creates a runtime that blocks in the operating system poller, wrapped in a
    /// [`TimedPoller`].
    #[must_use]
    pub fn timed() -> Self {
        Self::new(TimedPoller::new(SystemPoller::new()))
    }
}

impl<P> Drop for LocalRuntime<P> {
    fn drop(&mut self) {
        // Tasks hold handles that point back at the shared state. Dropping them breaks the
        // reference cycle. They are taken out first because dropping a task may touch timers
        // and I/O registrations.
        let tasks = self.shared.tasks.borrow_mut().drain();
        drop(tasks);
    }
}

impl<P> fmt::Debug for LocalRuntime<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRuntime")
            .field("tasks", &self.shared.tasks.borrow().len())
            .field("tasks_per_tick", &self.tasks_per_tick)
            .finish_non_exhaustive()
    }
}

/// Configures a [`LocalRuntime`].
///
/// # Examples
///
/// ```
/// # #[cfg(unix)]
/// # fn main() {
/// use std::num::NonZero;
///
/// use loop_timing::{LocalRuntime, SystemPoller};
///
/// let runtime = LocalRuntime::builder(SystemPoller::new())
///     .tasks_per_tick(NonZero::new(16).unwrap())
///     .build();
/// # drop(runtime);
/// # }
/// # #[cfg(not(unix))]
/// # fn main() {}
/// ```
#[must_use]
pub struct RuntimeBuilder<P> {
    poller: P,
    tasks_per_tick: NonZero<usize>,
}

impl<P: Poller> RuntimeBuilder<P> {
    fn new(poller: P) -> Self {
        Self {
            poller,
            tasks_per_tick: DEFAULT_TASKS_PER_TICK,
        }
    }

    /// How many ready tasks to run before checking the poller for I/O and timers.
    /// Defaults to 64.
    ///
    /// Lower values let I/O and timers be noticed sooner when many tasks are busy.
    pub fn tasks_per_tick(mut self, tasks_per_tick: NonZero<usize>) -> Self {
        self.tasks_per_tick = tasks_per_tick;
        self
    }

    /// Creates the runtime.
    #[must_use]
    pub fn build(self) -> LocalRuntime<P> {
        LocalRuntime {
            poller: self.poller,
            shared: Rc::new(Shared::default()),
            events: Vec::new(),
            tasks_per_tick: self.tasks_per_tick,
        }
    }
}

impl<P> fmt::Debug for RuntimeBuilder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("tasks_per_tick", &self.tasks_per_tick)
            .finish_non_exhaustive()
    }
}
