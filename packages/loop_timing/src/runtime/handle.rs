use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{self, Poll};
use std::time::{Duration, Instant};

use crate::runtime::{Readiness, Shared, Sleep};
use crate::{Interest, RawSource};

/// Spawns tasks and creates timer and I/O futures for a [`LocalRuntime`][crate::LocalRuntime].
///
/// Handles are cheap to clone and can be moved into tasks. They are bound to the thread of the
/// runtime that created them.
///
/// # Examples
///
/// ```
/// # #[cfg(unix)]
/// # fn main() -> loop_timing::Result<()> {
/// use std::time::Duration;
///
/// use loop_timing::{LocalRuntime, SystemPoller};
///
/// let mut runtime = LocalRuntime::new(SystemPoller::new());
/// let handle = runtime.handle();
///
/// let total = runtime.block_on(async {
///     let children = (1..=3_u64).map(|i| {
///         let child = handle.clone();
///         handle.spawn(async move {
///             child.sleep(Duration::from_millis(i)).await;
///             i * 10
///         })
///     });
///
///     let mut total = 0;
///     for child in children.collect::<Vec<_>>() {
///         total += child.await;
///     }
///     total
/// })?;
///
/// assert_eq!(total, 60);
/// # Ok(())
/// # }
/// # #[cfg(not(unix))]
/// # fn main() {}
/// ```
#[derive(Clone)]
pub struct Handle {
    shared: Rc<Shared>,
}

impl Handle {
    pub(crate) fn new(shared: Rc<Shared>) -> Self {
        Self { shared }
    }

    /// Spawns a task that runs concurrently with the other tasks of the runtime.
    ///
    /// The task starts running the next time the runtime drives its tasks. It keeps running
    /// even if the returned [`JoinHandle`] is dropped.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let id = self.shared.tasks.borrow_mut().insert(
            Box::pin(async move {
                // The receiver may be gone, in which case nobody wants the result.
                drop(sender.send(future.await));
            }),
            &self.shared.ready,
        );
        self.shared.ready.push(id);

        JoinHandle { receiver }
    }

    /// Completes after `duration` has elapsed.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(Rc::clone(&self.shared), Instant::now().checked_add(duration))
    }

    /// Completes once `deadline` has been reached.
    pub fn sleep_until(&self, deadline: Instant) -> Sleep {
        Sleep::new(Rc::clone(&self.shared), Some(deadline))
    }

    /// Completes once `source` is ready for reading or has hung up.
    pub fn readable(&self, source: RawSource) -> Readiness {
        Readiness::new(Rc::clone(&self.shared), source, Interest::Readable)
    }

    /// Completes once `source` is ready for writing.
    pub fn writable(&self, source: RawSource) -> Readiness {
        Readiness::new(Rc::clone(&self.shared), source, Interest::Writable)
    }

    /// Number of spawned tasks that have not completed yet.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.shared.tasks.borrow().len()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("task_count", &self.task_count())
            .finish_non_exhaustive()
    }
}

/// Resolves to the output of a task spawned with [`Handle::spawn()`].
///
/// # Panics
///
/// Awaiting the handle panics if the runtime that owns the task was dropped before the task
/// completed, or if the task itself panicked.
#[must_use = "futures do nothing unless awaited"]
pub struct JoinHandle<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|result| {
            result.expect("the task was dropped before completing - its runtime was dropped or it panicked")
        })
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle").finish_non_exhaustive()
    }
}

/// Suspends the current task once, letting every other ready task run first.
///
/// # Examples
///
/// ```
/// # #[cfg(unix)]
/// # fn main() -> loop_timing::Result<()> {
/// use loop_timing::{LocalRuntime, SystemPoller, yield_now};
///
/// let mut runtime = LocalRuntime::new(SystemPoller::new());
/// runtime.block_on(async {
///     yield_now().await;
/// })?;
/// # Ok(())
/// # }
/// # #[cfg(not(unix))]
/// # fn main() {}
/// ```
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now()`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
