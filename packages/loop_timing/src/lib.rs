#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Attributes the wall-clock time of cooperative async code to processor time,
//! time blocked in the readiness poller and everything else.
//!
//! When a block of async code is slow, the wall-clock duration alone does not tell you why.
//! This package splits that duration into four numbers:
//!
//! - **CPU time** - processor time consumed while the block was running.
//! - **Select time** - time the event loop spent blocked in its readiness poller, waiting for
//!   sockets, pipes or timers.
//! - **Other IO time** - the remainder: time blocked in calls that bypass the poller,
//!   scheduling jitter and time spent in other tasks that interleaved with the block.
//! - **Real time** - the wall-clock duration of the block.
//!
//! The core functionality includes:
//! - [`TimedPoller`] - Wraps any [`Poller`] and accumulates the time spent in timed waits
//! - [`PollAccumulator`] - Shared handle to the accumulated poll time of one [`TimedPoller`]
//! - [`TimingReporter`] - Measures scopes of code and emits a [`TimingReport`] for each
//! - [`LocalRuntime`] - Single-threaded cooperative executor that drives a [`Poller`]
//! - [`SystemPoller`] - The operating system readiness poller (`poll(2)`)
//!
//! This package is a diagnostic tool. It is not meant to be left enabled in production code.
//!
//! # Simple usage
//!
//! ```
//! # #[cfg(unix)]
//! # fn main() -> loop_timing::Result<()> {
//! use std::time::Duration;
//!
//! use loop_timing::LocalRuntime;
//!
//! let mut runtime = LocalRuntime::timed();
//! let handle = runtime.handle();
//! let reporter = runtime.timing_reporter();
//!
//! runtime.block_on(async {
//!     reporter
//!         .with_timing_async(Some("nap"), handle.sleep(Duration::from_millis(10)))
//!         .await;
//! })?;
//! # Ok(())
//! # }
//! # #[cfg(not(unix))]
//! # fn main() {}
//! ```
//!
//! This prints a block like the following to stdout:
//!
//! ```text
//! ---nap---
//! CPU time:      0.000 s
//! Select time:   0.010 s
//! Other IO time: 0.000 s
//! Real time:     0.010 s
//! ```
//!
//! # Wiring the poller explicitly
//!
//! The poller is an ordinary value. Wrap it, keep a [`PollAccumulator`] and install the wrapper
//! into the runtime:
//!
//! ```
//! # #[cfg(unix)]
//! # fn main() -> loop_timing::Result<()> {
//! use loop_timing::{LocalRuntime, SystemPoller, TimedPoller, TimingReporter};
//!
//! let poller = TimedPoller::new(SystemPoller::new());
//! let reporter = TimingReporter::builder(poller.accumulator())
//!     .print_to_stdout(false)
//!     .on_report(|report| assert!(report.wall_time() >= report.poll_time()))
//!     .build();
//!
//! let mut runtime = LocalRuntime::new(poller);
//! let answer = runtime.block_on(reporter.with_timing_async(None, async { 42 }))?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! # #[cfg(not(unix))]
//! # fn main() {}
//! ```
//!
//! # Measurement limitations
//!
//! The accumulator belongs to the poller, not to a task. Polls issued on behalf of unrelated
//! tasks while a measured block is suspended are counted, and wall time includes time those
//! tasks spent running. Every scope resets the accumulator when it starts, so nested or
//! overlapping scopes on the same poller under-report the poll time of the outer scope. Only
//! one scope per poller should be active at a time.
//!
//! # Platform support
//!
//! [`SystemPoller`] and the file descriptor readiness futures are available on Unix only.
//! The timing types work with any [`Poller`] implementation.

mod error;
mod pal;
mod poller;
mod report;
mod reporter;
mod runtime;
#[cfg(unix)]
mod system_poller;
mod timed_poller;

pub use error::*;
pub use poller::*;
pub use report::*;
pub use reporter::*;
pub use runtime::*;
#[cfg(unix)]
pub use system_poller::*;
pub use timed_poller::*;
