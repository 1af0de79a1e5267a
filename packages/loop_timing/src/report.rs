//! Timing reports for one measured scope.

use std::fmt;
use std::io;
use std::io::Write;
use std::time::Duration;

/// How the wall-clock time of one measured scope was spent.
///
/// Produced by a [`TimingReporter`][crate::TimingReporter] when a scope ends. The `Display`
/// implementation renders the human-readable block that is printed to stdout:
///
/// ```text
/// ---gather---
/// CPU time:      0.012 s
/// Select time:   0.230 s
/// Other IO time: 0.004 s
/// Real time:     0.246 s
/// ```
///
/// followed by an empty line. The label line is omitted for unlabeled scopes.
///
/// # Examples
///
/// ```
/// use loop_timing::{PollAccumulator, TimingReporter};
///
/// let reporter = TimingReporter::builder(PollAccumulator::new())
///     .print_to_stdout(false)
///     .build();
///
/// let report = reporter.scope(Some("work")).finish();
///
/// assert_eq!(report.label(), Some("work"));
/// assert!(report.poll_time().is_zero());
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimingReport {
    label: Option<String>,
    processor_time: Duration,
    poll_time: Duration,
    wall_time: Duration,
}

impl TimingReport {
    pub(crate) fn new(
        label: Option<String>,
        processor_time: Duration,
        poll_time: Duration,
        wall_time: Duration,
    ) -> Self {
        Self {
            label,
            processor_time,
            poll_time,
            wall_time,
        }
    }

    /// The label the scope was created with, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Processor time consumed during the scope.
    #[must_use]
    pub fn processor_time(&self) -> Duration {
        self.processor_time
    }

    /// Time the event loop spent blocked in timed waits of the poller during the scope.
    #[must_use]
    pub fn poll_time(&self) -> Duration {
        self.poll_time
    }

    /// Wall-clock time that is neither processor time nor poll time.
    ///
    /// This absorbs blocking calls that bypass the poller, waits without a timeout, scheduling
    /// jitter and time spent running other tasks. It is clamped at zero; the amount that was
    /// clamped away is available from [`excess_attributed_time()`][Self::excess_attributed_time].
    #[must_use]
    pub fn other_io_time(&self) -> Duration {
        self.wall_time.saturating_sub(self.attributed_time())
    }

    /// Wall-clock duration of the scope.
    #[must_use]
    pub fn wall_time(&self) -> Duration {
        self.wall_time
    }

    /// How much processor time and poll time together exceed the wall-clock time.
    ///
    /// Non-zero only when [`other_io_time()`][Self::other_io_time] was clamped to zero. This
    /// happens due to clock granularity, and routinely when other threads of the process
    /// consume processor time during the scope.
    #[must_use]
    pub fn excess_attributed_time(&self) -> Duration {
        self.attributed_time().saturating_sub(self.wall_time)
    }

    /// Prints the report block to stdout.
    ///
    /// Failures to write are ignored. Reports are emitted while unwinding from a panicking scope,
    /// where a second panic would abort the process.
    #[cfg_attr(test, mutants::skip)] // Too difficult to test stdout output reliably - manually tested.
    pub fn print_to_stdout(&self) {
        // Nothing useful can be done about a closed or broken stdout.
        drop(self.write_to(&mut io::stdout().lock()));
    }

    pub(crate) fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        write!(out, "{self}")?;
        out.flush()
    }

    fn attributed_time(&self) -> Duration {
        self.processor_time.saturating_add(self.poll_time)
    }
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            writeln!(f, "---{label}---")?;
        }

        writeln!(f, "CPU time:      {:.3} s", self.processor_time.as_secs_f64())?;
        writeln!(f, "Select time:   {:.3} s", self.poll_time.as_secs_f64())?;
        writeln!(f, "Other IO time: {:.3} s", self.other_io_time().as_secs_f64())?;
        writeln!(f, "Real time:     {:.3} s", self.wall_time.as_secs_f64())?;
        writeln!(f)
    }
}
