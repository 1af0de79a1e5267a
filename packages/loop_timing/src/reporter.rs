//! Scoped measurement of how wall-clock time was spent.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::pal::{Platform, PlatformFacade};
use crate::{PollAccumulator, TimingReport};

/// Which processor time counter a [`TimingReporter`] attributes CPU time with.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum ProcessorTime {
    /// Processor time of all threads in the process.
    #[default]
    Process,

    /// Processor time of the thread that created the scope. Use this when other threads of
    /// the process are busy and would otherwise inflate the CPU time of the scope.
    Thread,
}

type ReportHook = Rc<dyn Fn(&TimingReport)>;

/// Measures scopes of code running on an event loop and reports how their wall-clock time was
/// spent: processor time, time blocked in the poller and everything else.
///
/// The reporter reads poll time from the [`PollAccumulator`] of the [`TimedPoller`] installed in
/// the event loop. Each scope resets that accumulator when it starts, so only one scope per
/// accumulator can be active at a time. Nested scopes are allowed but the outer scope will
/// under-report its poll time by whatever the inner scope reset away.
///
/// Reports are logged as `tracing` debug events, printed to stdout unless disabled and passed
/// to the hook registered with [`TimingReporterBuilder::on_report()`].
///
/// [`TimedPoller`]: crate::TimedPoller
///
/// # Examples
///
/// ```
/// use loop_timing::{PollAccumulator, TimingReporter};
///
/// let reporter = TimingReporter::new(PollAccumulator::new());
///
/// let sum = reporter.with_timing(Some("sum"), || (0..1000_u64).sum::<u64>());
/// assert_eq!(sum, 499_500);
/// ```
pub struct TimingReporter {
    accumulator: PollAccumulator,
    platform: PlatformFacade,
    processor_time: ProcessorTime,
    print_to_stdout: bool,
    on_report: Option<ReportHook>,
}

impl TimingReporter {
    /// Creates a reporter that prints reports to stdout and attributes process processor time.
    #[must_use]
    pub fn new(accumulator: PollAccumulator) -> Self {
        Self::builder(accumulator).build()
    }

    /// Starts configuring a reporter that reads poll time from `accumulator`.
    #[must_use]
    pub fn builder(accumulator: PollAccumulator) -> TimingReporterBuilder {
        TimingReporterBuilder::new(accumulator)
    }

    /// Starts measuring a scope that ends when the returned [`TimingScope`] is finished or
    /// dropped.
    ///
    /// This resets the poll time accumulator.
    pub fn scope(&self, label: Option<&str>) -> TimingScope<'_> {
        TimingScope::begin(self, label)
    }

    /// Runs `body` inside a measured scope and returns its result untouched.
    ///
    /// The report is emitted before this returns, including when `body` returns an error
    /// value. If `body` panics, the report is emitted while unwinding.
    pub fn with_timing<T>(&self, label: Option<&str>, body: impl FnOnce() -> T) -> T {
        let _scope = self.scope(label);
        body()
    }

    /// Awaits `body` inside a measured scope and returns its output untouched.
    ///
    /// The scope starts when the returned future is first polled and spans every suspension
    /// of `body`, including time the event loop spends running other tasks in between. If the
    /// returned future is dropped before completing, the report is emitted at that point.
    pub async fn with_timing_async<F: Future>(&self, label: Option<&str>, body: F) -> F::Output {
        let _scope = self.scope(label);
        body.await
    }

    fn processor_time(&self) -> Duration {
        match self.processor_time {
            ProcessorTime::Process => self.platform.process_time(),
            ProcessorTime::Thread => self.platform.thread_time(),
        }
    }

    fn emit(&self, report: &TimingReport) {
        debug!(
            label = report.label(),
            cpu_ms = report.processor_time().as_secs_f64() * 1000.0,
            select_ms = report.poll_time().as_secs_f64() * 1000.0,
            other_io_ms = report.other_io_time().as_secs_f64() * 1000.0,
            real_ms = report.wall_time().as_secs_f64() * 1000.0,
            "timing scope finished"
        );

        if self.print_to_stdout {
            report.print_to_stdout();
        }

        if let Some(hook) = &self.on_report {
            hook(report);
        }
    }
}

impl fmt::Debug for TimingReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingReporter")
            .field("accumulator", &self.accumulator)
            .field("processor_time", &self.processor_time)
            .field("print_to_stdout", &self.print_to_stdout)
            .field("on_report", &self.on_report.is_some())
            .finish_non_exhaustive()
    }
}

/// Configures a [`TimingReporter`].
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use loop_timing::{PollAccumulator, ProcessorTime, TimingReporter};
///
/// let reports = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&reports);
///
/// let reporter = TimingReporter::builder(PollAccumulator::new())
///     .processor_time(ProcessorTime::Thread)
///     .print_to_stdout(false)
///     .on_report(move |report| sink.borrow_mut().push(report.clone()))
///     .build();
///
/// reporter.with_timing(Some("quiet"), || ());
///
/// assert_eq!(reports.borrow().len(), 1);
/// ```
#[must_use]
pub struct TimingReporterBuilder {
    accumulator: PollAccumulator,
    platform: PlatformFacade,
    processor_time: ProcessorTime,
    print_to_stdout: bool,
    on_report: Option<ReportHook>,
}

impl TimingReporterBuilder {
    fn new(accumulator: PollAccumulator) -> Self {
        Self {
            accumulator,
            platform: PlatformFacade::real(),
            processor_time: ProcessorTime::default(),
            print_to_stdout: true,
            on_report: None,
        }
    }

    /// Selects the processor time counter. Defaults to [`ProcessorTime::Process`].
    pub fn processor_time(mut self, processor_time: ProcessorTime) -> Self {
        self.processor_time = processor_time;
        self
    }

    /// Whether to print each report to stdout. Defaults to `true`.
    pub fn print_to_stdout(mut self, enabled: bool) -> Self {
        self.print_to_stdout = enabled;
        self
    }

    /// Registers a function that receives every report after it has been logged and printed.
    ///
    /// The hook also runs for scopes that end by panicking, while the panic is unwinding. A
    /// hook that panics at that point aborts the process, so it should not panic.
    pub fn on_report(mut self, hook: impl Fn(&TimingReport) + 'static) -> Self {
        self.on_report = Some(Rc::new(hook));
        self
    }

    #[cfg(test)]
    pub(crate) fn platform(mut self, platform: PlatformFacade) -> Self {
        self.platform = platform;
        self
    }

    /// Creates the reporter.
    #[must_use]
    pub fn build(self) -> TimingReporter {
        TimingReporter {
            accumulator: self.accumulator,
            platform: self.platform,
            processor_time: self.processor_time,
            print_to_stdout: self.print_to_stdout,
            on_report: self.on_report,
        }
    }
}

impl fmt::Debug for TimingReporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingReporterBuilder")
            .field("processor_time", &self.processor_time)
            .field("print_to_stdout", &self.print_to_stdout)
            .finish_non_exhaustive()
    }
}

/// One measured scope, started by [`TimingReporter::scope()`].
///
/// The report is emitted exactly once: by [`finish()`][Self::finish], or when the scope is
/// dropped without being finished. Dropping covers early returns, `?` and panics.
#[must_use = "the scope ends when dropped, so an unbound scope measures nothing"]
pub struct TimingScope<'a> {
    reporter: &'a TimingReporter,
    label: Option<String>,
    wall_start: Duration,
    processor_start: Duration,
    finished: bool,
}

impl<'a> TimingScope<'a> {
    fn begin(reporter: &'a TimingReporter, label: Option<&str>) -> Self {
        reporter.accumulator.reset();

        Self {
            reporter,
            label: label.map(ToOwned::to_owned),
            wall_start: reporter.platform.monotonic_time(),
            processor_start: reporter.processor_time(),
            finished: false,
        }
    }

    /// The label the scope was created with, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Ends the scope, emits the report and returns it.
    pub fn finish(mut self) -> TimingReport {
        self.conclude()
    }

    fn conclude(&mut self) -> TimingReport {
        self.finished = true;

        let wall_time = self
            .reporter
            .platform
            .monotonic_time()
            .saturating_sub(self.wall_start);
        let processor_time = self
            .reporter
            .processor_time()
            .saturating_sub(self.processor_start);
        let poll_time = self.reporter.accumulator.accumulated();

        let report = TimingReport::new(self.label.take(), processor_time, poll_time, wall_time);
        self.reporter.emit(&report);
        report
    }
}

impl Drop for TimingScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.conclude();
        }
    }
}

impl fmt::Debug for TimingScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingScope")
            .field("label", &self.label)
            .field("wall_start", &self.wall_start)
            .field("processor_start", &self.processor_start)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
