use std::fmt::Debug;
use std::time::Duration;

/// Provides the clocks used to attribute time.
///
/// All values are offsets from some fixed starting point, so only the difference between two
/// readings from the same platform instance is meaningful.
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Wall-clock time that never goes backwards.
    fn monotonic_time(&self) -> Duration;

    /// Processor time consumed by all threads of the current process.
    fn process_time(&self) -> Duration;

    /// Processor time consumed by the current thread.
    fn thread_time(&self) -> Duration;
}
