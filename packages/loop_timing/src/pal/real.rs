use std::time::{Duration, Instant};

use cpu_time::{ProcessTime, ThreadTime};

use crate::pal::abstractions::Platform;

/// Clocks of the operating system the build is targeting.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RealPlatform {
    epoch: Instant,
}

impl RealPlatform {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Platform for RealPlatform {
    fn monotonic_time(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn process_time(&self) -> Duration {
        ProcessTime::now().as_duration()
    }

    fn thread_time(&self) -> Duration {
        ThreadTime::now().as_duration()
    }
}
