//! Platform abstraction layer for the clocks that timing is measured with.
//!
//! Real measurements use the monotonic clock of the standard library and the processor time
//! counters exposed by the `cpu_time` package. Unit tests substitute a fake platform whose
//! clocks only move when the test says so.

mod abstractions;
mod facade;
#[cfg(test)]
mod fake;
mod real;

pub(crate) use abstractions::Platform;
pub(crate) use facade::PlatformFacade;
#[cfg(test)]
pub(crate) use fake::FakePlatform;
