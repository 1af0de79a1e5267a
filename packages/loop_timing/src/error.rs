use std::io;

use thiserror::Error;

/// Errors that can stop a [`LocalRuntime`][crate::LocalRuntime] from driving its tasks.
///
/// Errors raised by a [`Poller`][crate::Poller] are carried as the [`source`][std::error::Error::source]
/// of this error, unmodified.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The readiness poller failed while waiting for I/O sources or timers.
    #[error("readiness poller failed: {source}")]
    Poll {
        /// The error returned by the poller.
        source: io::Error,
    },

    /// The poller refused to register or deregister an I/O source.
    #[error("updating I/O source registrations failed: {source}")]
    Register {
        /// The error returned by the poller.
        source: io::Error,
    },

    /// No task can ever make progress again: nothing is ready to run, no timer is pending and
    /// no I/O source is registered, so waiting would block the thread forever.
    #[error(
        "runtime stalled: no task is ready, no timer is pending and no I/O source is registered"
    )]
    Stalled,
}

/// A specialized `Result` type for runtime operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
