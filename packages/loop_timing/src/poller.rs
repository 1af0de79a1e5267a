//! The readiness-polling capability that an event loop blocks in.

use std::io;
use std::time::Duration;

/// Raw operating system handle of an I/O source that can be registered with a [`Poller`].
#[cfg(unix)]
pub type RawSource = std::os::fd::RawFd;

/// Raw operating system handle of an I/O source that can be registered with a [`Poller`].
#[cfg(windows)]
pub type RawSource = std::os::windows::io::RawSocket;

#[cfg(not(any(unix, windows)))]
compile_error!("loop_timing supports Unix and Windows targets only");

/// Identifies a registered I/O source in the events reported by a [`Poller`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Token(pub usize);

/// The kind of readiness an I/O source is registered for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Interest {
    /// The source has data to read, or the peer hung up.
    Readable,

    /// The source can accept more data.
    Writable,
}

/// Readiness of one registered I/O source, as reported by [`Poller::poll_and_wait()`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Event {
    token: Token,
    readable: bool,
    writable: bool,
}

impl Event {
    /// Creates an event for the source registered under `token`.
    #[must_use]
    pub fn new(token: Token, readable: bool, writable: bool) -> Self {
        Self {
            token,
            readable,
            writable,
        }
    }

    /// The token the source was registered under.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// Whether the source is ready for reading. Error and hang-up conditions count as readable,
    /// since a read is how the owner finds out about them.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.readable
    }

    /// Whether the source is ready for writing.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Blocks the calling thread until registered I/O sources become ready or a timeout elapses.
///
/// This is the one place where a cooperative event loop really blocks its thread. Everything
/// else the loop does is either running task code or switching between tasks.
///
/// Wrappers such as [`TimedPoller`][crate::TimedPoller] implement this trait by forwarding to
/// another poller, which is how behavior is added to the poller a runtime uses.
#[cfg_attr(test, mockall::automock)]
pub trait Poller {
    /// Starts reporting readiness of `source` for `interest` under `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is already registered or the operating system rejects
    /// the source.
    fn register(&mut self, token: Token, source: RawSource, interest: Interest) -> io::Result<()>;

    /// Stops reporting readiness for the source registered under `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is registered under the token.
    fn deregister(&mut self, token: Token) -> io::Result<()>;

    /// Waits until at least one registered source is ready or the timeout elapses, then appends
    /// the ready sources to `events`.
    ///
    /// A timeout of `None` waits without limit. A zero timeout checks readiness and returns
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns whatever error the underlying wait primitive reports, including
    /// [`io::ErrorKind::Interrupted`] when a signal interrupts the wait.
    fn poll_and_wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>)
    -> io::Result<()>;
}

impl<P: Poller + ?Sized> Poller for Box<P> {
    fn register(&mut self, token: Token, source: RawSource, interest: Interest) -> io::Result<()> {
        (**self).register(token, source, interest)
    }

    fn deregister(&mut self, token: Token) -> io::Result<()> {
        (**self).deregister(token)
    }

    fn poll_and_wait(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        (**self).poll_and_wait(events, timeout)
    }
}

impl<P: Poller + ?Sized> Poller for &mut P {
    fn register(&mut self, token: Token, source: RawSource, interest: Interest) -> io::Result<()> {
        (**self).register(token, source, interest)
    }

    fn deregister(&mut self, token: Token) -> io::Result<()> {
        (**self).deregister(token)
    }

    fn poll_and_wait(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        (**self).poll_and_wait(events, timeout)
    }
}
