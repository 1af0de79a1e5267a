use std::fmt;
use std::io;
use std::time::Duration;

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, c_int, c_short, nfds_t, pollfd};

use crate::{Event, Interest, Poller, RawSource, Token};

/// The operating system readiness poller, built on `poll(2)`.
///
/// Timeouts are rounded up to whole milliseconds, so a wait never ends before a timer deadline
/// that was used to compute its timeout.
///
/// # Examples
///
/// ```
/// use std::io::Write;
/// use std::os::fd::AsRawFd;
/// use std::os::unix::net::UnixStream;
/// use std::time::Duration;
///
/// use loop_timing::{Interest, Poller, SystemPoller, Token};
///
/// # fn main() -> std::io::Result<()> {
/// let (mut writer, reader) = UnixStream::pair()?;
///
/// let mut poller = SystemPoller::new();
/// poller.register(Token(1), reader.as_raw_fd(), Interest::Readable)?;
///
/// writer.write_all(b"x")?;
///
/// let mut events = Vec::new();
/// poller.poll_and_wait(&mut events, Some(Duration::from_secs(5)))?;
/// assert_eq!(events[0].token(), Token(1));
/// assert!(events[0].is_readable());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SystemPoller {
    // Kept in step: `tokens[i]` identifies `fds[i]`.
    fds: Vec<pollfd>,
    tokens: Vec<Token>,
}

impl SystemPoller {
    /// Creates a poller with no registered sources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no sources are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn position(&self, token: Token) -> Option<usize> {
        self.tokens.iter().position(|candidate| *candidate == token)
    }
}

impl Poller for SystemPoller {
    fn register(&mut self, token: Token, source: RawSource, interest: Interest) -> io::Result<()> {
        if self.position(token).is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("token {} is already registered", token.0),
            ));
        }

        let events: c_short = match interest {
            Interest::Readable => POLLIN,
            Interest::Writable => POLLOUT,
        };

        self.fds.push(pollfd {
            fd: source,
            events,
            revents: 0,
        });
        self.tokens.push(token);

        Ok(())
    }

    fn deregister(&mut self, token: Token) -> io::Result<()> {
        let index = self.position(token).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("token {} is not registered", token.0),
            )
        })?;

        self.fds.swap_remove(index);
        self.tokens.swap_remove(index);

        Ok(())
    }

    fn poll_and_wait(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let nfds = nfds_t::try_from(self.fds.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many registered sources"))?;

        // SAFETY: The pointer and length describe the initialized `fds` buffer, which stays
        // alive and unaliased for the duration of the call.
        let ready = unsafe { libc::poll(self.fds.as_mut_ptr(), nfds, timeout_millis(timeout)) };

        if ready < 0 {
            return Err(io::Error::last_os_error());
        }

        if ready == 0 {
            return Ok(());
        }

        for (fd, token) in self.fds.iter_mut().zip(&self.tokens) {
            if fd.revents == 0 {
                continue;
            }

            let failed = fd.revents & (POLLERR | POLLHUP | POLLNVAL) != 0;
            let readable = failed || fd.revents & POLLIN != 0;
            let writable = failed || fd.revents & POLLOUT != 0;

            events.push(Event::new(*token, readable, writable));
            fd.revents = 0;
        }

        Ok(())
    }
}

impl fmt::Debug for SystemPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemPoller")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// Converts a timeout to the millisecond argument of `poll(2)`, rounding up and saturating.
fn timeout_millis(timeout: Option<Duration>) -> c_int {
    match timeout {
        None => -1,
        Some(timeout) => {
            let millis = timeout.as_nanos().div_ceil(1_000_000);
            c_int::try_from(millis).unwrap_or(c_int::MAX)
        }
    }
}
