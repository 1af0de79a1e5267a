use std::collections::HashMap;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{self, Poll, Waker};

use crate::runtime::Shared;
use crate::{Event, Interest, Poller, RawSource, Token};

enum Change {
    Register(Token, RawSource, Interest),
    Deregister(Token),
}

struct Source {
    waker: Waker,
    ready: bool,
}

/// I/O sources that tasks are waiting on.
///
/// Registration changes are queued here and applied to the poller right before it waits, so
/// that futures never need access to the poller itself.
#[derive(Default)]
pub(crate) struct IoRegistry {
    last_token: usize,
    sources: HashMap<Token, Source>,
    changes: Vec<Change>,
}

impl IoRegistry {
    pub(crate) fn register(&mut self, source: RawSource, interest: Interest, waker: Waker) -> Token {
        self.last_token = self.last_token.wrapping_add(1);
        let token = Token(self.last_token);

        self.sources.insert(
            token,
            Source {
                waker,
                ready: false,
            },
        );
        self.changes.push(Change::Register(token, source, interest));

        token
    }

    pub(crate) fn update_waker(&mut self, token: Token, waker: &Waker) {
        if let Some(source) = self.sources.get_mut(&token) {
            if !source.waker.will_wake(waker) {
                source.waker.clone_from(waker);
            }
        }
    }

    pub(crate) fn is_ready(&self, token: Token) -> bool {
        self.sources.get(&token).is_some_and(|source| source.ready)
    }

    pub(crate) fn remove(&mut self, token: Token) {
        if self.sources.remove(&token).is_some() {
            self.changes.push(Change::Deregister(token));
        }
    }

    pub(crate) fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Marks the sources named by `events` as ready and returns the wakers to wake.
    pub(crate) fn dispatch(&mut self, events: impl IntoIterator<Item = Event>) -> Vec<Waker> {
        events
            .into_iter()
            .filter_map(|event| {
                let source = self.sources.get_mut(&event.token())?;
                source.ready = true;
                Some(source.waker.clone())
            })
            .collect()
    }

    /// Applies queued registration changes to the poller, in the order they were made.
    pub(crate) fn apply(&mut self, poller: &mut impl Poller) -> io::Result<()> {
        for change in self.changes.drain(..) {
            match change {
                Change::Register(token, source, interest) => {
                    poller.register(token, source, interest)?;
                }
                Change::Deregister(token) => poller.deregister(token)?,
            }
        }

        Ok(())
    }
}

/// Completes once an I/O source is ready for reading or writing. Created by
/// [`Handle::readable()`][crate::Handle::readable] and
/// [`Handle::writable()`][crate::Handle::writable].
///
/// The source is registered with the poller when the future is first polled and deregistered
/// when it completes or is dropped. The caller keeps ownership of the source and must keep it
/// open while the future exists.
#[must_use = "futures do nothing unless awaited"]
pub struct Readiness {
    shared: Rc<Shared>,
    source: RawSource,
    interest: Interest,
    token: Option<Token>,
}

impl Readiness {
    pub(crate) fn new(shared: Rc<Shared>, source: RawSource, interest: Interest) -> Self {
        Self {
            shared,
            source,
            interest,
            token: None,
        }
    }
}

impl Future for Readiness {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut io = this.shared.io.borrow_mut();

        match this.token {
            None => {
                this.token = Some(io.register(this.source, this.interest, cx.waker().clone()));
                Poll::Pending
            }
            Some(token) if io.is_ready(token) => {
                io.remove(token);
                this.token = None;
                Poll::Ready(())
            }
            Some(token) => {
                io.update_waker(token, cx.waker());
                Poll::Pending
            }
        }
    }
}

impl Drop for Readiness {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.shared.io.borrow_mut().remove(token);
        }
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Readiness")
            .field("source", &self.source)
            .field("interest", &self.interest)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
