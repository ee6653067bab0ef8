//! The host event loop that edge monitors plug into.
//!
//! Edge notifications on sysfs lines arrive as *priority* readiness on the `value`
//! attribute: the file is always readable, and the kernel flags `POLLPRI` once an edge
//! matching the configured `edge` attribute has happened. Anything able to wait on a
//! descriptor and call a handler can drive the crate by implementing [`Reactor`];
//! [`PollReactor`] is a small single-threaded implementation built on `poll(2)`.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    os::fd::{AsRawFd, BorrowedFd, RawFd},
    time::Duration,
};

use bitflags::bitflags;
use log::{trace, warn};
use nix::poll::{PollFd, PollFlags, PollTimeout};

use crate::errors::{ErrorKind, Result};

bitflags! {
    /// Readiness a registration is interested in.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Interest: u8 {
        /// Ordinary readable data (`POLLIN`).
        const READABLE = (1 << 0);
        /// Priority/exceptional data (`POLLPRI`), used by sysfs to signal an edge.
        const PRIORITY = (1 << 1);
    }
}

impl Interest {
    fn poll_flags(self) -> PollFlags {
        let mut flags = PollFlags::empty();
        if self.contains(Interest::READABLE) {
            flags |= PollFlags::POLLIN;
        }
        if self.contains(Interest::PRIORITY) {
            flags |= PollFlags::POLLPRI;
        }
        flags
    }
}

/// Identifies one registration with a [`Reactor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Invoked with no arguments whenever the registered descriptor becomes ready; the
/// handler re-reads whatever state it needs itself.
pub type ReadyHandler = Box<dyn FnMut()>;

pub trait Reactor {
    /// Start watching `fd` for `interest`.
    ///
    /// The reactor keeps the raw descriptor; callers must [`deregister`] before the
    /// descriptor is closed.
    ///
    /// [`deregister`]: Reactor::deregister
    fn register(&self, fd: BorrowedFd<'_>, interest: Interest) -> Result<Token>;

    /// Install the handler dispatched on readiness of `token`.
    fn on_ready(&self, token: Token, handler: ReadyHandler) -> Result<()>;

    /// Ask for the next readiness event after one has been handled.
    ///
    /// Level-triggered reactors re-arm implicitly, which is the default.
    fn rearm(&self, token: Token) -> Result<()> {
        let _ = token;
        Ok(())
    }

    /// Stop watching. Once this returns the handler for `token` is never called again,
    /// even if readiness for it was already collected.
    fn deregister(&self, token: Token) -> Result<()>;
}

struct Source {
    fd: RawFd,
    interest: Interest,
    handler: Option<ReadyHandler>,
}

/// Level-triggered, single-threaded reactor driven by [`PollReactor::poll_once`].
#[derive(Default)]
pub struct PollReactor {
    sources: RefCell<BTreeMap<Token, Source>>,
    next_token: Cell<u64>,
}

impl PollReactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.sources.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.borrow().is_empty()
    }

    /// Wait up to `timeout` (forever with `None`) for readiness and dispatch every
    /// ready handler once. Returns the number of handlers called.
    pub fn poll_once(&self, timeout: Option<Duration>) -> Result<usize> {
        let watched: Vec<(Token, RawFd, PollFlags)> = self
            .sources
            .borrow()
            .iter()
            .filter(|(_, src)| src.handler.is_some())
            .map(|(token, src)| (*token, src.fd, src.interest.poll_flags()))
            .collect();

        if watched.is_empty() {
            return Ok(0);
        }

        let mut fds: Vec<PollFd<'_>> = watched
            .iter()
            .map(|(_, fd, flags)| {
                // SAFETY: registrations are removed before their descriptor is closed,
                // so every registered descriptor is open for the duration of this call.
                let fd = unsafe { BorrowedFd::borrow_raw(*fd) };
                PollFd::new(fd, *flags)
            })
            .collect();

        let timeout = match timeout {
            Some(t) => PollTimeout::try_from(t.as_millis()).unwrap_or(PollTimeout::MAX),
            None => PollTimeout::NONE,
        };

        match nix::poll::poll(&mut fds, timeout) {
            Ok(0) => return Ok(0),
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => return Ok(0),
            Err(e) => return Err(e.into()),
        }

        let ready: Vec<Token> = watched
            .iter()
            .zip(fds.iter())
            .filter_map(|((token, _, wanted), pollfd)| {
                let revents = pollfd.revents()?;
                if revents.contains(PollFlags::POLLNVAL) {
                    warn!("reactor: descriptor for {token} is no longer valid");
                    return None;
                }
                revents
                    .intersects(*wanted | PollFlags::POLLERR)
                    .then_some(*token)
            })
            .collect();

        let mut dispatched = 0;
        for token in ready {
            if self.dispatch(token) {
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    /// Call the handler of `token` if it is still registered.
    fn dispatch(&self, token: Token) -> bool {
        let handler = match self.sources.borrow_mut().get_mut(&token) {
            Some(src) => src.handler.take(),
            None => {
                trace!("reactor: dropping readiness for deregistered {token}");
                return false;
            }
        };
        let Some(mut handler) = handler else {
            return false;
        };

        handler();

        // The handler may have deregistered its own token.
        if let Some(src) = self.sources.borrow_mut().get_mut(&token) {
            src.handler = Some(handler);
        }
        true
    }
}

impl Reactor for PollReactor {
    fn register(&self, fd: BorrowedFd<'_>, interest: Interest) -> Result<Token> {
        let token = Token(self.next_token.get());
        self.next_token.set(token.0 + 1);

        trace!("reactor: register fd {} as {token}", fd.as_raw_fd());
        self.sources.borrow_mut().insert(
            token,
            Source {
                fd: fd.as_raw_fd(),
                interest,
                handler: None,
            },
        );
        Ok(token)
    }

    fn on_ready(&self, token: Token, handler: ReadyHandler) -> Result<()> {
        let mut sources = self.sources.borrow_mut();
        let src = sources
            .get_mut(&token)
            .ok_or(ErrorKind::UnknownToken(token.0))?;
        src.handler = Some(handler);
        Ok(())
    }

    fn deregister(&self, token: Token) -> Result<()> {
        trace!("reactor: deregister {token}");
        // Take the handler out before dropping it: its destructor may touch the reactor.
        let removed = self.sources.borrow_mut().remove(&token);
        match removed {
            Some(src) => {
                drop(src);
                Ok(())
            }
            None => Err(ErrorKind::UnknownToken(token.0).into()),
        }
    }
}

#[cfg(test)]
mod test {
    use std::{io::Write, os::fd::AsFd, os::unix::net::UnixStream, rc::Rc};

    use super::*;

    fn readable_pair() -> (UnixStream, UnixStream) {
        let (mut tx, rx) = UnixStream::pair().unwrap();
        tx.write_all(b"x").unwrap();
        (tx, rx)
    }

    #[test]
    fn dispatches_ready_handlers() {
        let reactor = PollReactor::new();
        let (_tx, rx) = readable_pair();
        let hits = Rc::new(Cell::new(0));

        let token = reactor.register(rx.as_fd(), Interest::READABLE).unwrap();
        let counter = hits.clone();
        reactor
            .on_ready(token, Box::new(move || counter.set(counter.get() + 1)))
            .unwrap();

        assert_eq!(reactor.poll_once(Some(Duration::from_secs(1))).unwrap(), 1);
        assert_eq!(hits.get(), 1);

        reactor.deregister(token).unwrap();
        assert!(reactor.is_empty());
        assert_eq!(reactor.poll_once(Some(Duration::ZERO)).unwrap(), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn idle_descriptor_times_out() {
        let reactor = PollReactor::new();
        let (_tx, rx) = UnixStream::pair().unwrap();

        let token = reactor.register(rx.as_fd(), Interest::READABLE).unwrap();
        reactor.on_ready(token, Box::new(|| panic!("not ready"))).unwrap();

        let dispatched = reactor
            .poll_once(Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(dispatched, 0);
    }

    #[test]
    fn deregistration_cancels_collected_readiness() {
        let reactor = Rc::new(PollReactor::new());
        let (_tx_a, rx_a) = readable_pair();
        let (_tx_b, rx_b) = readable_pair();
        let fired = Rc::new(RefCell::new(Vec::new()));

        let a = reactor.register(rx_a.as_fd(), Interest::READABLE).unwrap();
        let b = reactor.register(rx_b.as_fd(), Interest::READABLE).unwrap();

        // Whichever handler runs first cancels the other one, although both
        // descriptors were reported ready by the same poll.
        for (me, other) in [(a, b), (b, a)] {
            let weak = Rc::downgrade(&reactor);
            let fired = fired.clone();
            reactor
                .on_ready(
                    me,
                    Box::new(move || {
                        fired.borrow_mut().push(me);
                        if let Some(r) = weak.upgrade() {
                            let _ = r.deregister(other);
                        }
                    }),
                )
                .unwrap();
        }

        assert_eq!(reactor.poll_once(Some(Duration::from_secs(1))).unwrap(), 1);
        assert_eq!(fired.borrow().len(), 1);
        assert_eq!(reactor.len(), 1);
    }

    #[test]
    fn handler_may_deregister_itself() {
        let reactor = Rc::new(PollReactor::new());
        let (_tx, rx) = readable_pair();

        let token = reactor.register(rx.as_fd(), Interest::READABLE).unwrap();
        let weak = Rc::downgrade(&reactor);
        reactor
            .on_ready(
                token,
                Box::new(move || {
                    if let Some(r) = weak.upgrade() {
                        r.deregister(token).unwrap();
                    }
                }),
            )
            .unwrap();

        assert_eq!(reactor.poll_once(Some(Duration::from_secs(1))).unwrap(), 1);
        assert!(reactor.is_empty());
    }

    #[test]
    fn unknown_tokens() {
        let reactor = PollReactor::new();
        let err = reactor.deregister(Token(42)).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnknownToken(42)));
        assert!(reactor.on_ready(Token(1), Box::new(|| ())).is_err());
    }

    #[test]
    fn interest_maps_to_poll_flags() {
        assert_eq!(Interest::PRIORITY.poll_flags(), PollFlags::POLLPRI);
        assert_eq!(
            (Interest::READABLE | Interest::PRIORITY).poll_flags(),
            PollFlags::POLLIN | PollFlags::POLLPRI
        );
    }
}
