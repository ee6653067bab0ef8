use std::{
    cell::{Cell, RefCell},
    os::fd::AsFd,
    panic::{self, AssertUnwindSafe},
    rc::{Rc, Weak},
};

use log::{error, trace, warn};

use crate::{
    errors::{ErrorKind, Result},
    reactor::{Interest, Reactor, Token},
};

use super::{options::Edge, values::LineValue, values::ValueFile};

/// Called with the line number and the freshly read level for every delivered edge.
pub type EdgeCallback = Box<dyn FnMut(u32, LineValue)>;

/// Decides which notifications reach the callback.
///
/// The kernel already restricts notifications to the configured edge; this is the
/// second check against the level actually read back.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EdgeFilter {
    edge: Edge,
    last: LineValue,
    first_pending: bool,
}

impl EdgeFilter {
    pub(crate) const fn new(edge: Edge) -> Self {
        Self {
            edge,
            last: LineValue::Low,
            first_pending: false,
        }
    }

    /// Record the level read at registration. The first notification afterwards is
    /// dropped if it still shows this level.
    pub(crate) fn prime(&mut self, baseline: LineValue) {
        self.last = baseline;
        self.first_pending = true;
    }

    pub(crate) fn accept(&mut self, value: LineValue) -> bool {
        if std::mem::take(&mut self.first_pending) && value == self.last {
            return false;
        }

        let accept = match self.edge {
            Edge::None => false,
            Edge::Rising => value == LineValue::High,
            Edge::Falling => value == LineValue::Low,
            Edge::Both => value != self.last,
        };

        if accept {
            self.last = value;
        }
        accept
    }
}

/// State shared between a monitor and the handler it installs in the reactor.
struct Watch {
    line: u32,
    /// Emptied on deregistration so a running handler does not keep the descriptor open.
    value: RefCell<Option<Rc<ValueFile>>>,
    filter: RefCell<EdgeFilter>,
    callback: RefCell<Option<EdgeCallback>>,
    closed: Cell<bool>,
}

impl Watch {
    fn dispatch(&self) {
        if self.closed.get() {
            return;
        }

        let read = match self.value.borrow().as_deref() {
            Some(file) => file.read(),
            None => return,
        };
        let value = match read {
            Ok(v) => v,
            Err(e) => {
                warn!("line {}: dropping edge, re-read failed: {e}", self.line);
                return;
            }
        };

        if !self.filter.borrow_mut().accept(value) {
            trace!("line {}: filtered notification ({value:?})", self.line);
            return;
        }

        // Out of the cell while running, so the callback may replace itself or
        // release its own pin.
        let Some(mut callback) = self.callback.borrow_mut().take() else {
            return;
        };

        let line = self.line;
        trace!("line {line}: edge -> {value:?}");
        if panic::catch_unwind(AssertUnwindSafe(|| callback(line, value))).is_err() {
            error!("line {line}: edge callback panicked");
        }

        let mut slot = self.callback.borrow_mut();
        if !self.closed.get() && slot.is_none() {
            *slot = Some(callback);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    Unregistered,
    Active(Token),
    Closed,
}

/// Edge notification subscription for one input line.
///
/// `Unregistered -> Active -> Closed`; closing is terminal and happens on
/// [`deregister`](EdgeMonitor::deregister) or drop.
pub(crate) struct EdgeMonitor {
    state: MonitorState,
    watch: Rc<Watch>,
    reactor: Rc<dyn Reactor>,
}

impl EdgeMonitor {
    pub(crate) fn new(
        line: u32,
        edge: Edge,
        value: Rc<ValueFile>,
        callback: EdgeCallback,
        reactor: Rc<dyn Reactor>,
    ) -> Self {
        let watch = Rc::new(Watch {
            line,
            value: RefCell::new(Some(value)),
            filter: RefCell::new(EdgeFilter::new(edge)),
            callback: RefCell::new(Some(callback)),
            closed: Cell::new(false),
        });

        Self {
            state: MonitorState::Unregistered,
            watch,
            reactor,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        matches!(self.state, MonitorState::Active(_))
    }

    pub(crate) fn token(&self) -> Option<Token> {
        match self.state {
            MonitorState::Active(token) => Some(token),
            _ => None,
        }
    }

    pub(crate) fn register(&mut self) -> Result<()> {
        let line = self.watch.line;
        match self.state {
            MonitorState::Unregistered => {}
            MonitorState::Active(_) => return Err(ErrorKind::MonitorActive(line).into()),
            MonitorState::Closed => return Err(ErrorKind::MonitorClosed(line).into()),
        }

        let value = self
            .watch
            .value
            .borrow()
            .clone()
            .ok_or(ErrorKind::MonitorClosed(line))?;

        // Reading clears the pending notification the kernel raises for a freshly
        // opened attribute.
        let baseline = value.read()?;
        self.watch.filter.borrow_mut().prime(baseline);

        let token = self.reactor.register(value.as_fd(), Interest::PRIORITY)?;

        let watch: Weak<Watch> = Rc::downgrade(&self.watch);
        let reactor: Weak<dyn Reactor> = Rc::downgrade(&self.reactor);
        let handler = move || {
            let Some(watch) = watch.upgrade() else {
                return;
            };
            watch.dispatch();

            if watch.closed.get() {
                return;
            }
            if let Some(reactor) = reactor.upgrade() {
                if let Err(e) = reactor.rearm(token) {
                    warn!("line {}: failed to re-arm edge monitor: {e}", watch.line);
                }
            }
        };

        if let Err(e) = self.reactor.on_ready(token, Box::new(handler)) {
            if let Err(de) = self.reactor.deregister(token) {
                warn!("line {line}: deregistering after failed setup: {de}");
            }
            return Err(e);
        }

        trace!(
            "line {line}: monitoring {} as {token}, baseline {baseline:?}",
            value.path().display()
        );
        self.state = MonitorState::Active(token);
        Ok(())
    }

    /// Remove the registration and let go of the `value` descriptor. No callback runs
    /// after this returns.
    pub(crate) fn deregister(&mut self) -> Result<()> {
        let line = self.watch.line;
        let prev = std::mem::replace(&mut self.state, MonitorState::Closed);
        self.watch.closed.set(true);

        let result = match prev {
            MonitorState::Active(token) => self.reactor.deregister(token),
            MonitorState::Unregistered => Ok(()),
            MonitorState::Closed => Err(ErrorKind::MonitorClosed(line).into()),
        };
        self.watch.value.borrow_mut().take();
        result
    }

    pub(crate) fn replace_callback(&self, callback: EdgeCallback) -> Result<()> {
        if self.watch.closed.get() {
            return Err(ErrorKind::MonitorClosed(self.watch.line).into());
        }
        *self.watch.callback.borrow_mut() = Some(callback);
        Ok(())
    }
}

impl Drop for EdgeMonitor {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(e) = self.deregister() {
                warn!("line {}: deregistering edge monitor: {e}", self.watch.line);
            }
        }
    }
}
