use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    errors::{ErrorKind, Result},
    line::{
        event::EdgeMonitor, Active, Direction, Edge, EdgeCallback, LineHandle, LineOptions,
        LineValue,
    },
    reactor::Token,
};

struct PinState {
    line: Option<LineHandle>,
    monitor: Option<EdgeMonitor>,
}

/// An allocated GPIO line.
///
/// Pins are created by [`Controller::alloc_pin`](crate::Controller::alloc_pin). Cloning
/// a `Pin` gives another handle to the same line; once the line is released through
/// its controller, every handle reports [`ErrorKind::Released`].
#[derive(Clone)]
pub struct Pin {
    number: u32,
    options: LineOptions,
    state: Rc<RefCell<PinState>>,
}

impl Pin {
    pub(crate) fn new(
        number: u32,
        options: LineOptions,
        line: LineHandle,
        monitor: Option<EdgeMonitor>,
    ) -> Self {
        Self {
            number,
            options,
            state: Rc::new(RefCell::new(PinState {
                line: Some(line),
                monitor,
            })),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn direction(&self) -> Direction {
        self.options.direction
    }

    pub fn edge(&self) -> Edge {
        self.options.edge
    }

    pub fn active(&self) -> Active {
        self.options.active
    }

    pub fn options(&self) -> LineOptions {
        self.options
    }

    pub fn is_allocated(&self) -> bool {
        self.state.borrow().line.is_some()
    }

    /// `true` while an edge monitor is registered for this pin.
    pub fn is_monitored(&self) -> bool {
        self.state
            .borrow()
            .monitor
            .as_ref()
            .is_some_and(EdgeMonitor::is_active)
    }

    /// The event loop registration of the edge monitor, if any.
    pub fn token(&self) -> Option<Token> {
        self.state.borrow().monitor.as_ref().and_then(EdgeMonitor::token)
    }

    /// Drive the line high.
    pub fn set(&self) -> Result<()> {
        self.with_line(LineHandle::set)
    }

    /// Drive the line low.
    pub fn reset(&self) -> Result<()> {
        self.with_line(LineHandle::reset)
    }

    pub fn write(&self, value: LineValue) -> Result<()> {
        self.with_line(|line| line.write(value))
    }

    pub fn read(&self) -> Result<LineValue> {
        self.with_line(LineHandle::read)
    }

    /// Replace the callback of an edge-monitored pin.
    pub fn set_callback(&self, callback: EdgeCallback) -> Result<()> {
        let state = self.state.borrow();
        if state.line.is_none() {
            return Err(ErrorKind::Released(self.number).into());
        }
        state
            .monitor
            .as_ref()
            .ok_or(ErrorKind::NoEdgeMonitor(self.number))?
            .replace_callback(callback)
    }

    fn with_line<T>(&self, f: impl FnOnce(&LineHandle) -> Result<T>) -> Result<T> {
        let state = self.state.borrow();
        let line = state
            .line
            .as_ref()
            .ok_or(ErrorKind::Released(self.number))?;
        f(line)
    }

    /// Deregister the monitor, then close the line.
    ///
    /// The descriptor is closed even if deregistration fails; the first error is
    /// returned.
    pub(crate) fn teardown(&self) -> Result<()> {
        let (monitor, line) = {
            let mut state = self.state.borrow_mut();
            (state.monitor.take(), state.line.take())
        };

        let Some(line) = line else {
            return Err(ErrorKind::Released(self.number).into());
        };

        let result = monitor.map_or(Ok(()), |mut monitor| {
            if monitor.is_active() {
                monitor.deregister()
            } else {
                Ok(())
            }
        });

        line.close();
        result
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pin")
            .field("number", &self.number)
            .field("options", &self.options)
            .field("allocated", &self.is_allocated())
            .field("monitored", &self.is_monitored())
            .finish()
    }
}
