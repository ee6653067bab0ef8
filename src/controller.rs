use std::{collections::BTreeMap, rc::Rc};

use log::{debug, warn};

use crate::{
    config::ControllerConfig,
    errors::{ErrorKind, Result},
    line::{
        event::EdgeMonitor, AsLineSet, Direction, Edge, EdgeCallback, LineHandle, LineOptions,
        LineSet,
    },
    pin::Pin,
    reactor::Reactor,
    uapi::Sysfs,
};

/// Authority over which GPIO lines this process may use and which it currently holds.
///
/// A controller is an explicit context object: create one at startup next to the
/// [`Reactor`] that drives edge notifications, assign the available pins, and allocate
/// from it. Every pin still allocated when the controller is dropped is released.
pub struct Controller {
    sysfs: Sysfs,
    reactor: Rc<dyn Reactor>,
    available: LineSet,
    allocated: BTreeMap<u32, Pin>,
}

impl Controller {
    /// A controller for `/sys/class/gpio` with no available pins yet.
    pub fn new(reactor: Rc<dyn Reactor>) -> Self {
        Self::with_sysfs(reactor, Sysfs::default())
    }

    pub fn with_sysfs(reactor: Rc<dyn Reactor>, sysfs: Sysfs) -> Self {
        Self {
            sysfs,
            reactor,
            available: LineSet::empty(),
            allocated: BTreeMap::new(),
        }
    }

    pub fn from_config(reactor: Rc<dyn Reactor>, config: &ControllerConfig) -> Result<Self> {
        let mut this = Self::with_sysfs(reactor, config.sysfs());
        this.set_available_pins(config.available_pins.as_slice())?;
        Ok(this)
    }

    pub fn sysfs(&self) -> &Sysfs {
        &self.sysfs
    }

    pub fn available_pins(&self) -> &LineSet {
        &self.available
    }

    /// Replace the set of lines that may be allocated.
    ///
    /// Pins already allocated stay allocated even if they are not part of `lines`.
    pub fn set_available_pins<S: AsLineSet + ?Sized>(&mut self, lines: &S) -> Result<()> {
        let lines = lines.as_line_set()?;
        debug!("available pins: {lines}");
        self.available = lines;
        Ok(())
    }

    pub fn is_allocated(&self, number: u32) -> bool {
        self.allocated.contains_key(&number)
    }

    /// Numbers of all allocated lines, in ascending order.
    pub fn allocated_pins(&self) -> impl Iterator<Item = u32> + '_ {
        self.allocated.keys().copied()
    }

    /// Reserve `number` and configure it.
    ///
    /// Edge monitoring needs both `callback` and an `edge` other than [`Edge::None`],
    /// and is only possible on inputs.
    pub fn alloc_pin(
        &mut self,
        number: u32,
        direction: Direction,
        callback: Option<EdgeCallback>,
        edge: Edge,
    ) -> Result<Pin> {
        self.alloc_pin_with(number, LineOptions::new(direction).with_edge(edge), callback)
    }

    pub fn alloc_pin_with(
        &mut self,
        number: u32,
        options: LineOptions,
        callback: Option<EdgeCallback>,
    ) -> Result<Pin> {
        debug!(
            "alloc_pin({number}, {options:?}, callback: {})",
            callback.is_some()
        );

        if !self.available.contains(number) {
            return Err(ErrorKind::Unavailable(number).into());
        }
        if self.allocated.contains_key(&number) {
            return Err(ErrorKind::AlreadyAllocated(number).into());
        }
        options.validate(number, callback.is_some())?;

        let line = LineHandle::open(&self.sysfs, number, &options)?;

        let monitor = match callback {
            Some(callback) => {
                let mut monitor = EdgeMonitor::new(
                    number,
                    options.edge,
                    line.value_file(),
                    callback,
                    self.reactor.clone(),
                );
                if let Err(e) = monitor.register() {
                    drop(monitor);
                    self.abandon(line);
                    return Err(e);
                }
                Some(monitor)
            }
            None => None,
        };

        let pin = Pin::new(number, options, line, monitor);
        self.allocated.insert(number, pin.clone());
        Ok(pin)
    }

    /// Close a line that failed to become a pin, unexporting it if we exported it.
    fn abandon(&self, line: LineHandle) {
        let number = line.line();
        let exported = line.exported();
        line.close();
        if exported {
            if let Err(e) = self.sysfs.unexport(number) {
                warn!("line {number}: unexport after failed allocation: {e}");
            }
        }
    }

    /// Deregister the edge monitor of `number`, close the line, unexport it and make
    /// the number available for allocation again.
    ///
    /// May be called from the pin's own edge callback; the `value` descriptor is still
    /// closed before the line is unexported.
    pub fn release_pin(&mut self, number: u32) -> Result<()> {
        debug!("release_pin({number})");

        let pin = self
            .allocated
            .remove(&number)
            .ok_or(ErrorKind::NotAllocated(number))?;

        let teardown = pin.teardown();
        let unexport = self.sysfs.unexport(number);
        teardown.and(unexport)
    }

    /// Release every allocated pin, returning the first error after trying them all.
    pub fn release_all(&mut self) -> Result<()> {
        let numbers: Vec<u32> = self.allocated_pins().collect();
        let mut result = Ok(());
        for number in numbers {
            if let Err(e) = self.release_pin(number) {
                warn!("line {number}: release failed: {e}");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    pub fn get_pin(&self, number: u32) -> Result<Pin> {
        self.allocated_pin(number).cloned()
    }

    pub fn set_pin(&self, number: u32) -> Result<()> {
        debug!("set_pin({number})");
        self.allocated_pin(number)?.set()
    }

    pub fn reset_pin(&self, number: u32) -> Result<()> {
        debug!("reset_pin({number})");
        self.allocated_pin(number)?.reset()
    }

    /// `true` if the line reads high.
    pub fn get_pin_state(&self, number: u32) -> Result<bool> {
        Ok(self.allocated_pin(number)?.read()?.is_high())
    }

    fn allocated_pin(&self, number: u32) -> Result<&Pin> {
        self.allocated
            .get(&number)
            .ok_or_else(|| ErrorKind::NotAllocated(number).into())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if !self.allocated.is_empty() {
            let _ = self.release_all();
        }
    }
}
