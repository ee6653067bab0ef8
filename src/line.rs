use std::rc::Rc;

use log::{debug, warn};

use crate::{
    errors::{ErrorKind, Result},
    uapi::{Attribute, Sysfs},
};

pub(crate) mod event;
pub mod options;
pub mod set;
pub mod values;

pub use event::EdgeCallback;
pub use options::{Active, Direction, Edge, LineOptions};
pub use set::{AsLineSet, LineSet};
pub use values::LineValue;

use values::ValueFile;

/// An exported line with its `value` attribute held open.
///
/// Dropping the handle closes the descriptor; unexporting is left to the
/// [`Controller`](crate::Controller), which owns the line number.
#[derive(Debug)]
pub struct LineHandle {
    line: u32,
    direction: Direction,
    exported: bool,
    value: Rc<ValueFile>,
}

impl LineHandle {
    /// Export `line` and write its attributes according to `options`.
    ///
    /// On failure, a line exported by this call is unexported again before the error
    /// is returned.
    pub(crate) fn open(sysfs: &Sysfs, line: u32, options: &LineOptions) -> Result<Self> {
        let exported = sysfs.export(line)?;

        match Self::configure(sysfs, line, options) {
            Ok(value) => {
                debug!("line {line}: opened as {:?}", options.direction);
                Ok(Self {
                    line,
                    direction: options.direction,
                    exported,
                    value: Rc::new(value),
                })
            }
            Err(e) => {
                if exported {
                    if let Err(ue) = sysfs.unexport(line) {
                        warn!("line {line}: unexport after failed setup: {ue}");
                    }
                }
                Err(e)
            }
        }
    }

    fn configure(sysfs: &Sysfs, line: u32, options: &LineOptions) -> Result<ValueFile> {
        sysfs.wait_for_attributes(line)?;
        sysfs.write_attribute(line, Attribute::Direction, options.direction_attr())?;

        if !options.edge.is_none() {
            sysfs.write_attribute(line, Attribute::Edge, options.edge.as_attr())?;
        }

        // Always written: a leaked export may still carry an inversion.
        let active_low = match options.active {
            Active::Low => "1",
            Active::High => "0",
        };
        sysfs.write_attribute(line, Attribute::ActiveLow, active_low)?;

        ValueFile::open(
            sysfs.attribute_path(line, Attribute::Value),
            options.direction == Direction::Output,
        )
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// `true` if opening this handle performed the export, rather than finding the
    /// line already exported.
    pub fn exported(&self) -> bool {
        self.exported
    }

    pub fn set(&self) -> Result<()> {
        self.write(LineValue::High)
    }

    pub fn reset(&self) -> Result<()> {
        self.write(LineValue::Low)
    }

    pub fn write(&self, value: LineValue) -> Result<()> {
        if self.direction != Direction::Output {
            return Err(ErrorKind::NotOutput {
                line: self.line,
                direction: self.direction,
            }
            .into());
        }
        self.value.write(value)
    }

    pub fn read(&self) -> Result<LineValue> {
        self.value.read()
    }

    /// Drop this handle's reference to the `value` descriptor.
    ///
    /// An edge monitor shares the descriptor; once it has been deregistered this is
    /// the last reference and the descriptor is closed here.
    pub fn close(self) {
        debug!(
            "line {}: closed ({} other references)",
            self.line,
            Rc::strong_count(&self.value) - 1
        );
    }

    pub(crate) fn value_file(&self) -> Rc<ValueFile> {
        self.value.clone()
    }
}
