// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The kernel side of the sysfs GPIO ABI.
//!
//! Documented upstream in [`Documentation/ABI/obsolete/sysfs-gpio`]. Lines are reserved
//! by writing their number to `export`, after which the kernel creates a `gpioN`
//! directory holding the per-line attributes.
//!
//! [`Documentation/ABI/obsolete/sysfs-gpio`]: https://www.kernel.org/doc/Documentation/ABI/obsolete/sysfs-gpio

use std::{
    fs::OpenOptions,
    io::{ErrorKind as IOErrorKind, Write},
    path::{Path, PathBuf},
    thread::sleep,
    time::Duration,
};

use log::{debug, trace};

use crate::errors::{Error, ErrorKind, Result};

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

pub const DEFAULT_EXPORT_ATTEMPTS: u32 = 10;
pub const DEFAULT_EXPORT_BACKOFF: Duration = Duration::from_millis(50);

/// Per-line attribute files inside `gpioN/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Direction,
    Value,
    Edge,
    ActiveLow,
}

impl Attribute {
    pub const fn file_name(self) -> &'static str {
        match self {
            Attribute::Direction => "direction",
            Attribute::Value => "value",
            Attribute::Edge => "edge",
            Attribute::ActiveLow => "active_low",
        }
    }
}

/// Bounds the wait for attribute files after an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_EXPORT_ATTEMPTS,
            backoff: DEFAULT_EXPORT_BACKOFF,
        }
    }
}

/// A sysfs GPIO class directory, normally `/sys/class/gpio`.
#[derive(Debug, Clone)]
pub struct Sysfs {
    root: PathBuf,
    retry: RetryPolicy,
}

impl Default for Sysfs {
    fn default() -> Self {
        Self::new(SYSFS_GPIO_ROOT)
    }
}

impl Sysfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        Self { retry, ..self }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn export_path(&self) -> PathBuf {
        self.root.join("export")
    }

    pub fn unexport_path(&self) -> PathBuf {
        self.root.join("unexport")
    }

    pub fn line_dir(&self, line: u32) -> PathBuf {
        self.root.join(format!("gpio{line}"))
    }

    pub fn attribute_path(&self, line: u32, attr: Attribute) -> PathBuf {
        self.line_dir(line).join(attr.file_name())
    }

    pub fn is_exported(&self, line: u32) -> bool {
        self.line_dir(line).is_dir()
    }

    /// Reserve `line` with the kernel.
    ///
    /// Returns `false` when the line was already exported, e.g. leaked by a process
    /// that exited without cleaning up.
    pub fn export(&self, line: u32) -> Result<bool> {
        if self.is_exported(line) {
            debug!("line {line} already exported");
            return Ok(false);
        }

        match write_control(&self.export_path(), line) {
            Ok(()) => Ok(true),
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) => {
                debug!("line {line} exported concurrently");
                Ok(false)
            }
            Err(e) => Err(Error::attribute(self.export_path(), e)),
        }
    }

    pub fn unexport(&self, line: u32) -> Result<()> {
        write_control(&self.unexport_path(), line)
            .map_err(|e| Error::attribute(self.unexport_path(), e))
    }

    /// Wait until the attributes of a freshly exported line are writable.
    ///
    /// The kernel (and udev, for permissions) populate `gpioN/` asynchronously, so
    /// `NotFound` and `PermissionDenied` are retried until the policy runs out.
    pub fn wait_for_attributes(&self, line: u32) -> Result<()> {
        let path = self.attribute_path(line, Attribute::Direction);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match OpenOptions::new().write(true).open(&path) {
                Ok(_) => return Ok(()),
                Err(e) => e,
            };

            if !attributes_pending(&err) {
                return Err(Error::attribute(path, err));
            }

            if attempt >= self.retry.attempts {
                return Err(ErrorKind::ExportTimeout {
                    line,
                    attempts: attempt,
                    source: err,
                }
                .into());
            }

            trace!("line {line}: attributes not ready ({err}), attempt {attempt}");
            sleep(self.retry.backoff);
        }
    }

    pub fn write_attribute(&self, line: u32, attr: Attribute, value: &str) -> Result<()> {
        let path = self.attribute_path(line, attr);
        trace!("{} <- {value}", path.display());
        std::fs::write(&path, value).map_err(|e| Error::attribute(path, e))
    }

    pub fn read_attribute(&self, line: u32, attr: Attribute) -> Result<String> {
        let path = self.attribute_path(line, attr);
        std::fs::read_to_string(&path)
            .map(|s| s.trim_end().to_owned())
            .map_err(|e| Error::attribute(path, e))
    }
}

/// Errors seen while the kernel and udev are still setting up `gpioN/`.
fn attributes_pending(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        IOErrorKind::NotFound | IOErrorKind::PermissionDenied
    )
}

fn write_control(path: &Path, line: u32) -> std::io::Result<()> {
    let mut f = OpenOptions::new().write(true).truncate(true).open(path)?;
    f.write_all(line.to_string().as_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    fn fake_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("export"), "").unwrap();
        std::fs::write(dir.path().join("unexport"), "").unwrap();
        dir
    }

    #[test]
    fn paths() {
        let sysfs = Sysfs::default();
        assert_eq!(sysfs.export_path(), Path::new("/sys/class/gpio/export"));
        assert_eq!(
            sysfs.attribute_path(17, Attribute::ActiveLow),
            Path::new("/sys/class/gpio/gpio17/active_low")
        );
    }

    #[test]
    fn export_writes_number() {
        let dir = fake_root();
        let sysfs = Sysfs::new(dir.path());

        assert!(sysfs.export(23).unwrap());
        let written = std::fs::read_to_string(dir.path().join("export")).unwrap();
        assert_eq!(written, "23");
    }

    #[test]
    fn export_tolerates_existing_directory() {
        let dir = fake_root();
        std::fs::create_dir(dir.path().join("gpio5")).unwrap();
        let sysfs = Sysfs::new(dir.path());

        assert!(!sysfs.export(5).unwrap());
        let written = std::fs::read_to_string(dir.path().join("export")).unwrap();
        assert!(written.is_empty());
    }

    #[test]
    fn wait_gives_up() {
        let dir = fake_root();
        let sysfs = Sysfs::new(dir.path()).with_retry(RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        });

        let err = sysfs.wait_for_attributes(8).unwrap_err();
        match err.kind() {
            ErrorKind::ExportTimeout { line, attempts, .. } => {
                assert_eq!(*line, 8);
                assert_eq!(*attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn wait_absorbs_slow_export() {
        let dir = fake_root();
        let sysfs = Sysfs::new(dir.path()).with_retry(RetryPolicy {
            attempts: 50,
            backoff: Duration::from_millis(10),
        });

        let line_dir = sysfs.line_dir(9);
        let populate = std::thread::spawn(move || {
            sleep(Duration::from_millis(30));
            std::fs::create_dir(&line_dir).unwrap();
            std::fs::write(line_dir.join("direction"), "in\n").unwrap();
        });

        sysfs.wait_for_attributes(9).unwrap();
        populate.join().unwrap();
        assert_eq!(sysfs.read_attribute(9, Attribute::Direction).unwrap(), "in");
    }

    #[test]
    fn pending_attribute_errors() {
        use std::io::Error as IOError;

        assert!(attributes_pending(&IOError::from(IOErrorKind::NotFound)));
        assert!(attributes_pending(&IOError::from(IOErrorKind::PermissionDenied)));
        assert!(!attributes_pending(&IOError::from(IOErrorKind::InvalidInput)));
        assert!(!attributes_pending(&IOError::from_raw_os_error(libc::EBUSY)));
    }

    #[test]
    fn attribute_round_trip() {
        let dir = fake_root();
        std::fs::create_dir(dir.path().join("gpio2")).unwrap();
        std::fs::write(dir.path().join("gpio2/edge"), "none\n").unwrap();
        let sysfs = Sysfs::new(dir.path());

        sysfs.write_attribute(2, Attribute::Edge, "both").unwrap();
        assert_eq!(sysfs.read_attribute(2, Attribute::Edge).unwrap(), "both");
    }
}
