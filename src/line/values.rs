use std::{
    fs::File,
    os::{
        fd::{AsFd, BorrowedFd},
        unix::fs::FileExt,
    },
    path::{Path, PathBuf},
};

use bstr::ByteSlice;

use crate::errors::{Error, ErrorKind, Result};

/// Logic level of a line, after any active-low inversion done by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineValue {
    Low,
    High,
}

impl LineValue {
    pub const fn new(is_high: bool) -> Self {
        if is_high {
            Self::High
        } else {
            Self::Low
        }
    }

    pub const fn is_high(&self) -> bool {
        matches!(self, LineValue::High)
    }

    /// `0` for low, `1` for high.
    pub const fn as_u8(&self) -> u8 {
        match self {
            LineValue::Low => 0,
            LineValue::High => 1,
        }
    }

    pub(crate) const fn as_attr(&self) -> &'static [u8] {
        match self {
            LineValue::Low => b"0",
            LineValue::High => b"1",
        }
    }

    pub(crate) fn parse(raw: &[u8]) -> Option<Self> {
        match raw.trim() {
            b"0" => Some(LineValue::Low),
            b"1" => Some(LineValue::High),
            _ => None,
        }
    }
}

impl From<bool> for LineValue {
    fn from(value: bool) -> Self {
        Self::new(value)
    }
}

impl From<LineValue> for u8 {
    fn from(value: LineValue) -> Self {
        value.as_u8()
    }
}

impl From<LineValue> for bool {
    fn from(value: LineValue) -> Self {
        value.is_high()
    }
}

impl std::ops::Not for LineValue {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            LineValue::Low => LineValue::High,
            LineValue::High => LineValue::Low,
        }
    }
}

/// The open `value` attribute of a line.
///
/// Reads and writes always address offset zero, so the descriptor can be reused for
/// the lifetime of the line without seeking.
#[derive(Debug)]
pub(crate) struct ValueFile {
    path: PathBuf,
    file: File,
}

impl ValueFile {
    pub(crate) fn open(path: PathBuf, writable: bool) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&path)
            .map_err(|e| Error::attribute(&path, e))?;
        Ok(Self { path, file })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn read(&self) -> Result<LineValue> {
        let mut buf = [0u8; 8];
        let n = self
            .file
            .read_at(&mut buf, 0)
            .map_err(|e| Error::attribute(&self.path, e))?;

        LineValue::parse(&buf[..n]).ok_or_else(|| {
            ErrorKind::InvalidValue {
                path: self.path.clone(),
                content: String::from_utf8_lossy(&buf[..n]).into_owned(),
            }
            .into()
        })
    }

    pub(crate) fn write(&self, value: LineValue) -> Result<()> {
        self.file
            .write_all_at(value.as_attr(), 0)
            .map_err(|e| Error::attribute(&self.path, e))
    }
}

impl AsFd for ValueFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_attribute_content() {
        assert_eq!(LineValue::parse(b"1\n"), Some(LineValue::High));
        assert_eq!(LineValue::parse(b"0"), Some(LineValue::Low));
        assert_eq!(LineValue::parse(b" 0 \n"), Some(LineValue::Low));
        assert_eq!(LineValue::parse(b"2\n"), None);
        assert_eq!(LineValue::parse(b""), None);
    }

    #[test]
    fn conversions() {
        assert_eq!(u8::from(LineValue::High), 1);
        assert_eq!(LineValue::from(false), LineValue::Low);
        assert_eq!(!LineValue::Low, LineValue::High);
    }

    #[test]
    fn value_file_reuses_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        std::fs::write(&path, "0\n").unwrap();

        let value = ValueFile::open(path.clone(), true).unwrap();
        assert_eq!(value.read().unwrap(), LineValue::Low);
        value.write(LineValue::High).unwrap();
        assert_eq!(value.read().unwrap(), LineValue::High);
        value.write(LineValue::Low).unwrap();
        assert_eq!(value.read().unwrap(), LineValue::Low);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\n");
    }

    #[test]
    fn garbage_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        std::fs::write(&path, "x\n").unwrap();

        let value = ValueFile::open(path, false).unwrap();
        let err = value.read().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidValue { .. }));
    }
}
