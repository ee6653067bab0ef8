//! Error types shared by every part of the crate.
//!
//! All fallible operations return [`Error`], which wraps an [`ErrorKind`]. The kind
//! carries the details; [`Error::category`] groups kinds into the four classes callers
//! usually branch on.

use std::io::Error as IOError;
use std::path::PathBuf;

use crate::line::options::Direction;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(#[from] ErrorKind);

/// Coarse classification of an [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The line is unavailable, already allocated, or not allocated.
    Allocation,
    /// Inconsistent direction, edge and callback combination, or a bad configuration.
    Configuration,
    /// Failure talking to the kernel or to the event loop.
    Io,
    /// The operation is not valid for the current state of the pin or monitor.
    State,
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("line {0} is not in the set of available pins")]
    Unavailable(u32),
    #[error("line {0} is already allocated")]
    AlreadyAllocated(u32),
    #[error("line {0} is not allocated")]
    NotAllocated(u32),

    #[error("line {0}: edge detection requires the input direction")]
    EdgeRequiresInput(u32),
    #[error("line {0}: a callback was supplied without an edge to trigger on")]
    CallbackWithoutEdge(u32),
    #[error("line {0}: an edge was requested without a callback")]
    EdgeWithoutCallback(u32),
    #[error("line {0} appears more than once in the available pins")]
    DuplicateLine(u32),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] IOError),
    #[error("failed to access {}: {source}", path.display())]
    Attribute {
        path: PathBuf,
        #[source]
        source: IOError,
    },
    #[error("unexpected content {content:?} in {}", path.display())]
    InvalidValue { path: PathBuf, content: String },
    #[error("line {line} attributes did not appear after {attempts} attempts: {source}")]
    ExportTimeout {
        line: u32,
        attempts: u32,
        #[source]
        source: IOError,
    },
    #[error("event loop failure: {0}")]
    Reactor(#[from] nix::Error),

    #[error("line {line} is configured as {direction:?}, operation requires output")]
    NotOutput { line: u32, direction: Direction },
    #[error("line {0} has been released")]
    Released(u32),
    #[error("line {0} has no edge monitor")]
    NoEdgeMonitor(u32),
    #[error("edge monitor for line {0} is already registered")]
    MonitorActive(u32),
    #[error("edge monitor for line {0} is closed")]
    MonitorClosed(u32),
    #[error("unknown event loop token {0}")]
    UnknownToken(u64),
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    pub fn into_kind(self) -> ErrorKind {
        self.0
    }

    pub fn category(&self) -> ErrorCategory {
        self.0.category()
    }

    pub(crate) fn attribute(path: impl Into<PathBuf>, source: IOError) -> Self {
        ErrorKind::Attribute {
            path: path.into(),
            source,
        }
        .into()
    }
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::Unavailable(_)
            | ErrorKind::AlreadyAllocated(_)
            | ErrorKind::NotAllocated(_) => ErrorCategory::Allocation,
            ErrorKind::EdgeRequiresInput(_)
            | ErrorKind::CallbackWithoutEdge(_)
            | ErrorKind::EdgeWithoutCallback(_)
            | ErrorKind::DuplicateLine(_)
            | ErrorKind::InvalidConfig(_) => ErrorCategory::Configuration,
            ErrorKind::Io(_)
            | ErrorKind::Attribute { .. }
            | ErrorKind::InvalidValue { .. }
            | ErrorKind::ExportTimeout { .. }
            | ErrorKind::Reactor(_) => ErrorCategory::Io,
            ErrorKind::NotOutput { .. }
            | ErrorKind::Released(_)
            | ErrorKind::NoEdgeMonitor(_)
            | ErrorKind::MonitorActive(_)
            | ErrorKind::MonitorClosed(_)
            | ErrorKind::UnknownToken(_) => ErrorCategory::State,
        }
    }
}

impl From<IOError> for Error {
    fn from(err: IOError) -> Self {
        Self(ErrorKind::Io(err))
    }
}

impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        Self(ErrorKind::Reactor(err))
    }
}
