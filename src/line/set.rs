use std::fmt;

use itertools::Itertools;

use crate::errors::{ErrorKind, Result};

pub trait AsLineSet {
    fn as_line_set(&self) -> Result<LineSet>;
}

impl AsLineSet for u32 {
    fn as_line_set(&self) -> Result<LineSet> {
        LineSet::try_from_iter([*self])
    }
}

impl AsLineSet for [u32] {
    fn as_line_set(&self) -> Result<LineSet> {
        LineSet::try_from_iter(self.iter().copied())
    }
}

impl<const N: usize> AsLineSet for [u32; N] {
    fn as_line_set(&self) -> Result<LineSet> {
        LineSet::try_from_iter(*self)
    }
}

impl AsLineSet for Vec<u32> {
    fn as_line_set(&self) -> Result<LineSet> {
        LineSet::try_from_iter(self.iter().copied())
    }
}

impl AsLineSet for LineSet {
    fn as_line_set(&self) -> Result<LineSet> {
        Ok(self.clone())
    }
}

/// A sorted set of line numbers without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineSet(Vec<u32>);

impl LineSet {
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Builds a set from `iter`, rejecting numbers that appear more than once.
    pub fn try_from_iter(iter: impl IntoIterator<Item = u32>) -> Result<Self> {
        let mut lines: Vec<u32> = iter.into_iter().collect();
        lines.sort_unstable();

        if let Some((dup, _)) = lines.iter().tuple_windows().find(|(a, b)| a == b) {
            return Err(ErrorKind::DuplicateLine(*dup).into());
        }

        Ok(Self(lines))
    }

    pub fn contains(&self, line: u32) -> bool {
        self.find_idx(line).is_some()
    }

    pub fn find_idx(&self, line: u32) -> Option<usize> {
        self.0.binary_search(&line).ok()
    }

    pub fn add_line(&mut self, line: u32) -> Result<()> {
        match self.0.binary_search(&line) {
            Ok(_) => Err(ErrorKind::DuplicateLine(line).into()),
            Err(idx) => {
                self.0.insert(idx, line);
                Ok(())
            }
        }
    }
}

impl std::ops::Deref for LineSet {
    type Target = [u32];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for LineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}
