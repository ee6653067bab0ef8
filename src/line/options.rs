use crate::errors::{ErrorKind, Result};

use super::values::LineValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub const fn as_attr(self) -> &'static str {
        match self {
            Direction::Input => "in",
            Direction::Output => "out",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Active {
    #[default]
    High,
    Low,
}

/// The transitions that raise an edge notification on an input line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Edge {
    #[default]
    None,
    Rising,
    Falling,
    Both,
}

impl Edge {
    pub const fn as_attr(self) -> &'static str {
        match self {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        }
    }

    pub const fn is_none(self) -> bool {
        matches!(self, Edge::None)
    }
}

/// Everything written to a line's attributes when it is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOptions {
    pub direction: Direction,
    pub edge: Edge,
    pub active: Active,
    /// Level driven the moment an output is configured, avoiding a glitch between
    /// setting the direction and the first write.
    pub initial: Option<LineValue>,
}

impl LineOptions {
    pub const fn new(direction: Direction) -> Self {
        Self {
            direction,
            edge: Edge::None,
            active: Active::High,
            initial: None,
        }
    }

    pub const fn input() -> Self {
        Self::new(Direction::Input)
    }

    pub const fn output() -> Self {
        Self::new(Direction::Output)
    }

    pub const fn with_edge(self, edge: Edge) -> Self {
        Self { edge, ..self }
    }

    pub const fn with_active(self, active: Active) -> Self {
        Self { active, ..self }
    }

    pub const fn with_initial(self, value: LineValue) -> Self {
        Self {
            initial: Some(value),
            ..self
        }
    }

    /// The string written to the `direction` attribute.
    pub(crate) const fn direction_attr(&self) -> &'static str {
        match (self.direction, self.initial) {
            (Direction::Output, Some(LineValue::High)) => "high",
            (Direction::Output, Some(LineValue::Low)) => "low",
            (dir, _) => dir.as_attr(),
        }
    }

    /// Checks the direction/edge/callback combination for `line`.
    ///
    /// Edge monitoring needs both an edge and a callback, and only inputs can be
    /// monitored.
    pub(crate) fn validate(&self, line: u32, has_callback: bool) -> Result<()> {
        if !self.edge.is_none() && self.direction != Direction::Input {
            return Err(ErrorKind::EdgeRequiresInput(line).into());
        }

        match (self.edge.is_none(), has_callback) {
            (true, true) => Err(ErrorKind::CallbackWithoutEdge(line).into()),
            (false, false) => Err(ErrorKind::EdgeWithoutCallback(line).into()),
            _ => Ok(()),
        }
    }
}

impl From<Direction> for LineOptions {
    fn from(direction: Direction) -> Self {
        Self::new(direction)
    }
}
