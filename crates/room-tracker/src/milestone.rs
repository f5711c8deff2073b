use crate::RoomName;
use crate::structures::StructureType;
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Milestone {
    ControllerLevel { level: u8 },
    StructureBuilt { id: String, structure: StructureType },
    SafeModeEnded,
    /// Informational countdown, repeated on a fixed tick cadence until safe mode ends.
    SafeModeRemaining { ticks: u64 },
}

impl Milestone {
    /// Countdown lines are progress notices rather than one-time benchmark signals.
    pub fn is_informational(&self) -> bool {
        matches!(self, Milestone::SafeModeRemaining { .. })
    }
}

impl Display for Milestone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Milestone::ControllerLevel { level } => write!(f, "controller progress: level {level}"),
            Milestone::StructureBuilt { id, structure } => {
                write!(f, "new {structure} detected: {id}")
            }
            Milestone::SafeModeEnded => write!(f, "safe mode ended"),
            Milestone::SafeModeRemaining { ticks } => {
                write!(f, "ticks until safe mode end: {ticks}")
            }
        }
    }
}

/// A milestone stamped with the room and the benchmark-relative tick it was observed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomMilestone {
    pub room: RoomName,
    pub tick: i64,
    #[serde(flatten)]
    pub milestone: Milestone,
}

impl Display for RoomMilestone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}][{}]: {}", self.tick, self.room, self.milestone)
    }
}
