use crate::RoomName;
use crate::tracker::TelemetryTracker;
use serde::{Deserialize, Serialize};

/// Which rooms have to pass the horizon before a run counts as complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomQuorum {
    #[default]
    Any,
    All,
}

/// "Relative tick exceeds the horizon" completion check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorizonPredicate {
    pub horizon: i64,
    pub quorum: RoomQuorum,
    pub rooms: Vec<RoomName>,
}

impl HorizonPredicate {
    pub fn new(horizon: u64, quorum: RoomQuorum, rooms: Vec<RoomName>) -> Self {
        Self {
            horizon: horizon as i64,
            quorum,
            rooms,
        }
    }

    /// Rooms that never produced an event don't count as past the horizon.
    pub fn is_complete(&self, tracker: &TelemetryTracker) -> bool {
        let mut past_horizon = self.rooms.iter().map(|room| {
            tracker
                .current_relative_tick(room)
                .is_some_and(|tick| tick > self.horizon)
        });
        match self.quorum {
            RoomQuorum::Any => past_horizon.any(|past| past),
            RoomQuorum::All => !self.rooms.is_empty() && past_horizon.all(|past| past),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::RoomSnapshot;
    use rstest::rstest;

    fn tracker_at(ticks: &[(&str, u64)]) -> TelemetryTracker {
        let mut tracker = TelemetryTracker::default();
        tracker.set_tick_offset(1000);
        for (room, tick) in ticks {
            tracker.apply_snapshot(
                room,
                &RoomSnapshot {
                    game_time: Some(*tick),
                    ..Default::default()
                },
            );
        }
        tracker
    }

    #[rstest]
    #[case(RoomQuorum::Any, &[("W8N3", 1100), ("W2N5", 1050)], true)]
    #[case(RoomQuorum::Any, &[("W8N3", 1099), ("W2N5", 1050)], false)]
    #[case(RoomQuorum::Any, &[("W8N3", 1100)], true)]
    #[case(RoomQuorum::All, &[("W8N3", 1100), ("W2N5", 1050)], false)]
    #[case(RoomQuorum::All, &[("W8N3", 1100), ("W2N5", 1101)], true)]
    #[case(RoomQuorum::All, &[("W8N3", 1100)], false)]
    #[case(RoomQuorum::Any, &[], false)]
    fn test_horizon_predicate(
        #[case] quorum: RoomQuorum,
        #[case] ticks: &[(&str, u64)],
        #[case] expected: bool,
    ) {
        let predicate = HorizonPredicate::new(99, quorum, vec!["W8N3".into(), "W2N5".into()]);
        assert_eq!(predicate.is_complete(&tracker_at(ticks)), expected);
    }

    #[test]
    fn test_unset_offset_is_never_complete() {
        let mut tracker = TelemetryTracker::default();
        tracker.apply_snapshot(
            "W8N3",
            &RoomSnapshot {
                game_time: Some(1_000_000),
                ..Default::default()
            },
        );
        let predicate = HorizonPredicate::new(10, RoomQuorum::Any, vec!["W8N3".into()]);
        assert!(!predicate.is_complete(&tracker));
    }
}
