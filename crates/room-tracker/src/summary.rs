use crate::RoomName;
use crate::structures::StructureType;
use crate::tracker::{RoomTrackingState, TelemetryTracker};
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

/// End-of-run figures for one room.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSummary {
    pub room: RoomName,
    pub last_tick: Option<i64>,
    pub controller_level_ticks: BTreeMap<u8, i64>,
    pub structures: BTreeMap<StructureType, usize>,
    /// Sum of the construction cost of every structure seen since the benchmark started.
    pub construction_points: u64,
    pub safe_mode_ended_at: Option<i64>,
    pub cpu_samples: usize,
    pub mean_cpu: Option<f64>,
    pub mean_memory: Option<f64>,
}

impl RoomSummary {
    fn from_state(room: &str, state: &RoomTrackingState, tracker: &TelemetryTracker) -> Self {
        let offset = tracker.tick_offset();
        // Structures that already existed before the benchmark started aren't progress
        let built = state
            .known_structures()
            .values()
            .filter(|s| {
                offset
                    .relative(s.first_seen_tick)
                    .is_some_and(|tick| tick >= 0)
            })
            .collect_vec();

        let structures = built.iter().map(|s| s.structure_type).counts();
        let construction_points = built
            .iter()
            .map(|s| s.structure_type.construction_cost())
            .sum();

        let samples = state.cpu_samples().values().collect_vec();
        let mean = |values: Vec<f64>| {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };

        Self {
            room: room.to_owned(),
            last_tick: tracker.current_relative_tick(room),
            controller_level_ticks: state.controller_level_ticks().clone(),
            structures: structures.into_iter().collect(),
            construction_points,
            safe_mode_ended_at: state.safe_mode_ended_at(),
            cpu_samples: samples.len(),
            mean_cpu: mean(samples.iter().map(|s| s.cpu_used).collect()),
            mean_memory: mean(samples.iter().map(|s| s.memory_used as f64).collect()),
        }
    }
}

impl TelemetryTracker {
    /// One summary per tracked room, ordered by room name.
    pub fn summaries(&self) -> Vec<RoomSummary> {
        self.rooms()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(room, state)| RoomSummary::from_state(room, state, self))
            .collect()
    }
}
