use crate::RoomName;
use crate::milestone::{Milestone, RoomMilestone};
use crate::snapshot::{CpuSample, ObjectSnapshot, RoomSnapshot};
use crate::structures::{CONTROLLER_TYPE, StructureType};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const MAX_CONTROLLER_LEVEL: u8 = 8;
pub const DEFAULT_SAFE_MODE_REPORT_INTERVAL: u64 = 500;

/// Absolute simulation tick at which the benchmark logically starts.
///
/// Unset until captured; every tick-relative value is unavailable before that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickOffset(Option<u64>);

impl TickOffset {
    pub fn get(&self) -> Option<u64> {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Convert an absolute tick, `None` while the offset is unset.
    pub fn relative(&self, absolute_tick: u64) -> Option<i64> {
        self.0.map(|offset| absolute_tick as i64 - offset as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KnownStructure {
    pub structure_type: StructureType,
    /// Absolute ticks.
    pub first_seen_tick: u64,
    pub last_seen_tick: u64,
    pub removed: bool,
}

/// Everything the tracker knows about one room.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoomTrackingState {
    known_structures: HashMap<String, KnownStructure>,
    controller_id: Option<String>,
    controller_level_ticks: BTreeMap<u8, i64>,
    safe_mode_expiry_tick: Option<u64>,
    safe_mode_ended_at: Option<i64>,
    last_countdown_bucket: Option<i64>,
    current_tick: Option<u64>,
    cpu_samples: BTreeMap<i64, CpuSample>,
}

impl RoomTrackingState {
    pub fn known_structures(&self) -> &HashMap<String, KnownStructure> {
        &self.known_structures
    }

    pub fn controller_id(&self) -> Option<&str> {
        self.controller_id.as_deref()
    }

    /// Relative tick at which each controller level was first observed.
    pub fn controller_level_ticks(&self) -> &BTreeMap<u8, i64> {
        &self.controller_level_ticks
    }

    pub fn safe_mode_expiry_tick(&self) -> Option<u64> {
        self.safe_mode_expiry_tick
    }

    pub fn safe_mode_ended_at(&self) -> Option<i64> {
        self.safe_mode_ended_at
    }

    /// Latest absolute tick seen for this room.
    pub fn current_tick(&self) -> Option<u64> {
        self.current_tick
    }

    pub fn cpu_samples(&self) -> &BTreeMap<i64, CpuSample> {
        &self.cpu_samples
    }

    fn highest_level(&self) -> Option<u8> {
        self.controller_level_ticks.keys().next_back().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Ticks between two "ticks until safe mode end" lines. Zero disables them.
    pub safe_mode_report_interval: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            safe_mode_report_interval: DEFAULT_SAFE_MODE_REPORT_INTERVAL,
        }
    }
}

/// Per-room state machine fed by the server's push events.
///
/// Rooms are created lazily on their first event and are fully independent from each other;
/// events for different rooms can arrive in any order. Malformed or partial data is skipped,
/// never reported as an error, so that losing one event doesn't stop the observation.
#[derive(Debug, Default)]
pub struct TelemetryTracker {
    offset: TickOffset,
    rooms: HashMap<RoomName, RoomTrackingState>,
    settings: TrackerSettings,
}

impl TelemetryTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    /// Capture the benchmark start tick. The offset can only be set once per run, later calls
    /// are ignored and return `false`.
    pub fn set_tick_offset(&mut self, absolute_tick: u64) -> bool {
        if let Some(offset) = self.offset.get() {
            warn!("Tick offset already set to {offset}, ignoring {absolute_tick}");
            return false;
        }
        debug!("Tick offset set to {absolute_tick}");
        self.offset = TickOffset(Some(absolute_tick));
        true
    }

    pub fn tick_offset(&self) -> TickOffset {
        self.offset
    }

    pub fn room(&self, room: &str) -> Option<&RoomTrackingState> {
        self.rooms.get(room)
    }

    pub fn rooms(&self) -> impl Iterator<Item = (&RoomName, &RoomTrackingState)> {
        self.rooms.iter()
    }

    /// Benchmark-relative tick of the latest event received for `room`.
    pub fn current_relative_tick(&self, room: &str) -> Option<i64> {
        let current_tick = self.rooms.get(room)?.current_tick?;
        self.offset.relative(current_tick)
    }

    /// Highest relative tick reached by any room.
    pub fn max_relative_tick(&self) -> Option<i64> {
        self.rooms
            .keys()
            .filter_map(|room| self.current_relative_tick(room))
            .max()
    }

    /// Apply one room snapshot and log the milestones it produced.
    pub fn on_room_snapshot(&mut self, room: &str, snapshot: &RoomSnapshot) -> Vec<RoomMilestone> {
        let milestones = self.apply_snapshot(room, snapshot);
        for milestone in &milestones {
            info!("{milestone}");
        }
        milestones
    }

    /// Apply one CPU sample, keyed by the room's current relative tick. Samples arriving before
    /// the tick offset is set, or before any room event, are dropped.
    pub fn on_cpu_sample(&mut self, room: &str, sample: CpuSample) -> bool {
        let Some(tick) = self.current_relative_tick(room) else {
            debug!("[{room}] Dropping CPU sample without a relative tick: {sample:?}");
            return false;
        };
        // The entry exists since current_relative_tick found it
        if let Some(state) = self.rooms.get_mut(room) {
            state.cpu_samples.insert(tick, sample);
        }
        true
    }

    /// Apply one room snapshot and return the milestones it produced, without logging them.
    pub fn apply_snapshot(&mut self, room: &str, snapshot: &RoomSnapshot) -> Vec<RoomMilestone> {
        let offset = self.offset;
        let settings = self.settings;
        let state = self.rooms.entry(room.to_owned()).or_default();

        if let Some(game_time) = snapshot.game_time {
            state.current_tick = Some(game_time);
        }
        let Some(tick) = state.current_tick else {
            debug!("[{room}] Skipping snapshot without a game time");
            return Vec::new();
        };
        let relative = offset.relative(tick);

        let mut milestones = Vec::new();
        for (id, object) in &snapshot.objects {
            let Some(object) = object else {
                if let Some(known) = state.known_structures.get_mut(id) {
                    known.removed = true;
                }
                continue;
            };

            if state.controller_id.is_none() && object.kind.as_deref() == Some(CONTROLLER_TYPE) {
                debug!("[{room}] Tracking controller {id}");
                state.controller_id = Some(id.clone());
            }

            if state.controller_id.as_deref() == Some(id.as_str()) {
                if let Some(milestone) = observe_controller(state, object, relative) {
                    milestones.push(milestone);
                }
                continue;
            }

            if let Some(known) = state.known_structures.get_mut(id) {
                known.last_seen_tick = tick;
                known.removed = false;
                continue;
            }

            let Some(structure_type) = object
                .kind
                .as_deref()
                .and_then(StructureType::from_type_name)
            else {
                continue;
            };
            state.known_structures.insert(
                id.clone(),
                KnownStructure {
                    structure_type,
                    first_seen_tick: tick,
                    last_seen_tick: tick,
                    removed: false,
                },
            );
            if structure_type.is_silent() || relative.is_none() {
                debug!("[{room}] Recorded {structure_type} {id} at absolute tick {tick}");
            } else {
                milestones.push(Milestone::StructureBuilt {
                    id: id.clone(),
                    structure: structure_type,
                });
            }
        }

        let Some(relative) = relative else {
            return Vec::new();
        };
        milestones.extend(check_safe_mode(state, settings, tick, relative));
        milestones
            .into_iter()
            .map(|milestone| RoomMilestone {
                room: room.to_owned(),
                tick: relative,
                milestone,
            })
            .collect()
    }
}

/// Record a new controller level or safe-mode expiry exposed by the tracked controller.
fn observe_controller(
    state: &mut RoomTrackingState,
    controller: &ObjectSnapshot,
    relative: Option<i64>,
) -> Option<Milestone> {
    if let Some(safe_mode) = controller.safe_mode
        && state.safe_mode_ended_at.is_none()
    {
        state.safe_mode_expiry_tick = Some(safe_mode);
    }

    let level = controller.level?;
    let relative = relative?;
    if !(1..=MAX_CONTROLLER_LEVEL).contains(&level) {
        return None;
    }
    // Levels are only ever reported in increasing order, a downgrade followed by an upgrade
    // doesn't re-trigger them.
    if state.highest_level().is_some_and(|highest| level <= highest) {
        return None;
    }
    state.controller_level_ticks.insert(level, relative);
    Some(Milestone::ControllerLevel { level })
}

fn check_safe_mode(
    state: &mut RoomTrackingState,
    settings: TrackerSettings,
    tick: u64,
    relative: i64,
) -> Option<Milestone> {
    let expiry = state.safe_mode_expiry_tick?;
    if state.safe_mode_ended_at.is_some() {
        return None;
    }

    if tick >= expiry {
        state.safe_mode_ended_at = Some(relative);
        return Some(Milestone::SafeModeEnded);
    }

    if settings.safe_mode_report_interval == 0 {
        return None;
    }
    let bucket = relative.div_euclid(settings.safe_mode_report_interval as i64);
    if state
        .last_countdown_bucket
        .is_some_and(|last| bucket <= last)
    {
        return None;
    }
    state.last_countdown_bucket = Some(bucket);
    Some(Milestone::SafeModeRemaining {
        ticks: expiry - tick,
    })
}
