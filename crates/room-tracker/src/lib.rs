//! Live telemetry tracking for rooms under benchmark.
//!
//! The tracker consumes room snapshots and CPU samples pushed by the game server and turns them
//! into tick-relative benchmark signals. It performs no I/O: feeding it events and logging or
//! persisting its output is the caller's job.

pub mod completion;
pub mod milestone;
pub mod snapshot;
pub mod structures;
pub mod summary;
pub mod tracker;

pub use completion::{HorizonPredicate, RoomQuorum};
pub use milestone::{Milestone, RoomMilestone};
pub use snapshot::{CpuSample, ObjectSnapshot, RoomSnapshot};
pub use structures::StructureType;
pub use summary::RoomSummary;
pub use tracker::{KnownStructure, RoomTrackingState, TelemetryTracker, TickOffset, TrackerSettings};

/// Coordinate-style room label, e.g. `W8N3`.
pub type RoomName = String;
