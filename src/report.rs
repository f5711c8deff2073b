use std::fs;
use std::path::Path;

use crate::prelude::*;
use itertools::Itertools;
use room_tracker::{RoomMilestone, RoomName, RoomSummary, TelemetryTracker};
use serde::Serialize;
use tabled::settings::object::{Columns, Rows};
use tabled::settings::panel::Panel;
use tabled::settings::style::HorizontalLine;
use tabled::settings::{Alignment, Color, Modify, Style};
use tabled::{Table, Tabled};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRoom {
    pub room: RoomName,
    pub reason: String,
}

/// Everything a run measured, written as the JSON results file.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub tick_offset: u64,
    pub horizon_ticks: u64,
    pub rooms: Vec<RoomSummary>,
    pub failed_rooms: Vec<FailedRoom>,
    pub milestones: Vec<RoomMilestone>,
}

impl BenchmarkReport {
    pub fn new(
        tick_offset: u64,
        horizon_ticks: u64,
        tracker: &TelemetryTracker,
        milestones: Vec<RoomMilestone>,
        failed_rooms: Vec<FailedRoom>,
    ) -> Self {
        Self {
            tick_offset,
            horizon_ticks,
            rooms: tracker.summaries(),
            failed_rooms,
            milestones,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write the results to {}", path.display()))?;
        info!("Results written to {}", path.display());
        Ok(())
    }
}

#[derive(Tabled)]
struct RoomRow {
    #[tabled(rename = "Room")]
    room: String,
    #[tabled(rename = "Last tick")]
    last_tick: String,
    #[tabled(rename = "Controller levels")]
    levels: String,
    #[tabled(rename = "Structures")]
    structures: String,
    #[tabled(rename = "Construction")]
    construction_points: String,
    #[tabled(rename = "Safe mode end")]
    safe_mode_end: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}

impl From<&RoomSummary> for RoomRow {
    fn from(summary: &RoomSummary) -> Self {
        let levels = summary
            .controller_level_ticks
            .iter()
            .map(|(level, tick)| format!("{level}@{tick}"))
            .join(" ");
        Self {
            room: summary.room.clone(),
            last_tick: or_dash(summary.last_tick),
            levels: if levels.is_empty() { "-".into() } else { levels },
            structures: summary.structures.values().sum::<usize>().to_string(),
            construction_points: summary.construction_points.to_string(),
            safe_mode_end: or_dash(summary.safe_mode_ended_at),
            cpu: or_dash(summary.mean_cpu.map(|cpu| format!("{cpu:.2}"))),
            memory: or_dash(summary.mean_memory.map(|memory| format!("{:.0} B", memory))),
        }
    }
}

pub fn build_summary_table(report: &BenchmarkReport) -> String {
    let rows = report.rooms.iter().map(RoomRow::from).collect_vec();

    let header_line = HorizontalLine::full('─', '┬', '├', '┤');
    let column_line = HorizontalLine::inherit(Style::modern());
    let title = (Color::BOLD | Color::FG_CYAN).colorize(format!(
        "Benchmark results (horizon {} ticks)",
        report.horizon_ticks
    ));

    let mut table = Table::new(rows);
    table
        .with(Panel::header(title))
        .with(
            Style::rounded()
                .remove_horizontals()
                .intersection_top('─')
                .horizontals([(1, header_line), (2, column_line)]),
        )
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .with(Modify::new(Rows::new(1..2)).with(Color::BOLD))
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()));
    table.to_string()
}

/// Log the summary table and the rooms left out of the run
pub fn log_report(report: &BenchmarkReport) {
    info!("\n{}", build_summary_table(report));
    for failed in &report.failed_rooms {
        warn!("[{}] Not benchmarked: {}", failed.room, failed.reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use room_tracker::{CpuSample, RoomSnapshot, TrackerSettings};
    use serde_json::json;

    fn report() -> BenchmarkReport {
        let mut tracker = TelemetryTracker::new(TrackerSettings::default());
        tracker.set_tick_offset(100);
        let snapshot = RoomSnapshot::from_json(&json!({
            "gameTime": 150,
            "objects": {
                "ctrl": { "type": "controller", "level": 2 },
                "ext1": { "type": "extension" }
            }
        }))
        .unwrap();
        let milestones = tracker.apply_snapshot("W8N3", &snapshot);
        tracker.on_cpu_sample(
            "W8N3",
            CpuSample {
                cpu_used: 4.0,
                memory_used: 1000,
            },
        );

        BenchmarkReport::new(
            100,
            10_000,
            &tracker,
            milestones,
            vec![FailedRoom {
                room: "W2N5".into(),
                reason: "server rejected".into(),
            }],
        )
    }

    #[test]
    fn test_summary_table() {
        let table = build_summary_table(&report());
        assert!(table.contains("W8N3"));
        assert!(table.contains("2@50"));
        assert!(table.contains("3000"));
        assert!(table.contains("4.00"));
        assert!(!table.contains("W2N5"));
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results").join("run.json");

        report().write_json(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["tick_offset"], 100);
        assert_eq!(written["rooms"][0]["room"], "W8N3");
        assert_eq!(written["rooms"][0]["construction_points"], 3000);
        assert_eq!(written["failed_rooms"][0]["room"], "W2N5");
        assert_eq!(written["milestones"][0]["kind"], "controller_level");
    }
}
