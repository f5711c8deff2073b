use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::prelude::*;
use itertools::Itertools;
use nestify::nest;
use room_tracker::{RoomQuorum, TrackerSettings};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "benchmark.yaml";

/// What to do when creating the test entity of one room fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomFailurePolicy {
    /// Report the room and keep benchmarking the others
    #[default]
    Continue,
    /// Abort the whole run
    Abort,
}

nest! {
    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]*
    #[serde(rename_all = "kebab-case", default)]*
    /// Benchmark configuration, usually read from `benchmark.yaml`.
    ///
    /// Every key is optional, missing keys take the values of [`BenchmarkConfig::default`].
    pub struct BenchmarkConfig {
        pub server: pub struct ServerConfig {
            pub executable: PathBuf,
            pub args: Vec<String>,
            /// Substring of an output line announcing the server is up
            pub ready_signature: String,
            /// Substring of an output line announcing a startup failure
            pub error_signature: String,
            /// Error lines containing one of these are not fatal
            pub tolerated_errors: Vec<String>,
            #[serde(with = "duration_str")]
            pub startup_timeout: Duration,
            #[serde(with = "duration_str")]
            pub slow_start_warning: Duration,
            pub host: String,
            pub cli_port: u16,
            pub game_port: u16,
            #[serde(with = "duration_str")]
            pub command_timeout: Duration,
        },
        pub readiness: pub struct ReadinessConfig {
            #[serde(with = "duration_str")]
            pub timeout: Duration,
            #[serde(with = "duration_str")]
            pub interval: Duration,
            pub probe_command: String,
        },
        pub benchmark: pub struct ScenarioConfig {
            pub rooms: Vec<String>,
            pub bot: String,
            pub user_prefix: String,
            pub password: String,
            /// Milliseconds per tick while benchmarking
            pub tick_duration: u64,
            #[serde(with = "duration_str")]
            pub room_setup_delay: Duration,
            pub room_failure_policy: RoomFailurePolicy,
            pub safe_mode_ticks: u64,
            pub horizon_ticks: u64,
            pub completion: RoomQuorum,
            pub safe_mode_report_interval: u64,
            #[serde(with = "duration_str")]
            pub status_interval: Duration,
            pub output: Option<PathBuf>,
        },
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("./server/screeps-launcher"),
            args: vec![],
            ready_signature: "Started".into(),
            error_signature: "Error".into(),
            tolerated_errors: vec![],
            startup_timeout: Duration::from_secs(60),
            slow_start_warning: Duration::from_secs(30),
            host: "127.0.0.1".into(),
            cli_port: 21026,
            game_port: 21025,
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(1),
            probe_command: "help()".into(),
        }
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            rooms: vec!["W8N3".into(), "W2N5".into(), "W8N7".into()],
            bot: "screeps-bot".into(),
            user_prefix: "bench".into(),
            password: "benchmark".into(),
            tick_duration: 10,
            room_setup_delay: Duration::from_secs(1),
            room_failure_policy: RoomFailurePolicy::default(),
            safe_mode_ticks: 20_000,
            horizon_ticks: 10_000,
            completion: RoomQuorum::default(),
            safe_mode_report_interval: 500,
            status_interval: Duration::from_secs(30),
            output: None,
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            readiness: ReadinessConfig::default(),
            benchmark: ScenarioConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn cli_url(&self) -> Result<Url> {
        Url::parse(&format!("http://{}:{}/cli", self.host, self.cli_port))
            .context("Invalid command channel address")
    }

    pub fn game_url(&self) -> Result<Url> {
        Url::parse(&format!("http://{}:{}/", self.host, self.game_port))
            .context("Invalid game API address")
    }

    pub fn socket_url(&self) -> Result<Url> {
        Url::parse(&format!(
            "ws://{}:{}/socket/websocket",
            self.host, self.game_port
        ))
        .context("Invalid game socket address")
    }
}

impl ScenarioConfig {
    /// Identity owning the test entity of `room`
    pub fn username(&self, room: &str) -> String {
        format!("{}_{}", self.user_prefix, room)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            safe_mode_report_interval: self.safe_mode_report_interval,
        }
    }
}

impl BenchmarkConfig {
    /// Load the configuration from `path`, or from `benchmark.yaml` in the current directory.
    ///
    /// An explicitly provided file must exist, the default one falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        match fs::read(&config_path) {
            Ok(config_str) => {
                let config: BenchmarkConfig = serde_yaml::from_slice(&config_str).context(
                    format!("Failed to parse config at {}", config_path.display()),
                )?;
                debug!("Config loaded from {}", config_path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                debug!(
                    "Config file not found at {}, using defaults",
                    config_path.display()
                );
                Ok(BenchmarkConfig::default())
            }
            Err(e) => bail!("Failed to load config at {}: {e}", config_path.display()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let scenario = &self.benchmark;
        ensure!(!scenario.rooms.is_empty(), "At least one room is required");
        if let Some(duplicate) = scenario.rooms.iter().duplicates().next() {
            bail!("Room {duplicate} is listed more than once");
        }
        ensure!(
            !self.server.ready_signature.is_empty(),
            "The ready signature cannot be empty"
        );
        ensure!(
            !self.server.error_signature.is_empty(),
            "The error signature cannot be empty"
        );
        ensure!(
            !self.readiness.interval.is_zero(),
            "The readiness interval must be greater than zero"
        );
        ensure!(
            !scenario.status_interval.is_zero(),
            "The status interval must be greater than zero"
        );
        ensure!(
            scenario.safe_mode_ticks > scenario.horizon_ticks,
            "safe-mode-ticks ({}) must outlast horizon-ticks ({})",
            scenario.safe_mode_ticks,
            scenario.horizon_ticks
        );
        if self.server.slow_start_warning >= self.server.startup_timeout {
            warn!("slow-start-warning is not shorter than startup-timeout, it will never fire");
        }
        Ok(())
    }
}

/// Humantime representation of durations, e.g. `"1m 30s"` or `"500ms"`
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(serde::de::Error::custom)
    }
}
