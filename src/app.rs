use std::path::PathBuf;
use std::time::Duration;

use crate::{
    benchmark::run_benchmark,
    command_channel::{HttpCommandChannel, ReadinessOptions, wait_until_ready},
    config::BenchmarkConfig,
    local_logger::{ACCENT_U8_COLOR_CODE, init_local_logger},
    prelude::*,
    report::log_report,
    server::ProcessRegistry,
};
use clap::{
    Args, Parser, Subcommand,
    builder::{Styles, styling},
};

fn create_styles() -> Styles {
    styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(
            styling::Ansi256Color(ACCENT_U8_COLOR_CODE).on_default() | styling::Effects::BOLD,
        )
        .placeholder(styling::AnsiColor::Cyan.on_default())
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Benchmark a bot against a local Screeps server",
    styles = create_styles()
)]
pub struct Cli {
    /// Path of the benchmark configuration file.
    /// Defaults to benchmark.yaml in the current directory, if it exists
    #[arg(long, short, env = "SCREEPS_BENCHMARK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server, run the benchmark scenario and stop the server
    Run(RunArgs),
    /// Check that the command channel of an already running server answers
    Probe,
}

#[derive(Args, Debug, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Rooms to benchmark, comma separated
    #[arg(long, value_delimiter = ',')]
    pub rooms: Vec<String>,

    /// Relative tick at which the benchmark completes
    #[arg(long)]
    pub horizon_ticks: Option<u64>,

    /// Write the results as JSON to this path
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Path of the server executable
    #[arg(long, env = "SCREEPS_SERVER_EXECUTABLE")]
    pub executable: Option<PathBuf>,
}

impl RunArgs {
    pub fn apply_to(self, config: &mut BenchmarkConfig) {
        if !self.rooms.is_empty() {
            config.benchmark.rooms = self.rooms;
        }
        if let Some(horizon_ticks) = self.horizon_ticks {
            config.benchmark.horizon_ticks = horizon_ticks;
        }
        if let Some(output) = self.output {
            config.benchmark.output = Some(output);
        }
        if let Some(executable) = self.executable {
            config.server.executable = executable;
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_local_logger()?;
    let mut config = BenchmarkConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            args.apply_to(&mut config);
            config.validate()?;
            run_and_report(&config).await?
        }
        Commands::Probe => probe(&config).await?,
    }
    Ok(())
}

async fn run_and_report(config: &BenchmarkConfig) -> Result<()> {
    let registry = ProcessRegistry::new();
    // Stops the server on every exit path, including errors and interruptions
    let _teardown = registry.teardown_guard();

    let mut signals = ShutdownSignals::install()?;

    let report = tokio::select! {
        report = run_benchmark(config, &registry) => report?,
        signal = signals.recv() => bail!("Received {signal}, stopping the server"),
    };

    log_report(&report);
    if let Some(output) = &config.benchmark.output {
        report.write_json(output)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Hangup,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT (Ctrl+C)"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Hangup => write!(f, "SIGHUP"),
        }
    }
}

/// Signals that end a run early.
///
/// Handlers are installed on construction. From then on these signals no longer kill the
/// runner directly, they are reported by [`ShutdownSignals::recv`] so the server can be stopped.
pub struct ShutdownSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            terminate: signal(SignalKind::terminate())
                .context("Failed to install the SIGTERM handler")?,
            hangup: signal(SignalKind::hangup()).context("Failed to install the SIGHUP handler")?,
        })
    }

    pub async fn recv(&mut self) -> ShutdownSignal {
        tokio::select! {
            _ = self.terminate.recv() => ShutdownSignal::Terminate,
            _ = self.hangup.recv() => ShutdownSignal::Hangup,
            _ = interrupt() => ShutdownSignal::Interrupt,
        }
    }
}

#[cfg(not(unix))]
impl ShutdownSignals {
    pub fn install() -> Result<Self> {
        Ok(Self {})
    }

    pub async fn recv(&mut self) -> ShutdownSignal {
        interrupt().await;
        ShutdownSignal::Interrupt
    }
}

async fn interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {err}");
        std::future::pending::<()>().await;
    }
}

async fn probe(config: &BenchmarkConfig) -> Result<()> {
    let channel = HttpCommandChannel::new(config.server.cli_url()?, config.server.command_timeout);
    let waited = wait_until_ready(&channel, &ReadinessOptions::from(&config.readiness)).await?;
    info!(
        "Command channel at {} is ready (waited {})",
        channel.url(),
        humantime::format_duration(Duration::from_millis(waited.as_millis() as u64))
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "screeps-benchmark",
            "run",
            "--rooms",
            "W1N1,W2N2",
            "--horizon-ticks",
            "500",
            "--config",
            "custom.yaml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        let Commands::Run(args) = cli.command else {
            panic!("expected the run command");
        };
        assert_eq!(args.rooms, vec!["W1N1", "W2N2"]);
        assert_eq!(args.horizon_ticks, Some(500));
    }

    #[test]
    fn test_parse_probe() {
        let cli = Cli::try_parse_from(["screeps-benchmark", "probe"]).unwrap();
        assert!(matches!(cli.command, Commands::Probe));
    }

    #[cfg(unix)]
    #[test_log::test(tokio::test)]
    async fn test_terminate_signal_is_caught() {
        let mut signals = ShutdownSignals::install().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let signal = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .unwrap();
        assert_eq!(signal, ShutdownSignal::Terminate);
        assert_eq!(signal.to_string(), "SIGTERM");
    }

    #[test]
    fn test_run_args_override_config() {
        let mut config = BenchmarkConfig::default();
        RunArgs {
            rooms: vec!["W5N5".into()],
            horizon_ticks: Some(2000),
            output: Some(PathBuf::from("results.json")),
            executable: None,
        }
        .apply_to(&mut config);

        assert_eq!(config.benchmark.rooms, vec!["W5N5"]);
        assert_eq!(config.benchmark.horizon_ticks, 2000);
        assert_eq!(config.benchmark.output, Some(PathBuf::from("results.json")));
        assert_eq!(
            config.server.executable,
            BenchmarkConfig::default().server.executable
        );

        let mut untouched = BenchmarkConfig::default();
        RunArgs::default().apply_to(&mut untouched);
        assert_eq!(untouched, BenchmarkConfig::default());
    }
}
