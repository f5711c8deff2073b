//! Supervision of the game server process.
//!
//! The server is started with its working directory set to the folder of its executable, and
//! its combined output is scanned line by line until it reports being ready, reports an error,
//! or the startup timeout runs out. Spawned processes live in a shared [`ProcessRegistry`]
//! until they are terminated along with their descendants.

pub mod classifier;
pub mod output;
pub mod process_tree;
pub mod registry;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::prelude::*;
use output::{OutputStream, pipe_lines};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{Instant, sleep};

pub use classifier::{LineClass, LineClassifier, SignatureClassifier};
pub use registry::{ManagedProcess, ProcessRegistry, ProcessState, TeardownGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupTimeouts {
    /// Hard limit for the server to report ready
    pub startup: Duration,
    /// Elapsed time after which a notice is logged, without failing
    pub slow_start_warning: Duration,
}

/// How the output of a successful start went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupReport {
    pub elapsed: Duration,
    pub slow_start_warned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedServer {
    pub pid: u32,
    pub startup: StartupReport,
}

pub struct ServerSupervisor {
    registry: ProcessRegistry,
    classifier: Arc<dyn LineClassifier>,
    timeouts: StartupTimeouts,
}

impl ServerSupervisor {
    pub fn new(
        registry: ProcessRegistry,
        classifier: Arc<dyn LineClassifier>,
        timeouts: StartupTimeouts,
    ) -> Self {
        Self {
            registry,
            classifier,
            timeouts,
        }
    }

    pub fn from_config(registry: ProcessRegistry, config: &ServerConfig) -> Self {
        Self::new(
            registry,
            Arc::new(SignatureClassifier::from(config)),
            StartupTimeouts {
                startup: config.startup_timeout,
                slow_start_warning: config.slow_start_warning,
            },
        )
    }

    /// Launch `executable` and wait for it to report ready.
    ///
    /// The process is registered as soon as it is spawned. On success it keeps running, on any
    /// failure it leaves the registry and its tree is killed before the error is returned.
    /// There is no retry.
    pub async fn start(
        &self,
        executable: &Path,
        args: &[String],
    ) -> Result<StartedServer, ServerError> {
        let working_dir = executable
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        debug!(
            "Launching {} {} in {}",
            executable.display(),
            args.join(" "),
            working_dir.display()
        );
        let mut child = Command::new(executable)
            .args(args)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ServerError::Spawn {
                path: executable.to_path_buf(),
                source,
            })?;

        let (lines_tx, mut lines) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            pipe_lines(stdout, OutputStream::Stdout, lines_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pipe_lines(stderr, OutputStream::Stderr, lines_tx.clone());
        }
        drop(lines_tx);

        let pid = child_pid(&child, executable)?;
        // Registered before the wait so an interrupted start is still torn down
        self.registry
            .register(ManagedProcess::new(pid, working_dir, args.to_vec(), child));

        match wait_for_signature(&mut lines, self.classifier.as_ref(), self.timeouts).await {
            Ok(startup) => {
                self.registry.set_state(pid, ProcessState::Running);
                info!(
                    "Server started in {} (pid {pid})",
                    humantime::format_duration(round_to_millis(startup.elapsed))
                );
                Ok(StartedServer { pid, startup })
            }
            Err(err) => {
                if let Some(mut process) = self.registry.remove(pid) {
                    process.set_state(ProcessState::Failed);
                    process.terminate();
                }
                Err(err)
            }
        }
    }

    pub fn terminate_all(&self) {
        self.registry.terminate_all();
    }
}

fn child_pid(child: &Child, executable: &Path) -> Result<u32, ServerError> {
    child.id().ok_or_else(|| ServerError::Spawn {
        path: executable.to_path_buf(),
        source: std::io::Error::other("the process was reaped before its pid was read"),
    })
}

fn round_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}

/// Consume output lines until the first ready or error line.
///
/// Lines classified as [`LineClass::Ignore`] are skipped, so an error line tolerated by the
/// classifier never prevents a later ready line from counting.
pub async fn wait_for_signature(
    lines: &mut UnboundedReceiver<String>,
    classifier: &dyn LineClassifier,
    timeouts: StartupTimeouts,
) -> Result<StartupReport, ServerError> {
    let start = Instant::now();
    let deadline = sleep(timeouts.startup);
    let slow_start = sleep(timeouts.slow_start_warning);
    tokio::pin!(deadline, slow_start);
    let mut slow_start_warned = false;

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => match classifier.classify(&line) {
                    LineClass::Ready => {
                        return Ok(StartupReport {
                            elapsed: start.elapsed(),
                            slow_start_warned,
                        });
                    }
                    LineClass::Error => return Err(ServerError::ErrorSignal { line }),
                    LineClass::Ignore => {}
                },
                None => return Err(ServerError::Exited),
            },
            _ = &mut slow_start, if !slow_start_warned => {
                slow_start_warned = true;
                info!(
                    "The server is taking longer than usual to start, this is expected when it installs or updates its dependencies"
                );
            }
            _ = &mut deadline => {
                return Err(ServerError::ProcessTimeout {
                    timeout: timeouts.startup,
                });
            }
        }
    }
}
