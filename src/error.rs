use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures of a single server start attempt. All of them are terminal for that attempt.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to launch {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("server did not report ready within {}", humantime::format_duration(*timeout))]
    ProcessTimeout { timeout: Duration },
    #[error("server reported a startup failure: {line}")]
    ErrorSignal { line: String },
    #[error("server closed its output before reporting ready")]
    Exited,
}

/// Outcome of a command the server did not execute successfully.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The server could not be reached (refused, reset, timed out).
    #[error("could not reach the server to run `{command}`: {source}")]
    Transport {
        command: String,
        #[source]
        source: BoxError,
    },
    /// The server received the command and rejected it.
    #[error("server rejected `{command}`: {response}")]
    Semantic { command: String, response: String },
}

impl CommandError {
    /// Transport failures usually mean "not ready yet" and are worth retrying, a rejected
    /// command will be rejected again.
    pub fn is_transient(&self) -> bool {
        matches!(self, CommandError::Transport { .. })
    }
}

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("command channel was not ready after {}", humantime::format_duration(*waited))]
    Timeout {
        waited: Duration,
        #[source]
        last_error: Option<CommandError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_transience() {
        let transport = CommandError::Transport {
            command: "help()".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into(),
        };
        let semantic = CommandError::Semantic {
            command: "setPassword('bench_W8N3', 'pw')".into(),
            response: "Error: user not found".into(),
        };
        assert!(transport.is_transient());
        assert!(!semantic.is_transient());
        assert_eq!(
            semantic.to_string(),
            "server rejected `setPassword('bench_W8N3', 'pw')`: Error: user not found"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = ServerError::ProcessTimeout {
            timeout: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "server did not report ready within 1m");
    }
}
