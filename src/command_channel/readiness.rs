use std::time::Duration;

use super::CommandChannel;
use crate::config::ReadinessConfig;
use crate::error::{CommandError, ReadinessError};
use crate::prelude::*;
use tokio::time::{Instant, sleep, timeout};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessOptions {
    pub timeout: Duration,
    pub interval: Duration,
    /// Side-effect free command used as probe
    pub probe_command: String,
}

impl From<&ReadinessConfig> for ReadinessOptions {
    fn from(config: &ReadinessConfig) -> Self {
        Self {
            timeout: config.timeout,
            interval: config.interval,
            probe_command: config.probe_command.clone(),
        }
    }
}

/// Probe the command channel until it answers, and return how long it took.
///
/// Unreachable means not ready yet. Any answer counts as ready, including a rejected probe,
/// since the server had to be up to reject it.
pub async fn wait_until_ready(
    channel: &dyn CommandChannel,
    options: &ReadinessOptions,
) -> Result<Duration, ReadinessError> {
    let start = Instant::now();
    let mut last_error: Option<CommandError> = None;
    let mut attempts = 0u32;

    loop {
        let remaining = options.timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }

        attempts += 1;
        match timeout(remaining, channel.execute(&options.probe_command)).await {
            Ok(Ok(_)) => {
                debug!("Command channel ready after {attempts} attempt(s)");
                return Ok(start.elapsed());
            }
            Ok(Err(err)) if !err.is_transient() => {
                debug!("Command channel ready, probe was rejected: {err}");
                return Ok(start.elapsed());
            }
            Ok(Err(err)) => {
                trace!("Command channel not ready yet: {err}");
                last_error = Some(err);
            }
            // The probe itself ran out the deadline
            Err(_) => break,
        }

        let remaining = options.timeout.saturating_sub(start.elapsed());
        sleep(options.interval.min(remaining)).await;
    }

    Err(ReadinessError::Timeout {
        waited: start.elapsed(),
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Plays back scripted answers, then refuses every connection.
    #[derive(Default)]
    struct ScriptedChannel {
        answers: RefCell<VecDeque<Result<String, CommandError>>>,
        calls: RefCell<Vec<Instant>>,
    }

    impl ScriptedChannel {
        fn new(answers: Vec<Result<String, CommandError>>) -> Self {
            Self {
                answers: RefCell::new(answers.into()),
                ..Default::default()
            }
        }
    }

    fn refused() -> Result<String, CommandError> {
        Err(CommandError::Transport {
            command: "help()".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into(),
        })
    }

    #[async_trait(?Send)]
    impl CommandChannel for ScriptedChannel {
        async fn execute(&self, _command: &str) -> Result<String, CommandError> {
            self.calls.borrow_mut().push(Instant::now());
            self.answers.borrow_mut().pop_front().unwrap_or_else(refused)
        }
    }

    struct HangingChannel;

    #[async_trait(?Send)]
    impl CommandChannel for HangingChannel {
        async fn execute(&self, _command: &str) -> Result<String, CommandError> {
            std::future::pending().await
        }
    }

    fn options(timeout: u64) -> ReadinessOptions {
        ReadinessOptions {
            timeout: Duration::from_secs(timeout),
            interval: Duration::from_secs(1),
            probe_command: "help()".into(),
        }
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_refused_connections_are_retried() {
        let channel = ScriptedChannel::new(vec![refused(), refused(), refused(), Ok("OK".into())]);

        let waited = wait_until_ready(&channel, &options(60)).await.unwrap();
        assert_eq!(channel.calls.borrow().len(), 4);
        assert_eq!(waited, Duration::from_secs(3));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_rejected_probe_means_ready() {
        let channel = ScriptedChannel::new(vec![Err(CommandError::Semantic {
            command: "help()".into(),
            response: "Error: user not found".into(),
        })]);

        let waited = wait_until_ready(&channel, &options(60)).await.unwrap();
        assert_eq!(channel.calls.borrow().len(), 1);
        assert_eq!(waited, Duration::ZERO);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_times_out_when_never_reachable() {
        let channel = ScriptedChannel::default();

        let err = wait_until_ready(&channel, &options(5)).await.unwrap_err();
        let ReadinessError::Timeout { waited, last_error } = err;
        assert_eq!(waited, Duration::from_secs(5));
        assert!(last_error.is_some_and(|err| err.is_transient()));
        // Probes at 0s..=4s, the deadline hits during the last sleep
        assert_eq!(channel.calls.borrow().len(), 5);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_hanging_probe_is_bounded_by_deadline() {
        let err = wait_until_ready(&HangingChannel, &options(10))
            .await
            .unwrap_err();
        let ReadinessError::Timeout { waited, last_error } = err;
        assert_eq!(waited, Duration::from_secs(10));
        assert!(last_error.is_none());
    }
}
