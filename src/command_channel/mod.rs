//! Command channel to the running server.
//!
//! Every command is a single `POST /cli` exchange: the body is the command text, the response
//! body is its result. The server answers rejected commands with a response starting with
//! [`SEMANTIC_ERROR_MARKER`], which is reported as [`CommandError::Semantic`] and never mixed up
//! with failing to reach the server at all.

pub mod readiness;

use std::time::Duration;

use crate::error::CommandError;
use crate::prelude::*;
use crate::request_client::COMMAND_CLIENT;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use url::Url;

pub use readiness::{ReadinessOptions, wait_until_ready};

pub const SEMANTIC_ERROR_MARKER: &str = "Error:";

#[async_trait(?Send)]
pub trait CommandChannel {
    /// Run `command` on the server and return its textual result.
    async fn execute(&self, command: &str) -> Result<String, CommandError>;
}

pub struct HttpCommandChannel {
    url: Url,
    timeout: Duration,
}

impl HttpCommandChannel {
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self { url, timeout }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait(?Send)]
impl CommandChannel for HttpCommandChannel {
    async fn execute(&self, command: &str) -> Result<String, CommandError> {
        let transport_error = |source: reqwest::Error| CommandError::Transport {
            command: command.to_owned(),
            source: source.into(),
        };

        trace!("Sending command: {command}");
        let response = COMMAND_CLIENT
            .post(self.url.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(command.to_owned())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        // A 5xx means the server could not run the command yet, not that it rejected it
        if status.is_server_error() {
            return Err(CommandError::Transport {
                command: command.to_owned(),
                source: format!("server answered {status}: {}", text.trim()).into(),
            });
        }
        if !status.is_success() {
            return Err(CommandError::Semantic {
                command: command.to_owned(),
                response: format!("{status}: {}", text.trim()),
            });
        }
        classify_response(command, text)
    }
}

/// Split a response body into a result or a rejected command
pub fn classify_response(command: &str, response: String) -> Result<String, CommandError> {
    let response = response.trim();
    if response.starts_with(SEMANTIC_ERROR_MARKER) {
        return Err(CommandError::Semantic {
            command: command.to_owned(),
            response: response.to_owned(),
        });
    }
    Ok(response.to_owned())
}
