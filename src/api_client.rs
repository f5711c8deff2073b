use crate::prelude::*;
use crate::request_client::API_CLIENT;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;

/// Client of the game HTTP API served next to the game socket.
pub struct GameApiClient {
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct GameTimeResponse {
    time: u64,
}

#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
}

/// Every response carries `ok: 1` on success, or an `error` otherwise
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: i64,
    error: Option<String>,
}

impl GameApiClient {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid API path {path}"))
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read the {what} response"))?;
        if !status.is_success() {
            bail!("Failed to {what}: {status} {}", body.trim());
        }
        let envelope: Envelope = serde_json::from_str(&body)
            .with_context(|| format!("Unexpected {what} response: {body}"))?;
        if envelope.ok != 1 {
            bail!(
                "Failed to {what}: {}",
                envelope.error.unwrap_or_else(|| body.clone())
            );
        }
        serde_json::from_str(&body).with_context(|| format!("Unexpected {what} response: {body}"))
    }

    /// Current absolute simulation tick
    pub async fn game_time(&self) -> Result<u64> {
        let response = API_CLIENT
            .get(self.endpoint("api/game/time")?)
            .send()
            .await
            .context("Failed to query the game time")?;
        let time: GameTimeResponse = Self::parse(response, "query the game time").await?;
        Ok(time.time)
    }

    /// Exchange a username and password for an auth token
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<String> {
        let response = API_CLIENT
            .post(self.endpoint("api/auth/signin")?)
            .json(&SignInRequest {
                email: username,
                password,
            })
            .send()
            .await
            .with_context(|| format!("Failed to sign in as {username}"))?;
        let signed_in: SignInResponse =
            Self::parse(response, &format!("sign in as {username}")).await?;
        Ok(signed_in.token)
    }

    pub async fn current_user(&self, token: &str, username: &str) -> Result<UserInfo> {
        let response = API_CLIENT
            .get(self.endpoint("api/auth/me")?)
            .header("X-Token", token)
            .header("X-Username", username)
            .send()
            .await
            .context("Failed to fetch the current user")?;
        Self::parse(response, "fetch the current user").await
    }
}
