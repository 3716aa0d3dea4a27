use std::fmt;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub mod event;
pub mod websocket;

#[cfg(test)]
pub mod testing;

pub use self::event::{InboundEvent, MalformedEvent};
pub use self::websocket::{EventHandler, EventListener, ListenerError, ReconnectPolicy};

/// Channel type code for public ("open") channels.
pub const CHANNEL_OPEN: &str = "O";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(rename = "type", default)]
    pub channel_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewChannel {
    pub team_id: String,
    pub name: String,
    pub display_name: String,
    pub purpose: String,
    #[serde(rename = "type")]
    pub channel_type: String,
}

impl NewChannel {
    pub fn open(team_id: &str, name: &str, purpose: &str) -> Self {
        Self {
            team_id: team_id.to_string(),
            name: name.to_string(),
            display_name: name.to_string(),
            purpose: purpose.to_string(),
            channel_type: CHANNEL_OPEN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub root_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub channel_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub root_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct UserAutocomplete {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct FileUploadResponse {
    #[serde(default)]
    file_infos: Vec<FileInfo>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned status {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("{endpoint} returned an unexpected body: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid server url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

/// The subset of the Mattermost v4 REST API the bridge depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn ping(&self) -> Result<(), ApiError>;
    async fn get_team_by_name(&self, name: &str) -> Result<Team, ApiError>;
    async fn autocomplete_users_in_team(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Vec<User>, ApiError>;
    async fn get_channel_by_name(&self, team_id: &str, name: &str) -> Result<Channel, ApiError>;
    async fn create_channel(&self, channel: &NewChannel) -> Result<Channel, ApiError>;
    async fn add_channel_member(&self, channel_id: &str, user_id: &str) -> Result<(), ApiError>;
    async fn upload_file(
        &self,
        channel_id: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<Vec<FileInfo>, ApiError>;
    async fn create_post(&self, post: &NewPost) -> Result<Post, ApiError>;
}

pub struct MattermostClient {
    base_url: Url,
    token: SecretString,
    http: reqwest::Client,
}

impl fmt::Debug for MattermostClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MattermostClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl MattermostClient {
    pub fn new(base_url: Url, token: SecretString) -> Result<Self, ApiError> {
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .user_agent("botkube-mattermost")
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: "client builder".to_string(),
                source,
            })?;

        Ok(Self {
            base_url,
            token,
            http,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "v4"])
            .extend(segments);
        Ok(url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        debug!("mattermost request endpoint={}", endpoint);
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        response.json::<T>().await.map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

#[async_trait]
impl ChatApi for MattermostClient {
    async fn ping(&self) -> Result<(), ApiError> {
        let mut url = self.endpoint(&["config", "client"])?;
        url.query_pairs_mut().append_pair("format", "old");
        let _: Value = self.execute("config/client", self.http.get(url)).await?;
        Ok(())
    }

    async fn get_team_by_name(&self, name: &str) -> Result<Team, ApiError> {
        let url = self.endpoint(&["teams", "name", name])?;
        self.execute("teams/name", self.http.get(url)).await
    }

    async fn autocomplete_users_in_team(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Vec<User>, ApiError> {
        let mut url = self.endpoint(&["users", "autocomplete"])?;
        url.query_pairs_mut()
            .append_pair("in_team", team_id)
            .append_pair("name", name);
        let result: UserAutocomplete = self.execute("users/autocomplete", self.http.get(url)).await?;
        Ok(result.users)
    }

    async fn get_channel_by_name(&self, team_id: &str, name: &str) -> Result<Channel, ApiError> {
        let url = self.endpoint(&["teams", team_id, "channels", "name", name])?;
        self.execute("teams/channels/name", self.http.get(url)).await
    }

    async fn create_channel(&self, channel: &NewChannel) -> Result<Channel, ApiError> {
        let url = self.endpoint(&["channels"])?;
        self.execute("channels", self.http.post(url).json(channel))
            .await
    }

    async fn add_channel_member(&self, channel_id: &str, user_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["channels", channel_id, "members"])?;
        let _: Value = self
            .execute(
                "channels/members",
                self.http.post(url).json(&json!({ "user_id": user_id })),
            )
            .await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        channel_id: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<Vec<FileInfo>, ApiError> {
        let mut url = self.endpoint(&["files"])?;
        url.query_pairs_mut()
            .append_pair("channel_id", channel_id)
            .append_pair("filename", filename);
        let result: FileUploadResponse = self
            .execute(
                "files",
                self.http
                    .post(url)
                    .header("Content-Type", "application/octet-stream")
                    .body(data),
            )
            .await?;
        Ok(result.file_infos)
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, ApiError> {
        let url = self.endpoint(&["posts"])?;
        self.execute("posts", self.http.post(url).json(post)).await
    }
}

/// Mattermost error bodies carry a human readable `message`; fall back to
/// the raw body for proxies that answer with plain text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
