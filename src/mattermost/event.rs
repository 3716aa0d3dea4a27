use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::Post;

/// Event tag the server emits when a new post is created.
pub const POSTED_EVENT: &str = "posted";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Broadcast {
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub user_id: String,
}

/// A single frame received over the websocket. Replies to client actions
/// (`{"status":"OK","seq_reply":1}`) decode with an empty `event`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub broadcast: Broadcast,
    #[serde(default)]
    pub seq: i64,
    /// Only set on replies: `OK` or `FAIL`.
    #[serde(default)]
    pub status: String,
}

#[derive(Error, Debug)]
pub enum MalformedEvent {
    #[error("event payload has no post field")]
    MissingPost,

    #[error("post field is not a string")]
    PostNotText,

    #[error("post payload is not valid JSON: {0}")]
    InvalidPost(#[from] serde_json::Error),
}

impl InboundEvent {
    pub fn is_posted(&self) -> bool {
        self.event == POSTED_EVENT
    }

    pub fn is_reply(&self) -> bool {
        self.event.is_empty()
    }

    /// A reply whose action was rejected, e.g. a failed authentication challenge.
    pub fn is_failed_reply(&self) -> bool {
        self.is_reply() && !self.status.is_empty() && self.status != "OK"
    }

    /// The post record travels as a JSON document serialized into the
    /// `post` string field.
    pub fn post(&self) -> Result<Post, MalformedEvent> {
        let raw = self.data.get("post").ok_or(MalformedEvent::MissingPost)?;
        let text = raw.as_str().ok_or(MalformedEvent::PostNotText)?;
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
pub(crate) fn posted_event(post: &Post, broadcast_channel: &str) -> InboundEvent {
    let mut data = Map::new();
    data.insert(
        "post".to_string(),
        Value::String(serde_json::to_string(post).unwrap_or_default()),
    );
    data.insert("channel_type".to_string(), Value::String("O".to_string()));
    InboundEvent {
        event: POSTED_EVENT.to_string(),
        data,
        broadcast: Broadcast {
            channel_id: broadcast_channel.to_string(),
            ..Broadcast::default()
        },
        seq: 7,
        status: String::new(),
    }
}
