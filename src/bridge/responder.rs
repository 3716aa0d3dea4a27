use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::mattermost::{ApiError, ChatApi, NewPost};

/// Messages at or above this many bytes are sent as a file attachment.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 3990;
pub const ATTACHMENT_FILE_NAME: &str = "logs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Inline { post_id: String },
    Attachment { post_id: String, file_id: String },
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("failed to upload attachment: {0}")]
    Upload(#[source] ApiError),

    #[error("attachment upload returned no file info")]
    EmptyUpload,

    #[error("failed to create post: {0}")]
    Post(#[source] ApiError),
}

pub struct Responder {
    api: Arc<dyn ChatApi>,
    max_message_length: usize,
}

impl Responder {
    pub fn new(api: Arc<dyn ChatApi>, max_message_length: usize) -> Self {
        Self {
            api,
            max_message_length,
        }
    }

    /// Posts `text` as a threaded reply to `reply_to` in `channel_id`.
    pub async fn send(
        &self,
        text: &str,
        reply_to: &str,
        channel_id: &str,
    ) -> Result<SendOutcome, SendError> {
        let mut post = NewPost {
            channel_id: channel_id.to_string(),
            root_id: reply_to.to_string(),
            ..NewPost::default()
        };

        if text.len() < self.max_message_length {
            post.message = text.to_string();
            let created = self.api.create_post(&post).await.map_err(SendError::Post)?;
            return Ok(SendOutcome::Inline {
                post_id: created.id,
            });
        }

        debug!(
            "message of {} bytes exceeds {}, sending as attachment channel={}",
            text.len(),
            self.max_message_length,
            channel_id
        );
        let infos = self
            .api
            .upload_file(channel_id, ATTACHMENT_FILE_NAME, text.as_bytes().to_vec())
            .await
            .map_err(SendError::Upload)?;
        let file_id = infos
            .into_iter()
            .next()
            .map(|info| info.id)
            .ok_or(SendError::EmptyUpload)?;

        post.file_ids = vec![file_id.clone()];
        let created = self.api.create_post(&post).await.map_err(SendError::Post)?;
        Ok(SendOutcome::Attachment {
            post_id: created.id,
            file_id,
        })
    }
}
