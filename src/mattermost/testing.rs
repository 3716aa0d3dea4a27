use std::sync::Mutex;

use async_trait::async_trait;

use super::{ApiError, Channel, ChatApi, FileInfo, NewChannel, NewPost, Post, Team, User};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Ping,
    GetTeamByName(String),
    AutocompleteUsers { team_id: String, name: String },
    GetChannelByName { team_id: String, name: String },
    CreateChannel(NewChannel),
    AddChannelMember { channel_id: String, user_id: String },
    UploadFile { channel_id: String, filename: String, data: Vec<u8> },
    CreatePost(NewPost),
}

/// In-memory server used by the bootstrap, dispatcher and responder tests.
#[derive(Default)]
pub struct FakeChatApi {
    pub unreachable: bool,
    pub teams: Vec<Team>,
    pub users: Vec<User>,
    pub channels: Mutex<Vec<Channel>>,
    pub channel_lookup_error: Option<u16>,
    pub fail_create_channel: bool,
    pub fail_add_member: bool,
    pub fail_upload: bool,
    pub empty_upload: bool,
    pub fail_post: bool,
    pub log: Mutex<Vec<ApiCall>>,
}

fn status(endpoint: &str, status: u16) -> ApiError {
    ApiError::Status {
        endpoint: endpoint.to_string(),
        status,
        message: "fake failure".to_string(),
    }
}

impl FakeChatApi {
    pub fn with_defaults() -> Self {
        Self {
            teams: vec![Team {
                id: "team-1".to_string(),
                name: "dev".to_string(),
                display_name: "Dev".to_string(),
            }],
            users: vec![User {
                id: "u-bot".to_string(),
                username: "botkube".to_string(),
            }],
            ..Self::default()
        }
    }

    pub fn with_channel(self, id: &str, name: &str) -> Self {
        self.channels.lock().expect("lock").push(Channel {
            id: id.to_string(),
            team_id: "team-1".to_string(),
            name: name.to_string(),
            display_name: name.to_string(),
            purpose: String::new(),
            channel_type: "O".to_string(),
        });
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.log.lock().expect("lock").clone()
    }

    pub fn created_channels(&self) -> Vec<NewChannel> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::CreateChannel(channel) => Some(channel),
                _ => None,
            })
            .collect()
    }

    pub fn posts(&self) -> Vec<NewPost> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::CreatePost(post) => Some(post),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::UploadFile {
                    channel_id,
                    filename,
                    data,
                } => Some((channel_id, filename, data)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) {
        self.log.lock().expect("lock").push(call);
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn ping(&self) -> Result<(), ApiError> {
        self.record(ApiCall::Ping);
        if self.unreachable {
            return Err(status("config/client", 502));
        }
        Ok(())
    }

    async fn get_team_by_name(&self, name: &str) -> Result<Team, ApiError> {
        self.record(ApiCall::GetTeamByName(name.to_string()));
        self.teams
            .iter()
            .find(|team| team.name == name)
            .cloned()
            .ok_or_else(|| status("teams/name", 404))
    }

    async fn autocomplete_users_in_team(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Vec<User>, ApiError> {
        self.record(ApiCall::AutocompleteUsers {
            team_id: team_id.to_string(),
            name: name.to_string(),
        });
        Ok(self
            .users
            .iter()
            .filter(|user| user.username.starts_with(name))
            .cloned()
            .collect())
    }

    async fn get_channel_by_name(&self, team_id: &str, name: &str) -> Result<Channel, ApiError> {
        self.record(ApiCall::GetChannelByName {
            team_id: team_id.to_string(),
            name: name.to_string(),
        });
        if let Some(code) = self.channel_lookup_error {
            return Err(status("teams/channels/name", code));
        }
        self.channels
            .lock()
            .expect("lock")
            .iter()
            .find(|channel| channel.team_id == team_id && channel.name == name)
            .cloned()
            .ok_or_else(|| status("teams/channels/name", 404))
    }

    async fn create_channel(&self, channel: &NewChannel) -> Result<Channel, ApiError> {
        self.record(ApiCall::CreateChannel(channel.clone()));
        if self.fail_create_channel {
            return Err(status("channels", 403));
        }
        let created = Channel {
            id: format!("ch-{}", channel.name),
            team_id: channel.team_id.clone(),
            name: channel.name.clone(),
            display_name: channel.display_name.clone(),
            purpose: channel.purpose.clone(),
            channel_type: channel.channel_type.clone(),
        };
        self.channels.lock().expect("lock").push(created.clone());
        Ok(created)
    }

    async fn add_channel_member(&self, channel_id: &str, user_id: &str) -> Result<(), ApiError> {
        self.record(ApiCall::AddChannelMember {
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
        });
        if self.fail_add_member {
            return Err(status("channels/members", 400));
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        channel_id: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<Vec<FileInfo>, ApiError> {
        let size = data.len() as u64;
        self.record(ApiCall::UploadFile {
            channel_id: channel_id.to_string(),
            filename: filename.to_string(),
            data,
        });
        if self.fail_upload {
            return Err(status("files", 413));
        }
        if self.empty_upload {
            return Ok(Vec::new());
        }
        Ok(vec![
            FileInfo {
                id: "file-1".to_string(),
                name: filename.to_string(),
                size,
            },
            FileInfo {
                id: "file-2".to_string(),
                name: filename.to_string(),
                size,
            },
        ])
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, ApiError> {
        self.record(ApiCall::CreatePost(post.clone()));
        if self.fail_post {
            return Err(status("posts", 500));
        }
        Ok(Post {
            id: format!("post-{}", self.posts().len()),
            user_id: "u-bot".to_string(),
            channel_id: post.channel_id.clone(),
            root_id: post.root_id.clone(),
            message: post.message.clone(),
        })
    }
}
