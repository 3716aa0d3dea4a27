use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::mattermost::{ApiError, Channel, ChatApi, MattermostClient, NewChannel, Team, User};

/// Purpose set on the channel when the bridge has to create it.
pub const CHANNEL_PURPOSE: &str = "Botkube alerts";

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("invalid mattermost server url {url}: {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("failed to construct mattermost client: {0}")]
    Client(#[source] ApiError),

    #[error("mattermost server unreachable: {0}")]
    ServerUnreachable(#[source] ApiError),

    #[error("team {team} not found: {source}")]
    TeamNotFound {
        team: String,
        #[source]
        source: ApiError,
    },

    #[error("bot user {username} not found in team {team}")]
    BotUserNotFound {
        username: String,
        team: String,
        #[source]
        source: Option<ApiError>,
    },

    #[error("channel {channel} setup failed: {source}")]
    ChannelSetup {
        channel: String,
        #[source]
        source: ApiError,
    },
}

/// Server address, credentials and the authenticated client handle.
pub struct Session {
    server_url: Url,
    token: SecretString,
    api: Arc<dyn ChatApi>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("server_url", &self.server_url.as_str())
            .field("token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(server_url: Url, token: SecretString, api: Arc<dyn ChatApi>) -> Self {
        Self {
            server_url,
            token,
            api,
        }
    }

    /// Builds the HTTP client for `server_url`. Does not touch the network.
    pub fn connect(server_url: &str, token: &str) -> Result<Self, BootstrapError> {
        let url = Url::parse(server_url).map_err(|err| BootstrapError::InvalidServerUrl {
            url: server_url.to_string(),
            reason: err.to_string(),
        })?;
        let client = MattermostClient::new(url.clone(), SecretString::from(token.to_string()))
            .map_err(BootstrapError::Client)?;
        Ok(Self::new(url, SecretString::from(token.to_string()), Arc::new(client)))
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    pub fn token(&self) -> SecretString {
        SecretString::from(self.token.expose_secret().to_string())
    }

    pub fn api(&self) -> Arc<dyn ChatApi> {
        self.api.clone()
    }
}

/// Everything resolved during bootstrap. Built once and never rebound.
#[derive(Debug)]
pub struct BridgeContext {
    pub session: Session,
    pub team: Team,
    pub bot: User,
    pub channel: Channel,
}

#[derive(Debug, Clone)]
pub struct BootstrapTarget {
    pub team_name: String,
    pub channel_name: String,
    pub bot_name: String,
}

pub async fn bootstrap(
    session: Session,
    target: &BootstrapTarget,
) -> Result<BridgeContext, BootstrapError> {
    let api = session.api();

    api.ping()
        .await
        .map_err(BootstrapError::ServerUnreachable)?;
    debug!("mattermost server reachable url={}", session.server_url());

    let team = api
        .get_team_by_name(&target.team_name)
        .await
        .map_err(|source| BootstrapError::TeamNotFound {
            team: target.team_name.clone(),
            source,
        })?;

    let bot = resolve_bot_user(api.as_ref(), &team, &target.bot_name).await?;
    let channel = resolve_channel(api.as_ref(), &team, &target.channel_name, &bot).await?;

    Ok(BridgeContext {
        session,
        team,
        bot,
        channel,
    })
}

async fn resolve_bot_user(
    api: &dyn ChatApi,
    team: &Team,
    bot_name: &str,
) -> Result<User, BootstrapError> {
    let users = api
        .autocomplete_users_in_team(&team.id, bot_name)
        .await
        .map_err(|source| BootstrapError::BotUserNotFound {
            username: bot_name.to_string(),
            team: team.name.clone(),
            source: Some(source),
        })?;

    users
        .into_iter()
        .next()
        .ok_or_else(|| BootstrapError::BotUserNotFound {
            username: bot_name.to_string(),
            team: team.name.clone(),
            source: None,
        })
}

async fn resolve_channel(
    api: &dyn ChatApi,
    team: &Team,
    channel_name: &str,
    bot: &User,
) -> Result<Channel, BootstrapError> {
    let channel = match api.get_channel_by_name(&team.id, channel_name).await {
        Ok(channel) => {
            info!("found mattermost channel name={} id={}", channel.name, channel.id);
            channel
        }
        Err(err) if err.is_not_found() => {
            let request = NewChannel::open(&team.id, channel_name, CHANNEL_PURPOSE);
            let channel = api.create_channel(&request).await.map_err(|source| {
                BootstrapError::ChannelSetup {
                    channel: channel_name.to_string(),
                    source,
                }
            })?;
            info!("created mattermost channel name={} id={}", channel.name, channel.id);
            channel
        }
        Err(source) => {
            return Err(BootstrapError::ChannelSetup {
                channel: channel_name.to_string(),
                source,
            });
        }
    };

    // The server rejects re-adding an existing member on some versions.
    if let Err(err) = api.add_channel_member(&channel.id, &bot.id).await {
        warn!(
            "failed to add bot user {} to channel {}: {}",
            bot.username, channel.name, err
        );
    }

    Ok(channel)
}
