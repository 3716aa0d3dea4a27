use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::mattermost::ReconnectPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub communications: CommunicationsConfig,
    pub settings: SettingsConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommunicationsConfig {
    pub mattermost: MattermostConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MattermostConfig {
    pub url: String,
    pub token: String,
    pub team: String,
    pub channel: String,
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettingsConfig {
    pub cluster_name: String,
    #[serde(default)]
    pub allow_kubectl: bool,
    #[serde(default = "default_kubectl_path")]
    pub kubectl_path: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectMode {
    #[default]
    None,
    Backoff,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    #[serde(default)]
    pub reconnect: ReconnectMode,
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectMode::None,
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

impl ListenerConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        match self.reconnect {
            ReconnectMode::None => ReconnectPolicy::None,
            ReconnectMode::Backoff => ReconnectPolicy::Backoff {
                initial: Duration::from_secs(self.initial_backoff_secs),
                max: Duration::from_secs(self.max_backoff_secs),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides()?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mattermost = &self.communications.mattermost;

        let url = mattermost.url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "communications.mattermost.url cannot be empty".to_string(),
            ));
        }
        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Err(ConfigError::InvalidConfig(format!(
                    "communications.mattermost.url must use http or https, got {}",
                    parsed.scheme()
                )));
            }
            Err(err) => {
                return Err(ConfigError::InvalidConfig(format!(
                    "communications.mattermost.url is not a valid URL: {err}"
                )));
            }
        }

        if mattermost.token.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "communications.mattermost.token cannot be empty".to_string(),
            ));
        }
        if looks_like_placeholder_token(&mattermost.token) {
            return Err(ConfigError::InvalidConfig(
                "communications.mattermost.token is still using a placeholder value; set a real access token"
                    .to_string(),
            ));
        }

        if mattermost.team.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "communications.mattermost.team cannot be empty".to_string(),
            ));
        }
        if mattermost.channel.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "communications.mattermost.channel cannot be empty".to_string(),
            ));
        }
        if mattermost.bot_name.trim().is_empty() || mattermost.bot_name.contains(' ') {
            return Err(ConfigError::InvalidConfig(
                "communications.mattermost.bot_name must be a single non-empty word".to_string(),
            ));
        }

        if self.settings.cluster_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "settings.cluster_name cannot be empty".to_string(),
            ));
        }

        if self.limits.max_message_length == 0 {
            return Err(ConfigError::InvalidConfig(
                "limits.max_message_length must be greater than zero".to_string(),
            ));
        }

        if self.listener.reconnect == ReconnectMode::Backoff
            && (self.listener.initial_backoff_secs == 0
                || self.listener.initial_backoff_secs > self.listener.max_backoff_secs)
        {
            return Err(ConfigError::InvalidConfig(
                "listener.initial_backoff_secs must be between 1 and listener.max_backoff_secs"
                    .to_string(),
            ));
        }

        Ok(())
    }

    fn normalize(&mut self) {
        let mattermost = &mut self.communications.mattermost;
        mattermost.token = sanitize_token(&mattermost.token);
        mattermost.url = mattermost.url.trim().trim_end_matches('/').to_string();
        mattermost.bot_name = mattermost
            .bot_name
            .trim()
            .trim_start_matches('@')
            .to_string();
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let mattermost = &mut self.communications.mattermost;
        if let Ok(value) = std::env::var("BOTKUBE_MATTERMOST_URL") {
            mattermost.url = value;
        }
        if let Ok(value) = std::env::var("BOTKUBE_MATTERMOST_TOKEN") {
            mattermost.token = value;
        }
        if let Ok(value) = std::env::var("BOTKUBE_MATTERMOST_TEAM") {
            mattermost.team = value;
        }
        if let Ok(value) = std::env::var("BOTKUBE_MATTERMOST_CHANNEL") {
            mattermost.channel = value;
        }
        if let Ok(value) = std::env::var("BOTKUBE_CLUSTER_NAME") {
            self.settings.cluster_name = value;
        }
        if let Ok(value) = std::env::var(ALLOW_KUBECTL_ENV) {
            self.settings.allow_kubectl = env_flag(ALLOW_KUBECTL_ENV, &value)?;
        }
        Ok(())
    }
}

const ALLOW_KUBECTL_ENV: &str = "BOTKUBE_ALLOW_KUBECTL";

pub fn sample_config() -> String {
    r#"communications:
  mattermost:
    url: http://localhost:8065
    token: YOUR_MATTERMOST_TOKEN
    team: dev
    channel: botkube
    bot_name: botkube
settings:
  cluster_name: minikube
  allow_kubectl: false
  kubectl_path: kubectl
listener:
  reconnect: none
  initial_backoff_secs: 2
  max_backoff_secs: 300
limits:
  max_message_length: 3990
logging:
  level: info
  format: pretty
"#
    .to_string()
}

fn default_bot_name() -> String {
    "botkube".to_string()
}

fn default_kubectl_path() -> String {
    "kubectl".to_string()
}

fn default_initial_backoff_secs() -> u64 {
    2
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_max_message_length() -> usize {
    3990
}

fn default_log_level() -> String {
    "info".to_string()
}

fn env_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    parse_bool_flag(value).ok_or_else(|| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}

fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn sanitize_token(token: &str) -> String {
    let trimmed = token.trim();
    let without_prefix = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .unwrap_or(trimmed);
    without_prefix.trim().to_string()
}

fn looks_like_placeholder_token(token: &str) -> bool {
    let lower = token.trim().to_ascii_lowercase();
    lower == "your_mattermost_token"
        || lower == "your_token_here"
        || lower == "your_token"
        || lower == "your-token-here"
        || lower == "changeme"
}
