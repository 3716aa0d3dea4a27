use thiserror::Error;

use crate::bridge::BootstrapError;
use crate::config::ConfigError;
use crate::mattermost::ListenerError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Listener task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
