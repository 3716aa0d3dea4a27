#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod bridge;
mod cli;
mod config;
mod executor;
mod mattermost;
mod utils;

use bridge::{
    BootstrapTarget, BridgeContext, CommandDispatcher, DispatchSettings, Responder, Session,
};
use cli::{Cli, Commands};
use config::Config;
use executor::DefaultExecutor;
use mattermost::EventListener;
use utils::error::AppError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::GenerateConfig { output }) = &cli.command {
        generate_config(output)?;
        println!("sample configuration written to {}", output.display());
        return Ok(());
    }

    let config = Config::load_from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    utils::logging::init_tracing(&config.logging);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::ValidateConfig => {
            info!("configuration {} is valid", cli.config.display());
            Ok(())
        }
        Commands::Check => {
            let context = connect(&config).await?;
            println!("team:    {} ({})", context.team.name, context.team.id);
            println!("bot:     {} ({})", context.bot.username, context.bot.id);
            println!("channel: {} ({})", context.channel.name, context.channel.id);
            Ok(())
        }
        Commands::Run => run(config).await.map_err(Into::into),
        Commands::GenerateConfig { .. } => Ok(()),
    }
}

fn generate_config(output: &Path) -> Result<(), AppError> {
    std::fs::write(output, config::sample_config())?;
    Ok(())
}

async fn connect(config: &Config) -> Result<BridgeContext, AppError> {
    let mattermost = &config.communications.mattermost;
    let session = Session::connect(&mattermost.url, &mattermost.token)?;
    let target = BootstrapTarget {
        team_name: mattermost.team.clone(),
        channel_name: mattermost.channel.clone(),
        bot_name: mattermost.bot_name.clone(),
    };

    match bridge::bootstrap(session, &target).await {
        Ok(context) => Ok(context),
        Err(err) => {
            error!("mattermost bootstrap failed: {}", err);
            Err(err.into())
        }
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    info!(
        "botkube mattermost bridge starting cluster={}",
        config.settings.cluster_name
    );

    let context = Arc::new(connect(&config).await?);
    info!(
        "bridge ready team={} bot={} channel={}",
        context.team.name, context.bot.username, context.channel.name
    );

    let mattermost = &config.communications.mattermost;
    let executor = Arc::new(DefaultExecutor::new(
        config.settings.kubectl_path.clone(),
        mattermost.bot_name.clone(),
    ));
    let responder = Responder::new(context.session.api(), config.limits.max_message_length);
    let dispatcher = Arc::new(CommandDispatcher::new(
        context.clone(),
        executor,
        responder,
        DispatchSettings {
            bot_name: mattermost.bot_name.clone(),
            allow_kubectl: config.settings.allow_kubectl,
            cluster_name: config.settings.cluster_name.clone(),
            channel_name: mattermost.channel.clone(),
        },
    ));

    let listener = EventListener::new(
        context.session.server_url(),
        context.session.token(),
        config.listener.reconnect_policy(),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_handle =
        tokio::spawn(async move { listener.run(dispatcher, shutdown_rx).await });
    tokio::pin!(listener_handle);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, beginning shutdown");
            if shutdown_tx.send(true).is_err() {
                warn!("listener already stopped");
            }
            (&mut listener_handle).await??;
        },
        result = &mut listener_handle => {
            result??;
            info!("listener task exited, beginning shutdown");
        },
    }

    info!("botkube mattermost bridge shutting down");
    Ok(())
}
