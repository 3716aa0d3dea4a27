use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "botkube-mattermost")]
#[command(about = "Mattermost command bridge for Botkube", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Connect to Mattermost and answer commands (default)")]
    Run,

    #[command(about = "Validate the configuration file")]
    ValidateConfig,

    #[command(about = "Resolve team, bot user and channel, then exit")]
    Check,

    #[command(about = "Write a sample configuration file")]
    GenerateConfig {
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}
