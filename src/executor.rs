use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// kubectl verbs that only read cluster state.
pub const KUBECTL_VERBS: &[&str] = &[
    "api-resources",
    "api-versions",
    "cluster-info",
    "describe",
    "diff",
    "explain",
    "get",
    "logs",
    "top",
    "auth",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: String,
    pub allow_kubectl: bool,
    pub cluster_name: String,
    pub channel_name: String,
    pub is_auth_channel: bool,
}

/// Turns command text into reply text. An empty reply means the command was
/// not recognized and nothing should be posted.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: &CommandRequest) -> String;
}

pub struct DefaultExecutor {
    kubectl_path: String,
    bot_name: String,
}

impl DefaultExecutor {
    pub fn new(kubectl_path: impl Into<String>, bot_name: impl Into<String>) -> Self {
        Self {
            kubectl_path: kubectl_path.into(),
            bot_name: bot_name.into(),
        }
    }

    fn help_message(&self) -> String {
        let mention = format!("@{}", self.bot_name);
        let mut lines = vec![
            format!("{mention} ping - check that the bot can reach the cluster"),
            format!("{mention} help - show this message"),
        ];
        lines.push(format!(
            "{mention} <kubectl command> - run a read-only kubectl command ({})",
            KUBECTL_VERBS.join(", ")
        ));
        lines.join("\n")
    }

    async fn run_kubectl(&self, args: &[&str]) -> String {
        debug!("running {} {}", self.kubectl_path, args.join(" "));
        let output = match Command::new(&self.kubectl_path).args(args).output().await {
            Ok(output) => output,
            Err(err) => {
                warn!("failed to spawn {}: {}", self.kubectl_path, err);
                return format!("Error: failed to run kubectl: {err}");
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        let text = text.trim_end().to_string();
        if text.is_empty() && !output.status.success() {
            return format!("Error: kubectl exited with {}", output.status);
        }
        text
    }
}

#[async_trait]
impl Executor for DefaultExecutor {
    async fn execute(&self, request: &CommandRequest) -> String {
        if !request.is_auth_channel {
            debug!(
                "ignoring command outside channel {}: {}",
                request.channel_name, request.command
            );
            return String::new();
        }

        let args: Vec<&str> = request.command.split_whitespace().collect();
        let Some(first) = args.first().copied() else {
            return String::new();
        };

        match first {
            "ping" => format!("pong from cluster '{}'", request.cluster_name),
            "help" => self.help_message(),
            verb if KUBECTL_VERBS.contains(&verb) => {
                if !request.allow_kubectl {
                    return format!(
                        "Sorry, the admin hasn't given me the permission to execute kubectl command on cluster '{}'.",
                        request.cluster_name
                    );
                }
                self.run_kubectl(&args).await
            }
            _ => format!(
                "Command not supported. Please run '@{} help' to see supported commands.",
                self.bot_name
            ),
        }
    }
}
