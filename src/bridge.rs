use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::executor::{CommandRequest, Executor};
use crate::mattermost::{EventHandler, InboundEvent, MalformedEvent};
use crate::utils::formatting::{mention_prefix, strip_mention, wrap_code};

pub mod bootstrap;
pub mod responder;

pub use self::bootstrap::{BootstrapError, BootstrapTarget, BridgeContext, Session, bootstrap};
pub use self::responder::{Responder, SendError, SendOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotAPost,
    OwnMessage,
    NoMention,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ignored(IgnoreReason),
    NoResponse,
    Replied(SendOutcome),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] MalformedEvent),

    #[error("failed to send reply: {0}")]
    Send(#[from] SendError),
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub bot_name: String,
    pub allow_kubectl: bool,
    pub cluster_name: String,
    pub channel_name: String,
}

pub struct CommandDispatcher {
    context: Arc<BridgeContext>,
    executor: Arc<dyn Executor>,
    responder: Responder,
    settings: DispatchSettings,
    mention_prefix: String,
}

impl CommandDispatcher {
    pub fn new(
        context: Arc<BridgeContext>,
        executor: Arc<dyn Executor>,
        responder: Responder,
        settings: DispatchSettings,
    ) -> Self {
        let mention_prefix = mention_prefix(&settings.bot_name);
        Self {
            context,
            executor,
            responder,
            settings,
            mention_prefix,
        }
    }

    pub async fn handle(&self, event: &InboundEvent) -> Result<DispatchOutcome, DispatchError> {
        if !event.is_posted() {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::NotAPost));
        }

        let post = event.post()?;
        if post.user_id == self.context.bot.id {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::OwnMessage));
        }
        let Some(command) = strip_mention(&post.message, &self.mention_prefix) else {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::NoMention));
        };

        let channel_id = event.broadcast.channel_id.as_str();
        let request = CommandRequest {
            command: command.to_string(),
            allow_kubectl: self.settings.allow_kubectl,
            cluster_name: self.settings.cluster_name.clone(),
            channel_name: self.settings.channel_name.clone(),
            is_auth_channel: channel_id == self.context.channel.id,
        };
        debug!(
            "executing command post={} channel={} authorized={}",
            post.id, channel_id, request.is_auth_channel
        );

        let result = self.executor.execute(&request).await;
        if result.is_empty() {
            info!("invalid request, dropping response post={}", post.id);
            return Ok(DispatchOutcome::NoResponse);
        }

        let outcome = self
            .responder
            .send(&wrap_code(&result), &post.id, channel_id)
            .await?;
        Ok(DispatchOutcome::Replied(outcome))
    }
}

#[async_trait]
impl EventHandler for CommandDispatcher {
    async fn handle_event(&self, event: InboundEvent) {
        match self.handle(&event).await {
            Ok(DispatchOutcome::Ignored(reason)) => {
                debug!("ignored event type={} reason={:?}", event.event, reason);
            }
            Ok(DispatchOutcome::NoResponse) => {}
            Ok(DispatchOutcome::Replied(outcome)) => {
                debug!("replied to command outcome={:?}", outcome);
            }
            Err(err) => {
                error!(
                    "failed to handle event type={} channel={}: {}",
                    event.event, event.broadcast.channel_id, err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use secrecy::SecretString;
    use test_case::test_case;
    use url::Url;

    use super::bootstrap::CHANNEL_PURPOSE;
    use super::responder::DEFAULT_MAX_MESSAGE_LENGTH;
    use super::*;
    use crate::mattermost::event::posted_event;
    use crate::mattermost::testing::FakeChatApi;
    use crate::mattermost::{Channel, Post, Team, User};

    const HOME_CHANNEL: &str = "ch-home";

    struct ScriptedExecutor {
        reply: String,
        requests: Mutex<Vec<CommandRequest>>,
    }

    impl ScriptedExecutor {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<CommandRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn execute(&self, request: &CommandRequest) -> String {
            self.requests.lock().expect("lock").push(request.clone());
            self.reply.clone()
        }
    }

    fn context(api: Arc<FakeChatApi>) -> Arc<BridgeContext> {
        Arc::new(BridgeContext {
            session: Session::new(
                Url::parse("http://localhost:8065").expect("url"),
                SecretString::from("tok".to_string()),
                api,
            ),
            team: Team {
                id: "team-1".to_string(),
                name: "dev".to_string(),
                display_name: "Dev".to_string(),
            },
            bot: User {
                id: "u-bot".to_string(),
                username: "botkube".to_string(),
            },
            channel: Channel {
                id: HOME_CHANNEL.to_string(),
                team_id: "team-1".to_string(),
                name: "botkube".to_string(),
                display_name: "botkube".to_string(),
                purpose: CHANNEL_PURPOSE.to_string(),
                channel_type: "O".to_string(),
            },
        })
    }

    fn dispatcher(
        api: Arc<FakeChatApi>,
        executor: Arc<ScriptedExecutor>,
    ) -> CommandDispatcher {
        CommandDispatcher::new(
            context(api.clone()),
            executor,
            Responder::new(api, DEFAULT_MAX_MESSAGE_LENGTH),
            DispatchSettings {
                bot_name: "botkube".to_string(),
                allow_kubectl: true,
                cluster_name: "prod".to_string(),
                channel_name: "botkube".to_string(),
            },
        )
    }

    fn post(user_id: &str, message: &str) -> Post {
        Post {
            id: "post-42".to_string(),
            user_id: user_id.to_string(),
            channel_id: HOME_CHANNEL.to_string(),
            root_id: String::new(),
            message: message.to_string(),
        }
    }

    #[test_case("typing" ; "typing indicator")]
    #[test_case("status_change" ; "presence change")]
    #[test_case("hello" ; "hello")]
    #[test_case("post_edited" ; "edited post")]
    #[tokio::test]
    async fn non_post_events_are_ignored(tag: &str) {
        let api = Arc::new(FakeChatApi::default());
        let executor = ScriptedExecutor::replying("pong");
        let mut event = posted_event(&post("u-alice", "@botkube ping"), HOME_CHANNEL);
        event.event = tag.to_string();

        let outcome = dispatcher(api.clone(), executor.clone())
            .handle(&event)
            .await
            .expect("handled");
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::NotAPost));
        assert!(executor.requests().is_empty());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn own_posts_are_ignored() {
        let api = Arc::new(FakeChatApi::default());
        let executor = ScriptedExecutor::replying("pong");
        let event = posted_event(&post("u-bot", "@botkube ping"), HOME_CHANNEL);

        let outcome = dispatcher(api, executor.clone())
            .handle(&event)
            .await
            .expect("handled");
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::OwnMessage));
        assert!(executor.requests().is_empty());
    }

    #[test_case("ping" ; "no mention")]
    #[test_case("@botkube" ; "no trailing space")]
    #[test_case("@Botkube ping" ; "wrong case")]
    #[test_case("hey @botkube ping" ; "mention not leading")]
    #[test_case("@botkubeping" ; "no separator")]
    #[tokio::test]
    async fn messages_without_mention_prefix_are_ignored(message: &str) {
        let api = Arc::new(FakeChatApi::default());
        let executor = ScriptedExecutor::replying("pong");
        let event = posted_event(&post("u-alice", message), HOME_CHANNEL);

        let outcome = dispatcher(api, executor.clone())
            .handle(&event)
            .await
            .expect("handled");
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::NoMention));
        assert!(executor.requests().is_empty());
    }

    #[tokio::test]
    async fn command_text_is_stripped_of_mention() {
        let api = Arc::new(FakeChatApi::default());
        let executor = ScriptedExecutor::replying("NAME READY");
        let event = posted_event(&post("u-alice", "@botkube get pods"), HOME_CHANNEL);

        dispatcher(api, executor.clone())
            .handle(&event)
            .await
            .expect("handled");

        let requests = executor.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].command, "get pods");
        assert!(requests[0].allow_kubectl);
        assert_eq!(requests[0].cluster_name, "prod");
        assert_eq!(requests[0].channel_name, "botkube");
    }

    #[test_case(HOME_CHANNEL, true ; "configured channel")]
    #[test_case("ch-other", false ; "other member channel")]
    #[test_case("", false ; "empty channel id")]
    #[tokio::test]
    async fn authorization_follows_broadcast_channel(channel_id: &str, expected: bool) {
        let api = Arc::new(FakeChatApi::default());
        let executor = ScriptedExecutor::replying("pong");
        let event = posted_event(&post("u-alice", "@botkube ping"), channel_id);

        dispatcher(api, executor.clone())
            .handle(&event)
            .await
            .expect("handled");
        assert_eq!(executor.requests()[0].is_auth_channel, expected);
    }

    #[tokio::test]
    async fn empty_result_sends_nothing() {
        let api = Arc::new(FakeChatApi::default());
        let executor = ScriptedExecutor::replying("");
        let event = posted_event(&post("u-alice", "@botkube dance"), HOME_CHANNEL);

        let outcome = dispatcher(api.clone(), executor.clone())
            .handle(&event)
            .await
            .expect("handled");
        assert_eq!(outcome, DispatchOutcome::NoResponse);
        assert_eq!(executor.requests().len(), 1);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn reply_is_wrapped_and_threaded_in_source_channel() {
        let api = Arc::new(FakeChatApi::default());
        let executor = ScriptedExecutor::replying("pong");
        let event = posted_event(&post("u-alice", "@botkube ping"), "ch-other");

        let outcome = dispatcher(api.clone(), executor)
            .handle(&event)
            .await
            .expect("handled");
        assert!(matches!(
            outcome,
            DispatchOutcome::Replied(SendOutcome::Inline { .. })
        ));

        let posts = api.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].message, "`pong`");
        assert_eq!(posts[0].root_id, "post-42");
        assert_eq!(posts[0].channel_id, "ch-other");
        assert!(api.uploads().is_empty());
    }

    #[tokio::test]
    async fn wrapped_result_at_threshold_goes_out_as_file() {
        let api = Arc::new(FakeChatApi::default());
        let executor = ScriptedExecutor::replying(&"z".repeat(DEFAULT_MAX_MESSAGE_LENGTH - 2));
        let event = posted_event(&post("u-alice", "@botkube logs pod"), HOME_CHANNEL);

        let outcome = dispatcher(api.clone(), executor)
            .handle(&event)
            .await
            .expect("handled");
        assert!(matches!(
            outcome,
            DispatchOutcome::Replied(SendOutcome::Attachment { .. })
        ));

        let uploads = api.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].2.len(), DEFAULT_MAX_MESSAGE_LENGTH);
        let posts = api.posts();
        assert_eq!(posts[0].message, "");
        assert_eq!(posts[0].file_ids.len(), 1);
    }

    #[tokio::test]
    async fn wrapped_result_below_threshold_stays_inline() {
        let api = Arc::new(FakeChatApi::default());
        let body = "z".repeat(DEFAULT_MAX_MESSAGE_LENGTH - 3);
        let executor = ScriptedExecutor::replying(&body);
        let event = posted_event(&post("u-alice", "@botkube logs pod"), HOME_CHANNEL);

        dispatcher(api.clone(), executor)
            .handle(&event)
            .await
            .expect("handled");

        assert!(api.uploads().is_empty());
        assert_eq!(api.posts()[0].message, format!("`{body}`"));
    }

    #[tokio::test]
    async fn malformed_post_is_a_transient_error() {
        let api = Arc::new(FakeChatApi::default());
        let executor = ScriptedExecutor::replying("pong");
        let mut event = posted_event(&post("u-alice", "@botkube ping"), HOME_CHANNEL);
        event
            .data
            .insert("post".to_string(), serde_json::Value::String("{oops".to_string()));

        let err = dispatcher(api, executor.clone())
            .handle(&event)
            .await
            .expect_err("malformed");
        assert!(matches!(err, DispatchError::MalformedEvent(_)));
        assert!(executor.requests().is_empty());
    }

    #[tokio::test]
    async fn send_failure_surfaces_as_dispatch_error() {
        let api = Arc::new(FakeChatApi {
            fail_post: true,
            ..FakeChatApi::default()
        });
        let executor = ScriptedExecutor::replying("pong");
        let event = posted_event(&post("u-alice", "@botkube ping"), HOME_CHANNEL);

        let err = dispatcher(api, executor)
            .handle(&event)
            .await
            .expect_err("send fails");
        assert!(matches!(err, DispatchError::Send(SendError::Post(_))));
    }

    #[tokio::test]
    async fn handler_keeps_going_after_failures() {
        let api = Arc::new(FakeChatApi {
            fail_post: true,
            ..FakeChatApi::default()
        });
        let executor = ScriptedExecutor::replying("pong");
        let dispatcher = dispatcher(api.clone(), executor.clone());

        let event = posted_event(&post("u-alice", "@botkube ping"), HOME_CHANNEL);
        dispatcher.handle_event(event.clone()).await;
        dispatcher.handle_event(event).await;

        assert_eq!(executor.requests().len(), 2);
        assert_eq!(api.posts().len(), 2);
    }
}
