use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use super::InboundEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// A dropped connection ends the listener.
    None,
    /// Reconnect with exponential backoff, doubling from `initial` up to `max`.
    Backoff { initial: Duration, max: Duration },
}

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("cannot derive websocket url from {0}")]
    InvalidUrl(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid authorization header: {0}")]
    InvalidToken(String),

    #[error("websocket connection closed by server")]
    ConnectionClosed,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: InboundEvent);
}

/// Maps `http(s)://host[:port]/prefix` onto `ws(s)://host[:port]/prefix/api/v4/websocket`.
pub fn websocket_url(server_url: &Url) -> Result<Url, ListenerError> {
    let scheme = match server_url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ListenerError::InvalidUrl(format!(
                "{server_url} (unsupported scheme {other})"
            )));
        }
    };

    let mut url = server_url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.set_scheme(scheme)
        .map_err(|_| ListenerError::InvalidUrl(server_url.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ListenerError::InvalidUrl(server_url.to_string()))?
        .pop_if_empty()
        .extend(["api", "v4", "websocket"]);
    Ok(url)
}

pub struct EventListener {
    url: Url,
    token: SecretString,
    reconnect: ReconnectPolicy,
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("url", &self.url.as_str())
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

impl EventListener {
    pub fn new(
        server_url: &Url,
        token: SecretString,
        reconnect: ReconnectPolicy,
    ) -> Result<Self, ListenerError> {
        Ok(Self {
            url: websocket_url(server_url)?,
            token,
            reconnect,
        })
    }

    pub async fn connect(&self) -> Result<EventStream, ListenerError> {
        let token = self.token.expose_secret();
        let mut request = self.url.as_str().into_client_request()?;
        let header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| ListenerError::InvalidToken(err.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        let (socket, _) = connect_async(request).await?;
        let mut stream = EventStream { socket, seq: 0 };
        stream.authenticate(token).await?;
        Ok(stream)
    }

    /// Feeds events to `handler` one at a time until `shutdown` flips or the
    /// connection is lost under [`ReconnectPolicy::None`].
    pub async fn run(
        &self,
        handler: Arc<dyn EventHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ListenerError> {
        let mut retry_delay = match self.reconnect {
            ReconnectPolicy::None => Duration::ZERO,
            ReconnectPolicy::Backoff { initial, .. } => initial,
        };

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let connected = tokio::select! {
                result = self.connect() => result,
                _ = shutdown.changed() => return Ok(()),
            };

            match connected {
                Ok(mut stream) => {
                    info!("mattermost websocket connected url={}", self.url);
                    if let ReconnectPolicy::Backoff { initial, .. } = self.reconnect {
                        retry_delay = initial;
                    }

                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                info!("mattermost listener shutting down");
                                stream.close().await;
                                return Ok(());
                            }
                            next = stream.next_event() => match next {
                                Some(event) => handler.handle_event(event).await,
                                None => break,
                            },
                        }
                    }

                    warn!("mattermost websocket connection closed url={}", self.url);
                    if self.reconnect == ReconnectPolicy::None {
                        return Err(ListenerError::ConnectionClosed);
                    }
                }
                Err(err) => {
                    if self.reconnect == ReconnectPolicy::None {
                        return Err(err);
                    }
                    warn!("failed to connect mattermost websocket: {}", err);
                }
            }

            let ReconnectPolicy::Backoff { max, .. } = self.reconnect else {
                return Err(ListenerError::ConnectionClosed);
            };
            info!(
                "reconnecting mattermost websocket in {} seconds",
                retry_delay.as_secs()
            );
            tokio::select! {
                _ = tokio::time::sleep(retry_delay) => {}
                _ = shutdown.changed() => return Ok(()),
            }
            retry_delay = (retry_delay * 2).min(max);
        }
    }
}

pub struct EventStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    seq: i64,
}

impl EventStream {
    async fn authenticate(&mut self, token: &str) -> Result<(), ListenerError> {
        self.seq += 1;
        let challenge = json!({
            "seq": self.seq,
            "action": "authentication_challenge",
            "data": { "token": token }
        });
        self.socket
            .send(WsMessage::Text(challenge.to_string().into()))
            .await?;
        Ok(())
    }

    /// Waits for the next event frame. Returns `None` once the connection is
    /// gone; the stream cannot be restarted.
    pub async fn next_event(&mut self) -> Option<InboundEvent> {
        while let Some(frame) = self.socket.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    match serde_json::from_str::<InboundEvent>(text.as_str()) {
                        Ok(event) if event.is_failed_reply() => {
                            warn!("websocket action rejected: {}", text.as_str());
                        }
                        Ok(event) if event.is_reply() => {
                            debug!("websocket reply frame: {}", text.as_str());
                        }
                        Ok(event) => return Some(event),
                        Err(err) => warn!("failed to decode websocket frame: {}", err),
                    }
                }
                Ok(WsMessage::Ping(payload)) => {
                    if let Err(err) = self.socket.send(WsMessage::Pong(payload)).await {
                        warn!("failed to answer websocket ping: {}", err);
                        return None;
                    }
                }
                Ok(WsMessage::Close(_)) => return None,
                Ok(_) => {}
                Err(err) => {
                    warn!("websocket frame error: {}", err);
                    return None;
                }
            }
        }
        None
    }

    pub async fn close(mut self) {
        if let Err(err) = self.socket.close(None).await {
            debug!("websocket close failed: {}", err);
        }
    }
}
