//! WebSocket implementation of the coordinator event channel.
//!
//! Frames are JSON text. After connecting to `<api>/sentinel` the client
//! sends an `auth` frame and a `subscribe` frame for its admin event; the
//! server then pushes `{"event", "data"}` frames. An `error` frame from the
//! server (bad credentials, unknown agent) ends the stream.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use sentinel_common::AuthCredentials;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::application::ports::{ChannelConnector, EventStream};
use crate::domain::error::ChannelError;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientFrame<'a> {
    Auth {
        #[serde(flatten)]
        credentials: &'a AuthCredentials,
    },
    Subscribe {
        event: &'a str,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerFrame {
    Error {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        message: String,
    },
    Event {
        event: String,
        data: String,
    },
}

/// Event endpoint derived from the coordinator's HTTP base URL.
///
/// # Errors
///
/// Returns an error if `api_url` is not an `http`/`https` URL.
pub fn event_endpoint(api_url: &str) -> Result<Url> {
    let mut url = Url::parse(api_url).with_context(|| format!("parsing api url {api_url}"))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => anyhow::bail!("unsupported api url scheme '{other}'"),
    };
    url.set_scheme(scheme)
        .map_err(|()| anyhow::anyhow!("cannot switch {api_url} to {scheme}"))?;
    let path = format!("{}/sentinel", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

pub struct WsConnector {
    endpoint: Url,
    connect_timeout: Duration,
}

impl WsConnector {
    /// # Errors
    ///
    /// Returns an error if the event endpoint cannot be derived from `api_url`.
    pub fn new(api_url: &str, connect_timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: event_endpoint(api_url)?,
            connect_timeout,
        })
    }
}

fn text_frame(frame: &ClientFrame<'_>) -> Result<Message> {
    let json = serde_json::to_string(frame).context("serializing frame")?;
    Ok(Message::Text(json.into()))
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(
        &self,
        credentials: &AuthCredentials,
        event: &str,
    ) -> Result<Box<dyn EventStream>> {
        tracing::debug!(url = %self.endpoint, "opening event channel");
        let (mut socket, _) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.endpoint.as_str()),
        )
        .await
        .with_context(|| format!("connecting to {} timed out", self.endpoint))?
        .with_context(|| format!("connecting to {}", self.endpoint))?;

        socket
            .send(text_frame(&ClientFrame::Auth { credentials })?)
            .await
            .context("sending auth frame")?;
        socket
            .send(text_frame(&ClientFrame::Subscribe { event })?)
            .await
            .context("sending subscribe frame")?;

        Ok(Box::new(WsEventStream {
            socket,
            event: event.to_string(),
        }))
    }
}

pub struct WsEventStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    event: String,
}

impl WsEventStream {
    /// Payload carried by a text frame, `None` for frames to skip.
    fn payload(&self, text: &str) -> Option<Result<String>> {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(ServerFrame::Event { event, data }) if event == self.event => Some(Ok(data)),
            Ok(ServerFrame::Event { event, .. }) => {
                tracing::debug!(%event, "ignoring frame for other event");
                None
            }
            Ok(ServerFrame::Error { kind, message }) if kind == "error" => {
                Some(Err(ChannelError::HandshakeRejected(message).into()))
            }
            Ok(ServerFrame::Error { kind, .. }) => {
                tracing::debug!(%kind, "ignoring control frame");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparseable frame");
                None
            }
        }
    }
}

#[async_trait]
impl EventStream for WsEventStream {
    async fn next_payload(&mut self) -> Option<Result<String>> {
        loop {
            let message = match self.socket.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("reading event frame"))),
            };
            match message {
                Message::Text(text) => {
                    if let Some(payload) = self.payload(&text) {
                        return Some(payload);
                    }
                }
                Message::Close(frame) => {
                    tracing::info!(?frame, "event channel closed by coordinator");
                    return None;
                }
                // Pings are answered by tungstenite on the next read.
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            tracing::debug!(error = %e, "closing event channel");
        }
    }
}
