//! Realtime channel transport
//!
//! A background task holds an authenticated WebSocket open, forwards named
//! events to its owner and reconnects with exponential backoff until told to
//! shut down.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::message::EventFrame;

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Commands sent to the channel task
#[derive(Debug)]
pub enum ChannelCommand {
    /// Close the connection and stop reconnecting
    Shutdown,
}

/// Events from the channel task
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connection established
    Connected,
    /// Connection lost; the task will retry
    Disconnected,
    /// Named event pushed by the server
    Message { name: String, payload: Value },
    /// Transport error
    Error(String),
}

/// Owner's side of a realtime channel
pub struct ChannelHandle {
    command_tx: mpsc::Sender<ChannelCommand>,
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// Task's side of a realtime channel
pub struct ChannelEndpoint {
    pub commands: mpsc::Receiver<ChannelCommand>,
    pub event_tx: mpsc::Sender<ChannelEvent>,
}

impl ChannelHandle {
    /// Create a connected handle/endpoint pair
    pub fn pair() -> (ChannelHandle, ChannelEndpoint) {
        let (command_tx, commands) = mpsc::channel(16);
        let (event_tx, events) = mpsc::channel(64);
        (
            ChannelHandle { command_tx, events },
            ChannelEndpoint { commands, event_tx },
        )
    }

    /// Ask the channel task to stop
    ///
    /// Returns immediately; an already finished task is not an error.
    pub fn shutdown(&self) {
        let _ = self.command_tx.try_send(ChannelCommand::Shutdown);
    }
}

/// Opens realtime channels for an authenticated session
pub trait ChannelConnector: Send + Sync {
    /// Start a channel authenticated with `token`
    fn connect(&self, token: &str) -> ChannelHandle;
}

/// WebSocket implementation of the realtime channel
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ChannelConnector for WebSocketConnector {
    fn connect(&self, token: &str) -> ChannelHandle {
        let (handle, endpoint) = ChannelHandle::pair();
        tokio::spawn(listener_task(self.url.clone(), token.to_string(), endpoint));
        handle
    }
}

/// Background task that maintains the WebSocket connection
async fn listener_task(url: String, token: String, mut endpoint: ChannelEndpoint) {
    let client_id = format!("stockflow-{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let mut reconnect_delay = INITIAL_RECONNECT_DELAY;

    loop {
        match connect_and_listen(&url, &token, &client_id, &mut endpoint).await {
            Ok(true) => break,
            Ok(false) => {
                // Clean disconnect, reset backoff
                reconnect_delay = INITIAL_RECONNECT_DELAY;
            }
            Err(e) => {
                warn!("Realtime channel error: {:#}", e);
                let _ = endpoint
                    .event_tx
                    .send(ChannelEvent::Error(format!("{:#}", e)))
                    .await;
            }
        }

        if endpoint.event_tx.send(ChannelEvent::Disconnected).await.is_err() {
            break;
        }

        debug!("Reconnecting in {:?}", reconnect_delay);
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {
                reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
            }
            cmd = endpoint.commands.recv() => {
                if matches!(cmd, Some(ChannelCommand::Shutdown) | None) {
                    break;
                }
            }
        }
    }

    debug!("Realtime channel task stopped");
}

/// Connect and forward events until disconnect or shutdown
///
/// Returns `Ok(true)` when the task should stop.
async fn connect_and_listen(
    url: &str,
    token: &str,
    client_id: &str,
    endpoint: &mut ChannelEndpoint,
) -> Result<bool> {
    let mut request = url
        .into_client_request()
        .with_context(|| format!("Invalid realtime URL: {}", url))?;
    let headers = request.headers_mut();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).context("Invalid session token")?,
    );
    headers.insert("X-Client-Id", HeaderValue::from_str(client_id)?);

    debug!("Connecting to {}", url);
    let (ws_stream, _response) = connect_async(request)
        .await
        .context("Failed to connect to realtime server")?;
    let (mut write, mut read) = ws_stream.split();

    info!("Realtime channel connected");
    if endpoint.event_tx.send(ChannelEvent::Connected).await.is_err() {
        let _ = write.close().await;
        return Ok(true);
    }

    loop {
        tokio::select! {
            cmd = endpoint.commands.recv() => {
                if matches!(cmd, Some(ChannelCommand::Shutdown) | None) {
                    let _ = write.close().await;
                    return Ok(true);
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match EventFrame::decode(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                debug!("Dropping undecodable frame: {}", e);
                                continue;
                            }
                        };
                        let event = ChannelEvent::Message {
                            name: frame.event,
                            payload: frame.data,
                        };
                        if endpoint.event_tx.send(event).await.is_err() {
                            let _ = write.close().await;
                            return Ok(true);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Realtime channel closed by server");
                        return Ok(false);
                    }
                    Some(Err(e)) => {
                        return Err(e).context("Realtime connection lost");
                    }
                    _ => {
                        // Ping/pong/binary - ignore
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

    async fn next_event(handle: &mut ChannelHandle) -> ChannelEvent {
        timeout(Duration::from_secs(5), handle.events.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_forwards_server_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (auth_tx, auth_rx) = oneshot::channel();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, response: Response| {
                let auth = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let _ = auth_tx.send(auth);
                Ok(response)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();

            ws.send(Message::Text("garbage".to_string())).await.unwrap();
            let frame = EventFrame::new("order:created", json!({"orderId": "o1"}));
            ws.send(Message::Text(frame.encode().unwrap()))
                .await
                .unwrap();

            // Hold the connection until the client closes it
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let connector = WebSocketConnector::new(&format!("ws://{}/realtime", addr));
        let mut handle = connector.connect("tok-123");

        assert_eq!(next_event(&mut handle).await, ChannelEvent::Connected);
        assert_eq!(
            auth_rx.await.unwrap().as_deref(),
            Some("Bearer tok-123")
        );
        assert_eq!(
            next_event(&mut handle).await,
            ChannelEvent::Message {
                name: "order:created".to_string(),
                payload: json!({"orderId": "o1"}),
            }
        );

        handle.shutdown();
        timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_reports_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WebSocketConnector::new(&format!("ws://{}/realtime", addr));
        let mut handle = connector.connect("tok");

        assert!(matches!(next_event(&mut handle).await, ChannelEvent::Error(_)));
        assert_eq!(next_event(&mut handle).await, ChannelEvent::Disconnected);

        handle.shutdown();
        // Task exits during backoff and drops its sender
        let closed = timeout(Duration::from_secs(5), handle.events.recv())
            .await
            .unwrap();
        assert!(closed.is_none());
    }
}
