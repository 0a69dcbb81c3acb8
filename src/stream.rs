//! Websocket client for the AIS feed

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::{
    config::{ReconnectConfig, StreamConfig},
    errors::{AisTrackerError, StreamError},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Source of raw inbound frames.
///
/// `Ok(None)` means the source was closed locally.
#[async_trait]
pub trait FrameSource: Send {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, StreamError>;
}

/// Lifecycle of a feed session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Subscription session over a websocket.
///
/// The subscription is sent as the first message of every connection,
/// including reconnects.
pub struct StreamClient {
    url: String,
    subscription: String,
    reconnect: ReconnectConfig,
    socket: Option<Socket>,
    state: SessionState,
    attempts: u32,
}

impl StreamClient {
    pub fn new(config: &StreamConfig) -> Result<Self, AisTrackerError> {
        let subscription = config.subscription()?.to_json()?;
        Ok(Self {
            url: config.url.clone(),
            subscription,
            reconnect: config.reconnect.clone(),
            socket: None,
            state: SessionState::Disconnected,
            attempts: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Open the connection and send the subscription
    pub async fn connect(&mut self) -> Result<(), StreamError> {
        if let Err(e) = self.open().await {
            error!("Failed to start feed session: {}", e);
            self.transition(SessionState::Failed);
            return Err(e);
        }
        Ok(())
    }

    async fn open(&mut self) -> Result<(), StreamError> {
        self.transition(SessionState::Connecting);

        let (mut socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| StreamError::Connect {
                url: self.url.clone(),
                source: Box::new(e),
            })?;

        if let Err(e) = socket.send(Message::Text(self.subscription.clone())).await {
            let _ = socket.close(None).await;
            return Err(StreamError::Subscribe(Box::new(e)));
        }

        self.socket = Some(socket);
        self.transition(SessionState::Subscribed);
        Ok(())
    }

    /// Release the connection; safe to call in any state
    pub async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                debug!("Error while closing feed connection: {}", e);
            }
        }
        if self.state != SessionState::Failed {
            self.transition(SessionState::Closed);
        }
    }

    /// Recover from a transport failure by reconnecting, if the retry budget allows
    async fn recover(&mut self, mut err: StreamError) -> Result<(), StreamError> {
        // The failed socket is unusable; dropping it releases the transport
        self.socket = None;

        loop {
            if self.attempts >= self.reconnect.max_retries {
                error!("Feed session failed: {}", err);
                self.transition(SessionState::Failed);
                return Err(err);
            }

            let delay = backoff_delay(&self.reconnect, self.attempts);
            self.attempts += 1;
            warn!(
                "{}; reconnecting in {:?} (attempt {}/{})",
                err, delay, self.attempts, self.reconnect.max_retries
            );
            tokio::time::sleep(delay).await;

            match self.open().await {
                Ok(()) => return Ok(()),
                Err(e) => err = e,
            }
        }
    }

    fn transition(&mut self, state: SessionState) {
        if self.state != state {
            info!("Feed session {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn received(&mut self) {
        self.attempts = 0;
        self.transition(SessionState::Streaming);
    }
}

#[async_trait]
impl FrameSource for StreamClient {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        if self.state == SessionState::Disconnected {
            self.connect().await?;
        }

        loop {
            let Some(socket) = self.socket.as_mut() else {
                return Ok(None);
            };

            let err = match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.received();
                    return Ok(Some(text.into_bytes()));
                }
                Some(Ok(Message::Binary(data))) => {
                    self.received();
                    return Ok(Some(data));
                }
                // The feed never ends a subscription on its own; a remote
                // close is a transport failure like any other
                Some(Ok(Message::Close(frame))) => StreamError::ClosedByFeed {
                    reason: frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "no close frame".to_string()),
                },
                // Ping/pong is answered by the websocket layer
                Some(Ok(_)) => continue,
                None => StreamError::ClosedByFeed {
                    reason: "end of stream".to_string(),
                },
                Some(Err(e)) => StreamError::Receive(Box::new(e)),
            };

            self.recover(err).await?;
        }
    }
}

/// Exponential backoff: `initial * 2^attempt`, capped at `max_backoff`
pub fn backoff_delay(config: &ReconnectConfig, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    config
        .initial_backoff
        .saturating_mul(factor)
        .min(config.max_backoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, Coordinate, Mmsi};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn config(url: String, max_retries: u32) -> StreamConfig {
        StreamConfig {
            url,
            api_key: "secret".to_string(),
            bounding_boxes: vec![BoundingBox::new(
                Coordinate::new(49.0, -0.1),
                Coordinate::new(54.0, 8.0),
            )],
            mmsi: vec![Mmsi::try_from(244592000).unwrap()],
            message_types: vec![],
            reconnect: ReconnectConfig {
                max_retries,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(50),
            },
        }
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn accept_subscribed(listener: &TcpListener) -> (WebSocketStream<TcpStream>, String) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let first = ws.next().await.unwrap().unwrap();
        (ws, first.into_text().unwrap().to_string())
    }

    #[test]
    fn backoff_grows_and_caps() {
        let reconnect = ReconnectConfig {
            max_retries: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(3),
        };
        assert_eq!(backoff_delay(&reconnect, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(&reconnect, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&reconnect, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&reconnect, 3), Duration::from_secs(3));
        assert_eq!(backoff_delay(&reconnect, 40), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn subscribes_then_streams_frames() {
        let (listener, url) = listener().await;
        let config = config(url, 0);
        let expected = config.subscription().unwrap().to_json().unwrap();

        let server = tokio::spawn(async move {
            let (mut ws, subscription) = accept_subscribed(&listener).await;
            ws.send(Message::Text(r#"{"MessageType":"PositionReport"}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Binary(b"binary".to_vec())).await.unwrap();
            ws.close(None).await.unwrap();
            subscription
        });

        let mut client = StreamClient::new(&config).unwrap();
        assert_eq!(client.state(), SessionState::Disconnected);

        let first = client.recv().await.unwrap().unwrap();
        assert_eq!(first, br#"{"MessageType":"PositionReport"}"#.to_vec());
        assert_eq!(client.state(), SessionState::Streaming);
        assert_eq!(client.recv().await.unwrap().unwrap(), b"binary".to_vec());
        assert_eq!(server.await.unwrap(), expected);

        client.close().await;
        assert_eq!(client.state(), SessionState::Closed);
        assert!(client.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remote_close_without_retries_is_fatal() {
        let (listener, url) = listener().await;
        let server = tokio::spawn(async move {
            let (mut ws, _) = accept_subscribed(&listener).await;
            ws.send(Message::Text(r#"{"error":"Api Key Is Not Valid"}"#.to_string()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let mut client = StreamClient::new(&config(url, 0)).unwrap();
        assert!(client.recv().await.unwrap().is_some());
        server.await.unwrap();

        let err = client.recv().await.unwrap_err();
        assert!(matches!(err, StreamError::ClosedByFeed { .. }));
        assert_eq!(err.stage(), crate::errors::Stage::Receive);
        assert_eq!(client.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn remote_close_triggers_reconnect() {
        let (listener, url) = listener().await;
        let server = tokio::spawn(async move {
            let (mut ws, _) = accept_subscribed(&listener).await;
            ws.close(None).await.unwrap();
            drop(ws);

            let (mut ws, _) = accept_subscribed(&listener).await;
            ws.send(Message::Text("after close".to_string()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let mut client = StreamClient::new(&config(url, 2)).unwrap();
        let frame = client.recv().await.unwrap().unwrap();
        assert_eq!(frame, b"after close".to_vec());
        assert_eq!(client.state(), SessionState::Streaming);

        server.await.unwrap();
        client.close().await;
    }

    #[tokio::test]
    async fn connect_failure_is_fatal() {
        let (listener, url) = listener().await;
        drop(listener);

        let mut client = StreamClient::new(&config(url, 0)).unwrap();
        let err = client.connect().await.unwrap_err();

        assert!(matches!(err, StreamError::Connect { .. }));
        assert_eq!(client.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn transport_failure_without_retries_is_fatal() {
        let (listener, url) = listener().await;
        let server = tokio::spawn(async move {
            let (ws, _) = accept_subscribed(&listener).await;
            // Drop without a closing handshake
            drop(ws);
        });

        let mut client = StreamClient::new(&config(url, 0)).unwrap();
        client.connect().await.unwrap();
        server.await.unwrap();

        let err = client.recv().await.unwrap_err();
        assert!(matches!(err, StreamError::Receive(_)));
        assert_eq!(client.state(), SessionState::Failed);
        assert!(client.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reconnects_and_resubscribes() {
        let (listener, url) = listener().await;
        let server = tokio::spawn(async move {
            let (ws, first) = accept_subscribed(&listener).await;
            drop(ws);

            let (mut ws, second) = accept_subscribed(&listener).await;
            ws.send(Message::Text("after reconnect".to_string()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            (first, second)
        });

        let mut client = StreamClient::new(&config(url, 2)).unwrap();
        let frame = client.recv().await.unwrap().unwrap();
        assert_eq!(frame, b"after reconnect".to_vec());

        let (first, second) = server.await.unwrap();
        assert_eq!(first, second);
        client.close().await;
        assert_eq!(client.state(), SessionState::Closed);
    }
}
