//! WebSocket [`Transport`]: one socket per session, JSON text frames.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use myduka_auth::SessionCredential;
use myduka_events::{LiveEvent, WireFrame};

use crate::transport::{Connection, Transport, TransportError};

/// Frame names the server uses to reject a connection after the upgrade.
const AUTH_REJECTION_EVENTS: &[&str] = &["unauthorized", "connect_error"];

#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The socket url carrying the token as a query parameter.
    fn url_for(&self, credential: &SessionCredential) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("token", credential.access_token());
        url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, credential: &SessionCredential) -> Result<Box<dyn Connection>, TransportError> {
        let mut request = self
            .url_for(credential)
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        let bearer =
            HeaderValue::from_str(&credential.bearer()).map_err(|e| TransportError::Protocol(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_handshake_error)?;
        tracing::debug!(status = %response.status(), url = %self.url, "websocket upgraded");

        Ok(Box::new(WsConnection {
            stream,
            closed: false,
        }))
    }
}

fn map_handshake_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status().as_u16();
            if matches!(status, 401 | 403) {
                TransportError::Unauthorized(format!("handshake rejected with HTTP {status}"))
            } else {
                TransportError::Network(format!("handshake failed with HTTP {status}"))
            }
        }
        tungstenite::Error::Io(e) => TransportError::Network(e.to_string()),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => TransportError::Closed,
        other => TransportError::Protocol(other.to_string()),
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Connection for WsConnection {
    async fn next_event(&mut self) -> Option<Result<LiveEvent, TransportError>> {
        if self.closed {
            return None;
        }
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => return None,
                Err(e) => return Some(Err(TransportError::Network(e.to_string()))),
            };
            let text = match message {
                Message::Text(text) => text,
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        tracing::warn!("non-utf8 binary frame dropped");
                        continue;
                    }
                },
                Message::Close(frame) => {
                    tracing::info!(?frame, "server closed the live connection");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            if let Some(decoded) = decode_frame(&text) {
                return Some(decoded);
            }
        }
    }

    async fn send(&mut self, event: &str, payload: Value) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let text = serde_json::to_string(&WireFrame::new(event, payload))
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Network(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("websocket close: {e}");
        }
    }
}

/// Decode one text frame. Undecodable frames are dropped (`None`).
fn decode_frame(text: &str) -> Option<Result<LiveEvent, TransportError>> {
    let frame: WireFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("malformed live frame dropped: {e}");
            return None;
        }
    };

    if AUTH_REJECTION_EVENTS.contains(&frame.event.as_str()) {
        let reason = frame
            .data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(frame.event.as_str())
            .to_string();
        return Some(Err(TransportError::Unauthorized(reason)));
    }

    Some(Ok(LiveEvent::from(frame)))
}
