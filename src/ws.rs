//! WebSocket transport for the notification bridge.
//!
//! Keeps `tokio-tungstenite` types out of the bridge. [`connect`] opens an
//! authenticated session socket and hands back independent
//! ([`WsWriter`], [`WsReader`]) halves for use in `tokio::select!` loops.

// Rust guideline compliant 2026-02

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::constants;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Credentials presented in the WebSocket handshake.
#[derive(Clone, Copy)]
pub struct SessionHeaders<'a> {
    /// Sent as the `application_id` header.
    pub application_id: &'a str,
    /// Sent as the `session_token` header.
    pub session_token: &'a str,
}

impl std::fmt::Debug for SessionHeaders<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHeaders")
            .field("application_id", &self.application_id)
            .field("session_token", &"<redacted>")
            .finish()
    }
}

/// Frame read from the bridge socket. Pongs are absorbed.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping that should be answered with [`WsWriter::pong`].
    Ping(Vec<u8>),
    /// Peer closed the socket.
    Closed {
        /// Close code; 1005 when the peer sent none.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Write half of a bridge socket.
#[derive(Debug)]
pub struct WsWriter {
    sink: SplitSink<Socket, Message>,
}

impl WsWriter {
    /// Sends one text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(Message::Text(text.to_owned()))
            .await
            .context("failed to send text frame")
    }

    /// Answers a ping.
    pub async fn pong(&mut self, payload: Vec<u8>) -> Result<()> {
        self.sink
            .send(Message::Pong(payload))
            .await
            .context("failed to send pong")
    }

    /// Sends a close frame and shuts the sink.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("failed to close socket")
    }
}

/// Read half of a bridge socket.
#[derive(Debug)]
pub struct WsReader {
    stream: SplitStream<Socket>,
}

impl WsReader {
    /// Next frame, or `None` once the stream is exhausted.
    pub async fn next_inbound(&mut self) -> Option<Result<Inbound>> {
        while let Some(message) = self.stream.next().await {
            let inbound = match message {
                Ok(Message::Text(text)) => Inbound::Text(text),
                Ok(Message::Binary(data)) => Inbound::Binary(data),
                Ok(Message::Ping(data)) => Inbound::Ping(data),
                Ok(Message::Close(frame)) => {
                    let (code, reason) = frame.map_or((1005, String::new()), |frame| {
                        (u16::from(frame.code), frame.reason.into_owned())
                    });
                    Inbound::Closed { code, reason }
                }
                Ok(Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("socket read failed"))),
            };
            return Some(Ok(inbound));
        }
        None
    }
}

/// Opens a bridge socket at `endpoint` with the session headers attached.
///
/// `endpoint` may use `http(s)` or `ws(s)`. The handshake, TLS included,
/// must finish within `timeout`.
pub async fn connect(
    endpoint: &str,
    session: SessionHeaders<'_>,
    timeout: Duration,
) -> Result<(WsWriter, WsReader)> {
    let url = socket_url(endpoint)?;
    let mut request = url
        .as_str()
        .into_client_request()
        .with_context(|| format!("cannot build handshake for {url}"))?;

    let headers = request.headers_mut();
    headers.insert(
        constants::APPLICATION_ID_HEADER,
        HeaderValue::from_str(session.application_id).context("application id is not a valid header value")?,
    );
    headers.insert(
        constants::SESSION_TOKEN_HEADER,
        HeaderValue::from_str(session.session_token).context("session token is not a valid header value")?,
    );

    let (socket, response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
        .await
        .map_err(|_elapsed| anyhow::anyhow!("bridge handshake timed out after {timeout:?}"))?
        .with_context(|| format!("bridge handshake with {url} failed"))?;
    log::debug!("[Bridge] Handshake completed with HTTP {}", response.status());

    let (sink, stream) = socket.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Maps `http`/`https` endpoints to `ws`/`wss`. Other schemes are rejected.
pub fn socket_url(endpoint: &str) -> Result<url::Url> {
    let mut url = url::Url::parse(endpoint).with_context(|| format!("invalid bridge endpoint: {endpoint}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => anyhow::bail!("unsupported bridge endpoint scheme `{other}`"),
    };
    if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
        anyhow::bail!("cannot use {scheme} for bridge endpoint {endpoint}");
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn session() -> SessionHeaders<'static> {
        SessionHeaders {
            application_id: "app-1",
            session_token: "tok-1",
        }
    }

    #[test]
    fn test_socket_url_maps_http_schemes() {
        assert_eq!(
            socket_url("https://acs.example.com/bridge").unwrap().as_str(),
            "wss://acs.example.com/bridge"
        );
        assert_eq!(
            socket_url("http://localhost:8080/bridge").unwrap().as_str(),
            "ws://localhost:8080/bridge"
        );
    }

    #[test]
    fn test_socket_url_keeps_ws_schemes_and_query() {
        assert_eq!(
            socket_url("wss://acs.example.com/bridge?next=https://x").unwrap().as_str(),
            "wss://acs.example.com/bridge?next=https://x"
        );
        assert_eq!(socket_url("ws://localhost/b").unwrap().as_str(), "ws://localhost/b");
    }

    #[test]
    fn test_socket_url_rejects_other_schemes() {
        assert!(socket_url("ftp://acs.example.com/bridge").is_err());
        assert!(socket_url("not-a-url").is_err());
    }

    #[test]
    fn test_session_headers_debug_hides_token() {
        let debug = format!("{:?}", session());
        assert!(debug.contains("app-1"));
        assert!(!debug.contains("tok-1"));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_token_value() {
        let bad = SessionHeaders {
            application_id: "app-1",
            session_token: "a\nb",
        };
        let err = connect("ws://127.0.0.1:1/bridge", bad, TIMEOUT).await.unwrap_err();
        assert!(format!("{err:#}").contains("session token"));
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_fails() {
        assert!(connect("ws://127.0.0.1:1/bridge", session(), TIMEOUT).await.is_err());
    }
}
