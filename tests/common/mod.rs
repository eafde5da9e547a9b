//! Shared fixtures for integration tests: a recording event handler, a
//! scripted local bridge and canned service responses.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use accessfeed::handler::resolve_fault_message;
use accessfeed::{EventFields, EventHandler, Subscription};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

/// One handler callback as seen by the test.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Received(EventFields),
    Lost,
    Established,
    Error(String),
    Management(String),
}

/// Forwards every bridge callback to a channel the test reads from.
/// `subscription_ready` calls are kept aside as `(id, listening)`.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Observed>,
    ready: Mutex<Vec<(i64, bool)>>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Observed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Self {
            tx,
            ready: Mutex::new(Vec::new()),
        };
        (Arc::new(recorder), rx)
    }

    pub fn ready(&self) -> Vec<(i64, bool)> {
        self.ready.lock().unwrap().clone()
    }
}

impl EventHandler for Recorder {
    fn received(&self, fields: &EventFields) {
        let _ = self.tx.send(Observed::Received(fields.clone()));
    }
    fn connection_lost(&self) {
        let _ = self.tx.send(Observed::Lost);
    }
    fn connection_established(&self) {
        let _ = self.tx.send(Observed::Established);
    }
    fn exception_raised(&self, cause: &anyhow::Error) {
        let _ = self.tx.send(Observed::Error(resolve_fault_message(cause)));
    }
    fn management_event(&self, message: &str) {
        let _ = self.tx.send(Observed::Management(message.to_string()));
    }
    fn subscription_ready(&self, subscription: &Subscription, listening: bool) {
        self.ready.lock().unwrap().push((subscription.id, listening));
    }
}

/// Next callback, failing the test if none arrives in time.
pub async fn next_observed(rx: &mut mpsc::UnboundedReceiver<Observed>) -> Observed {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for handler callback")
        .expect("handler channel closed")
}

/// What the bridge saw from one client connection.
#[derive(Debug)]
pub struct Handshake {
    pub headers: HashMap<String, String>,
    pub subscribe: serde_json::Value,
}

/// Local bridge that greets each client, records its subscribe command,
/// then plays `frames` and idles until the client leaves.
pub struct ScriptedBridge {
    pub endpoint: String,
    pub handshakes: mpsc::UnboundedReceiver<Handshake>,
}

impl ScriptedBridge {
    pub async fn start(frames: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, frames.clone(), tx.clone()));
            }
        });

        Self {
            endpoint: format!("http://{addr}/bridge"),
            handshakes: rx,
        }
    }

    pub async fn next_handshake(&mut self) -> Handshake {
        tokio::time::timeout(WAIT, self.handshakes.recv())
            .await
            .expect("timed out waiting for bridge client")
            .expect("bridge closed")
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    frames: Vec<String>,
    tx: mpsc::UnboundedSender<Handshake>,
) {
    let mut headers = HashMap::new();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        for (name, value) in request.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        Ok(response)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    if ws
        .send(Message::Text(r#"{"type":"welcome"}"#.to_string()))
        .await
        .is_err()
    {
        return;
    }

    let subscribe = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => break serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            _ => return,
        }
    };
    let _ = tx.send(Handshake { headers, subscribe });

    for frame in frames {
        if ws.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }

    while let Some(Ok(message)) = ws.next().await {
        if message.is_close() {
            break;
        }
    }
}

pub fn confirm_frame() -> String {
    r#"{"type":"confirm_subscription","identifier":"{}"}"#.to_string()
}

pub fn business_event_frame(payload: serde_json::Value) -> String {
    serde_json::json!({
        "type": "event",
        "event": "business_event",
        "message": payload,
    })
    .to_string()
}

/// A provisioned subscription as the service returns it.
pub fn subscription_json(id: i64, disabled: bool) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "user_id": "operator",
        "description": "",
        "filter": "",
        "is_durable": false,
        "is_disabled": disabled,
        "queue_name": format!("q.{id}"),
        "exchange_name": "access.events",
        "routing_key": "door.#",
        "host_name": "broker.local",
        "port": 5672,
        "use_ssl": false,
        "created_at": "2026-10-16T08:00:00Z"
    })
}
