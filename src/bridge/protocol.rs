//! Bridge wire frames.
//!
//! The bridge speaks ActionCable-style JSON text frames. Control frames
//! carry a `type` (`welcome`, `ping`, `confirm_subscription`,
//! `reject_subscription`, `disconnect`, `error`). Event frames carry
//! `"type": "event"`, an `event` name and the payload under `message`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::server::DeliveryCoordinates;

/// A classified inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InboundFrame {
    Welcome,
    Ping,
    Confirmed,
    Rejected { reason: Option<String> },
    Disconnect { reason: Option<String>, reconnect: bool },
    Error { message: String },
    BusinessEvent(serde_json::Value),
    /// Any other frame, kept verbatim.
    Management(String),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    reconnect: Option<bool>,
}

/// Subscription identifier sent with the `subscribe` command.
#[derive(Debug, Serialize)]
struct SubscriptionIdentifier<'a> {
    channel: &'static str,
    queue_name: &'a str,
    exchange_name: &'a str,
    routing_key: &'a str,
    host_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    use_ssl: bool,
}

/// Parses and classifies one text frame.
///
/// Fails only when the frame is not a JSON object.
pub(crate) fn parse_frame(text: &str) -> Result<InboundFrame> {
    let raw: RawFrame = serde_json::from_str(text)
        .with_context(|| format!("malformed bridge frame: {}", truncate(text, 100)))?;

    let frame = match raw.kind.as_deref() {
        Some("welcome") => InboundFrame::Welcome,
        Some("ping") => InboundFrame::Ping,
        Some("confirm_subscription") => InboundFrame::Confirmed,
        Some("reject_subscription") => InboundFrame::Rejected {
            reason: raw.message.map(message_text),
        },
        Some("disconnect") => InboundFrame::Disconnect {
            reason: raw.reason,
            reconnect: raw.reconnect.unwrap_or(true),
        },
        Some("error") => InboundFrame::Error {
            message: raw.message.map(message_text).unwrap_or_default(),
        },
        Some("event") if raw.event.as_deref() == Some(constants::BUSINESS_EVENT) => {
            InboundFrame::BusinessEvent(raw.message.unwrap_or(serde_json::Value::Null))
        }
        _ => InboundFrame::Management(text.to_string()),
    };
    Ok(frame)
}

/// Builds the `subscribe` command for the given coordinates.
///
/// The identifier is itself a JSON string, as ActionCable expects.
pub(crate) fn subscribe_command(coordinates: &DeliveryCoordinates) -> Result<String> {
    let identifier = serde_json::to_string(&SubscriptionIdentifier {
        channel: constants::BRIDGE_CHANNEL,
        queue_name: &coordinates.queue_name,
        exchange_name: &coordinates.exchange_name,
        routing_key: &coordinates.binding_key,
        host_name: &coordinates.host_name,
        port: coordinates.port,
        use_ssl: coordinates.use_ssl,
    })
    .context("failed to encode subscription identifier")?;

    Ok(serde_json::json!({
        "command": "subscribe",
        "identifier": identifier,
    })
    .to_string())
}

fn message_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinates() -> DeliveryCoordinates {
        DeliveryCoordinates {
            queue_name: "q.7".to_string(),
            exchange_name: "events".to_string(),
            binding_key: "door.#".to_string(),
            host_name: "broker.local".to_string(),
            port: Some(5671),
            use_ssl: true,
        }
    }

    #[test]
    fn test_parse_control_frames() {
        assert_eq!(parse_frame(r#"{"type":"welcome"}"#).unwrap(), InboundFrame::Welcome);
        assert_eq!(
            parse_frame(r#"{"type":"ping","message":1700000000}"#).unwrap(),
            InboundFrame::Ping
        );
        assert_eq!(
            parse_frame(r#"{"type":"confirm_subscription","identifier":"x"}"#).unwrap(),
            InboundFrame::Confirmed
        );
    }

    #[test]
    fn test_parse_business_event() {
        let frame = parse_frame(
            r#"{"type":"event","event":"business_event","message":{"door":"Front","action":"open"}}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            InboundFrame::BusinessEvent(serde_json::json!({"door": "Front", "action": "open"}))
        );
    }

    #[test]
    fn test_other_event_names_are_management() {
        let text = r#"{"type":"event","event":"queue_stats","message":{"depth":3}}"#;
        assert_eq!(
            parse_frame(text).unwrap(),
            InboundFrame::Management(text.to_string())
        );
    }

    #[test]
    fn test_unknown_type_is_management() {
        let text = r#"{"type":"heartbeat_ack"}"#;
        assert_eq!(
            parse_frame(text).unwrap(),
            InboundFrame::Management(text.to_string())
        );
        let untyped = r#"{"hello":"world"}"#;
        assert_eq!(
            parse_frame(untyped).unwrap(),
            InboundFrame::Management(untyped.to_string())
        );
    }

    #[test]
    fn test_rejection_keeps_structured_reason_as_text() {
        let frame =
            parse_frame(r#"{"type":"reject_subscription","message":{"ErrorCode":"E2"}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Rejected {
                reason: Some(r#"{"ErrorCode":"E2"}"#.to_string())
            }
        );
    }

    #[test]
    fn test_disconnect_defaults_to_reconnect() {
        assert_eq!(
            parse_frame(r#"{"type":"disconnect","reason":"server_restart"}"#).unwrap(),
            InboundFrame::Disconnect {
                reason: Some("server_restart".to_string()),
                reconnect: true
            }
        );
        assert_eq!(
            parse_frame(r#"{"type":"disconnect","reconnect":false}"#).unwrap(),
            InboundFrame::Disconnect {
                reason: None,
                reconnect: false
            }
        );
    }

    #[test]
    fn test_error_frame_message() {
        assert_eq!(
            parse_frame(r#"{"type":"error","message":"{\"Message\":\"quota exceeded\"}"}"#)
                .unwrap(),
            InboundFrame::Error {
                message: r#"{"Message":"quota exceeded"}"#.to_string()
            }
        );
    }

    #[test]
    fn test_non_object_frames_fail() {
        assert!(parse_frame("not json").is_err());
        assert!(parse_frame("[1,2]").is_err());
    }

    #[test]
    fn test_subscribe_command_format() {
        let command: serde_json::Value =
            serde_json::from_str(&subscribe_command(&coordinates()).unwrap()).unwrap();
        assert_eq!(command["command"], "subscribe");
        assert!(command["identifier"].is_string());

        let identifier: serde_json::Value =
            serde_json::from_str(command["identifier"].as_str().unwrap()).unwrap();
        assert_eq!(identifier["channel"], "EventSubscriptionChannel");
        assert_eq!(identifier["queue_name"], "q.7");
        assert_eq!(identifier["routing_key"], "door.#");
        assert_eq!(identifier["port"], 5671);
        assert_eq!(identifier["use_ssl"], true);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("ééé", 2), "éé");
        assert_eq!(truncate("ab", 5), "ab");
    }
}
