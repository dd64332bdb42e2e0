//! Text framing for the realtime channel.
//!
//! The server speaks the numeric-prefix protocol used by Engine.IO /
//! Socket.IO v4 over a websocket:
//!
//! | Frame          | Meaning                                         |
//! |----------------|-------------------------------------------------|
//! | `2`            | heartbeat probe, answered with a bare `3`       |
//! | `42[name, …]`  | event; element 0 is the name, element 1 payload |
//! | anything else  | ignored                                         |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

pub const HEARTBEAT_PROBE: &str = "2";
pub const HEARTBEAT_REPLY: &str = "3";
const EVENT_PREFIX: &str = "42";

// ── Event names ──────────────────────────────────────────────────────

pub const EVENT_CLICK: &str = "click";
pub const EVENT_CAR_NOTIFICATION: &str = "notificar_carro";
pub const EVENT_CALL_ANSWERED: &str = "ligacao_atendida";
pub const EVENT_INTERNAL_CALL: &str = "ligacao_interna";

// ── Frame ────────────────────────────────────────────────────────────

/// A decoded inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Server heartbeat probe (`2`).
    Ping,
    /// `42[...]` event frame.
    Event {
        name: String,
        payload: Option<Value>,
    },
    /// Any other frame: open packets, acks, malformed events.
    Ignored,
}

/// Decode a single text frame.
///
/// Never fails: frames that do not parse as a heartbeat or a well-formed
/// event come back as [`Frame::Ignored`].
pub fn decode(text: &str) -> Frame {
    if text == HEARTBEAT_PROBE {
        return Frame::Ping;
    }

    let Some(body) = text.strip_prefix(EVENT_PREFIX) else {
        return Frame::Ignored;
    };

    let mut items: Vec<Value> = match serde_json::from_str(body) {
        Ok(items) => items,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse event frame");
            return Frame::Ignored;
        }
    };

    if items.is_empty() {
        return Frame::Ignored;
    }

    let payload = (items.len() > 1).then(|| items.swap_remove(1));
    match items.swap_remove(0) {
        Value::String(name) => Frame::Event { name, payload },
        other => {
            tracing::debug!(name = %other, "Event frame without a string name");
            Frame::Ignored
        }
    }
}

/// Encode an outbound event as `42["name", payload]`.
pub fn encode_event<T: Serialize + ?Sized>(name: &str, payload: &T) -> Result<String, Error> {
    let body = serde_json::to_string(&(name, payload))?;
    Ok(format!("{EVENT_PREFIX}{body}"))
}

// ── Payloads ─────────────────────────────────────────────────────────

/// Outbound `click` payload: which extension pressed which button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickPayload {
    #[serde(rename = "ramal")]
    pub extension: String,
    pub token: String,
    pub button: String,
}

#[derive(Debug, Deserialize)]
struct CarNotificationPayload {
    #[serde(rename = "TemCarro")]
    has_car: bool,
}

#[derive(Debug, Deserialize)]
struct CallAnsweredPayload {
    #[serde(rename = "RamalQueAtendeu")]
    answered_by: String,
}

#[derive(Debug, Deserialize)]
struct InternalCallPayload {
    #[serde(rename = "RamalQueSolicitou")]
    requested_by: String,
    #[serde(rename = "TemCarro")]
    has_car: bool,
}

/// A recognized inbound server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A vehicle is (or is no longer) waiting.
    CarNotification { has_car: bool },
    /// Another extension picked up the call.
    CallAnswered { answered_by: String },
    /// An internal call was requested by another extension.
    InternalCall { requested_by: String, has_car: bool },
}

/// Outcome of interpreting an event frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpreted {
    Known(ServerEvent),
    /// Recognized name, but the payload did not match its shape.
    BadPayload { name: String, reason: String },
    Unknown(String),
}

impl ServerEvent {
    /// Map an event name and optional payload onto a typed event.
    pub fn interpret(name: &str, payload: Option<Value>) -> Interpreted {
        let payload = payload.unwrap_or(Value::Null);
        let parsed = match name {
            EVENT_CAR_NOTIFICATION => serde_json::from_value::<CarNotificationPayload>(payload)
                .map(|p| Self::CarNotification { has_car: p.has_car }),
            EVENT_CALL_ANSWERED => serde_json::from_value::<CallAnsweredPayload>(payload)
                .map(|p| Self::CallAnswered {
                    answered_by: p.answered_by,
                }),
            EVENT_INTERNAL_CALL => serde_json::from_value::<InternalCallPayload>(payload)
                .map(|p| Self::InternalCall {
                    requested_by: p.requested_by,
                    has_car: p.has_car,
                }),
            other => return Interpreted::Unknown(other.to_owned()),
        };

        match parsed {
            Ok(event) => Interpreted::Known(event),
            Err(e) => Interpreted::BadPayload {
                name: name.to_owned(),
                reason: e.to_string(),
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn bare_two_is_heartbeat() {
        assert_eq!(decode("2"), Frame::Ping);
    }

    #[test]
    fn short_and_unknown_frames_are_ignored() {
        assert_eq!(decode(""), Frame::Ignored);
        assert_eq!(decode("3"), Frame::Ignored);
        assert_eq!(decode("40"), Frame::Ignored);
        assert_eq!(decode(r#"0{"sid":"abc"}"#), Frame::Ignored);
    }

    #[test]
    fn malformed_event_is_ignored() {
        assert_eq!(decode("42not json"), Frame::Ignored);
        assert_eq!(decode("42[]"), Frame::Ignored);
        assert_eq!(decode("42[17, {}]"), Frame::Ignored);
    }

    #[test]
    fn event_without_payload() {
        assert_eq!(
            decode(r#"42["ping_me"]"#),
            Frame::Event {
                name: "ping_me".into(),
                payload: None
            }
        );
    }

    #[test]
    fn click_round_trips_through_decoder() {
        let click = ClickPayload {
            extension: "10".into(),
            token: "t".into(),
            button: "Mute".into(),
        };
        let text = encode_event(EVENT_CLICK, &click).unwrap();
        assert!(text.starts_with("42["));

        let Frame::Event { name, payload } = decode(&text) else {
            panic!("expected event frame, got {text}");
        };
        assert_eq!(name, "click");
        assert_eq!(
            payload.unwrap(),
            json!({ "ramal": "10", "token": "t", "button": "Mute" })
        );
    }

    #[test]
    fn interprets_known_events() {
        assert_eq!(
            ServerEvent::interpret(EVENT_CAR_NOTIFICATION, Some(json!({ "TemCarro": true }))),
            Interpreted::Known(ServerEvent::CarNotification { has_car: true })
        );
        assert_eq!(
            ServerEvent::interpret(
                EVENT_CALL_ANSWERED,
                Some(json!({ "RamalQueAtendeu": "2001" }))
            ),
            Interpreted::Known(ServerEvent::CallAnswered {
                answered_by: "2001".into()
            })
        );
        assert_eq!(
            ServerEvent::interpret(
                EVENT_INTERNAL_CALL,
                Some(json!({ "RamalQueSolicitou": "3003", "TemCarro": false }))
            ),
            Interpreted::Known(ServerEvent::InternalCall {
                requested_by: "3003".into(),
                has_car: false
            })
        );
    }

    #[test]
    fn unknown_event_name_is_reported() {
        assert_eq!(
            ServerEvent::interpret("something_else", None),
            Interpreted::Unknown("something_else".into())
        );
    }

    #[test]
    fn missing_payload_for_known_event_is_bad_payload() {
        assert!(matches!(
            ServerEvent::interpret(EVENT_CAR_NOTIFICATION, None),
            Interpreted::BadPayload { .. }
        ));
    }
}
