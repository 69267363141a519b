//! Relay wire frames (spec §6)
//!
//! Frames are JSON arrays on a single text message, tagged by their first
//! element. There is no single shape across variants so we encode/decode
//! through `serde_json::Value` rather than deriving `Serialize`, the same
//! way `terrain-gossip-net::framing` hand-rolls its cell header instead of
//! deriving one uniform struct.

use nsite_core::{Event, Filter};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// A frame sent from this client to a relay.
#[derive(Debug, Clone)]
pub enum ClientFrame {
    Event(Event),
    Req { sub_id: String, filter: Filter },
    Close { sub_id: String },
}

impl ClientFrame {
    pub fn to_text(&self) -> Result<String, FrameError> {
        let value = match self {
            ClientFrame::Event(event) => json!(["EVENT", event]),
            ClientFrame::Req { sub_id, filter } => json!(["REQ", sub_id, filter]),
            ClientFrame::Close { sub_id } => json!(["CLOSE", sub_id]),
        };
        Ok(serde_json::to_string(&value)?)
    }
}

/// A frame received from a relay.
#[derive(Debug, Clone)]
pub enum ServerFrame {
    Event { sub_id: String, event: Event },
    Eose { sub_id: String },
    Ok { event_id: String, accepted: bool, message: String },
    Notice { text: String },
    Closed { sub_id: String, reason: String },
}

impl ServerFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let arr = value
            .as_array()
            .ok_or_else(|| FrameError::Malformed("frame is not a JSON array".into()))?;
        let tag = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| FrameError::Malformed("frame missing string tag".into()))?;

        match tag {
            "EVENT" => {
                let sub_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| FrameError::Malformed("EVENT missing sub_id".into()))?
                    .to_string();
                let event_value = arr
                    .get(2)
                    .ok_or_else(|| FrameError::Malformed("EVENT missing event body".into()))?;
                let event: Event = serde_json::from_value(event_value.clone())?;
                Ok(ServerFrame::Event { sub_id, event })
            }
            "EOSE" => {
                let sub_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| FrameError::Malformed("EOSE missing sub_id".into()))?
                    .to_string();
                Ok(ServerFrame::Eose { sub_id })
            }
            "OK" => {
                let event_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| FrameError::Malformed("OK missing event_id".into()))?
                    .to_string();
                let accepted = arr.get(2).and_then(Value::as_bool).unwrap_or(false);
                let message = arr
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(ServerFrame::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            "NOTICE" => {
                let text = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(ServerFrame::Notice { text })
            }
            "CLOSED" => {
                let sub_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| FrameError::Malformed("CLOSED missing sub_id".into()))?
                    .to_string();
                let reason = arr
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(ServerFrame::Closed { sub_id, reason })
            }
            other => Err(FrameError::Malformed(format!("unknown frame tag {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            id: "a".repeat(64),
            pubkey: "b".repeat(64),
            created_at: 1,
            kind: 34128,
            tags: vec![vec!["d".into(), "/index.html".into()]],
            content: String::new(),
            sig: "c".repeat(128),
        }
    }

    #[test]
    fn event_frame_round_trips() {
        let event = sample_event();
        let client = ClientFrame::Event(event.clone());
        let text = client.to_text().unwrap();
        assert!(text.starts_with("[\"EVENT\","));

        let server_text = format!(r#"["EVENT","sub1",{}]"#, serde_json::to_string(&event).unwrap());
        match ServerFrame::parse(&server_text).unwrap() {
            ServerFrame::Event { sub_id, event: parsed } => {
                assert_eq!(sub_id, "sub1");
                assert_eq!(parsed, event);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn parses_ok_frame() {
        let text = r#"["OK","eventid",true,""]"#;
        match ServerFrame::parse(text).unwrap() {
            ServerFrame::Ok {
                event_id,
                accepted,
                message,
            } => {
                assert_eq!(event_id, "eventid");
                assert!(accepted);
                assert_eq!(message, "");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn parses_notice_and_closed() {
        assert!(matches!(
            ServerFrame::parse(r#"["NOTICE","rate limited"]"#).unwrap(),
            ServerFrame::Notice { text } if text == "rate limited"
        ));
        assert!(matches!(
            ServerFrame::parse(r#"["CLOSED","sub1","auth-required"]"#).unwrap(),
            ServerFrame::Closed { sub_id, reason } if sub_id == "sub1" && reason == "auth-required"
        ));
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(ServerFrame::parse(r#"["BOGUS"]"#).is_err());
    }

    #[test]
    fn req_frame_serializes_filter_inline() {
        let frame = ClientFrame::Req {
            sub_id: "s1".into(),
            filter: Filter {
                kinds: Some(vec![34128]),
                ..Default::default()
            },
        };
        let text = frame.to_text().unwrap();
        assert!(text.contains("\"kinds\":[34128]"));
    }
}
