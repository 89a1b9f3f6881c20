use serde_json::{json, Value};

use crate::types::Snapshot;

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Ping { t: Option<f64> },
    GetState,
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "ping" => {
            let t = match object.get("t") {
                None | Some(Value::Null) => None,
                Some(value) => {
                    let t = value.as_f64()?;
                    if !t.is_finite() {
                        return None;
                    }
                    Some(t)
                }
            };
            Some(ParsedClientMessage::Ping { t })
        }
        "get_state" => Some(ParsedClientMessage::GetState),
        _ => None,
    }
}

pub fn initial_state_message(snapshot: &Snapshot) -> Value {
    json!({
        "type": "initial_state",
        "data": snapshot,
    })
}

pub fn game_state_message(snapshot: &Snapshot) -> Value {
    json!({
        "type": "game_state",
        "data": snapshot,
    })
}

pub fn game_end_message(snapshot: &Snapshot) -> Value {
    json!({
        "type": "game_end",
        "winner": snapshot.winner,
        "final_state": snapshot,
    })
}

pub fn pong_message(t: Option<f64>) -> Value {
    match t {
        Some(t) => json!({ "type": "pong", "t": t }),
        None => json!({ "type": "pong" }),
    }
}

pub fn heartbeat_message() -> Value {
    json!({ "type": "heartbeat" })
}

pub fn error_message(message: &str) -> Value {
    json!({
        "type": "error",
        "message": message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ping_with_and_without_timestamp() {
        assert_eq!(
            parse_client_message(r#"{"type":"ping"}"#),
            Some(ParsedClientMessage::Ping { t: None })
        );
        assert_eq!(
            parse_client_message(r#"{"type":"ping","t":12.5}"#),
            Some(ParsedClientMessage::Ping { t: Some(12.5) })
        );
    }

    #[test]
    fn parse_ping_rejects_non_numeric_timestamp() {
        assert!(parse_client_message(r#"{"type":"ping","t":"soon"}"#).is_none());
    }

    #[test]
    fn parse_rejects_unknown_and_malformed() {
        assert!(parse_client_message(r#"{"type":"input","dir":"up"}"#).is_none());
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message(r#"["ping"]"#).is_none());
        assert_eq!(
            parse_client_message(r#"{"type":"get_state"}"#),
            Some(ParsedClientMessage::GetState)
        );
    }

    #[test]
    fn pong_echoes_timestamp() {
        assert_eq!(pong_message(Some(3.0))["t"], json!(3.0));
        assert!(pong_message(None).get("t").is_none());
        assert_eq!(heartbeat_message()["type"], "heartbeat");
    }
}
