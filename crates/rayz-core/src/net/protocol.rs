//! Framing and dispatch-level codec for the admin protocol.

use serde::Serialize;
use serde_json::Value;

use super::frames::{self, Command, CommandFrame, ConfigUpdate, GameCommandKind};

/// Protocol revision spoken by this endpoint.
pub const PROTOCOL_VERSION: &str = "2.2";

/// Maximum inbound WebSocket frame size; larger frames are dropped.
pub const MAX_FRAME_SIZE: usize = 1024;

#[derive(Debug)]
pub enum ProtocolError {
    Json(String),
    MissingField(&'static str),
    BadField(&'static str),
    SerializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(e) => write!(f, "malformed JSON: {e}"),
            Self::MissingField(name) => write!(f, "missing field: {name}"),
            Self::BadField(name) => write!(f, "bad field: {name}"),
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encodes an outbound frame to its JSON wire form.
pub fn encode<T: Serialize>(frame: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(|e| ProtocolError::SerializeError(e.to_string()))
}

/// Decodes one inbound text frame.
///
/// Returns `Ok(None)` for frames carrying an unknown opcode — those are
/// ignored by contract, not errors. Malformed JSON and commands with
/// unusable required fields are errors (dropped with a counter upstream).
pub fn decode_command(text: &str) -> Result<Option<CommandFrame>, ProtocolError> {
    let root: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Json(e.to_string()))?;

    let mut op = root
        .get("op")
        .and_then(Value::as_u64)
        .and_then(|op| u8::try_from(op).ok())
        .unwrap_or(0);
    if op == 0 {
        // Fallback for legacy senders: map the canonical type string.
        op = root
            .get("type")
            .and_then(Value::as_str)
            .and_then(frames::op_for_type)
            .unwrap_or(0);
    }

    let req_id = root
        .get("req_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let command = match op {
        frames::OP_GET_STATUS => Command::GetStatus,
        frames::OP_HEARTBEAT => Command::Heartbeat,
        frames::OP_CONFIG_UPDATE => {
            let update: ConfigUpdate = serde_json::from_value(root)
                .map_err(|e| ProtocolError::Json(e.to_string()))?;
            Command::ConfigUpdate(Box::new(update))
        },
        frames::OP_GAME_COMMAND => {
            let raw = root
                .get("command")
                .and_then(Value::as_u64)
                .ok_or(ProtocolError::MissingField("command"))?;
            let kind = u8::try_from(raw)
                .ok()
                .and_then(GameCommandKind::from_byte)
                .ok_or(ProtocolError::BadField("command"))?;
            Command::GameCommand(kind)
        },
        frames::OP_HIT_FORWARD => {
            let shooter_id = root
                .get("shooter_id")
                .and_then(Value::as_u64)
                .ok_or(ProtocolError::MissingField("shooter_id"))?;
            let shooter_id =
                u8::try_from(shooter_id).map_err(|_| ProtocolError::BadField("shooter_id"))?;
            let shooter_team = root
                .get("shooter_team")
                .and_then(Value::as_u64)
                .and_then(|v| u8::try_from(v).ok());
            let damage = root
                .get("damage")
                .and_then(Value::as_u64)
                .map(|v| v.min(u64::from(u16::MAX)) as u16);
            Command::HitForward {
                shooter_id,
                shooter_team,
                damage,
            }
        },
        frames::OP_KILL_CONFIRMED => Command::KillConfirmed,
        frames::OP_REMOTE_SOUND => {
            let sound_id = root
                .get("sound_id")
                .and_then(Value::as_u64)
                .ok_or(ProtocolError::MissingField("sound_id"))?;
            let sound_id = u8::try_from(sound_id).unwrap_or(u8::MAX);
            Command::RemoteSound { sound_id }
        },
        _ => return Ok(None),
    };

    Ok(Some(CommandFrame { command, req_id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::frames::{AckFrame, StatusStats};

    #[test]
    fn decode_by_op() {
        let frame = decode_command(r#"{"op":1}"#).unwrap().unwrap();
        assert_eq!(frame.command, Command::GetStatus);
        assert_eq!(frame.req_id, None);
    }

    #[test]
    fn decode_by_type_fallback() {
        for (t, expect) in [
            ("get_status", Command::GetStatus),
            ("heartbeat", Command::Heartbeat),
        ] {
            let frame = decode_command(&format!(r#"{{"type":"{t}"}}"#))
                .unwrap()
                .unwrap();
            assert_eq!(frame.command, expect);
        }

        let frame = decode_command(r#"{"type":"config_update","max_hearts":5}"#)
            .unwrap()
            .unwrap();
        match frame.command {
            Command::ConfigUpdate(update) => assert_eq!(update.max_hearts, Some(5)),
            other => panic!("expected ConfigUpdate, got {other:?}"),
        }
    }

    #[test]
    fn op_wins_over_type() {
        // op says heartbeat even though type claims get_status
        let frame = decode_command(r#"{"op":2,"type":"get_status"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, Command::Heartbeat);
    }

    #[test]
    fn unknown_op_is_ignored() {
        assert!(decode_command(r#"{"op":99}"#).unwrap().is_none());
        assert!(decode_command(r#"{"type":"mystery"}"#).unwrap().is_none());
        assert!(decode_command(r#"{}"#).unwrap().is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(decode_command("{not json").is_err());
    }

    #[test]
    fn req_id_is_carried() {
        let frame = decode_command(r#"{"op":4,"command":1,"req_id":"abc-123"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame.req_id.as_deref(), Some("abc-123"));
        assert_eq!(frame.command, Command::GameCommand(GameCommandKind::Start));
    }

    #[test]
    fn game_command_requires_valid_verb() {
        assert!(decode_command(r#"{"op":4}"#).is_err());
        assert!(decode_command(r#"{"op":4,"command":7}"#).is_err());
    }

    #[test]
    fn hit_forward_fields() {
        let frame = decode_command(r#"{"op":5,"shooter_id":9,"shooter_team":2,"damage":3}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            frame.command,
            Command::HitForward {
                shooter_id: 9,
                shooter_team: Some(2),
                damage: Some(3),
            }
        );

        let frame = decode_command(r#"{"op":5,"shooter_id":9}"#).unwrap().unwrap();
        assert_eq!(
            frame.command,
            Command::HitForward {
                shooter_id: 9,
                shooter_team: None,
                damage: None,
            }
        );
    }

    #[test]
    fn encode_is_compact_json() {
        let json = encode(&AckFrame::ok("r")).unwrap();
        assert!(json.starts_with('{'));
        assert!(!json.contains('\n'));

        let stats = StatusStats {
            shots: 1,
            enemy_kills: 2,
            friendly_kills: 0,
            deaths: 3,
        };
        let json = encode(&stats).unwrap();
        let back: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back["deaths"], 3);
    }
}
