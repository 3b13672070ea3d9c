// Realtime wire format: one JSON text frame per event, `{"event": name, "data": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::Message;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event {event} has invalid payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SenderPayload {
    sender_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteChatPayload {
    receiver_id: String,
}

/// Events delivered to channel subscribers. `Connected` and `Disconnected` are
/// synthesised by the channel itself, everything else comes off the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    NewMessage(Message),
    MessageSent(Message),
    DeleteChat { peer_id: String },
    Typing { sender_id: String },
    StopTyping { sender_id: String },
}

impl ChannelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::Connected => "connect",
            ChannelEvent::Disconnected => "disconnect",
            ChannelEvent::NewMessage(_) => "new-message",
            ChannelEvent::MessageSent(_) => "message-sent",
            ChannelEvent::DeleteChat { .. } => "delete-chat",
            ChannelEvent::Typing { .. } => "typing",
            ChannelEvent::StopTyping { .. } => "stop-typing",
        }
    }

    /// Decode one inbound text frame. Unknown event names yield `Ok(None)`.
    pub fn decode(text: &str) -> Result<Option<Self>, WireError> {
        let Envelope { event, data } = serde_json::from_str(text)?;
        let payload = |err| WireError::Payload {
            event: event.clone(),
            source: err,
        };
        let decoded = match event.as_str() {
            "new-message" => {
                ChannelEvent::NewMessage(serde_json::from_value(data).map_err(payload)?)
            }
            "message-sent" => {
                ChannelEvent::MessageSent(serde_json::from_value(data).map_err(payload)?)
            }
            "delete-chat" => {
                let p: DeleteChatPayload = serde_json::from_value(data).map_err(payload)?;
                ChannelEvent::DeleteChat {
                    peer_id: p.receiver_id,
                }
            }
            "typing" => {
                let p: SenderPayload = serde_json::from_value(data).map_err(payload)?;
                ChannelEvent::Typing {
                    sender_id: p.sender_id,
                }
            }
            "stop-typing" => {
                let p: SenderPayload = serde_json::from_value(data).map_err(payload)?;
                ChannelEvent::StopTyping {
                    sender_id: p.sender_id,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinRoom {
        user_id: String,
    },
    LeaveRoom {
        user_id: String,
    },
    SendMessage {
        sender_id: String,
        receiver_id: String,
        body: String,
    },
    Typing {
        sender_id: String,
        receiver_id: String,
    },
    StopTyping {
        sender_id: String,
        receiver_id: String,
    },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::JoinRoom { .. } => "join-room",
            OutboundEvent::LeaveRoom { .. } => "leave-room",
            OutboundEvent::SendMessage { .. } => "send-message",
            OutboundEvent::Typing { .. } => "typing",
            OutboundEvent::StopTyping { .. } => "stop-typing",
        }
    }

    pub fn encode(&self) -> String {
        let data = match self {
            // Rooms are keyed by the bare user id.
            OutboundEvent::JoinRoom { user_id } | OutboundEvent::LeaveRoom { user_id } => {
                Value::String(user_id.clone())
            }
            OutboundEvent::SendMessage {
                sender_id,
                receiver_id,
                body,
            } => serde_json::json!({
                "senderId": sender_id,
                "receiverId": receiver_id,
                "message": body,
            }),
            OutboundEvent::Typing {
                sender_id,
                receiver_id,
            }
            | OutboundEvent::StopTyping {
                sender_id,
                receiver_id,
            } => serde_json::json!({
                "senderId": sender_id,
                "receiverId": receiver_id,
            }),
        };
        serde_json::json!({ "event": self.name(), "data": data }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_typing_and_delete_chat() {
        let typing = ChannelEvent::decode(r#"{"event":"typing","data":{"senderId":"alice"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            typing,
            ChannelEvent::Typing {
                sender_id: "alice".into()
            }
        );

        let deleted =
            ChannelEvent::decode(r#"{"event":"delete-chat","data":{"receiverId":"alice"}}"#)
                .unwrap()
                .unwrap();
        assert_eq!(
            deleted,
            ChannelEvent::DeleteChat {
                peer_id: "alice".into()
            }
        );
    }

    #[test]
    fn decodes_new_message_payload() {
        let frame = r#"{"event":"new-message","data":{
            "_id":"m1","senderId":"alice","receiverId":"bob",
            "message":"hi","sentAt":"2024-03-01T10:00:00Z","isRead":false}}"#;
        match ChannelEvent::decode(frame).unwrap() {
            Some(ChannelEvent::NewMessage(m)) => {
                assert_eq!(m.id, "m1");
                assert_eq!(m.body.as_deref(), Some("hi"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_events_are_ignored() {
        assert!(ChannelEvent::decode(r#"{"event":"presence","data":{}}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn bad_payload_is_an_error() {
        let err = ChannelEvent::decode(r#"{"event":"typing","data":{"who":"alice"}}"#)
            .unwrap_err();
        assert!(matches!(err, WireError::Payload { ref event, .. } if event == "typing"));
        assert!(ChannelEvent::decode("not json").is_err());
    }

    #[test]
    fn join_room_carries_bare_user_id() {
        let frame: Value = serde_json::from_str(
            &OutboundEvent::JoinRoom {
                user_id: "bob".into(),
            }
            .encode(),
        )
        .unwrap();
        assert_eq!(frame["event"], "join-room");
        assert_eq!(frame["data"], "bob");
    }

    #[test]
    fn send_message_uses_backend_field_names() {
        let frame: Value = serde_json::from_str(
            &OutboundEvent::SendMessage {
                sender_id: "bob".into(),
                receiver_id: "alice".into(),
                body: "hey".into(),
            }
            .encode(),
        )
        .unwrap();
        assert_eq!(frame["event"], "send-message");
        assert_eq!(frame["data"]["receiverId"], "alice");
        assert_eq!(frame["data"]["message"], "hey");
    }
}
