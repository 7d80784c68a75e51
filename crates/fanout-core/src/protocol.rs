// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! Wire shapes exchanged between clients and the hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum size, in bytes, of a single inbound frame. Frames larger than
/// this are rejected before they are even parsed as JSON.
pub const MAX_FRAME_BYTES: usize = 8 * 1024;

/// Capacity of a single connection's outbound queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// A `{type, payload}` frame sent by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// The validated shape of an inbound message, once `kind` and `payload` have
/// been matched against one of the three supported message types.
#[derive(Debug, Clone)]
pub enum InboundRequest {
    Join { room: String },
    Leave { room: String },
    Broadcast { room: String, body: Value },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    MessageTooLarge,
    InvalidJson,
    UnsupportedMessageType,
    MissingRoom,
    MissingBody,
    NotAuthorized,
    ServerError,
}

impl ProtocolError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolError::MessageTooLarge => "message too large",
            ProtocolError::InvalidJson => "invalid json",
            ProtocolError::UnsupportedMessageType => "unsupported message type",
            ProtocolError::MissingRoom => "missing room",
            ProtocolError::MissingBody => "missing body",
            ProtocolError::NotAuthorized => "not authorized",
            ProtocolError::ServerError => "server error",
        }
    }

    /// Serializes this error into the structured `{type: "error", payload:
    /// {error}}` envelope sent back to the client.
    pub fn to_frame(&self) -> Value {
        serde_json::json!({
            "type": "error",
            "payload": { "error": self.as_str() },
        })
    }
}

impl InboundMessage {
    /// Matches this message against the three supported request shapes,
    /// returning the structured [`ProtocolError`] the frontend must send
    /// back on a mismatch.
    pub fn into_request(self) -> Result<InboundRequest, ProtocolError> {
        let room = || {
            self.payload
                .get("room")
                .and_then(Value::as_str)
                .filter(|room| !room.is_empty())
                .map(str::to_owned)
                .ok_or(ProtocolError::MissingRoom)
        };

        match self.kind.as_str() {
            "join" => Ok(InboundRequest::Join { room: room()? }),
            "leave" => Ok(InboundRequest::Leave { room: room()? }),
            "broadcast" => {
                let room = room()?;
                let body = self
                    .payload
                    .get("body")
                    .cloned()
                    .ok_or(ProtocolError::MissingBody)?;
                Ok(InboundRequest::Broadcast { room, body })
            }
            _ => Err(ProtocolError::UnsupportedMessageType),
        }
    }
}

/// Server-originated or broadcast payload delivered to room members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub from: String,
    pub room: String,
    pub ts: DateTime<Utc>,
    pub body: Value,
}

impl Envelope {
    pub fn new(from: impl Into<String>, room: impl Into<String>, body: Value) -> Self {
        Self {
            from: from.into(),
            room: room.into(),
            ts: Utc::now(),
            body,
        }
    }
}

/// Role-scoped delivery event relayed from the bus's `events` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsEvent {
    #[serde(rename = "type")]
    pub kind: StatsEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsEventKind {
    #[serde(rename = "ADMIN_STATS_UPDATED")]
    AdminStatsUpdated,
    #[serde(rename = "SELLER_STATS_UPDATED")]
    SellerStatsUpdated,
    #[serde(other)]
    Unknown,
}

/// Ack text sent back on successful join/leave, kept as plain UTF-8 strings
/// for backward compatibility with older clients.
pub fn join_ack(room: &str) -> String {
    format!("joined {room}")
}

pub fn leave_ack(room: &str) -> String {
    format!("left {room}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_join_request() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"join","payload":{"room":"order-1"}}"#).unwrap();
        let req = msg.into_request().unwrap();
        assert!(matches!(req, InboundRequest::Join { room } if room == "order-1"));
    }

    #[test]
    fn rejects_empty_room() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"join","payload":{"room":""}}"#).unwrap();
        assert_eq!(msg.into_request().unwrap_err(), ProtocolError::MissingRoom);
    }

    #[test]
    fn rejects_missing_body() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"broadcast","payload":{"room":"order-1"}}"#).unwrap();
        assert_eq!(msg.into_request().unwrap_err(), ProtocolError::MissingBody);
    }

    #[test]
    fn rejects_unknown_type() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"ping","payload":{}}"#).unwrap();
        assert_eq!(
            msg.into_request().unwrap_err(),
            ProtocolError::UnsupportedMessageType
        );
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = Envelope::new("conn-1", "order-1", serde_json::json!({"hello": 1}));
        let encoded = serde_json::to_string(&envelope).unwrap();
        let decoded: Envelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.room, "order-1");
    }

    #[test]
    fn stats_event_unknown_type_does_not_fail_to_parse() {
        let event: StatsEvent = serde_json::from_str(
            r#"{"type":"SOMETHING_ELSE","timestamp":"2024-01-01T00:00:00Z","metadata":{}}"#,
        )
        .unwrap();
        assert_eq!(event.kind, StatsEventKind::Unknown);
    }
}
