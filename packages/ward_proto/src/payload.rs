//! Wire Payload Types
//!
//! Message shapes for client-server traffic over the persistent connection.

use serde::{Deserialize, Serialize};

/// Recognized envelope tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    Connect,
    Disconnect,
    Message,
}

impl PayloadType {
    /// Map a wire tag onto the closed tag set. `None` for anything outside it.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "connect" => Some(PayloadType::Connect),
            "disconnect" => Some(PayloadType::Disconnect),
            "message" => Some(PayloadType::Message),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            PayloadType::Connect => "connect",
            PayloadType::Disconnect => "disconnect",
            PayloadType::Message => "message",
        }
    }
}

/// The outer wire wrapper: exactly a `type` tag and an opaque `data` field
/// holding the JSON-encoded body for that type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub data: String,
}

/// Body of a `connect` envelope: a peer came online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConPayload {
    pub id: String,
}

/// Body of a `disconnect` envelope: a peer went offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconPayload {
    pub id: String,
}

/// Body of a `message` envelope: a chat message relayed from a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgPayload {
    pub msg: String,
    pub sender_id: String,
}

/// One decoded inbound protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Connect(ConPayload),
    Disconnect(DisconPayload),
    Message(MsgPayload),
}

impl Frame {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Frame::Connect(_) => PayloadType::Connect,
            Frame::Disconnect(_) => PayloadType::Disconnect,
            Frame::Message(_) => PayloadType::Message,
        }
    }
}

/// The outbound chat message, sent as a flat JSON object directly over the
/// transport. Inbound frames are enveloped, outbound ones are not; field
/// order is `msg` then `recvid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub msg: String,
    pub recvid: String,
}
