//! Protocol Codec
//!
//! Pure decode/encode over the wire shapes in [`crate::payload`]. Decoding is
//! two-phase: parse the envelope and validate its tag, then parse the
//! JSON-string body and validate the fields that tag requires. No mutation,
//! no side effects.

use thiserror::Error;

use crate::payload::{Envelope, Frame, OutboundMessage, PayloadType};

/// Why an inbound frame could not be decoded. Always recoverable: the caller
/// drops the frame, logs, and keeps processing.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// JSON parse failure in either phase (envelope or body).
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// Envelope tag outside the recognized set.
    #[error("unknown payload type: {0:?}")]
    UnknownType(String),
    /// Body parsed as JSON but is missing fields the tag requires.
    #[error("malformed {tag} body: {source}")]
    MalformedBody {
        tag: &'static str,
        source: serde_json::Error,
    },
}

/// Decode one raw text frame into a [`Frame`].
pub fn decode(raw: &str) -> Result<Frame, DecodeError> {
    // Phase one: the envelope itself.
    let envelope: Envelope = serde_json::from_str(raw)?;
    let tag = PayloadType::from_tag(&envelope.payload_type)
        .ok_or_else(|| DecodeError::UnknownType(envelope.payload_type.clone()))?;

    // Phase two: the body, itself a JSON document inside the `data` string.
    let body: serde_json::Value = serde_json::from_str(&envelope.data)?;
    match tag {
        PayloadType::Connect => serde_json::from_value(body)
            .map(Frame::Connect)
            .map_err(|source| DecodeError::MalformedBody {
                tag: "connect",
                source,
            }),
        PayloadType::Disconnect => serde_json::from_value(body)
            .map(Frame::Disconnect)
            .map_err(|source| DecodeError::MalformedBody {
                tag: "disconnect",
                source,
            }),
        PayloadType::Message => serde_json::from_value(body)
            .map(Frame::Message)
            .map_err(|source| DecodeError::MalformedBody {
                tag: "message",
                source,
            }),
    }
}

/// Encode the one outbound shape the client produces.
pub fn encode_outbound(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}
