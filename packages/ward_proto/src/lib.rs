//! Ward Wire Protocol
//!
//! Payload types and codec for the clinic-messaging wire protocol. Inbound
//! traffic arrives as an envelope (`type` tag + JSON-string body) and decodes
//! into a closed [`Frame`] sum type; the one outbound shape the client
//! produces is a flat, unenveloped [`OutboundMessage`]. The asymmetry is part
//! of the wire contract and is preserved byte-for-byte.

mod codec;
mod payload;

pub use codec::{DecodeError, decode, encode_outbound};
pub use payload::{
    ConPayload, DisconPayload, Envelope, Frame, MsgPayload, OutboundMessage, PayloadType,
};
