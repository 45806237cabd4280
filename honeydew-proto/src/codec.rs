//! Encode/decode helpers for the protobuf records carried as bus payloads.

use bytes::Bytes;
use prost::Message;

use crate::error::DecodeError;

/// Encode `message` into a payload ready to be handed to the bus.
#[must_use]
pub fn encode<M: Message>(message: &M) -> Bytes {
    Bytes::from(message.encode_to_vec())
}

/// Decode a bus payload into the expected message type.
///
/// # Errors
///
/// It returns an error if `payload` isn't a valid encoding of `M`.
pub fn decode<M: Message + Default>(payload: &[u8]) -> Result<M, DecodeError> {
    M::decode(payload)
}
