//! Conveniences over the generated wire messages.

use crate::{
    checksum::{decode, encode},
    proto::{SequenceRequest, SequenceResponse, sequence_response::Payload},
    types::Value,
};

/// A decoded [`SequenceResponse`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// One element of the sequence.
    Value(Value),
    /// Sum of the whole sequence; the final message of a call.
    Checksum(Value),
}

impl SequenceRequest {
    pub const fn new(quantity: i64, seed: u64) -> Self {
        Self { quantity, seed }
    }
}

impl SequenceResponse {
    /// Builds a message carrying one sequence element.
    pub fn value(value: &Value) -> Self {
        Self {
            payload: Some(Payload::Value(encode(value).into())),
        }
    }

    /// Builds the terminal message carrying the checksum.
    pub fn checksum(checksum: &Value) -> Self {
        Self {
            payload: Some(Payload::Checksum(encode(checksum).into())),
        }
    }

    /// Decodes the payload, or `None` if no field is populated.
    pub fn decode(&self) -> Option<Message> {
        match self.payload.as_ref()? {
            Payload::Value(bytes) => Some(Message::Value(decode(bytes))),
            Payload::Checksum(bytes) => Some(Message::Checksum(decode(bytes))),
        }
    }
}
