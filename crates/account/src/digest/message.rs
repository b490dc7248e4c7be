use alloy_primitives::{B256, Bytes, keccak256};
use serde::{Deserialize, Serialize};

use super::SigningPayload;
use crate::error::{AccountError, AccountResult};

const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n";

/// Input to `personal_sign`.
///
/// In JSON, a plain string is text and `{"raw": "0x…"}` is a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignableMessage {
    /// Prefixed with `"\x19Ethereum Signed Message:\n" ‖ len` before hashing.
    Text(String),
    /// Hashed as-is, no prefix.
    Raw { raw: Bytes },
}

impl SignableMessage {
    pub fn text(message: impl Into<String>) -> Self {
        Self::Text(message.into())
    }

    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Self::Raw { raw: bytes.into() }
    }

    pub fn from_value(value: &serde_json::Value) -> AccountResult<Self> {
        Self::deserialize(value).map_err(|_| {
            AccountError::invalid_input(
                "message must be a string or an object with a hex `raw` field",
            )
        })
    }
}

impl From<&str> for SignableMessage {
    fn from(message: &str) -> Self {
        Self::text(message)
    }
}

impl From<String> for SignableMessage {
    fn from(message: String) -> Self {
        Self::Text(message)
    }
}

/// EIP-191 version `0x45` hash for text, plain keccak for raw bytes.
///
/// The length in the prefix is the UTF-8 byte length, not the character
/// count.
pub fn message_digest(message: &SignableMessage) -> B256 {
    match message {
        SignableMessage::Text(text) => {
            let bytes = text.as_bytes();
            let length = bytes.len().to_string();
            let mut preimage =
                Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + length.len() + bytes.len());
            preimage.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
            preimage.extend_from_slice(length.as_bytes());
            preimage.extend_from_slice(bytes);
            keccak256(&preimage)
        }
        SignableMessage::Raw { raw } => keccak256(raw),
    }
}

impl SigningPayload for SignableMessage {
    fn signing_digest(&self) -> AccountResult<B256> {
        Ok(message_digest(self))
    }

    fn kind(&self) -> &'static str {
        "message"
    }
}
