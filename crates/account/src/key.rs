use alloy_primitives::{Address, keccak256};
use k256::ecdsa::VerifyingKey;
use k256::pkcs8::DecodePublicKey;

use crate::oracle::OracleError;

/// secp256k1 public key held alongside the account's cached address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Accepts compressed (33 bytes) or uncompressed (65 bytes) SEC1 encodings.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, OracleError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|e| OracleError::MalformedResponse(format!("invalid SEC1 public key: {e}")))
    }

    /// Parses a DER `SubjectPublicKeyInfo`, the form KMS services return.
    pub fn from_der(der: &[u8]) -> Result<Self, OracleError> {
        VerifyingKey::from_public_key_der(der)
            .map(Self)
            .map_err(|e| OracleError::MalformedResponse(format!("invalid DER public key: {e}")))
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }

    /// `0x04 ‖ x ‖ y`
    pub fn to_uncompressed(&self) -> [u8; 65] {
        let point = self.0.to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Low 20 bytes of `keccak256(x ‖ y)`.
    pub fn address(&self) -> Address {
        let uncompressed = self.to_uncompressed();
        let hash = keccak256(&uncompressed[1..]);
        Address::from_slice(&hash[12..])
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}
