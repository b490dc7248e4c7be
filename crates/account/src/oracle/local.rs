use alloy_primitives::{B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, signature::hazmat::PrehashSigner};
use sha2::{Digest, Sha256};

use super::{OracleError, SigningOracle};
use crate::key::PublicKey;
use crate::signature::{RawSignature, SECP256K1_ORDER};

/// In-process oracle backed by a local secp256k1 key.
///
/// Answers in the same shape a KMS does (DER signature, no recovery id) so
/// the rest of the pipeline cannot tell it apart from a remote key. Created
/// from a seed string: the SHA-256 hash of the seed becomes the private key.
pub struct LocalKeyOracle {
    signing_key: SigningKey,
    high_s: bool,
}

impl LocalKeyOracle {
    pub fn from_seed(seed: &str) -> Result<Self> {
        let hash = Sha256::digest(seed.as_bytes());
        let signing_key = SigningKey::from_bytes((&hash).into())
            .map_err(|e| anyhow::anyhow!("invalid seed: {e}"))?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Self {
            signing_key,
            high_s: false,
        }
    }

    /// Emit every signature in its high-s form, the way an HSM that does not
    /// normalize would half of the time.
    pub fn with_high_s(mut self, high_s: bool) -> Self {
        self.high_s = high_s;
        self
    }
}

#[async_trait]
impl SigningOracle for LocalKeyOracle {
    async fn sign_digest(&self, digest: B256) -> Result<RawSignature, OracleError> {
        let signature: EcdsaSignature = self
            .signing_key
            .sign_prehash(digest.as_slice())
            .map_err(|e| OracleError::Rejected(format!("secp256k1 sign_prehash failed: {e}")))?;

        let raw = RawSignature::from_der(signature.to_der().as_bytes())?;
        if !self.high_s {
            return Ok(raw);
        }
        let s = U256::from_be_bytes(raw.s().0);
        RawSignature::from_scalars(raw.r(), B256::from((SECP256K1_ORDER - s).to_be_bytes::<32>()))
    }

    async fn public_key(&self) -> Result<PublicKey, OracleError> {
        Ok(PublicKey::from(self.signing_key.verifying_key().clone()))
    }
}
