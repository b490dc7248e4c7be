mod local;
#[cfg(feature = "aws")]
mod aws;

use std::sync::Arc;

use alloy_primitives::B256;
use async_trait::async_trait;

use crate::key::PublicKey;
use crate::signature::RawSignature;

pub use local::LocalKeyOracle;
#[cfg(feature = "aws")]
pub use self::aws::AwsKmsOracle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// Transport, credential or timeout failure.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    /// The remote key policy refused the operation.
    #[error("oracle rejected the request: {0}")]
    Rejected(String),
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
}

/// A remote signing service holding a secp256k1 key that never leaves it.
///
/// Implementations make exactly one remote call per method invocation and
/// keep no local state between calls. Retries belong to the caller: a
/// silently repeated `sign_digest` shows up twice in the key's audit log.
#[async_trait]
pub trait SigningOracle: Send + Sync {
    /// Signs a 32-byte prehash. The result carries no recovery id and is not
    /// guaranteed to be low-s.
    async fn sign_digest(&self, digest: B256) -> Result<RawSignature, OracleError>;

    async fn public_key(&self) -> Result<PublicKey, OracleError>;
}

#[async_trait]
impl<T> SigningOracle for Arc<T>
where
    T: SigningOracle + ?Sized,
{
    async fn sign_digest(&self, digest: B256) -> Result<RawSignature, OracleError> {
        (**self).sign_digest(digest).await
    }

    async fn public_key(&self) -> Result<PublicKey, OracleError> {
        (**self).public_key().await
    }
}
