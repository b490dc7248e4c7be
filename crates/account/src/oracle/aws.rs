use alloy_primitives::B256;
use async_trait::async_trait;
use aws_sdk_kms::Client;
use aws_sdk_kms::config::{Credentials, Region};
use aws_sdk_kms::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::{MessageType, SigningAlgorithmSpec};
use tracing::debug;

use super::{OracleError, SigningOracle};
use crate::config::{ConfigError, KmsConfig};
use crate::key::PublicKey;
use crate::signature::RawSignature;

/// Service error codes that mean "could not reach or authenticate", as
/// opposed to the key policy saying no. `AccessDeniedException` is a policy
/// or IAM denial and stays on the rejected side.
const UNAVAILABLE_CODES: &[&str] = &[
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "ExpiredTokenException",
    "ThrottlingException",
    "DependencyTimeoutException",
    "KMSInternalException",
];

/// Signing oracle backed by an `ECC_SECG_P256K1` key in AWS KMS.
pub struct AwsKmsOracle {
    client: Client,
    key_id: String,
}

impl AwsKmsOracle {
    /// Validates `config` before any client is built.
    pub async fn connect(config: KmsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "kms-eth-account",
        );
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .load()
            .await;
        Ok(Self::from_client(Client::new(&sdk_config), config.key_id))
    }

    pub fn from_client(client: Client, key_id: String) -> Self {
        Self { client, key_id }
    }
}

fn classify<E, R>(operation: &str, error: SdkError<E, R>) -> OracleError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{operation}: {}", DisplayErrorContext(&error));
    match &error {
        SdkError::ServiceError(_) => classify_code(error.code(), message),
        _ => OracleError::Unavailable(message),
    }
}

/// Maps a KMS service error code onto the oracle's error kinds.
fn classify_code(code: Option<&str>, message: String) -> OracleError {
    match code {
        Some(code) if UNAVAILABLE_CODES.contains(&code) => OracleError::Unavailable(message),
        _ => OracleError::Rejected(message),
    }
}

#[async_trait]
impl SigningOracle for AwsKmsOracle {
    async fn sign_digest(&self, digest: B256) -> Result<RawSignature, OracleError> {
        debug!(key_id = %self.key_id, %digest, "requesting KMS signature");
        let output = self
            .client
            .sign()
            .key_id(&self.key_id)
            .message(Blob::new(digest.to_vec()))
            .message_type(MessageType::Digest)
            .signing_algorithm(SigningAlgorithmSpec::EcdsaSha256)
            .send()
            .await
            .map_err(|e| classify("kms:Sign", e))?;

        let der = output
            .signature()
            .ok_or_else(|| OracleError::MalformedResponse("kms:Sign returned no signature".into()))?;
        RawSignature::from_der(der.as_ref())
    }

    async fn public_key(&self) -> Result<PublicKey, OracleError> {
        debug!(key_id = %self.key_id, "fetching KMS public key");
        let output = self
            .client
            .get_public_key()
            .key_id(&self.key_id)
            .send()
            .await
            .map_err(|e| classify("kms:GetPublicKey", e))?;

        let der = output.public_key().ok_or_else(|| {
            OracleError::MalformedResponse("kms:GetPublicKey returned no key".into())
        })?;
        PublicKey::from_der(der.as_ref())
    }
}
