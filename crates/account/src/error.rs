use alloy_primitives::Address;

use crate::oracle::OracleError;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("signing oracle unavailable: {0}")]
    OracleUnavailable(String),
    #[error("signing oracle rejected the request: {0}")]
    OracleRejected(String),
    #[error("signature does not recover to account address {expected}")]
    RecoveryFailed { expected: Address },
    #[error("{0} is not supported by a signing-only account")]
    NotImplemented(&'static str),
}

impl AccountError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Only transport/auth failures are worth retrying; everything else needs
    /// a change of input, policy or key before trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccountError::OracleUnavailable(_))
    }
}

impl From<OracleError> for AccountError {
    fn from(error: OracleError) -> Self {
        match error {
            OracleError::Unavailable(message) => Self::OracleUnavailable(message),
            OracleError::Rejected(message) => Self::OracleRejected(message),
            malformed @ OracleError::MalformedResponse(_) => {
                Self::OracleUnavailable(malformed.to_string())
            }
        }
    }
}

pub type AccountResult<T> = Result<T, AccountError>;
