pub mod account;
pub mod config;
pub mod digest;
pub mod error;
pub mod key;
pub mod oracle;
pub mod signature;

pub use account::{EthAccount, KmsAccount};
pub use config::{ConfigError, KmsConfig};
pub use digest::{SignableMessage, SigningPayload, TransactionRequest, TxType, TypedData};
pub use error::{AccountError, AccountResult};
pub use key::PublicKey;
pub use oracle::{LocalKeyOracle, OracleError, SigningOracle};
#[cfg(feature = "aws")]
pub use oracle::AwsKmsOracle;
pub use signature::{RawSignature, Signature};
