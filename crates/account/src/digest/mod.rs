mod message;
mod quantity;
mod typed_data;
mod transaction;

pub use message::{SignableMessage, message_digest};
pub use transaction::{
    AccessListItem, TransactionRequest, TxType, encode_for_signing, encode_signed,
    resolve_type, transaction_digest,
};
pub use typed_data::{
    TypedData, TypedDataDomain, TypedDataField, Types, domain_separator, encode_type,
    hash_struct, type_hash, typed_data_digest,
};

use alloy_primitives::B256;

use crate::error::AccountResult;

/// Something the account can sign.
///
/// The payload owns its hashing convention: it produces the 32-byte digest
/// the oracle will sign, byte-for-byte what Ethereum tooling computes for the
/// same input.
pub trait SigningPayload: Send + Sync {
    fn signing_digest(&self) -> AccountResult<B256>;

    /// Payload class (e.g. "message", "typed-data", "transaction").
    fn kind(&self) -> &'static str;
}
