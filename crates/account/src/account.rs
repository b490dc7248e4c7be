use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::digest::{SignableMessage, SigningPayload, TransactionRequest, TypedData};
use crate::error::{AccountError, AccountResult};
use crate::key::PublicKey;
use crate::oracle::SigningOracle;
use crate::signature::{Signature, attach_recovery_id};

/// Signing surface a wallet client drives.
///
/// Broadcasting and gas estimation belong to a transaction submitter; this
/// account only ever signs.
#[async_trait]
pub trait EthAccount: Send + Sync {
    async fn address(&self) -> AccountResult<Address>;
    async fn sign_message(&self, message: &SignableMessage) -> AccountResult<Signature>;
    async fn sign_typed_data(&self, typed_data: &TypedData) -> AccountResult<Signature>;
    async fn sign_transaction(&self, tx: &TransactionRequest) -> AccountResult<Signature>;
    async fn send_transaction(&self, tx: &TransactionRequest) -> AccountResult<B256>;
    async fn estimate_gas(&self, tx: &TransactionRequest) -> AccountResult<U256>;
}

#[derive(Debug, Clone)]
struct Identity {
    public_key: PublicKey,
    address: Address,
}

/// Ethereum account whose private key never leaves the signing oracle.
///
/// The address is derived from the oracle's public key on first use and
/// cached for the lifetime of the account. Concurrent first callers share a
/// single `public_key` fetch; a failed fetch caches nothing, so the next call
/// tries again.
pub struct KmsAccount<O> {
    oracle: O,
    identity: OnceCell<Identity>,
}

impl<O: SigningOracle> KmsAccount<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            identity: OnceCell::new(),
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    async fn identity(&self) -> AccountResult<&Identity> {
        self.identity
            .get_or_try_init(|| async {
                let public_key = self.oracle.public_key().await?;
                let address = public_key.address();
                info!(%address, "derived account address from oracle public key");
                Ok::<_, AccountError>(Identity {
                    public_key,
                    address,
                })
            })
            .await
    }

    pub async fn address(&self) -> AccountResult<Address> {
        Ok(self.identity().await?.address)
    }

    pub async fn public_key(&self) -> AccountResult<PublicKey> {
        Ok(self.identity().await?.public_key.clone())
    }

    pub async fn sign_message(&self, message: &SignableMessage) -> AccountResult<Signature> {
        self.sign_payload(message).await
    }

    pub async fn sign_typed_data(&self, typed_data: &TypedData) -> AccountResult<Signature> {
        self.sign_payload(typed_data).await
    }

    /// Signature over the transaction's signing hash. Wrapping it into the
    /// broadcastable envelope is up to the caller, see
    /// [`encode_signed`](crate::digest::encode_signed).
    pub async fn sign_transaction(&self, tx: &TransactionRequest) -> AccountResult<Signature> {
        self.sign_payload(tx).await
    }

    pub async fn send_transaction(&self, _tx: &TransactionRequest) -> AccountResult<B256> {
        Err(AccountError::NotImplemented("sendTransaction"))
    }

    pub async fn estimate_gas(&self, _tx: &TransactionRequest) -> AccountResult<U256> {
        Err(AccountError::NotImplemented("estimateGas"))
    }

    async fn sign_payload<P>(&self, payload: &P) -> AccountResult<Signature>
    where
        P: SigningPayload + ?Sized,
    {
        // Bad input is reported before the oracle is contacted.
        let digest = payload.signing_digest()?;
        let address = self.address().await?;

        debug!(kind = payload.kind(), %digest, "requesting oracle signature");
        let raw = self.oracle.sign_digest(digest).await?;
        attach_recovery_id(&digest, &raw, address)
    }
}

#[async_trait]
impl<O: SigningOracle> EthAccount for KmsAccount<O> {
    async fn address(&self) -> AccountResult<Address> {
        KmsAccount::address(self).await
    }

    async fn sign_message(&self, message: &SignableMessage) -> AccountResult<Signature> {
        KmsAccount::sign_message(self, message).await
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> AccountResult<Signature> {
        KmsAccount::sign_typed_data(self, typed_data).await
    }

    async fn sign_transaction(&self, tx: &TransactionRequest) -> AccountResult<Signature> {
        KmsAccount::sign_transaction(self, tx).await
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> AccountResult<B256> {
        KmsAccount::send_transaction(self, tx).await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> AccountResult<U256> {
        KmsAccount::estimate_gas(self, tx).await
    }
}
