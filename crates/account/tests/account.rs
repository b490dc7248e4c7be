use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, B256, U256, address, b256};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;

use kms_eth_account::digest::{
    SigningPayload, TypedDataDomain, TypedDataField, Types, encode_signed,
};
use kms_eth_account::signature::SECP256K1_HALF_ORDER;
use kms_eth_account::{
    AccountError, EthAccount, KmsAccount, LocalKeyOracle, OracleError, PublicKey, RawSignature,
    SignableMessage, Signature, SigningOracle, TransactionRequest, TypedData,
};

const SEED: &str = "kms-account";
const SEED_ADDRESS: Address = address!("5eb4248379623d872d3a1d646134c3de3b3564b1");

fn local(seed: &str) -> LocalKeyOracle {
    LocalKeyOracle::from_seed(seed).unwrap()
}

fn person_typed_data() -> TypedData {
    let mut types = Types::new();
    types.insert(
        "Person".into(),
        vec![
            TypedDataField::new("name", "string"),
            TypedDataField::new("wallet", "address"),
        ],
    );
    TypedData::new(
        TypedDataDomain {
            name: Some("Example".into()),
            version: Some("1".into()),
            chain_id: Some(1),
            verifying_contract: Some(address!("CcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC")),
            salt: None,
        },
        types,
        "Person",
        json!({"name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"}),
    )
}

fn fee_market_tx() -> TransactionRequest {
    TransactionRequest {
        chain_id: Some(1),
        nonce: Some(0),
        max_fee_per_gas: Some(U256::from(20_000_000_000u64)),
        max_priority_fee_per_gas: Some(U256::from(1_000_000_000u64)),
        to: Some(Address::ZERO),
        value: Some(U256::from(1_000_000_000_000_000_000u128)),
        ..Default::default()
    }
}

fn assert_low_s(signature: &Signature) {
    assert!(U256::from_be_bytes(signature.s().0) <= SECP256K1_HALF_ORDER);
    assert!(matches!(signature.v(), 27 | 28));
}

/// Counts `public_key` calls and can be told to fail the first one.
struct CountingOracle {
    inner: LocalKeyOracle,
    fetches: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingOracle {
    fn new(inner: LocalKeyOracle) -> Self {
        Self {
            inner,
            fetches: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SigningOracle for CountingOracle {
    async fn sign_digest(&self, digest: B256) -> Result<RawSignature, OracleError> {
        self.inner.sign_digest(digest).await
    }

    async fn public_key(&self) -> Result<PublicKey, OracleError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(OracleError::Unavailable("connection reset".into()));
        }
        self.inner.public_key().await
    }
}

/// Oracle whose key can be replaced after the account cached its address.
struct SwappableOracle {
    current: Mutex<Arc<LocalKeyOracle>>,
}

impl SwappableOracle {
    fn swap(&self, next: LocalKeyOracle) {
        *self.current.lock().unwrap() = Arc::new(next);
    }

    fn current(&self) -> Arc<LocalKeyOracle> {
        self.current.lock().unwrap().clone()
    }
}

#[async_trait]
impl SigningOracle for SwappableOracle {
    async fn sign_digest(&self, digest: B256) -> Result<RawSignature, OracleError> {
        self.current().sign_digest(digest).await
    }

    async fn public_key(&self) -> Result<PublicKey, OracleError> {
        self.current().public_key().await
    }
}

/// Oracle that refuses to sign.
struct DenyingOracle(LocalKeyOracle);

#[async_trait]
impl SigningOracle for DenyingOracle {
    async fn sign_digest(&self, _digest: B256) -> Result<RawSignature, OracleError> {
        Err(OracleError::Rejected("key policy denies kms:Sign".into()))
    }

    async fn public_key(&self) -> Result<PublicKey, OracleError> {
        self.0.public_key().await
    }
}

// ── Round trips ──────────────────────────────────────────────────────

#[tokio::test]
async fn message_signature_recovers_to_account() {
    for high_s in [false, true] {
        let account = KmsAccount::new(local(SEED).with_high_s(high_s));
        let message = SignableMessage::text("hello");

        let signature = account.sign_message(&message).await.unwrap();
        assert_low_s(&signature);
        let digest = message.signing_digest().unwrap();
        assert_eq!(signature.recover_address(&digest).unwrap(), SEED_ADDRESS);
    }
}

#[tokio::test]
async fn raw_message_signature_recovers_to_account() {
    let account = KmsAccount::new(local(SEED));
    let message = SignableMessage::raw(vec![0x00, 0xff, 0x10]);
    let signature = account.sign_message(&message).await.unwrap();
    let digest = message.signing_digest().unwrap();
    assert_eq!(signature.recover_address(&digest).unwrap(), SEED_ADDRESS);
}

#[tokio::test]
async fn typed_data_vector_signature_recovers_to_account() {
    let account = KmsAccount::new(local(SEED).with_high_s(true));
    let typed_data = person_typed_data();

    let digest = typed_data.signing_digest().unwrap();
    assert_eq!(
        digest,
        b256!("798fc79c97ce1df786c35accc8d0c2866f9151208ba4e5b24566dad890259eff")
    );

    let signature = account.sign_typed_data(&typed_data).await.unwrap();
    assert_low_s(&signature);
    assert_eq!(signature.recover_address(&digest).unwrap(), SEED_ADDRESS);
}

#[tokio::test]
async fn transaction_signature_recovers_account_public_key() {
    let account = KmsAccount::new(local(SEED));
    let tx = fee_market_tx();

    let signature = account.sign_transaction(&tx).await.unwrap();
    assert_low_s(&signature);

    let digest = tx.signing_digest().unwrap();
    let recovered = signature.recover_public_key(&digest).unwrap();
    assert_eq!(recovered, account.public_key().await.unwrap());
}

#[tokio::test]
async fn signed_envelope_carries_signature() {
    let account = KmsAccount::new(local(SEED));
    let tx = fee_market_tx();
    let signature = account.sign_transaction(&tx).await.unwrap();

    let signed = encode_signed(&tx, &signature).unwrap();
    assert_eq!(signed[0], 0x02);
    // RLP drops leading zero bytes of the scalar
    let s: Vec<u8> = signature.s().iter().copied().skip_while(|b| *b == 0).collect();
    assert!(signed.ends_with(&s));
}

#[tokio::test]
async fn signatures_are_uniform_across_payload_kinds() {
    let account = KmsAccount::new(local(SEED).with_high_s(true));
    let signatures = [
        account.sign_message(&SignableMessage::text("hello")).await.unwrap(),
        account.sign_typed_data(&person_typed_data()).await.unwrap(),
        account.sign_transaction(&fee_market_tx()).await.unwrap(),
    ];
    for signature in signatures {
        let hex = signature.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 132);
        assert!(hex.ends_with("1b") || hex.ends_with("1c"));
        assert_eq!(hex, hex.to_lowercase());
    }
}

// ── Address caching ──────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_first_callers_share_one_fetch() {
    let oracle = Arc::new(CountingOracle::new(local(SEED)));
    let account = KmsAccount::new(oracle.clone());

    let addresses = join_all((0..16).map(|_| account.address())).await;
    for address in addresses {
        assert_eq!(address.unwrap(), SEED_ADDRESS);
    }
    account.sign_message(&SignableMessage::text("cached")).await.unwrap();
    assert_eq!(oracle.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_fetch_is_not_cached() {
    let oracle = Arc::new(CountingOracle::new(local(SEED)));
    oracle.fail_next.store(true, Ordering::SeqCst);
    let account = KmsAccount::new(oracle.clone());

    let err = account.address().await.unwrap_err();
    assert!(matches!(err, AccountError::OracleUnavailable(_)));
    assert!(err.is_retryable());

    assert_eq!(account.address().await.unwrap(), SEED_ADDRESS);
    assert_eq!(oracle.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn swapped_key_fails_recovery() {
    let oracle = Arc::new(SwappableOracle {
        current: Mutex::new(Arc::new(local(SEED))),
    });
    let account = KmsAccount::new(oracle.clone());
    assert_eq!(account.address().await.unwrap(), SEED_ADDRESS);

    oracle.swap(local("other-key"));
    let err = account
        .sign_message(&SignableMessage::text("hello"))
        .await
        .unwrap_err();
    match err {
        AccountError::RecoveryFailed { expected } => assert_eq!(expected, SEED_ADDRESS),
        other => panic!("expected RecoveryFailed, got {other:?}"),
    }
}

// ── Failure surface ──────────────────────────────────────────────────

#[tokio::test]
async fn oracle_rejection_surfaces_unchanged() {
    let account = KmsAccount::new(DenyingOracle(local(SEED)));
    let err = account
        .sign_message(&SignableMessage::text("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::OracleRejected(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn invalid_typed_data_is_rejected() {
    let account = KmsAccount::new(local(SEED));
    let mut typed_data = person_typed_data();
    typed_data.primary_type = "Mail".into();
    let err = account.sign_typed_data(&typed_data).await.unwrap_err();
    assert!(matches!(err, AccountError::InvalidInput(_)));
}

#[tokio::test]
async fn wallet_surface_is_signing_only() {
    let account: Box<dyn EthAccount> = Box::new(KmsAccount::new(local(SEED)));
    assert_eq!(account.address().await.unwrap(), SEED_ADDRESS);

    let tx = fee_market_tx();
    assert!(account.sign_transaction(&tx).await.is_ok());
    assert!(matches!(
        account.send_transaction(&tx).await,
        Err(AccountError::NotImplemented(_))
    ));
    assert!(matches!(
        account.estimate_gas(&tx).await,
        Err(AccountError::NotImplemented(_))
    ));
}
