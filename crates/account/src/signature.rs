use std::fmt;

use alloy_primitives::{Address, B256, U256, uint};
use k256::FieldBytes;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use tracing::warn;

use crate::error::{AccountError, AccountResult};
use crate::key::PublicKey;
use crate::oracle::OracleError;

/// Order of the secp256k1 group.
pub const SECP256K1_ORDER: U256 =
    uint!(0xfffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141_U256);

/// Largest `s` accepted by EIP-2 validators.
pub const SECP256K1_HALF_ORDER: U256 =
    uint!(0x7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0_U256);

/// `(r, s)` exactly as the oracle produced it. `s` may sit in the upper half
/// of the curve order and there is no recovery id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignature(EcdsaSignature);

impl RawSignature {
    /// Parses the ASN.1 `SEQUENCE { r INTEGER, s INTEGER }` that KMS services emit.
    pub fn from_der(der: &[u8]) -> Result<Self, OracleError> {
        EcdsaSignature::from_der(der)
            .map(Self)
            .map_err(|e| OracleError::MalformedResponse(format!("invalid DER signature: {e}")))
    }

    pub fn from_scalars(r: B256, s: B256) -> Result<Self, OracleError> {
        EcdsaSignature::from_scalars(
            FieldBytes::clone_from_slice(r.as_slice()),
            FieldBytes::clone_from_slice(s.as_slice()),
        )
        .map(Self)
        .map_err(|e| OracleError::MalformedResponse(format!("invalid signature scalars: {e}")))
    }

    pub fn r(&self) -> B256 {
        let (r, _) = self.0.split_bytes();
        B256::from_slice(&r)
    }

    pub fn s(&self) -> B256 {
        let (_, s) = self.0.split_bytes();
        B256::from_slice(&s)
    }

    pub fn is_low_s(&self) -> bool {
        U256::from_be_bytes(self.s().0) <= SECP256K1_HALF_ORDER
    }
}

/// Canonical low-s transform: `(r, s) -> (r, n - s)` when `s > n/2`.
///
/// Negating `s` reflects the nonce point, so the recovery id of the
/// normalized signature is the opposite parity of the original one.
/// [`attach_recovery_id`] always searches after normalizing, so callers
/// never carry a parity across this step.
pub fn normalize(raw: RawSignature) -> RawSignature {
    match raw.0.normalize_s() {
        Some(low) => RawSignature(low),
        None => raw,
    }
}

/// Finds the recovery id under which `raw` recovers to `expected` over
/// `digest`.
///
/// Both candidates are tried. If neither matches, the oracle signed with a
/// key other than the one the address was derived from and the signature
/// must not be handed out.
pub fn attach_recovery_id(
    digest: &B256,
    raw: &RawSignature,
    expected: Address,
) -> AccountResult<Signature> {
    let normalized = normalize(raw.clone());

    for y_parity in [false, true] {
        let recovery_id = RecoveryId::new(y_parity, false);
        let Ok(key) =
            VerifyingKey::recover_from_prehash(digest.as_slice(), &normalized.0, recovery_id)
        else {
            continue;
        };
        if PublicKey::from(key).address() == expected {
            return Ok(Signature::new(normalized.r(), normalized.s(), y_parity));
        }
    }

    warn!(%expected, %digest, "oracle signature recovers to neither candidate address");
    Err(AccountError::RecoveryFailed { expected })
}

/// Recoverable secp256k1 signature in Ethereum's `r ‖ s ‖ v` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    r: B256,
    s: B256,
    y_parity: bool,
}

impl Signature {
    pub const BYTES: usize = 65;

    pub fn new(r: B256, s: B256, y_parity: bool) -> Self {
        Self { r, s, y_parity }
    }

    pub fn r(&self) -> B256 {
        self.r
    }

    pub fn s(&self) -> B256 {
        self.s
    }

    pub fn y_parity(&self) -> bool {
        self.y_parity
    }

    /// Recovery id in the `{27, 28}` convention.
    pub fn v(&self) -> u8 {
        27 + u8::from(self.y_parity)
    }

    pub fn as_bytes(&self) -> [u8; Self::BYTES] {
        let mut out = [0u8; Self::BYTES];
        out[..32].copy_from_slice(self.r.as_slice());
        out[32..64].copy_from_slice(self.s.as_slice());
        out[64] = self.v();
        out
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.as_bytes()))
    }

    /// Accepts `v` as either `{0, 1}` or `{27, 28}`.
    pub fn from_bytes(bytes: &[u8]) -> AccountResult<Self> {
        if bytes.len() != Self::BYTES {
            return Err(AccountError::invalid_input(format!(
                "signature must be {} bytes (got {})",
                Self::BYTES,
                bytes.len()
            )));
        }
        let y_parity = match bytes[64] {
            0 | 27 => false,
            1 | 28 => true,
            v => {
                return Err(AccountError::invalid_input(format!(
                    "unsupported recovery id {v}"
                )));
            }
        };
        Ok(Self::new(
            B256::from_slice(&bytes[..32]),
            B256::from_slice(&bytes[32..64]),
            y_parity,
        ))
    }

    /// `ecrecover` returning the full public key.
    pub fn recover_public_key(&self, digest: &B256) -> AccountResult<PublicKey> {
        let signature = EcdsaSignature::from_scalars(
            FieldBytes::clone_from_slice(self.r.as_slice()),
            FieldBytes::clone_from_slice(self.s.as_slice()),
        )
        .map_err(|e| AccountError::invalid_input(format!("invalid signature scalars: {e}")))?;
        let recovery_id = RecoveryId::new(self.y_parity, false);
        VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
            .map(PublicKey::from)
            .map_err(|e| AccountError::invalid_input(format!("signature is not recoverable: {e}")))
    }

    /// `ecrecover`
    pub fn recover_address(&self, digest: &B256) -> AccountResult<Address> {
        self.recover_public_key(digest).map(|key| key.address())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
