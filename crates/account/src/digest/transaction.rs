use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_rlp::{BufMut, EMPTY_STRING_CODE, Encodable, Header};
use serde::{Deserialize, Serialize};

use super::SigningPayload;
use crate::error::{AccountError, AccountResult};
use crate::signature::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    #[serde(alias = "0x0")]
    Legacy,
    #[serde(alias = "0x1")]
    Eip2930,
    #[serde(alias = "0x2")]
    Eip1559,
}

impl TxType {
    /// EIP-2718 type byte. Legacy transactions carry none.
    pub fn envelope_byte(self) -> Option<u8> {
        match self {
            TxType::Legacy => None,
            TxType::Eip2930 => Some(0x01),
            TxType::Eip1559 => Some(0x02),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListItem {
    pub address: Address,
    #[serde(default)]
    pub storage_keys: Vec<B256>,
}

impl AccessListItem {
    fn payload_length(&self) -> usize {
        self.address.length() + self.storage_keys.length()
    }
}

impl Encodable for AccessListItem {
    fn encode(&self, out: &mut dyn BufMut) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.address.encode(out);
        self.storage_keys.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

/// Unsigned transaction as handed over by a wallet client.
///
/// Every attribute is optional. Which ones are required depends on the
/// transaction type, see [`resolve_type`]. Quantities that can exceed 64 bits
/// are given as `0x`-hex or decimal strings; `chainId`, `nonce` and `gas`
/// also accept plain JSON numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<TxType>,
    #[serde(
        default,
        deserialize_with = "super::quantity::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_id: Option<u64>,
    #[serde(
        default,
        deserialize_with = "super::quantity::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub nonce: Option<u64>,
    #[serde(
        default,
        deserialize_with = "super::quantity::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_list: Option<Vec<AccessListItem>>,
}

impl SigningPayload for TransactionRequest {
    fn signing_digest(&self) -> AccountResult<B256> {
        transaction_digest(self)
    }

    fn kind(&self) -> &'static str {
        "transaction"
    }
}

enum Fees {
    GasPrice(U256),
    Market { max_fee: U256, max_priority: U256 },
}

struct Validated {
    ty: TxType,
    chain_id: Option<u64>,
    fees: Fees,
}

fn require<T: Copy>(value: Option<T>, field: &str, ty: TxType) -> AccountResult<T> {
    value.ok_or_else(|| {
        AccountError::invalid_input(format!("{ty:?} transaction requires `{field}`"))
    })
}

fn forbid<T>(value: &Option<T>, field: &str, ty: TxType) -> AccountResult<()> {
    match value {
        Some(_) => Err(AccountError::invalid_input(format!(
            "`{field}` is not valid on a {ty:?} transaction"
        ))),
        None => Ok(()),
    }
}

fn infer_type(tx: &TransactionRequest) -> AccountResult<TxType> {
    if let Some(ty) = tx.tx_type {
        return Ok(ty);
    }
    if tx.max_fee_per_gas.is_some() || tx.max_priority_fee_per_gas.is_some() {
        return Ok(TxType::Eip1559);
    }
    match (&tx.gas_price, &tx.access_list) {
        (Some(_), Some(_)) => Ok(TxType::Eip2930),
        (Some(_), None) => Ok(TxType::Legacy),
        (None, _) => Err(AccountError::invalid_input(
            "cannot infer transaction type: set `type`, `gasPrice` or `maxFeePerGas`",
        )),
    }
}

fn validate(tx: &TransactionRequest) -> AccountResult<Validated> {
    let ty = infer_type(tx)?;

    if tx.chain_id == Some(0) {
        return Err(AccountError::invalid_input("`chainId` must be positive"));
    }

    let (chain_id, fees) = match ty {
        TxType::Legacy => {
            forbid(&tx.max_fee_per_gas, "maxFeePerGas", ty)?;
            forbid(&tx.max_priority_fee_per_gas, "maxPriorityFeePerGas", ty)?;
            if tx.access_list.as_ref().is_some_and(|list| !list.is_empty()) {
                return Err(AccountError::invalid_input(
                    "`accessList` is not valid on a Legacy transaction",
                ));
            }
            (tx.chain_id, Fees::GasPrice(require(tx.gas_price, "gasPrice", ty)?))
        }
        TxType::Eip2930 => {
            forbid(&tx.max_fee_per_gas, "maxFeePerGas", ty)?;
            forbid(&tx.max_priority_fee_per_gas, "maxPriorityFeePerGas", ty)?;
            (
                Some(require(tx.chain_id, "chainId", ty)?),
                Fees::GasPrice(require(tx.gas_price, "gasPrice", ty)?),
            )
        }
        TxType::Eip1559 => {
            forbid(&tx.gas_price, "gasPrice", ty)?;
            let max_fee = require(tx.max_fee_per_gas, "maxFeePerGas", ty)?;
            let max_priority = require(tx.max_priority_fee_per_gas, "maxPriorityFeePerGas", ty)?;
            if max_priority > max_fee {
                return Err(AccountError::invalid_input(format!(
                    "maxPriorityFeePerGas ({max_priority}) exceeds maxFeePerGas ({max_fee})"
                )));
            }
            (
                Some(require(tx.chain_id, "chainId", ty)?),
                Fees::Market {
                    max_fee,
                    max_priority,
                },
            )
        }
    };

    Ok(Validated { ty, chain_id, fees })
}

/// Determines the transaction type and checks that the attributes fit it.
///
/// An explicit `type` wins. Otherwise fee-market fields imply `eip1559`,
/// `gasPrice` plus `accessList` implies `eip2930` and `gasPrice` alone implies
/// `legacy`.
pub fn resolve_type(tx: &TransactionRequest) -> AccountResult<TxType> {
    validate(tx).map(|validated| validated.ty)
}

/// The bytes whose keccak256 is signed.
pub fn encode_for_signing(tx: &TransactionRequest) -> AccountResult<Vec<u8>> {
    let validated = validate(tx)?;
    Ok(encode(tx, &validated, None))
}

/// The broadcastable envelope carrying `signature`.
pub fn encode_signed(tx: &TransactionRequest, signature: &Signature) -> AccountResult<Vec<u8>> {
    let validated = validate(tx)?;
    Ok(encode(tx, &validated, Some(signature)))
}

pub fn transaction_digest(tx: &TransactionRequest) -> AccountResult<B256> {
    Ok(keccak256(encode_for_signing(tx)?))
}

fn encode(tx: &TransactionRequest, validated: &Validated, signature: Option<&Signature>) -> Vec<u8> {
    let mut payload = Vec::new();
    let out = &mut payload;

    match (validated.ty, &validated.fees) {
        (TxType::Legacy, Fees::GasPrice(gas_price)) => {
            tx.nonce.unwrap_or_default().encode(out);
            gas_price.encode(out);
            encode_call(tx, out);
            match (signature, validated.chain_id) {
                (None, Some(chain_id)) => {
                    chain_id.encode(out);
                    0u8.encode(out);
                    0u8.encode(out);
                }
                (None, None) => {}
                (Some(signature), chain_id) => {
                    let parity = u64::from(signature.y_parity());
                    let v = match chain_id {
                        Some(chain_id) => {
                            U256::from(chain_id) * U256::from(2u8) + U256::from(35 + parity)
                        }
                        None => U256::from(27 + parity),
                    };
                    v.encode(out);
                    encode_scalars(signature, out);
                }
            }
        }
        (_, fees) => {
            validated.chain_id.unwrap_or_default().encode(out);
            tx.nonce.unwrap_or_default().encode(out);
            match fees {
                Fees::GasPrice(gas_price) => gas_price.encode(out),
                Fees::Market {
                    max_fee,
                    max_priority,
                } => {
                    max_priority.encode(out);
                    max_fee.encode(out);
                }
            }
            encode_call(tx, out);
            tx.access_list.clone().unwrap_or_default().encode(out);
            if let Some(signature) = signature {
                u8::from(signature.y_parity()).encode(out);
                encode_scalars(signature, out);
            }
        }
    }

    let mut encoded = Vec::with_capacity(payload.len() + 4);
    if let Some(byte) = validated.ty.envelope_byte() {
        encoded.push(byte);
    }
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut encoded);
    encoded.extend_from_slice(&payload);
    encoded
}

/// `gas, to, value, data`, shared by every transaction type.
fn encode_call(tx: &TransactionRequest, out: &mut Vec<u8>) {
    tx.gas.unwrap_or_default().encode(out);
    match &tx.to {
        Some(to) => to.encode(out),
        None => out.push(EMPTY_STRING_CODE),
    }
    tx.value.unwrap_or_default().encode(out);
    tx.data.clone().unwrap_or_default().encode(out);
}

fn encode_scalars(signature: &Signature, out: &mut Vec<u8>) {
    U256::from_be_bytes(signature.r().0).encode(out);
    U256::from_be_bytes(signature.s().0).encode(out);
}
