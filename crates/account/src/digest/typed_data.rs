use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use alloy_primitives::{Address, B256, U256, keccak256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SigningPayload;
use crate::error::{AccountError, AccountResult};

const DOMAIN_TYPE: &str = "EIP712Domain";

/// Struct/array nesting accepted while encoding a value.
const MAX_DEPTH: usize = 64;

/// Struct name → ordered member list, as in `eth_signTypedData_v4`.
pub type Types = BTreeMap<String, Vec<TypedDataField>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedDataField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl TypedDataField {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataDomain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(
        default,
        deserialize_with = "super::quantity::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_contract: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<B256>,
}

impl TypedDataDomain {
    /// `EIP712Domain` members implied by the fields that are set, in the
    /// canonical order.
    fn implied_fields(&self) -> Vec<TypedDataField> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push(TypedDataField::new("name", "string"));
        }
        if self.version.is_some() {
            fields.push(TypedDataField::new("version", "string"));
        }
        if self.chain_id.is_some() {
            fields.push(TypedDataField::new("chainId", "uint256"));
        }
        if self.verifying_contract.is_some() {
            fields.push(TypedDataField::new("verifyingContract", "address"));
        }
        if self.salt.is_some() {
            fields.push(TypedDataField::new("salt", "bytes32"));
        }
        fields
    }

    fn to_value(&self) -> Value {
        let mut object = Map::new();
        if let Some(name) = &self.name {
            object.insert("name".into(), Value::from(name.as_str()));
        }
        if let Some(version) = &self.version {
            object.insert("version".into(), Value::from(version.as_str()));
        }
        if let Some(chain_id) = self.chain_id {
            object.insert("chainId".into(), Value::from(chain_id));
        }
        if let Some(contract) = &self.verifying_contract {
            object.insert(
                "verifyingContract".into(),
                Value::from(format!("0x{}", hex::encode(contract))),
            );
        }
        if let Some(salt) = &self.salt {
            object.insert("salt".into(), Value::from(format!("0x{}", hex::encode(salt))));
        }
        Value::Object(object)
    }
}

/// A complete `eth_signTypedData_v4` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    #[serde(default)]
    pub domain: TypedDataDomain,
    pub types: Types,
    pub primary_type: String,
    #[serde(default)]
    pub message: Value,
}

impl TypedData {
    pub fn new(
        domain: TypedDataDomain,
        types: Types,
        primary_type: impl Into<String>,
        message: Value,
    ) -> Self {
        Self {
            domain,
            types,
            primary_type: primary_type.into(),
            message,
        }
    }
}

impl SigningPayload for TypedData {
    fn signing_digest(&self) -> AccountResult<B256> {
        typed_data_digest(self)
    }

    fn kind(&self) -> &'static str {
        "typed-data"
    }
}

/// `keccak256(0x1901 ‖ domainSeparator ‖ hashStruct(primaryType, message))`.
///
/// With `primaryType == "EIP712Domain"` the struct hash is omitted.
pub fn typed_data_digest(typed_data: &TypedData) -> AccountResult<B256> {
    let set = TypeSet::new(&typed_data.types, Some(&typed_data.domain));
    let separator = set.hash_struct(DOMAIN_TYPE, &typed_data.domain.to_value(), 0)?;

    let mut preimage = Vec::with_capacity(2 + 32 + 32);
    preimage.extend_from_slice(&[0x19, 0x01]);
    preimage.extend_from_slice(separator.as_slice());

    if typed_data.primary_type != DOMAIN_TYPE {
        if set.get(&typed_data.primary_type).is_none() {
            return Err(AccountError::invalid_input(format!(
                "primary type `{}` is not defined",
                typed_data.primary_type
            )));
        }
        let struct_hash = set.hash_struct(&typed_data.primary_type, &typed_data.message, 0)?;
        preimage.extend_from_slice(struct_hash.as_slice());
    }

    Ok(keccak256(&preimage))
}

/// `hashStruct(EIP712Domain, domain)`. A caller-supplied `EIP712Domain` in
/// `types` takes precedence over the one implied by the set fields.
pub fn domain_separator(domain: &TypedDataDomain, types: &Types) -> AccountResult<B256> {
    TypeSet::new(types, Some(domain)).hash_struct(DOMAIN_TYPE, &domain.to_value(), 0)
}

/// `Primary(type name,…)Dep1(…)Dep2(…)` with dependencies sorted by name.
pub fn encode_type(primary: &str, types: &Types) -> AccountResult<String> {
    TypeSet::new(types, None).encode_type(primary)
}

pub fn type_hash(primary: &str, types: &Types) -> AccountResult<B256> {
    TypeSet::new(types, None).type_hash(primary)
}

pub fn hash_struct(primary: &str, value: &Value, types: &Types) -> AccountResult<B256> {
    TypeSet::new(types, None).hash_struct(primary, value, 0)
}

struct TypeSet<'a> {
    types: &'a Types,
    implied_domain: Vec<TypedDataField>,
}

impl<'a> TypeSet<'a> {
    fn new(types: &'a Types, domain: Option<&TypedDataDomain>) -> Self {
        Self {
            types,
            implied_domain: domain.map(TypedDataDomain::implied_fields).unwrap_or_default(),
        }
    }

    fn get(&self, name: &str) -> Option<&[TypedDataField]> {
        match self.types.get(name) {
            Some(fields) => Some(fields.as_slice()),
            None if name == DOMAIN_TYPE => Some(self.implied_domain.as_slice()),
            None => None,
        }
    }

    /// Every struct reachable from `primary`, primary first, the rest sorted.
    ///
    /// Walks the type graph with an explicit worklist so self-referencing and
    /// mutually recursive types terminate without growing the stack.
    fn dependencies<'s>(&'s self, primary: &'s str) -> AccountResult<Vec<&'s str>> {
        let mut seen = BTreeSet::new();
        let mut work = vec![primary];

        while let Some(name) = work.pop() {
            if !seen.insert(name) {
                continue;
            }
            let fields = self.get(name).ok_or_else(|| {
                AccountError::invalid_input(format!("type `{name}` is not defined"))
            })?;
            for field in fields {
                let base = base_type(&field.ty);
                if is_atomic(base) {
                    continue;
                }
                if self.get(base).is_none() {
                    return Err(AccountError::invalid_input(format!(
                        "type `{base}` used by `{name}.{}` is not defined",
                        field.name
                    )));
                }
                if !seen.contains(base) {
                    work.push(base);
                }
            }
        }

        seen.remove(primary);
        let mut ordered = Vec::with_capacity(seen.len() + 1);
        ordered.push(primary);
        ordered.extend(seen);
        Ok(ordered)
    }

    fn encode_type(&self, primary: &str) -> AccountResult<String> {
        let mut encoded = String::new();
        for name in self.dependencies(primary)? {
            let members = self
                .get(name)
                .unwrap_or_default()
                .iter()
                .map(|field| format!("{} {}", field.ty, field.name))
                .collect::<Vec<_>>()
                .join(",");
            encoded.push_str(name);
            encoded.push('(');
            encoded.push_str(&members);
            encoded.push(')');
        }
        Ok(encoded)
    }

    fn type_hash(&self, primary: &str) -> AccountResult<B256> {
        Ok(keccak256(self.encode_type(primary)?.as_bytes()))
    }

    fn hash_struct(&self, name: &str, value: &Value, depth: usize) -> AccountResult<B256> {
        Ok(keccak256(self.encode_data(name, value, depth)?))
    }

    fn encode_data(&self, name: &str, value: &Value, depth: usize) -> AccountResult<Vec<u8>> {
        let fields = self
            .get(name)
            .ok_or_else(|| AccountError::invalid_input(format!("type `{name}` is not defined")))?;
        let object = value.as_object().ok_or_else(|| {
            AccountError::invalid_input(format!("value of `{name}` must be an object"))
        })?;

        let mut encoded = Vec::with_capacity(32 * (fields.len() + 1));
        encoded.extend_from_slice(self.type_hash(name)?.as_slice());
        for field in fields {
            let member = object.get(&field.name).ok_or_else(|| {
                AccountError::invalid_input(format!("missing value for `{name}.{}`", field.name))
            })?;
            let word = self
                .encode_field(&field.ty, member, depth + 1)
                .map_err(|e| match e {
                    AccountError::InvalidInput(message) => AccountError::InvalidInput(format!(
                        "`{name}.{}`: {message}",
                        field.name
                    )),
                    other => other,
                })?;
            encoded.extend_from_slice(word.as_slice());
        }
        Ok(encoded)
    }

    fn encode_field(&self, ty: &str, value: &Value, depth: usize) -> AccountResult<B256> {
        if depth > MAX_DEPTH {
            return Err(AccountError::invalid_input(format!(
                "value nests deeper than {MAX_DEPTH} levels"
            )));
        }

        if let Some((inner, length)) = split_array(ty)? {
            let items = value
                .as_array()
                .ok_or_else(|| AccountError::invalid_input(format!("expected array for `{ty}`")))?;
            if let Some(length) = length {
                if items.len() != length {
                    return Err(AccountError::invalid_input(format!(
                        "`{ty}` expects {length} elements (got {})",
                        items.len()
                    )));
                }
            }
            let mut encoded = Vec::with_capacity(32 * items.len());
            for item in items {
                encoded.extend_from_slice(self.encode_field(inner, item, depth + 1)?.as_slice());
            }
            return Ok(keccak256(&encoded));
        }

        if self.types.contains_key(ty) || ty == DOMAIN_TYPE {
            return self.hash_struct(ty, value, depth);
        }

        encode_atomic(ty, value)
    }
}

/// Strips every array suffix: `Person[2][]` → `Person`.
fn base_type(ty: &str) -> &str {
    ty.split('[').next().unwrap_or(ty)
}

/// `T[n]` → `(T, Some(n))`, `T[]` → `(T, None)`, non-arrays → `None`.
fn split_array(ty: &str) -> AccountResult<Option<(&str, Option<usize>)>> {
    let Some(without_close) = ty.strip_suffix(']') else {
        return Ok(None);
    };
    let open = without_close
        .rfind('[')
        .ok_or_else(|| AccountError::invalid_input(format!("malformed array type `{ty}`")))?;
    let inner = &without_close[..open];
    let size = &without_close[open + 1..];
    if size.is_empty() {
        return Ok(Some((inner, None)));
    }
    let size = size
        .parse::<usize>()
        .map_err(|_| AccountError::invalid_input(format!("malformed array length in `{ty}`")))?;
    Ok(Some((inner, Some(size))))
}

fn integer_bits(suffix: &str) -> Option<usize> {
    suffix
        .parse::<usize>()
        .ok()
        .filter(|bits| *bits % 8 == 0 && (8..=256).contains(bits))
}

fn fixed_bytes_len(suffix: &str) -> Option<usize> {
    suffix.parse::<usize>().ok().filter(|len| (1..=32).contains(len))
}

fn is_atomic(ty: &str) -> bool {
    if matches!(ty, "address" | "bool" | "string" | "bytes") {
        return true;
    }
    if let Some(suffix) = ty.strip_prefix("bytes") {
        return fixed_bytes_len(suffix).is_some();
    }
    ty.strip_prefix("uint")
        .or_else(|| ty.strip_prefix("int"))
        .and_then(integer_bits)
        .is_some()
}

fn mismatch(ty: &str, value: &Value) -> AccountError {
    AccountError::invalid_input(format!("value {value} does not fit type `{ty}`"))
}

fn parse_hex(ty: &str, value: &Value) -> AccountResult<Vec<u8>> {
    let text = value.as_str().ok_or_else(|| mismatch(ty, value))?;
    hex::decode(text.strip_prefix("0x").unwrap_or(text)).map_err(|_| mismatch(ty, value))
}

/// `(is_negative, magnitude)` from a JSON number, decimal string or hex string.
fn parse_integer(ty: &str, value: &Value) -> AccountResult<(bool, U256)> {
    match value {
        Value::Number(number) => {
            if let Some(unsigned) = number.as_u64() {
                Ok((false, U256::from(unsigned)))
            } else if let Some(signed) = number.as_i64() {
                Ok((signed < 0, U256::from(signed.unsigned_abs())))
            } else {
                Err(mismatch(ty, value))
            }
        }
        Value::String(text) => {
            let text = text.trim();
            let (negative, digits) = match text.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, text),
            };
            let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
                Some(hex_digits) if !hex_digits.is_empty() => U256::from_str_radix(hex_digits, 16),
                None if !digits.is_empty() => U256::from_str_radix(digits, 10),
                _ => return Err(mismatch(ty, value)),
            };
            let magnitude = parsed.map_err(|_| mismatch(ty, value))?;
            Ok((negative && !magnitude.is_zero(), magnitude))
        }
        _ => Err(mismatch(ty, value)),
    }
}

fn encode_atomic(ty: &str, value: &Value) -> AccountResult<B256> {
    match ty {
        "address" => {
            let text = value.as_str().ok_or_else(|| mismatch(ty, value))?;
            let address = Address::from_str(text).map_err(|_| mismatch(ty, value))?;
            Ok(address.into_word())
        }
        "bool" => {
            let flag = value.as_bool().ok_or_else(|| mismatch(ty, value))?;
            Ok(B256::with_last_byte(u8::from(flag)))
        }
        "string" => {
            let text = value.as_str().ok_or_else(|| mismatch(ty, value))?;
            Ok(keccak256(text.as_bytes()))
        }
        "bytes" => Ok(keccak256(parse_hex(ty, value)?)),
        _ => {
            if let Some(len) = ty.strip_prefix("bytes").and_then(fixed_bytes_len) {
                let bytes = parse_hex(ty, value)?;
                if bytes.len() != len {
                    return Err(mismatch(ty, value));
                }
                let mut word = B256::ZERO;
                word[..len].copy_from_slice(&bytes);
                return Ok(word);
            }
            if let Some(bits) = ty.strip_prefix("uint").and_then(integer_bits) {
                let (negative, magnitude) = parse_integer(ty, value)?;
                if negative || magnitude.bit_len() > bits {
                    return Err(mismatch(ty, value));
                }
                return Ok(B256::from(magnitude.to_be_bytes::<32>()));
            }
            if let Some(bits) = ty.strip_prefix("int").and_then(integer_bits) {
                let (negative, magnitude) = parse_integer(ty, value)?;
                let limit = U256::from(1u8) << (bits - 1);
                let fits = if negative { magnitude <= limit } else { magnitude < limit };
                if !fits {
                    return Err(mismatch(ty, value));
                }
                let twos = if negative { magnitude.wrapping_neg() } else { magnitude };
                return Ok(B256::from(twos.to_be_bytes::<32>()));
            }
            Err(AccountError::invalid_input(format!("unknown type `{ty}`")))
        }
    }
}
