//! Contract ABI handling: JSON descriptors, call-data encoding and return-data
//! decoding.
//!
//! Supports the subset of the Solidity ABI that contract storage interfaces
//! use in practice: unsigned integers, addresses, booleans, strings, dynamic
//! bytes, dynamic arrays and tuples. Everything here is pure and operates on
//! byte slices only.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{B256, U256};
use serde::Deserialize;
use sha3::{Digest, Keccak256};

use crate::address::{normalize, ChainAddress};
use crate::error::EthError;

/// Selector of the standard `Error(string)` revert payload.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Selector of the standard `Panic(uint256)` revert payload.
pub const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

const WORD: usize = 32;

/// A parameter type as declared in a contract ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
    /// `uint<N>`, N in bits (8..=256, multiple of 8).
    Uint(usize),
    Address,
    Bool,
    String,
    Bytes,
    /// Dynamic array `T[]`.
    Array(Box<AbiType>),
    Tuple(Vec<AbiType>),
}

impl AbiType {
    /// Canonical type string used in function signatures.
    pub fn canonical(&self) -> String {
        match self {
            AbiType::Uint(bits) => format!("uint{bits}"),
            AbiType::Address => "address".into(),
            AbiType::Bool => "bool".into(),
            AbiType::String => "string".into(),
            AbiType::Bytes => "bytes".into(),
            AbiType::Array(inner) => format!("{}[]", inner.canonical()),
            AbiType::Tuple(components) => {
                let inner: Vec<String> = components.iter().map(AbiType::canonical).collect();
                format!("({})", inner.join(","))
            }
        }
    }

    /// Dynamic types are encoded out-of-line behind an offset word.
    pub fn is_dynamic(&self) -> bool {
        match self {
            AbiType::String | AbiType::Bytes | AbiType::Array(_) => true,
            AbiType::Tuple(components) => components.iter().any(AbiType::is_dynamic),
            _ => false,
        }
    }

    /// Size of the in-place (head) encoding.
    fn head_size(&self) -> usize {
        match self {
            AbiType::Tuple(components) if !self.is_dynamic() => {
                components.iter().map(AbiType::head_size).sum()
            }
            _ => WORD,
        }
    }

    fn parse_with_components(ty: &str, components: &[RawParam]) -> Result<Self, EthError> {
        if let Some(inner) = ty.strip_suffix("[]") {
            let inner = Self::parse_with_components(inner, components)?;
            return Ok(AbiType::Array(Box::new(inner)));
        }

        if ty == "tuple" {
            let parsed = components
                .iter()
                .map(|c| Self::parse_with_components(&c.ty, &c.components))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(AbiType::Tuple(parsed));
        }

        ty.parse()
    }
}

impl FromStr for AbiType {
    type Err = EthError;

    fn from_str(ty: &str) -> Result<Self, Self::Err> {
        if let Some(inner) = ty.strip_suffix("[]") {
            return Ok(AbiType::Array(Box::new(inner.parse()?)));
        }

        match ty {
            "address" => Ok(AbiType::Address),
            "bool" => Ok(AbiType::Bool),
            "string" => Ok(AbiType::String),
            "bytes" => Ok(AbiType::Bytes),
            "uint" => Ok(AbiType::Uint(256)),
            _ => {
                let bits = ty
                    .strip_prefix("uint")
                    .and_then(|b| b.parse::<usize>().ok())
                    .filter(|b| *b >= 8 && *b <= 256 && b % 8 == 0)
                    .ok_or_else(|| EthError::AbiDescriptor(format!("unsupported type {ty}")))?;
                Ok(AbiType::Uint(bits))
            }
        }
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// A typed ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint(U256),
    Address(ChainAddress),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<AbiValue>),
    Tuple(Vec<AbiValue>),
}

impl AbiValue {
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            AbiValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a `u64`, if it is a uint that fits.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_uint().and_then(|v| u256_to_u64(&v))
    }

    pub fn as_address(&self) -> Option<ChainAddress> {
        match self {
            AbiValue::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            AbiValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<AbiValue>> {
        match self {
            AbiValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<u64> for AbiValue {
    fn from(v: u64) -> Self {
        AbiValue::Uint(U256::from(v))
    }
}

impl From<&str> for AbiValue {
    fn from(s: &str) -> Self {
        AbiValue::String(s.to_string())
    }
}

impl From<String> for AbiValue {
    fn from(s: String) -> Self {
        AbiValue::String(s)
    }
}

impl From<ChainAddress> for AbiValue {
    fn from(a: ChainAddress) -> Self {
        AbiValue::Address(a)
    }
}

/// A named, typed function or event parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiParam {
    pub name: String,
    pub ty: AbiType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiFunction {
    pub name: String,
    pub inputs: Vec<AbiParam>,
    pub outputs: Vec<AbiParam>,
}

impl AbiFunction {
    /// `name(type1,type2,...)`.
    pub fn signature(&self) -> String {
        signature(&self.name, self.inputs.iter().map(|p| &p.ty))
    }

    pub fn selector(&self) -> [u8; 4] {
        function_selector(&self.signature())
    }

    pub fn input_types(&self) -> Vec<AbiType> {
        self.inputs.iter().map(|p| p.ty.clone()).collect()
    }

    pub fn output_types(&self) -> Vec<AbiType> {
        self.outputs.iter().map(|p| p.ty.clone()).collect()
    }

    /// Selector followed by the encoded arguments.
    pub fn encode_input(&self, args: &[AbiValue]) -> Result<Vec<u8>, EthError> {
        if args.len() != self.inputs.len() {
            return Err(EthError::AbiEncoding(format!(
                "{} expects {} arguments, got {}",
                self.name,
                self.inputs.len(),
                args.len()
            )));
        }

        let encoded = encode(args, &self.input_types())?;
        let mut data = Vec::with_capacity(4 + encoded.len());
        data.extend_from_slice(&self.selector());
        data.extend_from_slice(&encoded);
        Ok(data)
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<AbiValue>, EthError> {
        decode_result(data, &self.output_types())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiEventParam {
    pub name: String,
    pub ty: AbiType,
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiEvent {
    pub name: String,
    pub inputs: Vec<AbiEventParam>,
    pub anonymous: bool,
}

impl AbiEvent {
    pub fn signature(&self) -> String {
        signature(&self.name, self.inputs.iter().map(|p| &p.ty))
    }

    /// Topic 0 of a non-anonymous event: `keccak256(signature)`.
    pub fn topic(&self) -> B256 {
        B256::from_slice(&Keccak256::digest(self.signature().as_bytes()))
    }

    /// Decodes a log emitted by this event into `(name, value)` pairs in
    /// declaration order.
    ///
    /// Indexed parameters of dynamic type are only available as their
    /// Keccak-256 hash and are returned as `AbiValue::Bytes`.
    pub fn decode_log(
        &self,
        topics: &[B256],
        data: &[u8],
    ) -> Result<Vec<(String, AbiValue)>, EthError> {
        let mut topics = topics.iter();
        if !self.anonymous {
            match topics.next() {
                Some(topic0) if *topic0 == self.topic() => {}
                _ => {
                    return Err(EthError::AbiDecoding(format!(
                        "log is not a {} event",
                        self.name
                    )))
                }
            }
        }

        let data_types: Vec<AbiType> = self
            .inputs
            .iter()
            .filter(|p| !p.indexed)
            .map(|p| p.ty.clone())
            .collect();
        let mut data_values = decode_result(data, &data_types)?.into_iter();

        let mut decoded = Vec::with_capacity(self.inputs.len());
        for param in &self.inputs {
            let value = if param.indexed {
                let topic = topics.next().ok_or_else(|| {
                    EthError::AbiDecoding(format!("missing topic for {}", param.name))
                })?;
                if param.ty.is_dynamic() {
                    AbiValue::Bytes(topic.to_vec())
                } else {
                    decode_single(topic.as_slice(), 0, &param.ty)?
                }
            } else {
                data_values.next().ok_or_else(|| {
                    EthError::AbiDecoding(format!("missing data for {}", param.name))
                })?
            };
            decoded.push((param.name.clone(), value));
        }

        Ok(decoded)
    }
}

/// A parsed contract interface descriptor.
#[derive(Debug, Clone, Default)]
pub struct ContractAbi {
    pub functions: Vec<AbiFunction>,
    pub events: Vec<AbiEvent>,
    /// Deployed address, when the descriptor carries one.
    pub address: Option<ChainAddress>,
}

impl ContractAbi {
    /// Parses a Hardhat/Truffle artifact (`{"abi": [...], "address": ...}`) or
    /// a bare ABI array.
    pub fn from_json(json: &str) -> Result<Self, EthError> {
        let raw: RawDescriptor = serde_json::from_str(json)
            .map_err(|e| EthError::AbiDescriptor(format!("malformed descriptor: {e}")))?;

        let (entries, address) = match raw {
            RawDescriptor::Artifact { abi, address } => (abi, address),
            RawDescriptor::Bare(entries) => (entries, None),
        };

        let mut contract = ContractAbi {
            address: address.as_deref().map(normalize).transpose()?,
            ..Default::default()
        };

        for entry in entries {
            match entry.kind.as_str() {
                "function" => contract.functions.push(AbiFunction {
                    name: entry.name,
                    inputs: parse_params(&entry.inputs)?,
                    outputs: parse_params(&entry.outputs)?,
                }),
                "event" => contract.events.push(AbiEvent {
                    name: entry.name,
                    inputs: entry
                        .inputs
                        .iter()
                        .map(|p| {
                            Ok(AbiEventParam {
                                name: p.name.clone(),
                                ty: AbiType::parse_with_components(&p.ty, &p.components)?,
                                indexed: p.indexed,
                            })
                        })
                        .collect::<Result<Vec<_>, EthError>>()?,
                    anonymous: entry.anonymous,
                }),
                // Constructors, errors, fallback and receive carry nothing we call.
                _ => {}
            }
        }

        Ok(contract)
    }

    /// First function with the given name.
    pub fn function(&self, name: &str) -> Option<&AbiFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Function with the given name and argument count (resolves overloads).
    pub fn function_with_arity(&self, name: &str, arity: usize) -> Option<&AbiFunction> {
        self.functions
            .iter()
            .find(|f| f.name == name && f.inputs.len() == arity)
    }

    pub fn event(&self, name: &str) -> Option<&AbiEvent> {
        self.events.iter().find(|e| e.name == name)
    }
}

/// Encodes a call to `method` with positional `args` as declared in `abi`.
pub fn encode_call(method: &str, args: &[AbiValue], abi: &ContractAbi) -> Result<Vec<u8>, EthError> {
    let function = abi.function_with_arity(method, args.len()).ok_or_else(|| {
        match abi.function(method) {
            Some(f) => EthError::AbiEncoding(format!(
                "{method} expects {} arguments, got {}",
                f.inputs.len(),
                args.len()
            )),
            None => EthError::AbiEncoding(format!("unknown method {method}")),
        }
    })?;
    function.encode_input(args)
}

/// Decodes return data against the declared return types.
pub fn decode_result(data: &[u8], return_types: &[AbiType]) -> Result<Vec<AbiValue>, EthError> {
    if return_types.is_empty() {
        return Ok(Vec::new());
    }
    if data.is_empty() {
        return Err(EthError::AbiDecoding("empty return data".into()));
    }
    decode_tuple(data, 0, return_types)
}

/// Encodes `values` as the tuple `types` (no selector).
pub fn encode(values: &[AbiValue], types: &[AbiType]) -> Result<Vec<u8>, EthError> {
    encode_tuple(types, values)
}

/// `keccak256(signature)[..4]`.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

/// Extracts a human-readable reason from revert data, if it uses the standard
/// `Error(string)` or `Panic(uint256)` shapes.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (selector, body) = data.split_at(4);

    if selector == ERROR_STRING_SELECTOR {
        return decode_result(body, &[AbiType::String])
            .ok()?
            .pop()?
            .into_string();
    }

    if selector == PANIC_SELECTOR {
        let code = decode_result(body, &[AbiType::Uint(256)]).ok()?.pop()?.as_u64()?;
        return Some(format!("panic code {code:#x}"));
    }

    None
}

pub(crate) fn u256_to_u64(value: &U256) -> Option<u64> {
    let bytes = value.to_be_bytes::<32>();
    if bytes[..24].iter().any(|&b| b != 0) {
        return None;
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&bytes[24..]);
    Some(u64::from_be_bytes(low))
}

fn signature<'a>(name: &str, types: impl Iterator<Item = &'a AbiType>) -> String {
    let types: Vec<String> = types.map(AbiType::canonical).collect();
    format!("{name}({})", types.join(","))
}

fn parse_params(params: &[RawParam]) -> Result<Vec<AbiParam>, EthError> {
    params
        .iter()
        .map(|p| {
            Ok(AbiParam {
                name: p.name.clone(),
                ty: AbiType::parse_with_components(&p.ty, &p.components)?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn encode_tuple(types: &[AbiType], values: &[AbiValue]) -> Result<Vec<u8>, EthError> {
    if types.len() != values.len() {
        return Err(EthError::AbiEncoding(format!(
            "expected {} values, got {}",
            types.len(),
            values.len()
        )));
    }

    let head_size: usize = types.iter().map(AbiType::head_size).sum();
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for (ty, value) in types.iter().zip(values) {
        let encoded = encode_single(ty, value)?;
        if ty.is_dynamic() {
            head.extend_from_slice(&usize_word(head_size + tail.len()));
            tail.extend_from_slice(&encoded);
        } else {
            head.extend_from_slice(&encoded);
        }
    }

    head.extend_from_slice(&tail);
    Ok(head)
}

fn encode_single(ty: &AbiType, value: &AbiValue) -> Result<Vec<u8>, EthError> {
    match (ty, value) {
        (AbiType::Uint(bits), AbiValue::Uint(v)) => {
            if v.bit_len() > *bits {
                return Err(EthError::AbiEncoding(format!(
                    "value {v} does not fit in uint{bits}"
                )));
            }
            Ok(v.to_be_bytes::<32>().to_vec())
        }
        (AbiType::Address, AbiValue::Address(a)) => Ok(a.to_word().to_vec()),
        (AbiType::Bool, AbiValue::Bool(b)) => Ok(usize_word(*b as usize).to_vec()),
        (AbiType::String, AbiValue::String(s)) => Ok(encode_packed_bytes(s.as_bytes())),
        (AbiType::Bytes, AbiValue::Bytes(b)) => Ok(encode_packed_bytes(b)),
        (AbiType::Array(inner), AbiValue::Array(items)) => {
            let types = vec![(**inner).clone(); items.len()];
            let mut out = usize_word(items.len()).to_vec();
            out.extend_from_slice(&encode_tuple(&types, items)?);
            Ok(out)
        }
        (AbiType::Tuple(components), AbiValue::Tuple(items)) => encode_tuple(components, items),
        (ty, value) => Err(EthError::AbiEncoding(format!(
            "value {value:?} does not match type {ty}"
        ))),
    }
}

/// Length word followed by the data, right-padded to a word boundary.
fn encode_packed_bytes(data: &[u8]) -> Vec<u8> {
    let padded_len = data.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(WORD + padded_len);
    out.extend_from_slice(&usize_word(data.len()));
    out.extend_from_slice(data);
    out.resize(WORD + padded_len, 0);
    out
}

fn usize_word(value: usize) -> [u8; 32] {
    U256::from(value).to_be_bytes::<32>()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn decode_tuple(data: &[u8], base: usize, types: &[AbiType]) -> Result<Vec<AbiValue>, EthError> {
    let mut values = Vec::with_capacity(types.len());
    let mut cursor = base;

    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, cursor)?;
            let start = base
                .checked_add(offset)
                .ok_or_else(|| EthError::AbiDecoding("offset overflow".into()))?;
            values.push(decode_single(data, start, ty)?);
            cursor += WORD;
        } else {
            values.push(decode_single(data, cursor, ty)?);
            cursor += ty.head_size();
        }
    }

    Ok(values)
}

fn decode_single(data: &[u8], at: usize, ty: &AbiType) -> Result<AbiValue, EthError> {
    match ty {
        AbiType::Uint(bits) => {
            let value = U256::from_be_bytes(read_word(data, at)?);
            if value.bit_len() > *bits {
                return Err(EthError::AbiDecoding(format!(
                    "value does not fit in uint{bits}"
                )));
            }
            Ok(AbiValue::Uint(value))
        }
        AbiType::Address => Ok(AbiValue::Address(ChainAddress::from_word(&read_word(
            data, at,
        )?)?)),
        AbiType::Bool => match read_usize(data, at)? {
            0 => Ok(AbiValue::Bool(false)),
            1 => Ok(AbiValue::Bool(true)),
            other => Err(EthError::AbiDecoding(format!("invalid bool word {other}"))),
        },
        AbiType::String => {
            let bytes = read_packed_bytes(data, at)?;
            String::from_utf8(bytes)
                .map(AbiValue::String)
                .map_err(|e| EthError::AbiDecoding(format!("invalid utf-8 string: {e}")))
        }
        AbiType::Bytes => Ok(AbiValue::Bytes(read_packed_bytes(data, at)?)),
        AbiType::Array(inner) => {
            let len = read_usize(data, at)?;
            let base = at + WORD;
            // Every element occupies at least one head word.
            let available = data.len().saturating_sub(base) / WORD;
            if len > available {
                return Err(EthError::AbiDecoding(format!(
                    "array length {len} exceeds available data"
                )));
            }
            let types = vec![(**inner).clone(); len];
            Ok(AbiValue::Array(decode_tuple(data, base, &types)?))
        }
        AbiType::Tuple(components) => Ok(AbiValue::Tuple(decode_tuple(data, at, components)?)),
    }
}

fn read_word(data: &[u8], at: usize) -> Result<[u8; 32], EthError> {
    let end = at
        .checked_add(WORD)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            EthError::AbiDecoding(format!(
                "need {} bytes at offset {at}, have {}",
                WORD,
                data.len()
            ))
        })?;
    let mut word = [0u8; 32];
    word.copy_from_slice(&data[at..end]);
    Ok(word)
}

fn read_usize(data: &[u8], at: usize) -> Result<usize, EthError> {
    let value = U256::from_be_bytes(read_word(data, at)?);
    u256_to_u64(&value)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| EthError::AbiDecoding(format!("length or offset {value} too large")))
}

fn read_packed_bytes(data: &[u8], at: usize) -> Result<Vec<u8>, EthError> {
    let len = read_usize(data, at)?;
    let start = at + WORD;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| EthError::AbiDecoding(format!("byte string of length {len} is truncated")))?;
    Ok(data[start..end].to_vec())
}

// ---------------------------------------------------------------------------
// JSON descriptor shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDescriptor {
    Artifact {
        abi: Vec<RawEntry>,
        #[serde(default)]
        address: Option<String>,
    },
    Bare(Vec<RawEntry>),
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = "type", default = "default_entry_kind")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<RawParam>,
    #[serde(default)]
    outputs: Vec<RawParam>,
    #[serde(default)]
    anonymous: bool,
}

#[derive(Deserialize)]
struct RawParam {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    components: Vec<RawParam>,
    #[serde(default)]
    indexed: bool,
}

fn default_entry_kind() -> String {
    "function".into()
}
