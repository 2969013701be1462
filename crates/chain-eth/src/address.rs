use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::error::EthError;

/// A 20-byte account or contract address.
///
/// The only way to build one from text is [`normalize`], so every address held
/// by the rest of the system has been validated. Equality is byte equality:
/// `0xabc…` and `0xABC…` name the same account.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChainAddress([u8; 20]);

impl ChainAddress {
    /// The all-zero address.
    pub const ZERO: ChainAddress = ChainAddress([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Reads an address out of a 32-byte ABI word.
    ///
    /// The upper 12 bytes must be zero; anything else means the word is not an
    /// address.
    pub fn from_word(word: &[u8; 32]) -> Result<Self, EthError> {
        if word[..12].iter().any(|&b| b != 0) {
            return Err(EthError::AbiDecoding(
                "address word has non-zero padding".into(),
            ));
        }
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&word[12..]);
        Ok(Self(addr))
    }

    /// Left-pads the address to a 32-byte ABI word.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }

    /// EIP-55 mixed-case representation, `0x`-prefixed.
    pub fn to_checksum(&self) -> String {
        eip55(&hex::encode(self.0))
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainAddress({})", self.to_checksum())
    }
}

impl FromStr for ChainAddress {
    type Err = EthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

impl From<ChainAddress> for alloy_primitives::Address {
    fn from(addr: ChainAddress) -> Self {
        alloy_primitives::Address::from(addr.0)
    }
}

impl From<alloy_primitives::Address> for ChainAddress {
    fn from(addr: alloy_primitives::Address) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(addr.as_slice());
        Self(bytes)
    }
}

impl Serialize for ChainAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for ChainAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        normalize(&raw).map_err(serde::de::Error::custom)
    }
}

/// Validates and canonicalizes a textual address.
///
/// Accepts `0x` + 40 hex characters in any casing. All-lowercase and
/// all-uppercase inputs carry no checksum and are accepted as-is; a mixed-case
/// input must carry a correct EIP-55 checksum, otherwise it is treated as a
/// corrupted address and rejected.
pub fn normalize(raw: &str) -> Result<ChainAddress, EthError> {
    let raw = raw.trim();
    let hex_part = strip_hex_prefix(raw)?;
    check_hex_body(hex_part)?;

    let is_all_lower = hex_part.chars().all(|c| !c.is_ascii_uppercase());
    let is_all_upper = hex_part.chars().all(|c| !c.is_ascii_lowercase());

    let lower = hex_part.to_ascii_lowercase();
    if !is_all_lower && !is_all_upper && eip55(&lower)[2..] != *hex_part {
        return Err(EthError::InvalidAddressFormat(format!(
            "checksum mismatch for {raw}"
        )));
    }

    let bytes = hex::decode(&lower)
        .map_err(|e| EthError::InvalidAddressFormat(format!("invalid hex: {e}")))?;
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&bytes);
    Ok(ChainAddress(addr))
}

/// Derives the address of an uncompressed secp256k1 public key (65 bytes,
/// starting with 0x04).
///
/// The address is the last 20 bytes of the Keccak-256 hash of the 64-byte key
/// body (without the 0x04 prefix).
pub fn pubkey_to_eth_address(uncompressed_pubkey: &[u8; 65]) -> Result<ChainAddress, EthError> {
    if uncompressed_pubkey[0] != 0x04 {
        return Err(EthError::InvalidPublicKey(
            "uncompressed key must start with 0x04".into(),
        ));
    }

    let hash = Keccak256::digest(&uncompressed_pubkey[1..]);

    let mut addr_bytes = [0u8; 20];
    addr_bytes.copy_from_slice(&hash[12..]);
    Ok(ChainAddress(addr_bytes))
}

/// EIP-55 over 40 lowercase hex characters; returns the `0x`-prefixed result.
fn eip55(lower_hex: &str) -> String {
    let hash = Keccak256::digest(lower_hex.as_bytes());

    let mut checksummed = String::with_capacity(42);
    checksummed.push_str("0x");

    for (i, c) in lower_hex.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            checksummed.push(c.to_ascii_uppercase());
        } else {
            checksummed.push(c);
        }
    }

    checksummed
}

fn strip_hex_prefix(address: &str) -> Result<&str, EthError> {
    address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| EthError::InvalidAddressFormat("address must start with 0x".into()))
}

fn check_hex_body(hex_part: &str) -> Result<(), EthError> {
    if hex_part.len() != 40 {
        return Err(EthError::InvalidAddressFormat(format!(
            "expected 40 hex characters, got {}",
            hex_part.len()
        )));
    }

    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EthError::InvalidAddressFormat(
            "address contains non-hex characters".into(),
        ));
    }

    Ok(())
}
