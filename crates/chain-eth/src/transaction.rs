use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::address::{pubkey_to_eth_address, ChainAddress};
use crate::error::EthError;

/// An unsigned legacy (EIP-155) transaction calling a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    /// Account expected to sign; not part of the encoding.
    pub from: ChainAddress,
    pub to: ChainAddress,
    pub nonce: u64,
    pub gas_limit: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    pub chain_id: u64,
    /// Transfer value in wei.
    pub value: U256,
    pub data: Vec<u8>,
}

impl PendingTransaction {
    /// EIP-155 signing payload:
    /// `rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0])`.
    pub fn signing_payload(&self) -> Vec<u8> {
        let fields = UnsignedLegacyFields {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: self.to.into(),
            value: self.value,
            data: Bytes::from(self.data.clone()),
            chain_id: self.chain_id,
            empty_r: 0,
            empty_s: 0,
        };

        let mut buf = Vec::with_capacity(fields.length());
        fields.encode(&mut buf);
        buf
    }

    /// Keccak-256 of [`Self::signing_payload`]; this is what gets signed.
    pub fn signing_hash(&self) -> B256 {
        B256::from_slice(&Keccak256::digest(self.signing_payload()))
    }
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: PendingTransaction,
    /// EIP-155 `v`: `recovery_id + 2 * chain_id + 35`.
    pub v: u64,
    pub r: U256,
    pub s: U256,
    /// RLP-encoded signed transaction.
    pub raw: Vec<u8>,
    /// Keccak-256 of `raw`.
    pub hash: B256,
}

impl SignedTransaction {
    /// Builds the signed encoding from a pending transaction and the signature
    /// components.
    pub(crate) fn assemble(
        tx: PendingTransaction,
        y_odd: bool,
        r: U256,
        s: U256,
    ) -> Result<Self, EthError> {
        let v = tx
            .chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + y_odd as u64))
            .ok_or_else(|| {
                EthError::TransactionBuildError(format!("chain id {} too large", tx.chain_id))
            })?;

        let fields = SignedLegacyFields {
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: tx.to.into(),
            value: tx.value,
            data: Bytes::from(tx.data.clone()),
            v,
            r,
            s,
        };

        let mut raw = Vec::with_capacity(fields.length());
        fields.encode(&mut raw);
        let hash = B256::from_slice(&Keccak256::digest(&raw));

        Ok(Self {
            tx,
            v,
            r,
            s,
            raw,
            hash,
        })
    }

    /// Parses raw signed bytes and recovers the sender from the signature.
    pub fn decode(raw: &[u8]) -> Result<Self, EthError> {
        let mut buf = raw;
        let fields = SignedLegacyFields::decode(&mut buf)
            .map_err(|e| EthError::TransactionDecoding(e.to_string()))?;
        if !buf.is_empty() {
            return Err(EthError::TransactionDecoding(format!(
                "{} trailing bytes after transaction",
                buf.len()
            )));
        }

        let (chain_id, y_odd) = split_v(fields.v)?;
        let mut tx = PendingTransaction {
            from: ChainAddress::ZERO,
            to: fields.to.into(),
            nonce: fields.nonce,
            gas_limit: fields.gas_limit,
            gas_price: fields.gas_price,
            chain_id,
            value: fields.value,
            data: fields.data.to_vec(),
        };
        tx.from = recover_address(&tx.signing_hash(), &fields.r, &fields.s, y_odd)?;

        Self::assemble(tx, y_odd, fields.r, fields.s)
    }

    /// Re-derives the signing account from the signature and the transaction
    /// fields.
    pub fn recover_signer(&self) -> Result<ChainAddress, EthError> {
        let (_, y_odd) = split_v(self.v)?;
        recover_address(&self.tx.signing_hash(), &self.r, &self.s, y_odd)
    }

    /// `0x`-prefixed hex of the raw bytes.
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

/// Splits an EIP-155 `v` into `(chain_id, y_odd)`. Pre-EIP-155 values (27/28)
/// are rejected because they are not bound to a network.
fn split_v(v: u64) -> Result<(u64, bool), EthError> {
    if v < 35 {
        return Err(EthError::TransactionDecoding(format!(
            "v = {v} is not replay protected"
        )));
    }
    Ok(((v - 35) / 2, (v - 35) % 2 == 1))
}

fn recover_address(hash: &B256, r: &U256, s: &U256, y_odd: bool) -> Result<ChainAddress, EthError> {
    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&r.to_be_bytes::<32>());
    sig_bytes[32..].copy_from_slice(&s.to_be_bytes::<32>());

    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| EthError::SigningError(format!("malformed signature: {e}")))?;
    let recovery_id = RecoveryId::new(y_odd, false);

    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)
        .map_err(|e| EthError::SigningError(format!("signature recovery failed: {e}")))?;

    let uncompressed = key.to_encoded_point(false);
    let mut key_65 = [0u8; 65];
    key_65.copy_from_slice(uncompressed.as_bytes());
    pubkey_to_eth_address(&key_65)
}

// ---------------------------------------------------------------------------
// RLP-encodable structures
// ---------------------------------------------------------------------------

#[derive(RlpEncodable)]
struct UnsignedLegacyFields {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
    chain_id: u64,
    empty_r: u8,
    empty_s: u8,
}

#[derive(RlpEncodable, RlpDecodable)]
struct SignedLegacyFields {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
    v: u64,
    r: U256,
    s: U256,
}
