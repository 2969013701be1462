use std::fmt;

use alloy_primitives::U256;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use zeroize::Zeroize;

use crate::address::{pubkey_to_eth_address, ChainAddress};
use crate::error::EthError;
use crate::transaction::{PendingTransaction, SignedTransaction};

/// Holds one secp256k1 key and signs transactions with it.
///
/// The key never leaves this type: there is no accessor for it, `Debug` prints
/// only the derived address, and `SigningKey` zeroizes its scalar on drop.
pub struct Signer {
    key: SigningKey,
    address: ChainAddress,
}

impl Signer {
    /// Builds a signer from a 32-byte secret scalar.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, EthError> {
        let key = SigningKey::from_bytes(secret.into())
            .map_err(|_| EthError::InvalidKeyMaterial("not a valid secp256k1 scalar".into()))?;

        let uncompressed = key.verifying_key().to_encoded_point(false);
        let mut key_65 = [0u8; 65];
        key_65.copy_from_slice(uncompressed.as_bytes());
        let address = pubkey_to_eth_address(&key_65)?;

        Ok(Self { key, address })
    }

    /// Builds a signer from a hex secret, with or without a `0x` prefix.
    pub fn from_hex(secret: &str) -> Result<Self, EthError> {
        let secret = secret.trim();
        let hex_part = secret
            .strip_prefix("0x")
            .or_else(|| secret.strip_prefix("0X"))
            .unwrap_or(secret);

        if hex_part.len() != 64 {
            return Err(EthError::InvalidKeyMaterial(format!(
                "expected 64 hex characters, got {}",
                hex_part.len()
            )));
        }

        let mut key_bytes = [0u8; 32];
        let decoded = hex::decode_to_slice(hex_part, &mut key_bytes)
            .map_err(|_| EthError::InvalidKeyMaterial("secret is not valid hex".into()));
        let signer = decoded.and_then(|()| Self::from_bytes(&key_bytes));
        key_bytes.zeroize();
        signer
    }

    pub fn address(&self) -> ChainAddress {
        self.address
    }

    /// Signs a pending transaction with EIP-155 replay protection.
    ///
    /// The transaction's `from` must be this signer's address.
    pub fn sign(&self, tx: &PendingTransaction) -> Result<SignedTransaction, EthError> {
        if tx.from != self.address {
            return Err(EthError::SigningError(format!(
                "transaction is from {} but signer is {}",
                tx.from, self.address
            )));
        }

        let hash = tx.signing_hash();

        // RFC 6979 deterministic nonce, low-S normalized.
        let (signature, recovery_id): (Signature, RecoveryId) = self
            .key
            .sign_prehash(hash.as_slice())
            .map_err(|e| EthError::SigningError(e.to_string()))?;

        let r = U256::from_be_slice(&signature.r().to_bytes());
        let s = U256::from_be_slice(&signature.s().to_bytes());

        SignedTransaction::assemble(tx.clone(), recovery_id.is_y_odd(), r, s)
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::normalize;

    /// Well-known test key (DO NOT use on a public network).
    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    /// First Hardhat development account.
    const HARDHAT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn pending(from: ChainAddress, nonce: u64, chain_id: u64) -> PendingTransaction {
        PendingTransaction {
            from,
            to: normalize("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap(),
            nonce,
            gas_limit: 2_000_000,
            gas_price: 1_875_000_000,
            chain_id,
            value: U256::ZERO,
            data: vec![0xde, 0xad, 0xbe, 0xef],
        }
    }

    #[test]
    fn derives_known_addresses() {
        let one = Signer::from_hex(KEY_ONE).unwrap();
        assert_eq!(one.address().to_string(), "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");

        let hardhat = Signer::from_hex(HARDHAT_KEY).unwrap();
        assert_eq!(
            hardhat.address().to_string(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn rejects_invalid_key_material() {
        let zero = "0".repeat(64);
        // Curve order n is not a valid scalar.
        let order = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";
        for bad in ["", "0x1234", "zz".repeat(32).as_str(), zero.as_str(), order] {
            assert!(
                matches!(Signer::from_hex(bad), Err(EthError::InvalidKeyMaterial(_))),
                "expected rejection of {bad:?}"
            );
        }
    }

    #[test]
    fn debug_does_not_leak_key() {
        let signer = Signer::from_hex(HARDHAT_KEY).unwrap();
        let debug = format!("{signer:?}");
        assert!(debug.contains("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
        assert!(!debug.to_lowercase().contains(HARDHAT_KEY));
    }

    #[test]
    fn eip155_reference_signature() {
        let signer = Signer::from_hex(&"46".repeat(32)).unwrap();
        let tx = PendingTransaction {
            from: signer.address(),
            to: normalize("0x3535353535353535353535353535353535353535").unwrap(),
            nonce: 9,
            gas_limit: 21_000,
            gas_price: 20_000_000_000,
            chain_id: 1,
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Vec::new(),
        };

        let signed = signer.sign(&tx).unwrap();
        assert_eq!(signed.v, 37);
        assert_eq!(
            signed.raw_hex(),
            "0xf86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = Signer::from_hex(HARDHAT_KEY).unwrap();
        let tx = pending(signer.address(), 0, 31337);

        let a = signer.sign(&tx).unwrap();
        let b = signer.sign(&tx).unwrap();
        assert_eq!(a.raw, b.raw);
        assert_eq!(a.hash, b.hash);
        assert!(a.raw_hex().starts_with("0x"));
    }

    #[test]
    fn recovered_signer_matches_account() {
        let signer = Signer::from_hex(HARDHAT_KEY).unwrap();
        for (nonce, chain_id) in [(0, 31337), (1, 31337), (7, 1337), (42, 1)] {
            let signed = signer.sign(&pending(signer.address(), nonce, chain_id)).unwrap();
            assert_eq!(signed.recover_signer().unwrap(), signer.address());
        }
    }

    #[test]
    fn decode_recovers_fields_and_sender_from_raw_bytes() {
        let signer = Signer::from_hex(HARDHAT_KEY).unwrap();
        let tx = pending(signer.address(), 5, 31337);
        let signed = signer.sign(&tx).unwrap();

        let decoded = SignedTransaction::decode(&signed.raw).unwrap();
        assert_eq!(decoded.tx, tx);
        assert_eq!(decoded.hash, signed.hash);
        assert_eq!(decoded.v, 31337 * 2 + 35 + (signed.v - 35) % 2);
    }

    #[test]
    fn different_nonces_and_chains_produce_different_transactions() {
        let signer = Signer::from_hex(HARDHAT_KEY).unwrap();
        let base = signer.sign(&pending(signer.address(), 0, 31337)).unwrap();
        let next = signer.sign(&pending(signer.address(), 1, 31337)).unwrap();
        let other_chain = signer.sign(&pending(signer.address(), 0, 1337)).unwrap();

        assert_ne!(base.hash, next.hash);
        assert_ne!(base.raw, other_chain.raw);
    }

    #[test]
    fn refuses_to_sign_for_another_account() {
        let signer = Signer::from_hex(HARDHAT_KEY).unwrap();
        let stranger = normalize("0x70997970C51812dc3A010C7d01b50e0d17dc79C8").unwrap();
        assert!(matches!(
            signer.sign(&pending(stranger, 0, 31337)),
            Err(EthError::SigningError(_))
        ));
    }
}
