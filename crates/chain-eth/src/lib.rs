//! Ethereum/EVM primitives for the recipe ledger.
//!
//! This crate provides:
//! - Address validation and EIP-55 canonicalization
//! - Contract ABI descriptors, call-data encoding and return-data decoding
//! - EIP-155 legacy transaction encoding, signing and sender recovery
//! - Development network definitions
//!
//! Nothing in here performs I/O.

pub mod abi;
pub mod address;
pub mod chains;
pub mod error;
pub mod signer;
pub mod transaction;

pub use abi::{AbiType, AbiValue, ContractAbi};
pub use address::{normalize, ChainAddress};
pub use error::EthError;
pub use signer::Signer;
pub use transaction::{PendingTransaction, SignedTransaction};
