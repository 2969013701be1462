//! Recipe ledger: stores recipes as records of the `RecipeStorage` contract
//! and reads them back.
//!
//! [`RecipeLedger`] is the entry point. Writes go through a fixed pipeline
//! (build call data, reserve a nonce, sign, submit, wait for the receipt) and
//! failures carry the [`Stage`] they happened in.

pub mod config;
pub mod contract;
pub mod error;
pub mod record;
pub mod service;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerErrorKind, Stage};
pub use record::RecipeRecord;
pub use service::{NetworkStatus, RecipeLedger, WriteSettings};

pub use chain_eth::{normalize, ChainAddress, ContractAbi, Signer};
pub use chain_rpc::{ChainRpc, ReceiptStatus, TransactionReceipt};
