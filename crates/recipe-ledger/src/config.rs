use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chain_eth::chains::DEFAULT_NETWORK;
use chain_eth::{normalize, ChainAddress, ContractAbi, Signer};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{LedgerError, Stage};

pub const DEFAULT_RPC_URL: &str = DEFAULT_NETWORK.rpc_url;
pub const DEFAULT_CHAIN_ID: u64 = DEFAULT_NETWORK.chain_id;
pub const DEFAULT_ABI_PATH: &str = "artifacts/contracts/RecipeStorage.sol/RecipeStorage.json";
pub const DEFAULT_GAS_LIMIT: u64 = 2_000_000;
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to build a [`RecipeLedger`](crate::RecipeLedger).
///
/// `contract_address` and `private_key` are optional: without them the ledger
/// can still read, and writes fail with `NotConfigured`.
pub struct LedgerConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub contract_address: Option<String>,
    pub private_key: Option<SecretString>,
    pub abi_path: PathBuf,
    pub gas_limit: u64,
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
    pub rpc_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            contract_address: None,
            private_key: None,
            abi_path: PathBuf::from(DEFAULT_ABI_PATH),
            gas_limit: DEFAULT_GAS_LIMIT,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("contract_address", &self.contract_address)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("abi_path", &self.abi_path)
            .field("gas_limit", &self.gas_limit)
            .field("receipt_timeout", &self.receipt_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("rpc_timeout", &self.rpc_timeout)
            .finish()
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let invalid = |what: &str| Err(LedgerError::not_configured(Stage::Configure, what));

        if self.rpc_url.trim().is_empty() {
            return invalid("RPC_URL is empty");
        }
        if self.chain_id == 0 {
            return invalid("CHAIN_ID must be non-zero");
        }
        if self.gas_limit == 0 {
            return invalid("GAS_LIMIT must be non-zero");
        }
        if self.receipt_timeout.is_zero() {
            return invalid("receipt timeout must be non-zero");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll interval must be non-zero");
        }
        if self.rpc_timeout.is_zero() {
            return invalid("RPC timeout must be non-zero");
        }
        Ok(())
    }

    /// Reads and parses the contract descriptor at `abi_path`.
    pub fn load_abi(&self) -> Result<ContractAbi, LedgerError> {
        load_abi_file(&self.abi_path)
    }

    /// The configured contract address, normalized. Blank counts as unset.
    pub fn contract_address(&self) -> Result<Option<ChainAddress>, LedgerError> {
        self.contract_address
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| normalize(raw).map_err(|e| LedgerError::from_eth(Stage::Configure, e)))
            .transpose()
    }

    /// A signer for the configured key. Blank counts as unset.
    pub fn signer(&self) -> Result<Option<Signer>, LedgerError> {
        self.private_key
            .as_ref()
            .map(|secret| secret.expose_secret())
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| Signer::from_hex(raw).map_err(|e| LedgerError::from_eth(Stage::Configure, e)))
            .transpose()
    }
}

pub fn load_abi_file(path: &Path) -> Result<ContractAbi, LedgerError> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        LedgerError::not_configured(
            Stage::Configure,
            format!("cannot read contract descriptor {}: {e}", path.display()),
        )
    })?;
    ContractAbi::from_json(&json).map_err(|e| LedgerError::from_eth(Stage::Configure, e))
}
