use serde::Serialize;

/// A development network a recipe ledger is typically deployed to.
#[derive(Debug, Clone, Serialize)]
pub struct EvmNetwork {
    pub chain_id: u64,
    pub name: &'static str,
    pub rpc_url: &'static str,
}

/// Hardhat Network (chain ID 31337). Also the default of Anvil.
pub const HARDHAT: EvmNetwork = EvmNetwork {
    chain_id: 31337,
    name: "Hardhat",
    rpc_url: "http://127.0.0.1:8545",
};

/// Ganache (chain ID 1337).
pub const GANACHE: EvmNetwork = EvmNetwork {
    chain_id: 1337,
    name: "Ganache",
    rpc_url: "http://127.0.0.1:7545",
};

/// Sepolia Testnet (chain ID 11155111).
pub const SEPOLIA: EvmNetwork = EvmNetwork {
    chain_id: 11155111,
    name: "Sepolia",
    rpc_url: "https://rpc.sepolia.org",
};

const ALL_NETWORKS: &[&EvmNetwork] = &[&HARDHAT, &GANACHE, &SEPOLIA];

/// The network used when nothing else is configured.
pub const DEFAULT_NETWORK: &EvmNetwork = &HARDHAT;

/// Returns the network definition for a chain ID, or `None` if unknown.
pub fn get_network(chain_id: u64) -> Option<&'static EvmNetwork> {
    ALL_NETWORKS
        .iter()
        .find(|n| n.chain_id == chain_id)
        .copied()
}

/// Human-readable name for a chain ID.
pub fn network_name(chain_id: u64) -> String {
    get_network(chain_id)
        .map(|n| n.name.to_string())
        .unwrap_or_else(|| format!("chain {chain_id}"))
}
