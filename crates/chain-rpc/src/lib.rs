//! Async JSON-RPC access to an EVM node.
//!
//! [`ChainRpc`] is the seam the recipe ledger talks through: the HTTP client in
//! [`http`] implements it against a real node, and tests implement it with an
//! in-memory chain.

pub mod error;
pub mod http;

use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;
use chain_eth::{ChainAddress, SignedTransaction};
use tokio::time::Instant;

pub use error::RpcError;
pub use http::HttpChainClient;

/// A read-only contract call (`eth_call` against the latest block).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Sender as seen by the contract (`msg.sender`).
    pub from: Option<ChainAddress>,
    pub to: ChainAddress,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: ChainAddress,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
}

/// The outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub status: ReceiptStatus,
    pub gas_used: u64,
    pub logs: Vec<LogEntry>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// Node operations the ledger needs.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// `web3_clientVersion`.
    async fn client_version(&self) -> Result<String, RpcError>;

    /// Whether the node answers at all.
    async fn is_connected(&self) -> bool {
        self.client_version().await.is_ok()
    }

    async fn chain_id(&self) -> Result<u64, RpcError>;

    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Transaction count of `account` including pending transactions, i.e. the
    /// next nonce the node expects.
    async fn next_nonce(&self, account: &ChainAddress) -> Result<u64, RpcError>;

    /// Gas price suggested by the node, in wei.
    async fn gas_price(&self) -> Result<u128, RpcError>;

    /// Broadcasts a signed transaction and returns its hash.
    ///
    /// A node-level refusal is reported as [`RpcError::SubmissionRejected`].
    async fn submit(&self, tx: &SignedTransaction) -> Result<B256, RpcError>;

    /// `None` until the transaction is mined.
    async fn receipt(&self, hash: &B256) -> Result<Option<TransactionReceipt>, RpcError>;

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, RpcError>;

    /// Polls for a receipt until `timeout` elapses.
    ///
    /// Transient lookup failures are retried until the deadline. A receipt
    /// with failed status becomes [`RpcError::ExecutionReverted`].
    async fn wait_for_receipt(
        &self,
        hash: &B256,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<TransactionReceipt, RpcError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let timed_out = || RpcError::ConfirmationTimeout {
            hash: *hash,
            waited: Instant::now() - started,
        };

        loop {
            // A lookup still in flight at the deadline is abandoned.
            let Ok(lookup) = tokio::time::timeout_at(deadline, self.receipt(hash)).await else {
                return Err(timed_out());
            };
            match lookup {
                Ok(Some(receipt)) if receipt.succeeded() => return Ok(receipt),
                Ok(Some(receipt)) => {
                    return Err(RpcError::ExecutionReverted {
                        hash: *hash,
                        block_number: receipt.block_number,
                    })
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    tracing::debug!(tx_hash = %hash, error = %e, "receipt lookup failed, retrying");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out());
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }
}
