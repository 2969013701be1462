use std::time::Duration;

use alloy_eips::BlockId;
use alloy_network::{Ethereum, ReceiptResponse as _};
use alloy_primitives::{Address, Bytes, B256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use alloy_transport_http::Http;
use async_trait::async_trait;
use chain_eth::{ChainAddress, SignedTransaction};
use reqwest::Url;
use tracing::instrument;

use crate::error::RpcError;
use crate::{CallRequest, ChainRpc, LogEntry, ReceiptStatus, TransactionReceipt};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC over HTTP, backed by an alloy provider.
///
/// Construction performs no I/O; the first request is the first contact with
/// the node.
pub struct HttpChainClient {
    provider: RootProvider<Ethereum>,
}

impl HttpChainClient {
    pub fn connect(endpoint: &str) -> Result<Self, RpcError> {
        Self::connect_with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Like [`connect`](Self::connect), bounding every request by `timeout`.
    pub fn connect_with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, RpcError> {
        let url = Url::parse(endpoint.trim())
            .map_err(|e| RpcError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RpcError::InvalidEndpoint(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let client = RpcClient::new(Http::with_client(http, url), false);

        Ok(Self {
            provider: RootProvider::new(client),
        })
    }
}

#[async_trait]
impl ChainRpc for HttpChainClient {
    async fn client_version(&self) -> Result<String, RpcError> {
        Ok(self.provider.get_client_version().await?)
    }

    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.provider.get_block_number().await?)
    }

    #[instrument(skip_all, fields(account = %account))]
    async fn next_nonce(&self, account: &ChainAddress) -> Result<u64, RpcError> {
        let nonce = self
            .provider
            .get_transaction_count(Address::from(*account))
            .pending()
            .await?;
        Ok(nonce)
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        Ok(self.provider.get_gas_price().await?)
    }

    #[instrument(skip_all, fields(nonce = tx.tx.nonce, tx_hash = %tx.hash))]
    async fn submit(&self, tx: &SignedTransaction) -> Result<B256, RpcError> {
        let pending = self
            .provider
            .send_raw_transaction(&tx.raw)
            .await
            .map_err(|e| match RpcError::from(e) {
                RpcError::Node { message, .. } => RpcError::SubmissionRejected(message),
                other => other,
            })?;
        let hash = *pending.tx_hash();
        if hash != tx.hash {
            tracing::warn!(node_hash = %hash, "node reported a different transaction hash");
        }
        Ok(hash)
    }

    async fn receipt(&self, hash: &B256) -> Result<Option<TransactionReceipt>, RpcError> {
        let Some(receipt) = self.provider.get_transaction_receipt(*hash).await? else {
            return Ok(None);
        };
        Ok(convert_receipt(receipt))
    }

    #[instrument(skip_all, fields(to = %request.to))]
    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, RpcError> {
        let mut tx = TransactionRequest::default()
            .to(Address::from(request.to))
            .input(TransactionInput::new(Bytes::copy_from_slice(&request.data)));
        if let Some(from) = request.from {
            tx = tx.from(Address::from(from));
        }
        let output = self.provider.call(tx).block(BlockId::latest()).await?;
        Ok(output.to_vec())
    }
}

/// `None` while the receipt has no block yet (some nodes return pending
/// receipts).
fn convert_receipt(receipt: alloy_rpc_types_eth::TransactionReceipt) -> Option<TransactionReceipt> {
    let block_number = receipt.block_number?;
    let status = if receipt.status() {
        ReceiptStatus::Success
    } else {
        ReceiptStatus::Reverted
    };
    let logs = receipt
        .inner
        .logs()
        .iter()
        .map(|log| LogEntry {
            address: ChainAddress::from(log.inner.address),
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.to_vec(),
        })
        .collect();

    Some(TransactionReceipt {
        transaction_hash: receipt.transaction_hash,
        block_number,
        status,
        gas_used: receipt.gas_used,
        logs,
    })
}
