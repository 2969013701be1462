use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use chain_eth::chains::network_name;
use chain_eth::{ChainAddress, ContractAbi, PendingTransaction, Signer};
use chain_rpc::{CallRequest, ChainRpc, HttpChainClient, RpcError, TransactionReceipt};
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};
use tracing::instrument;

use crate::config::LedgerConfig;
use crate::contract::{RecipeContract, RecipeLookup};
use crate::error::{LedgerError, LedgerErrorKind, Stage};
use crate::record::RecipeRecord;

/// Parameters applied to every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSettings {
    /// Chain id the node must report before anything is signed.
    pub chain_id: u64,
    pub gas_limit: u64,
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
}

/// Signing state guarded by the write lock.
struct Writer {
    signer: Signer,
    /// Nonce after the last transaction this ledger submitted.
    next_nonce: Option<u64>,
}

impl Writer {
    /// Never hands out a nonce below one already used, even when the node's
    /// pending count lags behind.
    fn reserve(&self, node_nonce: u64) -> u64 {
        self.next_nonce.map_or(node_nonce, |local| local.max(node_nonce))
    }

    /// Hands nonce authority back to the node after `nonce` went unmined.
    ///
    /// A node that evicted the transaction reports a pending count at or
    /// below `nonce`. Reservations made since are left alone.
    fn release_unconfirmed(&mut self, nonce: u64) {
        if self.next_nonce == Some(nonce + 1) {
            self.next_nonce = None;
        }
    }
}

/// Snapshot of the node and the ledger's identity.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatus {
    pub connected: bool,
    pub client_version: Option<String>,
    pub chain_id: Option<u64>,
    pub expected_chain_id: u64,
    pub network: String,
    pub block_number: Option<u64>,
    pub account: Option<ChainAddress>,
    pub contract: Option<ChainAddress>,
}

/// Reads and writes recipes through the `RecipeStorage` contract.
///
/// One ledger per signing account: writes from the same ledger are
/// serialized, reads are not.
pub struct RecipeLedger {
    rpc: Arc<dyn ChainRpc>,
    contract: RecipeContract,
    contract_address: Option<ChainAddress>,
    account: Option<ChainAddress>,
    writer: Option<Mutex<Writer>>,
    settings: WriteSettings,
    node_chain_id: OnceCell<u64>,
}

impl RecipeLedger {
    /// `contract_address` falls back to the address recorded in the
    /// descriptor.
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        abi: ContractAbi,
        contract_address: Option<ChainAddress>,
        signer: Option<Signer>,
        settings: WriteSettings,
    ) -> Result<Self, LedgerError> {
        let contract =
            RecipeContract::new(abi).map_err(|e| LedgerError::from_eth(Stage::Configure, e))?;
        let contract_address = contract_address.or_else(|| contract.descriptor_address());
        let account = signer.as_ref().map(Signer::address);

        tracing::debug!(
            contract = ?contract_address,
            account = ?account,
            chain_id = settings.chain_id,
            "recipe ledger ready"
        );

        Ok(Self {
            rpc,
            contract,
            contract_address,
            account,
            writer: signer.map(|signer| {
                Mutex::new(Writer {
                    signer,
                    next_nonce: None,
                })
            }),
            settings,
            node_chain_id: OnceCell::new(),
        })
    }

    /// Builds a ledger talking JSON-RPC over HTTP. Malformed values fail here;
    /// nothing touches the network yet.
    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let abi = config.load_abi()?;
        let contract_address = config.contract_address()?;
        let signer = config.signer()?;
        let rpc = HttpChainClient::connect_with_timeout(&config.rpc_url, config.rpc_timeout)
            .map_err(|e| LedgerError::from_rpc(Stage::Configure, e))?;

        Self::new(
            Arc::new(rpc),
            abi,
            contract_address,
            signer,
            WriteSettings {
                chain_id: config.chain_id,
                gas_limit: config.gas_limit,
                receipt_timeout: config.receipt_timeout,
                poll_interval: config.poll_interval,
            },
        )
    }

    /// Address writes are signed with, if a key is configured.
    pub fn account(&self) -> Option<ChainAddress> {
        self.account
    }

    pub fn contract_address(&self) -> Option<ChainAddress> {
        self.contract_address
    }

    /// Stores a recipe and waits for it to be mined.
    ///
    /// Not retried: a failure at the `submit` or `confirm` stage may still
    /// have put the transaction on chain.
    #[instrument(skip_all, fields(name = %name))]
    pub async fn save_recipe(
        &self,
        name: &str,
        ingredients: &str,
        instructions: &str,
    ) -> Result<TransactionReceipt, LedgerError> {
        let (Some(writer), Some(to)) = (&self.writer, self.contract_address) else {
            return Err(LedgerError::not_configured(
                Stage::Configure,
                self.missing_write_config(),
            ));
        };

        if !self.rpc.is_connected().await {
            return Err(LedgerError::new(
                Stage::Configure,
                LedgerErrorKind::Disconnected("node did not answer web3_clientVersion".into()),
            ));
        }
        self.verify_chain_id().await?;

        tracing::debug!(state = "building");
        let data = self
            .contract
            .create_recipe_call(name, ingredients, instructions)
            .map_err(|e| LedgerError::from_eth(Stage::Build, e))?;

        let signed = {
            let mut writer = writer.lock().await;
            let from = writer.signer.address();

            let node_nonce = self
                .rpc
                .next_nonce(&from)
                .await
                .map_err(|e| LedgerError::from_rpc(Stage::Build, e))?;
            let gas_price = self
                .rpc
                .gas_price()
                .await
                .map_err(|e| LedgerError::from_rpc(Stage::Build, e))?;
            let nonce = writer.reserve(node_nonce);

            let pending = PendingTransaction {
                from,
                to,
                nonce,
                gas_limit: self.settings.gas_limit,
                gas_price,
                chain_id: self.settings.chain_id,
                value: U256::ZERO,
                data,
            };

            tracing::debug!(state = "signing", nonce, node_nonce, gas_price);
            let signed = writer
                .signer
                .sign(&pending)
                .map_err(|e| LedgerError::from_eth(Stage::Sign, e))?;

            match self.rpc.submit(&signed).await {
                Ok(hash) => {
                    writer.next_nonce = Some(nonce + 1);
                    tracing::info!(state = "submitted", nonce, tx_hash = %hash, "transaction submitted");
                    signed
                }
                Err(e) => {
                    // Fall back to the node's view for the next write.
                    writer.next_nonce = None;
                    tracing::warn!(state = "rejected", nonce, error = %e, "transaction not accepted");
                    return Err(LedgerError::from_rpc(Stage::Submit, e));
                }
            }
        };

        let waited = self
            .rpc
            .wait_for_receipt(
                &signed.hash,
                self.settings.receipt_timeout,
                self.settings.poll_interval,
            )
            .await;
        let receipt = match waited {
            Ok(receipt) => receipt,
            Err(e) => {
                match &e {
                    RpcError::ExecutionReverted { .. } => {
                        tracing::warn!(state = "reverted", tx_hash = %signed.hash, "transaction reverted")
                    }
                    RpcError::ConfirmationTimeout { .. } => {
                        tracing::warn!(state = "timed_out", tx_hash = %signed.hash, "no receipt before timeout");
                        writer.lock().await.release_unconfirmed(signed.tx.nonce);
                    }
                    _ => {}
                }
                return Err(LedgerError::from_rpc(Stage::Confirm, e));
            }
        };

        tracing::info!(
            state = "confirmed",
            tx_hash = %receipt.transaction_hash,
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            "recipe stored"
        );
        Ok(receipt)
    }

    /// Fetches one recipe by id.
    #[instrument(skip(self))]
    pub async fn get_recipe(&self, id: u64) -> Result<RecipeRecord, LedgerError> {
        let to = self.read_target()?;
        let data = self
            .contract
            .get_recipe_call(id)
            .map_err(|e| LedgerError::from_eth(Stage::Read, e))?;

        let output = match self.rpc.call(&CallRequest { from: None, to, data }).await {
            Ok(output) => output,
            Err(e) if e.is_revert() => {
                tracing::debug!(reason = ?e.revert_reason(), "getRecipe reverted");
                return Err(not_found(id));
            }
            Err(e) => return Err(LedgerError::from_rpc(Stage::Read, e)),
        };
        if output.is_empty() {
            return Err(not_found(id));
        }

        match self
            .contract
            .decode_recipe(id, &output)
            .map_err(|e| LedgerError::from_eth(Stage::Read, e))?
        {
            RecipeLookup::Found(record) => Ok(record),
            RecipeLookup::Missing => Err(not_found(id)),
        }
    }

    /// Ids of the recipes `owner` created, in creation order.
    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn get_owned_recipe_ids(&self, owner: &ChainAddress) -> Result<Vec<u64>, LedgerError> {
        let to = self.read_target()?;
        let (data, as_sender) = self
            .contract
            .owned_ids_call(owner)
            .map_err(|e| LedgerError::from_eth(Stage::Read, e))?;

        let output = self
            .rpc
            .call(&CallRequest {
                from: as_sender.then_some(*owner),
                to,
                data,
            })
            .await
            .map_err(|e| LedgerError::from_rpc(Stage::Read, e))?;

        self.contract
            .decode_owned_ids(&output)
            .map_err(|e| LedgerError::from_eth(Stage::Read, e))
    }

    /// Number of recipes ever created on the contract.
    pub async fn recipe_count(&self) -> Result<u64, LedgerError> {
        let to = self.read_target()?;
        let data = self
            .contract
            .recipe_count_call()
            .map_err(|e| LedgerError::from_eth(Stage::Read, e))?;
        let output = self
            .rpc
            .call(&CallRequest { from: None, to, data })
            .await
            .map_err(|e| LedgerError::from_rpc(Stage::Read, e))?;
        self.contract
            .decode_recipe_count(&output)
            .map_err(|e| LedgerError::from_eth(Stage::Read, e))
    }

    /// Id assigned to the recipe a confirmed `save_recipe` created, read from
    /// its `RecipeCreated` log.
    pub fn created_recipe_id(&self, receipt: &TransactionReceipt) -> Result<Option<u64>, LedgerError> {
        let Some(contract) = self.contract_address else {
            return Ok(None);
        };
        self.contract
            .created_recipe_id(&contract, &receipt.logs)
            .map_err(|e| LedgerError::from_eth(Stage::Read, e))
    }

    /// Probes the node without failing: unanswered fields stay `None`.
    pub async fn network_status(&self) -> NetworkStatus {
        let client_version = self.rpc.client_version().await.ok();
        let connected = client_version.is_some();
        let (chain_id, block_number) = if connected {
            (self.rpc.chain_id().await.ok(), self.rpc.block_number().await.ok())
        } else {
            (None, None)
        };

        NetworkStatus {
            connected,
            client_version,
            chain_id,
            expected_chain_id: self.settings.chain_id,
            network: network_name(chain_id.unwrap_or(self.settings.chain_id)),
            block_number,
            account: self.account,
            contract: self.contract_address,
        }
    }

    /// Asks the node for its chain id once per ledger; later writes reuse it.
    async fn verify_chain_id(&self) -> Result<(), LedgerError> {
        let reported = *self
            .node_chain_id
            .get_or_try_init(|| async {
                self.rpc
                    .chain_id()
                    .await
                    .map_err(|e| LedgerError::from_rpc(Stage::Configure, e))
            })
            .await?;

        if reported != self.settings.chain_id {
            return Err(LedgerError::not_configured(
                Stage::Configure,
                format!(
                    "node reports chain id {reported}, configured for {}",
                    self.settings.chain_id
                ),
            ));
        }
        Ok(())
    }

    fn read_target(&self) -> Result<ChainAddress, LedgerError> {
        self.contract_address.ok_or_else(|| {
            LedgerError::not_configured(Stage::Read, "RECIPE_CONTRACT_ADDRESS is not set")
        })
    }

    fn missing_write_config(&self) -> &'static str {
        match (self.writer.is_some(), self.contract_address.is_some()) {
            (false, false) => "PRIVATE_KEY and RECIPE_CONTRACT_ADDRESS are not set",
            (false, true) => "PRIVATE_KEY is not set",
            _ => "RECIPE_CONTRACT_ADDRESS is not set",
        }
    }
}

fn not_found(id: u64) -> LedgerError {
    LedgerError::new(Stage::Read, LedgerErrorKind::RecipeNotFound(id))
}
