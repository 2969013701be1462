//! In-memory chain node running a `RecipeStorage` contract, for driving the
//! ledger end to end without a real node.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;
use chain_eth::abi::{decode_result, encode, function_selector, AbiType, ERROR_STRING_SELECTOR};
use chain_eth::{AbiValue, ChainAddress, ContractAbi, SignedTransaction, Signer};
use chain_rpc::{CallRequest, ChainRpc, LogEntry, ReceiptStatus, RpcError, TransactionReceipt};
use recipe_ledger::{normalize, RecipeLedger, WriteSettings};

pub const CHAIN_ID: u64 = 31337;
pub const GAS_PRICE: u128 = 1_875_000_000;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// First and second Hardhat development accounts.
pub const HARDHAT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const SECOND_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

pub const RECIPE_STORAGE_ARTIFACT: &str = r#"{
    "_format": "hh-sol-artifact-1",
    "contractName": "RecipeStorage",
    "sourceName": "contracts/RecipeStorage.sol",
    "abi": [
        {"type": "function", "name": "createRecipe", "stateMutability": "nonpayable",
         "inputs": [
            {"name": "_name", "type": "string"},
            {"name": "_ingredients", "type": "string"},
            {"name": "_instructions", "type": "string"}],
         "outputs": []},
        {"type": "function", "name": "getRecipe", "stateMutability": "view",
         "inputs": [{"name": "_id", "type": "uint256"}],
         "outputs": [
            {"name": "name", "type": "string"},
            {"name": "ingredients", "type": "string"},
            {"name": "instructions", "type": "string"},
            {"name": "chef", "type": "address"},
            {"name": "timestamp", "type": "uint256"}]},
        {"type": "function", "name": "getChefRecipes", "stateMutability": "view",
         "inputs": [], "outputs": [{"name": "", "type": "uint256[]"}]},
        {"type": "function", "name": "getRecipeCount", "stateMutability": "view",
         "inputs": [], "outputs": [{"name": "", "type": "uint256"}]},
        {"type": "event", "name": "RecipeCreated", "anonymous": false,
         "inputs": [
            {"name": "id", "type": "uint256", "indexed": true},
            {"name": "name", "type": "string", "indexed": false},
            {"name": "chef", "type": "address", "indexed": true}]}
    ],
    "bytecode": "0x6080"
}"#;

pub fn contract_address() -> ChainAddress {
    normalize(CONTRACT).unwrap()
}

pub fn abi() -> ContractAbi {
    ContractAbi::from_json(RECIPE_STORAGE_ARTIFACT).unwrap()
}

pub fn settings() -> WriteSettings {
    WriteSettings {
        chain_id: CHAIN_ID,
        gas_limit: 2_000_000,
        receipt_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(5),
    }
}

/// A ledger with the Hardhat key that gives up on receipts after 50ms.
pub fn impatient_ledger(chain: &Arc<MockChain>) -> RecipeLedger {
    RecipeLedger::new(
        chain.clone(),
        abi(),
        Some(contract_address()),
        Some(Signer::from_hex(HARDHAT_KEY).unwrap()),
        WriteSettings {
            receipt_timeout: Duration::from_millis(50),
            ..settings()
        },
    )
    .unwrap()
}

/// A ledger signing with `key` against `chain`.
pub fn ledger(chain: &Arc<MockChain>, key: Option<&str>) -> RecipeLedger {
    RecipeLedger::new(
        chain.clone(),
        abi(),
        Some(contract_address()),
        key.map(|k| Signer::from_hex(k).unwrap()),
        settings(),
    )
    .unwrap()
}

struct StoredRecipe {
    name: String,
    ingredients: String,
    instructions: String,
    chef: ChainAddress,
    timestamp: u64,
}

struct PendingReceipt {
    polls_left: usize,
    receipt: TransactionReceipt,
}

#[derive(Default)]
struct ChainState {
    block: u64,
    nonces: HashMap<ChainAddress, u64>,
    recipes: Vec<StoredRecipe>,
    receipts: HashMap<B256, PendingReceipt>,
    accepted: Vec<SignedTransaction>,
}

pub struct MockChain {
    chain_id: u64,
    contract: ChainAddress,
    state: Mutex<ChainState>,
    /// Receipt lookups answered with "not mined yet" before a receipt shows.
    pending_polls: usize,

    pub connected: AtomicBool,
    /// Accepted transactions are never mined.
    pub stall_mining: AtomicBool,
    /// Unmined transactions leave the pool as soon as they are accepted, so
    /// the pending count does not include them.
    pub evict_unmined: AtomicBool,
    /// How far `next_nonce` trails the real pending count.
    pub nonce_lag: AtomicU64,

    pub requests: AtomicUsize,
    pub chain_id_requests: AtomicUsize,
    pub submissions: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Self::with_chain_id(CHAIN_ID)
    }

    pub fn with_chain_id(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            contract: contract_address(),
            state: Mutex::new(ChainState::default()),
            pending_polls: 1,
            connected: AtomicBool::new(true),
            stall_mining: AtomicBool::new(false),
            evict_unmined: AtomicBool::new(false),
            nonce_lag: AtomicU64::new(0),
            requests: AtomicUsize::new(0),
            chain_id_requests: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
        })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Transactions the node accepted, in acceptance order.
    pub fn accepted(&self) -> Vec<SignedTransaction> {
        self.state.lock().unwrap().accepted.clone()
    }

    pub fn confirmed_nonce(&self, account: &ChainAddress) -> u64 {
        self.state
            .lock()
            .unwrap()
            .nonces
            .get(account)
            .copied()
            .unwrap_or(0)
    }

    fn touch(&self) -> Result<(), RpcError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RpcError::Transport("connection refused".into()))
        }
    }

    fn execute(&self, state: &mut ChainState, tx: &SignedTransaction) -> TransactionReceipt {
        state.block += 1;
        let block_number = state.block;
        let reverted = TransactionReceipt {
            transaction_hash: tx.hash,
            block_number,
            status: ReceiptStatus::Reverted,
            gas_used: 21_000,
            logs: Vec::new(),
        };

        if tx.tx.to != self.contract || tx.tx.data.len() < 4 {
            return reverted;
        }
        let (selector, args) = tx.tx.data.split_at(4);
        if selector != function_selector("createRecipe(string,string,string)") {
            return reverted;
        }
        let Ok(values) = decode_result(args, &[AbiType::String, AbiType::String, AbiType::String])
        else {
            return reverted;
        };
        let mut fields = values.into_iter().filter_map(AbiValue::into_string);
        let (Some(name), Some(ingredients), Some(instructions)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return reverted;
        };
        // require(bytes(_name).length > 0)
        if name.is_empty() {
            return reverted;
        }

        let id = state.recipes.len() as u64;
        let mut id_topic = [0u8; 32];
        id_topic[24..].copy_from_slice(&id.to_be_bytes());
        let log = LogEntry {
            address: self.contract,
            topics: vec![
                abi().event("RecipeCreated").unwrap().topic(),
                B256::from(id_topic),
                B256::from(tx.tx.from.to_word()),
            ],
            data: encode(&[name.clone().into()], &[AbiType::String]).unwrap(),
        };

        state.recipes.push(StoredRecipe {
            name,
            ingredients,
            instructions,
            chef: tx.tx.from,
            timestamp: GENESIS_TIMESTAMP + block_number,
        });

        TransactionReceipt {
            status: ReceiptStatus::Success,
            gas_used: 180_000,
            logs: vec![log],
            ..reverted
        }
    }
}

fn revert(reason: &str) -> RpcError {
    let mut data = ERROR_STRING_SELECTOR.to_vec();
    data.extend(encode(&[reason.into()], &[AbiType::String]).unwrap());
    RpcError::Node {
        code: 3,
        message: format!("execution reverted: {reason}"),
        data: Some(data),
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn client_version(&self) -> Result<String, RpcError> {
        self.touch()?;
        Ok("MockChain/1.0".into())
    }

    async fn chain_id(&self) -> Result<u64, RpcError> {
        self.touch()?;
        self.chain_id_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        self.touch()?;
        Ok(self.state.lock().unwrap().block)
    }

    async fn next_nonce(&self, account: &ChainAddress) -> Result<u64, RpcError> {
        self.touch()?;
        let lag = self.nonce_lag.load(Ordering::SeqCst);
        Ok(self.confirmed_nonce(account).saturating_sub(lag))
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        self.touch()?;
        Ok(GAS_PRICE)
    }

    async fn submit(&self, tx: &SignedTransaction) -> Result<B256, RpcError> {
        self.touch()?;
        self.submissions.fetch_add(1, Ordering::SeqCst);

        // Work from the bytes on the wire, as a node would.
        let decoded = SignedTransaction::decode(&tx.raw)
            .map_err(|e| RpcError::SubmissionRejected(format!("invalid transaction: {e}")))?;
        if decoded.tx.chain_id != self.chain_id {
            return Err(RpcError::SubmissionRejected("invalid chain id".into()));
        }

        let mut state = self.state.lock().unwrap();
        let expected = state.nonces.get(&decoded.tx.from).copied().unwrap_or(0);
        if decoded.tx.nonce < expected {
            return Err(RpcError::SubmissionRejected(format!(
                "nonce too low: next nonce {expected}, tx nonce {}",
                decoded.tx.nonce
            )));
        }
        if decoded.tx.nonce > expected {
            return Err(RpcError::SubmissionRejected(format!(
                "nonce too high: next nonce {expected}, tx nonce {}",
                decoded.tx.nonce
            )));
        }
        let stalled = self.stall_mining.load(Ordering::SeqCst);
        if !(stalled && self.evict_unmined.load(Ordering::SeqCst)) {
            state.nonces.insert(decoded.tx.from, expected + 1);
        }

        if !stalled {
            let receipt = self.execute(&mut state, &decoded);
            state.receipts.insert(
                decoded.hash,
                PendingReceipt {
                    polls_left: self.pending_polls,
                    receipt,
                },
            );
        }
        state.accepted.push(decoded.clone());
        Ok(decoded.hash)
    }

    async fn receipt(&self, hash: &B256) -> Result<Option<TransactionReceipt>, RpcError> {
        self.touch()?;
        let mut state = self.state.lock().unwrap();
        match state.receipts.get_mut(hash) {
            Some(pending) if pending.polls_left > 0 => {
                pending.polls_left -= 1;
                Ok(None)
            }
            Some(pending) => Ok(Some(pending.receipt.clone())),
            None => Ok(None),
        }
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, RpcError> {
        self.touch()?;
        if request.to != self.contract {
            // No code at the address.
            return Ok(Vec::new());
        }
        if request.data.len() < 4 {
            return Err(revert("function selector was not recognized"));
        }

        let state = self.state.lock().unwrap();
        let (selector, args) = request.data.split_at(4);

        if selector == function_selector("getRecipe(uint256)") {
            let id = decode_result(args, &[AbiType::Uint(256)])
                .ok()
                .and_then(|v| v.first().and_then(AbiValue::as_u64))
                .ok_or_else(|| revert("bad argument"))?;
            let recipe = state
                .recipes
                .get(id as usize)
                .ok_or_else(|| revert("Recipe does not exist"))?;
            return Ok(encode(
                &[
                    recipe.name.as_str().into(),
                    recipe.ingredients.as_str().into(),
                    recipe.instructions.as_str().into(),
                    recipe.chef.into(),
                    recipe.timestamp.into(),
                ],
                &[
                    AbiType::String,
                    AbiType::String,
                    AbiType::String,
                    AbiType::Address,
                    AbiType::Uint(256),
                ],
            )
            .unwrap());
        }

        if selector == function_selector("getChefRecipes()") {
            let ids = state
                .recipes
                .iter()
                .enumerate()
                .filter(|(_, r)| Some(r.chef) == request.from)
                .map(|(id, _)| AbiValue::from(id as u64))
                .collect();
            return Ok(encode(
                &[AbiValue::Array(ids)],
                &[AbiType::Array(Box::new(AbiType::Uint(256)))],
            )
            .unwrap());
        }

        if selector == function_selector("getRecipeCount()") {
            return Ok(encode(&[(state.recipes.len() as u64).into()], &[AbiType::Uint(256)]).unwrap());
        }

        Err(revert("function selector was not recognized"))
    }
}
