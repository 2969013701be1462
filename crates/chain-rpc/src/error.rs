use std::time::Duration;

use alloy_json_rpc::RpcError as JsonRpcError;
use alloy_primitives::B256;
use alloy_transport::TransportError;
use chain_eth::abi::decode_revert_reason;
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error code geth uses for execution reverts.
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Errors returned by the chain client.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The request never got a JSON-RPC answer (connection refused, timeout,
    /// non-2xx HTTP status).
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("node error {code}: {message}")]
    Node {
        code: i64,
        message: String,
        data: Option<Vec<u8>>,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("transaction rejected by node: {0}")]
    SubmissionRejected(String),

    #[error("no receipt for {hash} after {}ms", waited.as_millis())]
    ConfirmationTimeout { hash: B256, waited: Duration },

    #[error("transaction {hash} reverted in block {block_number}")]
    ExecutionReverted { hash: B256, block_number: u64 },
}

impl RpcError {
    /// Failures where trying again later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RpcError::Transport(_) | RpcError::ConfirmationTimeout { .. }
        )
    }

    /// Whether a node error reports an execution revert (of an `eth_call` or
    /// gas estimation).
    pub fn is_revert(&self) -> bool {
        match self {
            RpcError::Node { code, message, .. } => {
                *code == EXECUTION_REVERTED_CODE || message.to_lowercase().contains("revert")
            }
            _ => false,
        }
    }

    /// The revert reason, decoded from the error data when possible and taken
    /// from the node's message otherwise.
    pub fn revert_reason(&self) -> Option<String> {
        if !self.is_revert() {
            return None;
        }
        match self {
            RpcError::Node { message, data, .. } => data
                .as_deref()
                .and_then(decode_revert_reason)
                .or_else(|| Some(message.clone())),
            _ => None,
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(e: TransportError) -> Self {
        match e {
            JsonRpcError::ErrorResp(payload) => {
                let data = payload
                    .data
                    .as_deref()
                    .and_then(|raw| serde_json::from_str::<Value>(raw.get()).ok())
                    .as_ref()
                    .and_then(error_data_bytes);
                tracing::debug!(code = payload.code, message = %payload.message, "node returned error");
                RpcError::Node {
                    code: payload.code,
                    message: payload.message.to_string(),
                    data,
                }
            }
            JsonRpcError::Transport(kind) => RpcError::Transport(kind.to_string()),
            JsonRpcError::NullResp => RpcError::InvalidResponse("null result".into()),
            other => RpcError::InvalidResponse(other.to_string()),
        }
    }
}

/// Revert data arrives either as a bare hex string (geth) or nested inside an
/// object (Hardhat: `{"message": ..., "data": "0x..."}`).
fn error_data_bytes(data: &Value) -> Option<Vec<u8>> {
    match data {
        Value::String(s) => {
            let digits = s.strip_prefix("0x").unwrap_or(s);
            hex::decode(digits).ok()
        }
        Value::Object(map) => map.get("data").and_then(error_data_bytes),
        _ => None,
    }
}
