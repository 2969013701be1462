use std::fmt;
use std::time::Duration;

use alloy_primitives::B256;
use chain_eth::EthError;
use chain_rpc::RpcError;
use thiserror::Error;

/// JSON-RPC "parse error", used when a node answers with something that is not
/// a valid response.
const MALFORMED_RESPONSE_CODE: i64 = -32700;

/// Where in a ledger operation a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Configure,
    Build,
    Sign,
    Submit,
    Confirm,
    Read,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Configure => "configure",
            Stage::Build => "build",
            Stage::Sign => "sign",
            Stage::Submit => "submit",
            Stage::Confirm => "confirm",
            Stage::Read => "read",
        })
    }
}

#[derive(Debug, Error)]
pub enum LedgerErrorKind {
    #[error("invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("abi encoding error: {0}")]
    AbiEncoding(String),

    #[error("abi decoding error: {0}")]
    AbiDecoding(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("chain node unreachable: {0}")]
    Disconnected(String),

    #[error("transaction rejected by node: {0}")]
    SubmissionRejected(String),

    #[error("no receipt for {hash} after {}ms", waited.as_millis())]
    ConfirmationTimeout { hash: B256, waited: Duration },

    #[error("transaction {hash} reverted in block {block_number}")]
    ExecutionReverted { hash: B256, block_number: u64 },

    #[error("recipe {0} does not exist")]
    RecipeNotFound(u64),

    /// A node answered with a JSON-RPC error that is not an execution revert.
    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },
}

/// A ledger failure tagged with the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage} failed: {kind}")]
pub struct LedgerError {
    pub stage: Stage,
    pub kind: LedgerErrorKind,
}

impl LedgerError {
    pub fn new(stage: Stage, kind: LedgerErrorKind) -> Self {
        Self { stage, kind }
    }

    pub fn not_configured(stage: Stage, what: impl Into<String>) -> Self {
        Self::new(stage, LedgerErrorKind::NotConfigured(what.into()))
    }

    pub fn from_eth(stage: Stage, e: EthError) -> Self {
        let kind = match e {
            EthError::InvalidAddressFormat(m) => LedgerErrorKind::InvalidAddressFormat(m),
            EthError::InvalidKeyMaterial(m) | EthError::InvalidPublicKey(m) => {
                LedgerErrorKind::InvalidKeyMaterial(m)
            }
            EthError::SigningError(m) => LedgerErrorKind::InvalidKeyMaterial(m),
            EthError::AbiEncoding(m) | EthError::TransactionBuildError(m) => {
                LedgerErrorKind::AbiEncoding(m)
            }
            EthError::AbiDecoding(m) | EthError::TransactionDecoding(m) => {
                LedgerErrorKind::AbiDecoding(m)
            }
            EthError::AbiDescriptor(m) => {
                LedgerErrorKind::NotConfigured(format!("contract descriptor: {m}"))
            }
        };
        Self::new(stage, kind)
    }

    pub fn from_rpc(stage: Stage, e: RpcError) -> Self {
        let kind = match e {
            RpcError::InvalidEndpoint(m) => LedgerErrorKind::NotConfigured(m),
            RpcError::Transport(m) => LedgerErrorKind::Disconnected(m),
            RpcError::Node { code, message, .. } => LedgerErrorKind::Node { code, message },
            RpcError::InvalidResponse(message) => LedgerErrorKind::Node {
                code: MALFORMED_RESPONSE_CODE,
                message,
            },
            RpcError::SubmissionRejected(m) => LedgerErrorKind::SubmissionRejected(m),
            RpcError::ConfirmationTimeout { hash, waited } => {
                LedgerErrorKind::ConfirmationTimeout { hash, waited }
            }
            RpcError::ExecutionReverted { hash, block_number } => {
                LedgerErrorKind::ExecutionReverted { hash, block_number }
            }
        };
        Self::new(stage, kind)
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            LedgerErrorKind::Disconnected(_) | LedgerErrorKind::ConfirmationTimeout { .. }
        )
    }

    /// Whether the signed transaction may have reached the node. Failures
    /// before submission guarantee nothing was broadcast.
    pub fn left_machine(&self) -> bool {
        matches!(self.stage, Stage::Submit | Stage::Confirm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_stage_and_kind() {
        let err = LedgerError::not_configured(Stage::Configure, "PRIVATE_KEY is not set");
        assert_eq!(
            err.to_string(),
            "configure failed: not configured: PRIVATE_KEY is not set"
        );
        assert_eq!(
            LedgerError::new(Stage::Read, LedgerErrorKind::RecipeNotFound(99)).to_string(),
            "read failed: recipe 99 does not exist"
        );
    }

    #[test]
    fn transport_failures_are_disconnected_and_transient() {
        let err = LedgerError::from_rpc(Stage::Build, RpcError::Transport("refused".into()));
        assert!(matches!(err.kind, LedgerErrorKind::Disconnected(_)));
        assert!(err.is_transient());
        assert!(!err.left_machine());
    }

    #[test]
    fn timeout_left_machine_and_is_transient() {
        let err = LedgerError::from_rpc(
            Stage::Confirm,
            RpcError::ConfirmationTimeout {
                hash: B256::ZERO,
                waited: Duration::from_secs(120),
            },
        );
        assert!(err.is_transient());
        assert!(err.left_machine());
    }

    #[test]
    fn rejection_and_revert_are_permanent() {
        let rejected = LedgerError::from_rpc(
            Stage::Submit,
            RpcError::SubmissionRejected("nonce too low".into()),
        );
        assert!(!rejected.is_transient());
        assert!(rejected.left_machine());

        let reverted = LedgerError::from_rpc(
            Stage::Confirm,
            RpcError::ExecutionReverted {
                hash: B256::ZERO,
                block_number: 3,
            },
        );
        assert!(!reverted.is_transient());
    }

    #[test]
    fn eth_errors_map_to_taxonomy() {
        let err = LedgerError::from_eth(
            Stage::Configure,
            EthError::InvalidAddressFormat("0x12".into()),
        );
        assert!(matches!(err.kind, LedgerErrorKind::InvalidAddressFormat(_)));

        let err = LedgerError::from_eth(Stage::Build, EthError::AbiEncoding("overflow".into()));
        assert!(matches!(err.kind, LedgerErrorKind::AbiEncoding(_)));

        let err = LedgerError::from_eth(Stage::Configure, EthError::AbiDescriptor("bad".into()));
        assert!(matches!(err.kind, LedgerErrorKind::NotConfigured(_)));
    }
}
