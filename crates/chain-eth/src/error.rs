use thiserror::Error;

/// Ethereum encoding and signing errors.
#[derive(Debug, Error)]
pub enum EthError {
    #[error("invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("abi encoding error: {0}")]
    AbiEncoding(String),

    #[error("abi decoding error: {0}")]
    AbiDecoding(String),

    #[error("invalid abi descriptor: {0}")]
    AbiDescriptor(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("transaction decoding error: {0}")]
    TransactionDecoding(String),
}
