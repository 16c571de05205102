use thiserror::Error;

/// Errors produced by block/transaction/chain validation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("chain mismatch: {0}")]
    ChainMismatch(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cryptography error: {0}")]
    Crypto(#[from] shared::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
