use thiserror::Error;

/// Errors produced by the shared hashing and cryptography primitives.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid key encoding: {0}")]
    InvalidKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("rsa key generation or encoding failure: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("malformed compact target: {0}")]
    InvalidTarget(String),
}

pub type Result<T> = std::result::Result<T, Error>;
