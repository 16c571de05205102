//! Transport-level errors for the binary crate, distinct from the library
//! crates' `shared::Error`/`chain_core::Error` (spec §7, §10.2).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("local key material could not be generated: {0}")]
    Key(#[from] shared::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;
