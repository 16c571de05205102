pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{KeyPair, PrivateKey, PublicKey};
pub use error::Error;
pub use hash::{Hash256, Target};
pub use types::{Amount, PubKeyHex, SignatureHex, BASE_DIFFICULTY, GENESIS_HASH};

pub type Result<T> = std::result::Result<T, Error>;
