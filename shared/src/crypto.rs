//! RSA-2048 key material, RIPEMD160(SHA256(..)) public key hashing, and
//! RSASSA-PSS signatures, matching the cryptographic capability assumed by
//! the wire protocol.

use rand::rngs::OsRng;
use ripemd::Ripemd160;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::pss::{Signature as PssSignature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{Error, Result};

const KEY_BITS: usize = 2048;
/// Maximum PSS salt length for a 2048-bit key with a 32-byte (SHA-256)
/// digest: `key_size_bytes - digest_size - 2`.
const MAX_SALT_LEN: usize = KEY_BITS / 8 - 32 - 2;

/// An RSA-2048 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

/// An RSA-2048 private key. The underlying key material zeroizes its prime
/// factors on drop (see the `rsa` crate's own `Drop` implementation); the
/// transient DER buffer produced by `dump` is wiped explicitly below.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl KeyPair {
    /// Generates a fresh 2048-bit RSA key pair with public exponent 65537.
    pub fn generate() -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self {
            public: PublicKey(public),
            private: PrivateKey(private),
        })
    }
}

impl PublicKey {
    /// Hex-encoded DER `SubjectPublicKeyInfo`.
    pub fn dump(&self) -> Result<String> {
        let der = self
            .0
            .to_public_key_der()
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(hex::encode(der.as_bytes()))
    }

    pub fn load(hex_str: &str) -> Result<Self> {
        let mut der = hex::decode(hex_str)?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        der.zeroize();
        Ok(Self(key))
    }

    /// `hex(RIPEMD160(SHA256(DER-SPKI(pub))))`.
    pub fn hash(&self) -> Result<String> {
        let der = self
            .0
            .to_public_key_der()
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        let sha = Sha256::digest(der.as_bytes());
        let ripe = Ripemd160::digest(sha);
        Ok(hex::encode(ripe))
    }
}

impl PrivateKey {
    /// Hex-encoded DER PKCS#8.
    pub fn dump(&self) -> Result<String> {
        let der = self
            .0
            .to_pkcs8_der()
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        let mut bytes = der.as_bytes().to_vec();
        let hex_str = hex::encode(&bytes);
        bytes.zeroize();
        Ok(hex_str)
    }

    pub fn load(hex_str: &str) -> Result<Self> {
        let mut der = hex::decode(hex_str)?;
        let key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        der.zeroize();
        Ok(Self(key))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(RsaPublicKey::from(&self.0))
    }
}

/// Signs `text` with RSASSA-PSS (MGF1-SHA256, maximum salt length).
///
/// The payload is pre-hashed with SHA-256 before being handed to the PSS
/// signer, which hashes its input with SHA-256 again internally — this
/// double hash is intentional, reproducing the behavior of the reference
/// implementation this protocol is modeled on.
pub fn sign(key: &PrivateKey, text: &str) -> Result<String> {
    let prehashed = Sha256::digest(text.as_bytes());
    let signing_key: SigningKey<Sha256> =
        SigningKey::new_with_salt_len(key.0.clone(), MAX_SALT_LEN);
    let signature = signing_key.sign_with_rng(&mut OsRng, &prehashed);
    Ok(hex::encode(signature.to_bytes()))
}

/// Verifies a hex-encoded PSS signature produced by [`sign`].
pub fn verify(key: &PublicKey, signature_hex: &str, text: &str) -> bool {
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = PssSignature::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let verifying_key: VerifyingKey<Sha256> =
        VerifyingKey::new_with_salt_len(key.0.clone(), MAX_SALT_LEN);
    let prehashed = Sha256::digest(text.as_bytes());
    verifying_key.verify(&prehashed, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let pair = KeyPair::generate().unwrap();
        let signature = sign(&pair.private, "1000").unwrap();
        assert!(verify(&pair.public, &signature, "1000"));
    }

    #[test]
    fn verify_rejects_wrong_payload() {
        let pair = KeyPair::generate().unwrap();
        let signature = sign(&pair.private, "1000").unwrap();
        assert!(!verify(&pair.public, &signature, "1001"));
    }

    #[test]
    fn verify_rejects_other_keypair() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        let signature = sign(&a.private, "payload").unwrap();
        assert!(!verify(&b.public, &signature, "payload"));
    }

    #[test]
    fn pubkey_dump_load_roundtrip() {
        let pair = KeyPair::generate().unwrap();
        let dumped = pair.public.dump().unwrap();
        let loaded = PublicKey::load(&dumped).unwrap();
        assert_eq!(pair.public.hash().unwrap(), loaded.hash().unwrap());
    }

    #[test]
    fn hash_pubkey_is_stable() {
        let pair = KeyPair::generate().unwrap();
        assert_eq!(pair.public.hash().unwrap(), pair.public.hash().unwrap());
    }
}
