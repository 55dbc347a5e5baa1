//! Per-connection RSA key provisioning for the relay.
//!
//! Every accepted connection gets its own [`UserKeyPair`] from a
//! [`KeyProvisioner`]. The pair lives exactly as long as the user's
//! registry entry and is never persisted.
//!
//! **Note:** [`transform::pass_through`] encrypts with a recipient's public key
//! and immediately decrypts with that same recipient's private key, all on the
//! server. It is kept for wire compatibility with existing clients and gives
//! no confidentiality whatsoever: the relay holds every private key and the
//! plaintext is what goes over the wire.

pub mod keys;
pub mod transform;

pub use keys::{KeyProvisioner, KeySource, UserKeyPair, DEFAULT_KEY_BITS, MIN_KEY_BITS};
pub use transform::{decrypt_with, encrypt_for, pass_through};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("decryption error: {0}")]
    Decryption(String),
    #[error("decrypted payload is not valid utf-8")]
    InvalidUtf8,
}
