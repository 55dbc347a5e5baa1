use crate::CryptoError;
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;

/// Modulus size used when nothing else is configured
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest modulus that still leaves room for an OAEP/SHA-256 payload
pub const MIN_KEY_BITS: usize = 1024;

/// RSA key pair bound to a single connected user
#[derive(Clone)]
pub struct UserKeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl UserKeyPair {
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.public_key.size() * 8
    }

    /// Base64 (standard, padded) encoding of the big-endian public modulus.
    ///
    /// This is the representation sent to clients in `Public Key of ...` lines.
    pub fn encoded_modulus(&self) -> String {
        general_purpose::STANDARD.encode(self.public_key.n().to_bytes_be())
    }
}

impl fmt::Debug for UserKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserKeyPair")
            .field("bits", &self.bits())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Generates one key pair per accepted connection.
///
/// The modulus size is fixed when the provisioner is built; clients never
/// negotiate it. Generation is CPU-bound (hundreds of milliseconds at 2048
/// bits), so async callers should run it on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct KeyProvisioner {
    bits: usize,
}

impl KeyProvisioner {
    pub fn new(bits: usize) -> Result<Self, CryptoError> {
        if bits < MIN_KEY_BITS || bits % 8 != 0 {
            return Err(CryptoError::KeyGeneration(format!(
                "unsupported modulus size {bits} (need a multiple of 8, >= {MIN_KEY_BITS})"
            )));
        }
        Ok(Self { bits })
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn generate(&self) -> Result<UserKeyPair, CryptoError> {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, self.bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);

        tracing::debug!(bits = self.bits, "generated user key pair");

        Ok(UserKeyPair {
            private_key,
            public_key,
        })
    }
}

/// Anything that can hand out a fresh key pair per connection
///
/// Implementations are called from the blocking pool.
pub trait KeySource: Send + Sync {
    fn generate(&self) -> Result<UserKeyPair, CryptoError>;
}

impl KeySource for KeyProvisioner {
    fn generate(&self) -> Result<UserKeyPair, CryptoError> {
        KeyProvisioner::generate(self)
    }
}

impl Default for KeyProvisioner {
    fn default() -> Self {
        Self {
            bits: DEFAULT_KEY_BITS,
        }
    }
}
