use crate::{CryptoError, UserKeyPair};
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// RSA-OAEP (SHA-256) encrypt `message` for the holder of `public_key`.
///
/// Fails when the message exceeds the OAEP payload limit
/// (`modulus_bytes - 66`, i.e. 190 bytes at 2048 bits).
pub fn encrypt_for(public_key: &RsaPublicKey, message: &str) -> Result<Vec<u8>, CryptoError> {
    let mut rng = OsRng;
    public_key
        .encrypt(&mut rng, Oaep::new::<Sha256>(), message.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// RSA-OAEP (SHA-256) decrypt back into a UTF-8 string.
pub fn decrypt_with(private_key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<String, CryptoError> {
    let plaintext = private_key
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

/// Encrypt with the recipient's public half, then decrypt with its private half.
///
/// The result equals `message`. This only proves the recipient's key pair
/// still round-trips; it hides nothing (see the crate docs).
pub fn pass_through(keys: &UserKeyPair, message: &str) -> Result<String, CryptoError> {
    let ciphertext = encrypt_for(keys.public_key(), message)?;
    decrypt_with(keys.private_key(), &ciphertext)
}
