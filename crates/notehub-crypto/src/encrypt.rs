use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

use crate::keys::ChatSecret;

const NONCE_LEN: usize = 12;

/// HKDF info label. Changing it changes every room key.
const ROOM_KEY_CONTEXT: &[u8] = b"notehub-chat-room-key-v1";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("room salt is empty")]
    EmptySalt,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encryption failed")]
    Encrypt,

    #[error("ciphertext is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("ciphertext is too short")]
    Truncated,

    #[error("decryption failed (wrong key or corrupted data)")]
    Decrypt,

    #[error("decrypted body is not valid UTF-8")]
    Utf8,
}

fn room_cipher(secret: &ChatSecret, salt: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if salt.is_empty() {
        return Err(CryptoError::EmptySalt);
    }

    let hk = Hkdf::<Sha256>::new(Some(salt), secret.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(ROOM_KEY_CONTEXT, &mut key)
        .map_err(|_| CryptoError::KeyDerivation)?;

    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)))
}

/// Encrypt a message body for a room.
/// Returns base64 of `nonce || ciphertext`.
pub fn encrypt_message(
    plaintext: &str,
    secret: &ChatSecret,
    salt: &[u8],
) -> Result<String, CryptoError> {
    let cipher = room_cipher(secret, salt)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::Encrypt)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(sealed))
}

/// Decrypt a body produced by [`encrypt_message`] with the same secret and salt.
pub fn decrypt_message(
    ciphertext: &str,
    secret: &ChatSecret,
    salt: &[u8],
) -> Result<String, CryptoError> {
    let sealed = BASE64.decode(ciphertext.trim())?;
    if sealed.len() <= NONCE_LEN {
        return Err(CryptoError::Truncated);
    }

    let cipher = room_cipher(secret, salt)?;
    let (nonce_bytes, body) = sealed.split_at(NONCE_LEN);

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), body)
        .map_err(|_| CryptoError::Decrypt)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::Utf8)
}
