//! Notehub chat encryption.
//!
//! Every room carries a random salt. The room key is HKDF-SHA256 over the
//! server-wide chat secret with that salt, and message bodies are sealed with
//! AES-256-GCM under a fresh nonce. The salt never changes once set: losing or
//! replacing it makes the room's history unreadable.

pub mod encrypt;
pub mod keys;

pub use encrypt::{CryptoError, decrypt_message, encrypt_message};
pub use keys::{ChatSecret, SALT_LEN, generate_salt};
