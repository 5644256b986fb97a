use std::fmt;

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;

/// Length of a room salt in bytes.
pub const SALT_LEN: usize = 16;

/// Used when no chat secret is configured. Anything encrypted with it is
/// readable by whoever has this source code.
const DEVELOPMENT_SECRET: &str = "notehub-dev-chat-secret-change-me";

/// Values that are treated as "not configured".
const PLACEHOLDER_SECRETS: &[&str] = &["", "change-me", "changeme", DEVELOPMENT_SECRET];

/// Generate a random salt for a new room.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Server-wide secret that, combined with a room salt, yields the room key.
#[derive(Clone)]
pub struct ChatSecret {
    bytes: Vec<u8>,
    development_default: bool,
}

impl ChatSecret {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            bytes: secret.as_ref().to_vec(),
            development_default: false,
        }
    }

    /// Build from a configured value. Missing or placeholder values fall back
    /// to the development secret and are flagged via `is_development_default`.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !PLACEHOLDER_SECRETS.contains(&v) => Self::new(v),
            _ => Self {
                bytes: DEVELOPMENT_SECRET.as_bytes().to_vec(),
                development_default: true,
            },
        }
    }

    pub fn is_development_default(&self) -> bool {
        self.development_default
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ChatSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSecret")
            .field("bytes", &"<redacted>")
            .field("development_default", &self.development_default)
            .finish()
    }
}
