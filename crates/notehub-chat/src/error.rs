use notehub_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Caller is not a participant (or may not perform this action).
    /// Deliberately says nothing about whether the target exists.
    #[error("not authorized")]
    NotAuthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("encryption failed: {0}")]
    Encryption(#[from] CryptoError),

    #[error("storage failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
