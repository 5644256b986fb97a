use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use notehub_types::api::Claims;
use notehub_types::models::Identity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,

    #[error("invalid bearer credential")]
    InvalidCredential,
}

/// Turns a bearer credential into a verified identity. Token issuance lives
/// with the external auth service; the chat core only ever verifies.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// HS256 JWTs signed with a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|_| AuthError::InvalidCredential)?;
        Ok(Identity::new(data.claims.sub, data.claims.username))
    }
}

/// Sign a token the way the auth service does. Used by tests and local tooling.
pub fn issue_token(secret: &str, identity: &Identity, ttl_secs: i64) -> Result<String, AuthError> {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let claims = Claims {
        sub: identity.user_id,
        username: identity.username.clone(),
        exp: exp.max(0) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|_| AuthError::InvalidCredential)
}
