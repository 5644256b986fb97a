use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use notehub_crypto::ChatSecret;
use tracing::warn;

const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub chat_secret: ChatSecret,
    pub environment: Environment,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Insecure secrets are fatal in
    /// production and a loud warning otherwise.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let environment = match lookup("NOTEHUB_ENV").as_deref().map(str::trim) {
            None | Some("") | Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                bail!("NOTEHUB_ENV must be 'development' or 'production', got '{}'", other)
            }
        };

        let host = lookup("NOTEHUB_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("NOTEHUB_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("NOTEHUB_PORT is not a valid port")?;
        let db_path: PathBuf = lookup("NOTEHUB_DB_PATH")
            .unwrap_or_else(|| "notehub.db".into())
            .into();

        let jwt_secret = match lookup("NOTEHUB_JWT_SECRET").filter(|s| !s.trim().is_empty()) {
            Some(secret) if !PLACEHOLDER_SECRETS.contains(&secret.as_str()) => secret,
            _ if environment == Environment::Production => {
                bail!("NOTEHUB_JWT_SECRET is unset or still a placeholder; it must match the auth service's secret")
            }
            _ => {
                warn!("NOTEHUB_JWT_SECRET is unset or a placeholder, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let chat_secret = ChatSecret::from_setting(lookup("NOTEHUB_CHAT_SECRET").as_deref());
        if chat_secret.is_development_default() {
            if environment == Environment::Production {
                bail!("NOTEHUB_CHAT_SECRET is unset or a placeholder; refusing to encrypt chats with the development key");
            }
            warn!("!!! NOTEHUB_CHAT_SECRET is unset: chat messages are encrypted with the INSECURE development key !!!");
        }

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            chat_secret,
            environment,
        })
    }
}
