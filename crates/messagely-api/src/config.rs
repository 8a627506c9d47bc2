use std::path::PathBuf;

use anyhow::{Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};

/// Placeholder secrets that are fine for local development only.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEFAULT_SECRET: &str = "dev-secret-change-me";

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub auth: AuthConfig,
}

/// Everything the session authenticator and account manager need.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC key for session tokens.
    pub secret_key: String,
    pub hash: HashParams,
}

/// Argon2id work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
        }
    }
}

impl HashParams {
    /// Cheapest parameters Argon2 accepts. Only for tests.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
        }
    }

    pub fn hasher(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl AuthConfig {
    pub fn uses_placeholder_secret(&self) -> bool {
        PLACEHOLDER_SECRETS.contains(&self.secret_key.as_str())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = HashParams::default();

        let port = parse_or(&lookup, "MESSAGELY_PORT", 3000)?;
        let memory_kib = parse_or(&lookup, "MESSAGELY_HASH_MEMORY_KIB", defaults.memory_kib)?;
        let iterations = parse_or(&lookup, "MESSAGELY_HASH_ITERATIONS", defaults.iterations)?;

        let secret_key = lookup("MESSAGELY_SECRET_KEY")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SECRET.into());

        Ok(Self {
            host: lookup("MESSAGELY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: lookup("MESSAGELY_DB_PATH")
                .unwrap_or_else(|| "messagely.db".into())
                .into(),
            auth: AuthConfig {
                secret_key,
                hash: HashParams {
                    memory_kib,
                    iterations,
                },
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
