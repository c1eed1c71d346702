use anyhow::Context;
use ethers::types::Address;
use rsa::RsaPublicKey;

use crate::auth::rsa::load_rsa_public_key_from_base64;

/// Process-wide configuration, read from the environment exactly once at
/// startup and immutable afterwards. The RSA public key is parsed here so a
/// missing or malformed key is a startup failure, never a per-request one.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub rsa_public_key: RsaPublicKey,
    pub metis_rpc: String,
    pub contract_address: Address,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_ms: u64,
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("required environment variable {} not set", name))
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let rsa_public_key_base64 = required("RSA_PUBLIC_KEY_BASE64")?;
        let rsa_public_key = load_rsa_public_key_from_base64(&rsa_public_key_base64)
            .context("RSA_PUBLIC_KEY_BASE64 is not a base64-encoded DER public key")?;

        Ok(Self {
            host: optional("HOST", "0.0.0.0"),
            port: optional("PORT", "3000")
                .parse()
                .context("PORT is not a valid port number")?,
            rsa_public_key,
            metis_rpc: required("METIS_RPC")?,
            contract_address: required("CONTRACT_ADDRESS")?
                .parse()
                .context("CONTRACT_ADDRESS is not a valid EVM address")?,
            rate_limit_max_requests: optional("COMMON_RATE_LIMIT_MAX_REQUESTS", "1000")
                .parse()
                .context("COMMON_RATE_LIMIT_MAX_REQUESTS is not a number")?,
            rate_limit_window_ms: optional("COMMON_RATE_LIMIT_WINDOW_MS", "1000")
                .parse()
                .context("COMMON_RATE_LIMIT_WINDOW_MS is not a number")?,
        })
    }
}
