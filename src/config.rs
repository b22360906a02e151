// src/config.rs
//! Environment-driven configuration.
//!
//! Everything operational comes from the environment (or a `.env` file):
//! store credentials, the chain RPC endpoint, the issuing key, and the admin
//! authority allowlist. Nothing security-relevant is compiled in.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the API server binds to.
    pub bind_addr: SocketAddr,
    /// Base URL of the relational store's REST surface.
    pub store_url: String,
    /// API key for the store.
    pub store_api_key: String,
    /// Chain JSON-RPC endpoint; `None` runs the in-process chain stand-in.
    pub chain_rpc_url: Option<String>,
    /// Hex secret key for the issuing authority; `None` disables chain
    /// writes (database-only deployment).
    pub signer_key: Option<String>,
    /// Authority keys permitted to call admin endpoints.
    pub admin_authorities: HashSet<String>,
    /// Pause between chain operations in a batch, in milliseconds.
    pub batch_delay_ms: u64,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// Required: `STORE_URL`, `STORE_API_KEY`. Optional: `BIND_ADDR`
    /// (default `127.0.0.1:3000`), `CHAIN_RPC_URL`, `SIGNER_KEY`,
    /// `ADMIN_AUTHORITIES` (comma-separated), `BATCH_DELAY_MS` (default
    /// 500).
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_url =
            std::env::var("STORE_URL").map_err(|_| ConfigError::Missing("STORE_URL"))?;
        let store_api_key =
            std::env::var("STORE_API_KEY").map_err(|_| ConfigError::Missing("STORE_API_KEY"))?;

        let bind_addr = match std::env::var("BIND_ADDR") {
            Ok(v) => v.parse().map_err(|e| ConfigError::Invalid {
                var: "BIND_ADDR",
                reason: format!("{}", e),
            })?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };

        let batch_delay_ms = match std::env::var("BATCH_DELAY_MS") {
            Ok(v) => v.parse().map_err(|e| ConfigError::Invalid {
                var: "BATCH_DELAY_MS",
                reason: format!("{}", e),
            })?,
            Err(_) => 500,
        };

        let admin_authorities = std::env::var("ADMIN_AUTHORITIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(AppConfig {
            bind_addr,
            store_url,
            store_api_key,
            chain_rpc_url: std::env::var("CHAIN_RPC_URL").ok(),
            signer_key: std::env::var("SIGNER_KEY").ok(),
            admin_authorities,
            batch_delay_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment-variable tests mutate process state; keep them to pure
    // parsing helpers instead.

    #[test]
    fn allowlist_parsing_shape() {
        let parsed: HashSet<String> = "key-a, key-b,,key-c "
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        assert_eq!(parsed.len(), 3);
        assert!(parsed.contains("key-b"));
    }
}
