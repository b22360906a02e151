// src/main.rs

//! # CertifyChain - Main Entry Point
//!
//! Certificate issuance and verification service backed by two systems: a
//! relational store (source of truth) and an on-chain certificate program
//! (tamper-evident mirror).
//!
//! ## Architecture Overview
//! 1. **Storage Layer**: REST client for the hosted relational backend
//! 2. **Chain Layer**: JSON-RPC client for the certificate program, plus
//!    address derivation and signing
//! 3. **Services Layer**: certificate orchestration, hash conflict
//!    remediation, diagnostics, and the HTTP API
//!
//! ## Environment Variables
//! - `STORE_URL` / `STORE_API_KEY`: relational backend credentials
//! - `CHAIN_RPC_URL`: (optional) program RPC endpoint; omitted runs the
//!   in-process chain stand-in
//! - `SIGNER_KEY`: (optional) hex secret key of the issuing authority;
//!   omitted disables chain writes
//! - `ADMIN_AUTHORITIES`: comma-separated keys allowed on admin endpoints
//! - `BIND_ADDR`, `BATCH_DELAY_MS`: server tuning

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};

use crate::chain::client::{ChainProgram, RpcChainClient};
use crate::chain::memory::MemoryChain;
use crate::chain::signer::{ChainSigner, KeypairSigner};
use crate::chain::transaction_manager::TransactionManager;
use crate::config::AppConfig;
use crate::services::api_server::ApiServer;
use crate::services::certificate_service::CertificateService;
use crate::storage::rest_store::RestStore;

// Module declarations (organized by functional domain)
mod chain; // on-chain program access
mod config; // environment configuration
mod models; // data structures
mod services; // business logic and API
mod storage; // relational storage layer
mod utils; // hashing and validation helpers

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env().context("configuration error")?;

    let store = Arc::new(
        RestStore::new(&config.store_url, &config.store_api_key)
            .context("failed to build store client")?,
    );

    let program: Arc<dyn ChainProgram> = match &config.chain_rpc_url {
        Some(url) => {
            info!("using chain RPC endpoint {}", url);
            Arc::new(RpcChainClient::new(url))
        }
        None => {
            warn!("CHAIN_RPC_URL not set; running with in-process chain stand-in");
            Arc::new(MemoryChain::new())
        }
    };

    let signer: Option<Arc<dyn ChainSigner>> = match &config.signer_key {
        Some(key) => Some(Arc::new(
            KeypairSigner::from_hex(key).context("invalid SIGNER_KEY")?,
        )),
        None => {
            warn!("SIGNER_KEY not set; chain writes disabled (database-only mode)");
            None
        }
    };

    // The service issues under the signer's authority; without one, fall
    // back to a fresh throwaway identity so read paths still work.
    let issuer = match &signer {
        Some(s) => s.authority(),
        None => KeypairSigner::random().authority(),
    };

    let manager = Arc::new(TransactionManager::new(
        program,
        signer,
        Duration::from_millis(config.batch_delay_ms),
    ));

    let service = Arc::new(CertificateService::new(
        store.clone(),
        store.clone(),
        manager,
        issuer,
    ));

    info!("issuing authority: {}", service.issuer());

    let api = ApiServer::new(service, store, config.admin_authorities.clone());
    api.run(config.bind_addr).await
}
