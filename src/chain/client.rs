// src/chain/client.rs
//! Opaque access to the on-chain certificate program.
//!
//! The program itself is owned by an external runtime; this module only
//! defines the instruction surface ([`ChainProgram`]) and a JSON-RPC client
//! for it. Account addresses are always derived locally (see
//! [`crate::chain::address`]) so reads need no lookup table.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::chain::accounts::{CertificateAccount, GlobalState, InstitutionAccount};
use crate::chain::address::{
    derive_certificate_address, derive_global_state_address, derive_institution_address,
    ChainAddress,
};
use crate::chain::signer::{ChainSigner, SignerError};

/// Transaction signature/identifier returned by the runtime.
pub type TxSignature = String;

#[derive(Debug, Error)]
pub enum ChainError {
    /// The caller holds no signing capability. The only chain failure that is
    /// raised to the caller instead of folded into a result object.
    #[error("no signing capability available")]
    NoSigner,

    /// Network-level failure talking to the RPC endpoint.
    #[error("rpc transport error: {0}")]
    Transport(String),

    /// The program rejected the instruction (duplicate id, revoked record,
    /// wrong authority, ...).
    #[error("program rejected instruction: {0}")]
    ProgramRejected(String),

    /// The RPC endpoint answered with something undecodable.
    #[error("malformed rpc response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Signer(#[from] SignerError),
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        ChainError::Transport(e.to_string())
    }
}

/// Parameters of an `issue_certificate` instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCertificateParams {
    pub certificate_id: String,
    pub student_name: String,
    pub course_name: String,
    pub certificate_hash: String,
    pub issued_at: i64,
}

/// The program's five state-changing instructions plus account reads.
///
/// `verify_certificate` is state-changing on purpose: the program bumps the
/// account's verification counter.
#[async_trait]
pub trait ChainProgram: Send + Sync {
    async fn initialize(&self, signer: &dyn ChainSigner) -> Result<TxSignature, ChainError>;

    async fn register_institution(
        &self,
        signer: &dyn ChainSigner,
        name: &str,
        location: &str,
    ) -> Result<TxSignature, ChainError>;

    async fn issue_certificate(
        &self,
        signer: &dyn ChainSigner,
        params: &IssueCertificateParams,
    ) -> Result<TxSignature, ChainError>;

    async fn verify_certificate(
        &self,
        signer: &dyn ChainSigner,
        certificate: &ChainAddress,
    ) -> Result<TxSignature, ChainError>;

    async fn revoke_certificate(
        &self,
        signer: &dyn ChainSigner,
        certificate: &ChainAddress,
    ) -> Result<TxSignature, ChainError>;

    async fn get_global_state(&self) -> Result<Option<GlobalState>, ChainError>;

    async fn get_institution(
        &self,
        address: &ChainAddress,
    ) -> Result<Option<InstitutionAccount>, ChainError>;

    async fn get_certificate(
        &self,
        address: &ChainAddress,
    ) -> Result<Option<CertificateAccount>, ChainError>;
}

/// Convenience read: certificate account located from (authority, id).
pub async fn fetch_certificate_for(
    program: &dyn ChainProgram,
    authority: &ChainAddress,
    certificate_id: &str,
) -> Result<Option<CertificateAccount>, ChainError> {
    let institution = derive_institution_address(authority);
    let address = derive_certificate_address(&institution, certificate_id);
    program.get_certificate(&address).await
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Program-level rejections come back in this JSON-RPC error code range.
const PROGRAM_ERROR_CODE_MIN: i64 = -32099;
const PROGRAM_ERROR_CODE_MAX: i64 = -32000;

/// JSON-RPC 2.0 client for the deployed program.
pub struct RpcChainClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl RpcChainClient {
    pub fn new(rpc_url: &str) -> Self {
        RpcChainClient {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.to_string(),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp = self.http.post(&self.rpc_url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(ChainError::Transport(format!("status {}", resp.status())));
        }
        let decoded: RpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| ChainError::Malformed(e.to_string()))?;
        if let Some(err) = decoded.error {
            if (PROGRAM_ERROR_CODE_MIN..=PROGRAM_ERROR_CODE_MAX).contains(&err.code) {
                return Err(ChainError::ProgramRejected(err.message));
            }
            return Err(ChainError::Transport(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }
        Ok(decoded.result)
    }

    /// Sends a signed instruction and expects a transaction signature back.
    async fn send_instruction(
        &self,
        signer: &dyn ChainSigner,
        method: &str,
        instruction: serde_json::Value,
    ) -> Result<TxSignature, ChainError> {
        let message = serde_json::to_vec(&instruction)
            .map_err(|e| ChainError::Malformed(e.to_string()))?;
        let signature = signer.sign(&message)?;
        let params = json!({
            "authority": signer.authority(),
            "instruction": instruction,
            "signature": hex::encode(signature),
        });
        self.call::<TxSignature>(method, params)
            .await?
            .ok_or_else(|| ChainError::Malformed("missing transaction signature".to_string()))
    }
}

#[async_trait]
impl ChainProgram for RpcChainClient {
    async fn initialize(&self, signer: &dyn ChainSigner) -> Result<TxSignature, ChainError> {
        self.send_instruction(signer, "certify_initialize", json!({}))
            .await
    }

    async fn register_institution(
        &self,
        signer: &dyn ChainSigner,
        name: &str,
        location: &str,
    ) -> Result<TxSignature, ChainError> {
        self.send_instruction(
            signer,
            "certify_registerInstitution",
            json!({ "name": name, "location": location }),
        )
        .await
    }

    async fn issue_certificate(
        &self,
        signer: &dyn ChainSigner,
        params: &IssueCertificateParams,
    ) -> Result<TxSignature, ChainError> {
        let instruction =
            serde_json::to_value(params).map_err(|e| ChainError::Malformed(e.to_string()))?;
        self.send_instruction(signer, "certify_issueCertificate", instruction)
            .await
    }

    async fn verify_certificate(
        &self,
        signer: &dyn ChainSigner,
        certificate: &ChainAddress,
    ) -> Result<TxSignature, ChainError> {
        self.send_instruction(
            signer,
            "certify_verifyCertificate",
            json!({ "certificate": certificate }),
        )
        .await
    }

    async fn revoke_certificate(
        &self,
        signer: &dyn ChainSigner,
        certificate: &ChainAddress,
    ) -> Result<TxSignature, ChainError> {
        self.send_instruction(
            signer,
            "certify_revokeCertificate",
            json!({ "certificate": certificate }),
        )
        .await
    }

    async fn get_global_state(&self) -> Result<Option<GlobalState>, ChainError> {
        self.call(
            "certify_getAccount",
            json!({ "address": derive_global_state_address() }),
        )
        .await
    }

    async fn get_institution(
        &self,
        address: &ChainAddress,
    ) -> Result<Option<InstitutionAccount>, ChainError> {
        self.call("certify_getAccount", json!({ "address": address }))
            .await
    }

    async fn get_certificate(
        &self,
        address: &ChainAddress,
    ) -> Result<Option<CertificateAccount>, ChainError> {
        self.call("certify_getAccount", json!({ "address": address }))
            .await
    }
}
