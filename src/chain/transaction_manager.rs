// src/chain/transaction_manager.rs
//! Chain transaction manager.
//!
//! Thin orchestration over [`ChainProgram`]: derives account addresses from
//! (authority, certificate id), folds every chain failure into a
//! [`ChainTxResult`] with a human-readable error, and never raises across its
//! boundary except when no signing capability is held.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::chain::accounts::CertificateAccount;
use crate::chain::address::{
    derive_certificate_address, derive_institution_address, ChainAddress,
};
use crate::chain::client::{
    ChainError, ChainProgram, IssueCertificateParams, TxSignature,
};
use crate::chain::signer::ChainSigner;
use crate::models::certificate::Certificate;

/// Outcome of a single chain operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTxResult {
    pub success: bool,
    pub signature: Option<TxSignature>,
    pub error: Option<String>,
}

impl ChainTxResult {
    fn ok(signature: TxSignature) -> Self {
        ChainTxResult {
            success: true,
            signature: Some(signature),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        ChainTxResult {
            success: false,
            signature: None,
            error: Some(error.into()),
        }
    }

    fn from_chain(result: Result<TxSignature, ChainError>) -> Self {
        match result {
            Ok(sig) => ChainTxResult::ok(sig),
            Err(e) => ChainTxResult::failed(e.to_string()),
        }
    }
}

/// Manager for the program's issue / verify / revoke instructions.
pub struct TransactionManager {
    program: Arc<dyn ChainProgram>,
    signer: Option<Arc<dyn ChainSigner>>,
    /// Pause between operations in a batch, to stay under RPC rate limits.
    batch_delay: Duration,
}

impl TransactionManager {
    pub fn new(
        program: Arc<dyn ChainProgram>,
        signer: Option<Arc<dyn ChainSigner>>,
        batch_delay: Duration,
    ) -> Self {
        TransactionManager {
            program,
            signer,
            batch_delay,
        }
    }

    /// Whether a chain-writing capability is configured.
    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    /// The configured authority key, if any.
    pub fn authority(&self) -> Option<ChainAddress> {
        self.signer.as_ref().map(|s| s.authority())
    }

    /// The configured pause between chain operations in a batch.
    pub fn batch_delay(&self) -> Duration {
        self.batch_delay
    }

    fn require_signer(&self) -> Result<&Arc<dyn ChainSigner>, ChainError> {
        self.signer.as_ref().ok_or(ChainError::NoSigner)
    }

    /// Registers the held authority as an institution.
    pub async fn register_institution(
        &self,
        name: &str,
        location: &str,
    ) -> Result<ChainTxResult, ChainError> {
        let signer = self.require_signer()?;
        Ok(ChainTxResult::from_chain(
            self.program
                .register_institution(signer.as_ref(), name, location)
                .await,
        ))
    }

    /// Mirrors a certificate record on chain.
    ///
    /// The record's base hash (pending marker stripped) is what lands in the
    /// certificate account.
    pub async fn issue_certificate(
        &self,
        certificate: &Certificate,
    ) -> Result<ChainTxResult, ChainError> {
        let signer = self.require_signer()?;
        let params = IssueCertificateParams {
            certificate_id: certificate.certificate_id.clone(),
            student_name: certificate.student_name.clone(),
            course_name: certificate.course_name.clone(),
            certificate_hash: certificate.base_hash().to_string(),
            issued_at: certificate.created_at.timestamp(),
        };
        let result = self.program.issue_certificate(signer.as_ref(), &params).await;
        if let Ok(sig) = &result {
            info!(
                "issued certificate {} on chain (tx {})",
                certificate.certificate_id, sig
            );
        }
        Ok(ChainTxResult::from_chain(result))
    }

    /// Records a verification against the on-chain copy (bumps its counter).
    pub async fn verify_certificate(
        &self,
        issuer: &ChainAddress,
        certificate_id: &str,
    ) -> Result<ChainTxResult, ChainError> {
        let signer = self.require_signer()?;
        let institution = derive_institution_address(issuer);
        let address = derive_certificate_address(&institution, certificate_id);
        Ok(ChainTxResult::from_chain(
            self.program.verify_certificate(signer.as_ref(), &address).await,
        ))
    }

    /// Revokes the on-chain copy of a certificate issued by the held
    /// authority.
    pub async fn revoke_certificate(
        &self,
        certificate_id: &str,
    ) -> Result<ChainTxResult, ChainError> {
        let signer = self.require_signer()?;
        let institution = derive_institution_address(&signer.authority());
        let address = derive_certificate_address(&institution, certificate_id);
        Ok(ChainTxResult::from_chain(
            self.program.revoke_certificate(signer.as_ref(), &address).await,
        ))
    }

    /// Read-only fetch of the on-chain certificate account. Needs no signer.
    pub async fn fetch_certificate(
        &self,
        issuer: &ChainAddress,
        certificate_id: &str,
    ) -> Result<Option<CertificateAccount>, ChainError> {
        let institution = derive_institution_address(issuer);
        let address = derive_certificate_address(&institution, certificate_id);
        self.program.get_certificate(&address).await
    }

    /// Issues a batch of certificates sequentially.
    ///
    /// A failed operation does not abort the batch and earlier successes are
    /// not rolled back; the result vector always has one entry per input, in
    /// order.
    pub async fn issue_batch(
        &self,
        certificates: &[Certificate],
    ) -> Result<Vec<ChainTxResult>, ChainError> {
        self.require_signer()?;
        let mut results = Vec::with_capacity(certificates.len());
        for (i, certificate) in certificates.iter().enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            let result = self.issue_certificate(certificate).await?;
            if !result.success {
                warn!(
                    "batch issue failed for {}: {}",
                    certificate.certificate_id,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }
        Ok(results)
    }
}
