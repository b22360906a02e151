// src/chain/memory.rs
//! In-process stand-in for the deployed program.
//!
//! Enforces the same instruction rules the real program does (duplicate ids,
//! revoked records, authority checks) against hashmap-backed accounts. Used
//! when no RPC endpoint is configured, and throughout the test suites.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::chain::accounts::{CertificateAccount, GlobalState, InstitutionAccount};
use crate::chain::address::{
    derive_certificate_address, derive_institution_address, ChainAddress,
};
use crate::chain::client::{ChainError, ChainProgram, IssueCertificateParams, TxSignature};
use crate::chain::signer::ChainSigner;

#[derive(Default)]
struct MemoryChainState {
    global: Option<GlobalState>,
    institutions: HashMap<ChainAddress, InstitutionAccount>,
    certificates: HashMap<ChainAddress, CertificateAccount>,
    tx_counter: u64,
}

/// Hashmap-backed implementation of [`ChainProgram`].
#[derive(Default)]
pub struct MemoryChain {
    state: Mutex<MemoryChainState>,
}

impl MemoryChain {
    pub fn new() -> Self {
        MemoryChain::default()
    }

    fn next_signature(state: &mut MemoryChainState, label: &str) -> TxSignature {
        state.tx_counter += 1;
        let digest = Sha256::digest(format!("{}:{}", label, state.tx_counter).as_bytes());
        hex::encode(digest)
    }
}

#[async_trait]
impl ChainProgram for MemoryChain {
    async fn initialize(&self, _signer: &dyn ChainSigner) -> Result<TxSignature, ChainError> {
        let mut state = self.state.lock().unwrap();
        if state.global.is_some() {
            return Err(ChainError::ProgramRejected(
                "program already initialized".to_string(),
            ));
        }
        state.global = Some(GlobalState::default());
        Ok(Self::next_signature(&mut state, "initialize"))
    }

    async fn register_institution(
        &self,
        signer: &dyn ChainSigner,
        name: &str,
        location: &str,
    ) -> Result<TxSignature, ChainError> {
        let mut state = self.state.lock().unwrap();
        let address = derive_institution_address(&signer.authority());
        if state.institutions.contains_key(&address) {
            return Err(ChainError::ProgramRejected(
                "institution already registered".to_string(),
            ));
        }
        state.institutions.insert(
            address,
            InstitutionAccount {
                name: name.to_string(),
                location: location.to_string(),
                authority: signer.authority(),
                verified: false,
                certificates_issued: 0,
            },
        );
        if let Some(global) = state.global.as_mut() {
            global.institution_count += 1;
        }
        Ok(Self::next_signature(&mut state, "register_institution"))
    }

    async fn issue_certificate(
        &self,
        signer: &dyn ChainSigner,
        params: &IssueCertificateParams,
    ) -> Result<TxSignature, ChainError> {
        let mut state = self.state.lock().unwrap();
        let institution = derive_institution_address(&signer.authority());
        let address = derive_certificate_address(&institution, &params.certificate_id);
        if state.certificates.contains_key(&address) {
            return Err(ChainError::ProgramRejected(format!(
                "certificate id already exists: {}",
                params.certificate_id
            )));
        }
        state.certificates.insert(
            address,
            CertificateAccount {
                certificate_id: params.certificate_id.clone(),
                institution,
                student_name: params.student_name.clone(),
                course_name: params.course_name.clone(),
                certificate_hash: params.certificate_hash.clone(),
                revoked: false,
                issued_at: params.issued_at,
                verification_count: 0,
            },
        );
        if let Some(inst) = state.institutions.get_mut(&institution) {
            inst.certificates_issued += 1;
        }
        if let Some(global) = state.global.as_mut() {
            global.certificate_count += 1;
        }
        Ok(Self::next_signature(&mut state, "issue_certificate"))
    }

    async fn verify_certificate(
        &self,
        _signer: &dyn ChainSigner,
        certificate: &ChainAddress,
    ) -> Result<TxSignature, ChainError> {
        let mut state = self.state.lock().unwrap();
        let account = state
            .certificates
            .get_mut(certificate)
            .ok_or_else(|| ChainError::ProgramRejected("certificate not found".to_string()))?;
        if account.revoked {
            return Err(ChainError::ProgramRejected(
                "certificate is revoked".to_string(),
            ));
        }
        account.verification_count += 1;
        if let Some(global) = state.global.as_mut() {
            global.verification_count += 1;
        }
        Ok(Self::next_signature(&mut state, "verify_certificate"))
    }

    async fn revoke_certificate(
        &self,
        signer: &dyn ChainSigner,
        certificate: &ChainAddress,
    ) -> Result<TxSignature, ChainError> {
        let mut state = self.state.lock().unwrap();
        let caller_institution = derive_institution_address(&signer.authority());
        let account = state
            .certificates
            .get_mut(certificate)
            .ok_or_else(|| ChainError::ProgramRejected("certificate not found".to_string()))?;
        if account.institution != caller_institution {
            return Err(ChainError::ProgramRejected(
                "caller is not the issuing institution".to_string(),
            ));
        }
        if account.revoked {
            return Err(ChainError::ProgramRejected(
                "certificate already revoked".to_string(),
            ));
        }
        account.revoked = true;
        Ok(Self::next_signature(&mut state, "revoke_certificate"))
    }

    async fn get_global_state(&self) -> Result<Option<GlobalState>, ChainError> {
        Ok(self.state.lock().unwrap().global.clone())
    }

    async fn get_institution(
        &self,
        address: &ChainAddress,
    ) -> Result<Option<InstitutionAccount>, ChainError> {
        Ok(self.state.lock().unwrap().institutions.get(address).cloned())
    }

    async fn get_certificate(
        &self,
        address: &ChainAddress,
    ) -> Result<Option<CertificateAccount>, ChainError> {
        Ok(self.state.lock().unwrap().certificates.get(address).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::client::fetch_certificate_for;
    use crate::chain::signer::KeypairSigner;

    fn params(id: &str) -> IssueCertificateParams {
        IssueCertificateParams {
            certificate_id: id.to_string(),
            student_name: "Ada Lovelace".into(),
            course_name: "Analytical Engines".into(),
            certificate_hash: "0f".repeat(32),
            issued_at: 1_719_700_000,
        }
    }

    #[tokio::test]
    async fn initialize_is_once_only() {
        let chain = MemoryChain::new();
        let signer = KeypairSigner::random();
        chain.initialize(&signer).await.unwrap();
        assert!(matches!(
            chain.initialize(&signer).await,
            Err(ChainError::ProgramRejected(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_issue_is_rejected() {
        let chain = MemoryChain::new();
        let signer = KeypairSigner::random();
        chain.issue_certificate(&signer, &params("CERT-1")).await.unwrap();
        let err = chain
            .issue_certificate(&signer, &params("CERT-1"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::ProgramRejected(msg) if msg.contains("already exists")));
    }

    #[tokio::test]
    async fn verify_bumps_counter_and_rejects_revoked() {
        let chain = MemoryChain::new();
        let signer = KeypairSigner::random();
        chain.issue_certificate(&signer, &params("CERT-1")).await.unwrap();

        let institution = derive_institution_address(&signer.authority());
        let address = derive_certificate_address(&institution, "CERT-1");

        chain.verify_certificate(&signer, &address).await.unwrap();
        let account = chain.get_certificate(&address).await.unwrap().unwrap();
        assert_eq!(account.verification_count, 1);

        chain.revoke_certificate(&signer, &address).await.unwrap();
        assert!(chain.verify_certificate(&signer, &address).await.is_err());
    }

    #[tokio::test]
    async fn revoke_requires_issuing_authority() {
        let chain = MemoryChain::new();
        let issuer = KeypairSigner::random();
        let stranger = KeypairSigner::random();
        chain.issue_certificate(&issuer, &params("CERT-1")).await.unwrap();

        let institution = derive_institution_address(&issuer.authority());
        let address = derive_certificate_address(&institution, "CERT-1");

        let err = chain
            .revoke_certificate(&stranger, &address)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::ProgramRejected(msg) if msg.contains("not the issuing")));

        chain.revoke_certificate(&issuer, &address).await.unwrap();
        // Double revoke is a program-level rejection.
        assert!(chain.revoke_certificate(&issuer, &address).await.is_err());
    }

    #[tokio::test]
    async fn fetch_by_authority_and_id() {
        let chain = MemoryChain::new();
        let signer = KeypairSigner::random();
        chain.issue_certificate(&signer, &params("CERT-1")).await.unwrap();

        let found = fetch_certificate_for(&chain, &signer.authority(), "CERT-1")
            .await
            .unwrap();
        assert_eq!(found.unwrap().certificate_id, "CERT-1");

        let missing = fetch_certificate_for(&chain, &signer.authority(), "CERT-2")
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
