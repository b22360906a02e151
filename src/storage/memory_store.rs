// src/storage/memory_store.rs
//! In-memory store backed by hashmaps.
//!
//! Mirrors the REST store's observable behavior, including unique-constraint
//! reporting on `certificate_id` and `certificate_hash`. Used by the test
//! suites and by diagnostics dry runs; not a durable backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::certificate::Certificate;
use crate::models::institution::Institution;
use crate::storage::store::{CertificateStore, InstitutionStore, StoreError};

/// Hashmap-backed store with the same constraint semantics as the backend.
#[derive(Default)]
pub struct MemoryStore {
    certificates: Mutex<HashMap<String, Certificate>>,
    institutions: Mutex<HashMap<String, Institution>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of stored certificates.
    pub fn certificate_count(&self) -> usize {
        self.certificates.lock().unwrap().len()
    }
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Certificate>, StoreError> {
        let certs = self.certificates.lock().unwrap();
        Ok(certs.values().find(|c| c.certificate_hash == hash).cloned())
    }

    async fn find_by_id(&self, certificate_id: &str) -> Result<Option<Certificate>, StoreError> {
        let certs = self.certificates.lock().unwrap();
        Ok(certs.get(certificate_id).cloned())
    }

    async fn insert(&self, certificate: &Certificate) -> Result<Certificate, StoreError> {
        let mut certs = self.certificates.lock().unwrap();
        if certs.contains_key(&certificate.certificate_id) {
            return Err(StoreError::UniqueViolation {
                column: "certificate_id".to_string(),
            });
        }
        if certs
            .values()
            .any(|c| c.certificate_hash == certificate.certificate_hash)
        {
            return Err(StoreError::UniqueViolation {
                column: "certificate_hash".to_string(),
            });
        }
        certs.insert(certificate.certificate_id.clone(), certificate.clone());
        Ok(certificate.clone())
    }

    async fn update_hash(&self, certificate_id: &str, new_hash: &str) -> Result<(), StoreError> {
        let mut certs = self.certificates.lock().unwrap();
        if certs
            .values()
            .any(|c| c.certificate_id != certificate_id && c.certificate_hash == new_hash)
        {
            return Err(StoreError::UniqueViolation {
                column: "certificate_hash".to_string(),
            });
        }
        let cert = certs
            .get_mut(certificate_id)
            .ok_or_else(|| StoreError::NotFound(certificate_id.to_string()))?;
        cert.certificate_hash = new_hash.to_string();
        cert.updated_at = Utc::now();
        Ok(())
    }

    async fn set_revoked(&self, certificate_id: &str) -> Result<(), StoreError> {
        let mut certs = self.certificates.lock().unwrap();
        let cert = certs
            .get_mut(certificate_id)
            .ok_or_else(|| StoreError::NotFound(certificate_id.to_string()))?;
        cert.revoked = true;
        cert.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_verification_count(
        &self,
        certificate_id: &str,
    ) -> Result<u64, StoreError> {
        let mut certs = self.certificates.lock().unwrap();
        let cert = certs
            .get_mut(certificate_id)
            .ok_or_else(|| StoreError::NotFound(certificate_id.to_string()))?;
        cert.verification_count += 1;
        cert.updated_at = Utc::now();
        Ok(cert.verification_count)
    }

    async fn list_by_issuer(&self, issuer: &str) -> Result<Vec<Certificate>, StoreError> {
        let certs = self.certificates.lock().unwrap();
        let mut out: Vec<Certificate> =
            certs.values().filter(|c| c.issuer == issuer).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn list_all(&self) -> Result<Vec<Certificate>, StoreError> {
        let certs = self.certificates.lock().unwrap();
        let mut out: Vec<Certificate> = certs.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }
}

#[async_trait]
impl InstitutionStore for MemoryStore {
    async fn insert_institution(
        &self,
        institution: &Institution,
    ) -> Result<Institution, StoreError> {
        let mut insts = self.institutions.lock().unwrap();
        if insts.contains_key(&institution.authority) {
            return Err(StoreError::UniqueViolation {
                column: "authority".to_string(),
            });
        }
        insts.insert(institution.authority.clone(), institution.clone());
        Ok(institution.clone())
    }

    async fn find_by_authority(&self, authority: &str) -> Result<Option<Institution>, StoreError> {
        let insts = self.institutions.lock().unwrap();
        Ok(insts.get(authority).cloned())
    }

    async fn set_verified(&self, authority: &str) -> Result<(), StoreError> {
        let mut insts = self.institutions.lock().unwrap();
        let inst = insts
            .get_mut(authority)
            .ok_or_else(|| StoreError::NotFound(authority.to_string()))?;
        inst.verified = true;
        Ok(())
    }

    async fn increment_certificates_issued(&self, authority: &str) -> Result<(), StoreError> {
        let mut insts = self.institutions.lock().unwrap();
        let inst = insts
            .get_mut(authority)
            .ok_or_else(|| StoreError::NotFound(authority.to_string()))?;
        inst.certificates_issued += 1;
        Ok(())
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Raw hash write bypassing the uniqueness check, to recreate legacy
    /// collided rows in tests.
    pub(crate) fn force_hash(&self, certificate_id: &str, hash: &str) {
        let mut certs = self.certificates.lock().unwrap();
        if let Some(cert) = certs.get_mut(certificate_id) {
            cert.certificate_hash = hash.to_string();
        }
    }
}
