// src/storage/store.rs
//! Store abstraction over the relational backend.
//!
//! The service layer only sees these traits; the concrete backend is either
//! the hosted REST store ([`crate::storage::rest_store::RestStore`]) or the
//! in-memory store used by tests and dry runs.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::certificate::Certificate;
use crate::models::institution::Institution;

/// Errors surfaced by a certificate/institution store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure (connection refused, timeout, non-2xx status
    /// that isn't a constraint violation).
    #[error("store request failed: {0}")]
    Connection(String),

    /// The backend rejected a write because a unique constraint fired.
    /// `column` names the constrained column when the backend reports it.
    #[error("unique constraint violated on `{column}`")]
    UniqueViolation { column: String },

    /// The target row does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The backend answered with something we could not decode.
    #[error("malformed store response: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Whether this error is a unique violation on the certificate hash
    /// column specifically. The creation flow retries exactly once on this.
    pub fn is_hash_conflict(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { column } if column == "certificate_hash")
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Connection(e.to_string())
    }
}

/// Certificate table operations.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Probes for a certificate carrying exactly this stored hash.
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Certificate>, StoreError>;

    /// Fetches a certificate by its human-assigned id.
    async fn find_by_id(&self, certificate_id: &str) -> Result<Option<Certificate>, StoreError>;

    /// Inserts a new row, returning the stored representation.
    ///
    /// Must report [`StoreError::UniqueViolation`] when the hash or id
    /// constraint fires; the unique constraint here is the correctness
    /// mechanism for hash uniqueness, not the pre-insert probe.
    async fn insert(&self, certificate: &Certificate) -> Result<Certificate, StoreError>;

    /// Rewrites the stored hash of an existing row.
    async fn update_hash(&self, certificate_id: &str, new_hash: &str) -> Result<(), StoreError>;

    /// Marks a certificate revoked. One-way; there is no un-revoke.
    async fn set_revoked(&self, certificate_id: &str) -> Result<(), StoreError>;

    /// Increments the verification counter, returning the new value.
    async fn increment_verification_count(&self, certificate_id: &str)
        -> Result<u64, StoreError>;

    /// All certificates issued under the given authority key.
    async fn list_by_issuer(&self, issuer: &str) -> Result<Vec<Certificate>, StoreError>;

    /// Every certificate in the store. Used by batch remediation.
    async fn list_all(&self) -> Result<Vec<Certificate>, StoreError>;
}

/// Institution table operations.
#[async_trait]
pub trait InstitutionStore: Send + Sync {
    async fn insert_institution(&self, institution: &Institution) -> Result<Institution, StoreError>;

    async fn find_by_authority(&self, authority: &str) -> Result<Option<Institution>, StoreError>;

    /// Flips the verified flag. One-way.
    async fn set_verified(&self, authority: &str) -> Result<(), StoreError>;

    /// Bumps the issued-certificates counter after a successful issuance.
    async fn increment_certificates_issued(&self, authority: &str) -> Result<(), StoreError>;
}
