// src/services/certificate_service.rs
//! Unified certificate service.
//!
//! Orchestrates the two backing systems: the relational store first, then the
//! on-chain mirror. The two writes are not atomic and there is no rollback —
//! a chain failure after a successful insert leaves the row flagged with a
//! pending marker and the result reports partial success. The sync routine
//! later repairs chain-missing certificates, with the database as source of
//! truth.

use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;

use crate::chain::address::ChainAddress;
use crate::chain::transaction_manager::TransactionManager;
use crate::models::certificate::{Certificate, PENDING_CHAIN_SUFFIX};
use crate::models::institution::Institution;
use crate::services::hash_conflicts::generate_unique_hash;
use crate::storage::store::{CertificateStore, InstitutionStore, StoreError};
use crate::utils::hash::{is_valid_hash_format, CertificateFields};
use crate::utils::validation::{
    validate_issue_date, validate_name, validate_required, validate_wallet, ValidationError,
};

/// Which of the two backing systems accepted a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartialSuccess {
    pub database: bool,
    pub chain: bool,
}

/// Result of a certificate creation attempt.
#[derive(Debug, Clone, Serialize)]
pub struct CreateCertificateResult {
    pub success: bool,
    pub certificate: Option<Certificate>,
    /// Chain transaction signature, when the mirror write went through.
    pub signature: Option<String>,
    pub hash: Option<String>,
    /// Set when exactly one backing system accepted the write.
    pub partial: Option<PartialSuccess>,
    pub error: Option<String>,
}

impl CreateCertificateResult {
    fn failure(error: impl Into<String>) -> Self {
        CreateCertificateResult {
            success: false,
            certificate: None,
            signature: None,
            hash: None,
            partial: None,
            error: Some(error.into()),
        }
    }
}

/// Result of a verification lookup.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub certificate: Option<Certificate>,
    /// Whether the on-chain copy could be consulted at all.
    pub chain_checked: bool,
    /// On-chain validity, when `chain_checked`.
    pub chain_valid: Option<bool>,
    /// Caller-supplied hash compared byte-for-byte against the chain copy.
    pub hash_matches: Option<bool>,
    pub message: String,
}

impl VerificationResult {
    fn invalid(message: impl Into<String>, certificate: Option<Certificate>) -> Self {
        VerificationResult {
            is_valid: false,
            certificate,
            chain_checked: false,
            chain_valid: None,
            hash_matches: None,
            message: message.into(),
        }
    }
}

/// Result of revoking a certificate across both systems.
#[derive(Debug, Clone, Serialize)]
pub struct RevokeResult {
    pub success: bool,
    pub partial: Option<PartialSuccess>,
    pub error: Option<String>,
}

/// Result of registering an institution across both systems.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterInstitutionResult {
    pub success: bool,
    pub institution: Option<Institution>,
    pub signature: Option<String>,
    pub partial: Option<PartialSuccess>,
    pub error: Option<String>,
}

/// Report from a one-directional database→chain repair pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
    pub checked: usize,
    pub reissued: Vec<String>,
    pub revocation_mismatches: Vec<String>,
    pub failures: Vec<String>,
}

/// Input for certificate creation, validated before any I/O.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateCertificateRequest {
    pub certificate_id: String,
    pub student_name: String,
    pub roll_number: String,
    pub course_name: String,
    pub grade: String,
    pub institution_name: String,
    pub student_wallet: String,
    /// ISO date (YYYY-MM-DD).
    pub issue_date: String,
}

impl CreateCertificateRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("certificate_id", &self.certificate_id)?;
        validate_name("student_name", &self.student_name)?;
        validate_required("roll_number", &self.roll_number)?;
        validate_name("course_name", &self.course_name)?;
        validate_required("grade", &self.grade)?;
        validate_name("institution_name", &self.institution_name)?;
        validate_wallet("student_wallet", &self.student_wallet)?;
        validate_issue_date("issue_date", &self.issue_date)?;
        Ok(())
    }

    fn fields(&self) -> CertificateFields {
        CertificateFields {
            student_name: self.student_name.clone(),
            roll_number: self.roll_number.clone(),
            course_name: self.course_name.clone(),
            grade: self.grade.clone(),
            institution_name: self.institution_name.clone(),
            certificate_id: self.certificate_id.clone(),
        }
    }
}

/// Orchestrates certificate lifecycle across the store and the chain.
pub struct CertificateService {
    store: Arc<dyn CertificateStore>,
    institutions: Arc<dyn InstitutionStore>,
    chain: Arc<TransactionManager>,
    /// Authority the service issues under (the signer's identity when one is
    /// configured).
    issuer: ChainAddress,
}

impl CertificateService {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        institutions: Arc<dyn InstitutionStore>,
        chain: Arc<TransactionManager>,
        issuer: ChainAddress,
    ) -> Self {
        CertificateService {
            store,
            institutions,
            chain,
            issuer,
        }
    }

    pub fn issuer(&self) -> &ChainAddress {
        &self.issuer
    }

    /// The underlying chain transaction manager (read paths need it too).
    pub fn chain_manager(&self) -> &TransactionManager {
        &self.chain
    }

    /// Creates a certificate: database first, then the chain mirror.
    ///
    /// Ordered steps:
    /// 1. validate the request (no I/O before this passes);
    /// 2. generate a uniqueness-probed salted hash;
    /// 3. insert the row — on a hash unique-constraint violation regenerate
    ///    once with a forced fresh salt and retry the insert exactly once;
    /// 4. mirror on chain when a signer is configured — on failure the row is
    ///    kept, its hash suffixed with the pending marker, and the result
    ///    reports partial success.
    pub async fn create_certificate(
        &self,
        request: &CreateCertificateRequest,
    ) -> CreateCertificateResult {
        if let Err(e) = request.validate() {
            return CreateCertificateResult::failure(e.to_string());
        }

        let fields = request.fields();
        let hash = match generate_unique_hash(self.store.as_ref(), &fields, false).await {
            Ok(h) => h,
            Err(e) => return CreateCertificateResult::failure(format!("hash generation failed: {}", e)),
        };

        let record = self.build_record(request, &hash);
        let stored = match self.insert_with_hash_retry(record, &fields).await {
            Ok(c) => c,
            Err(e) => return CreateCertificateResult::failure(format!("database insert failed: {}", e)),
        };
        let final_hash = stored.certificate_hash.clone();

        if !self.chain.has_signer() {
            // Database-only deployment; nothing to mirror.
            return CreateCertificateResult {
                success: true,
                certificate: Some(stored),
                signature: None,
                hash: Some(final_hash),
                partial: None,
                error: None,
            };
        }

        match self.chain.issue_certificate(&stored).await {
            Ok(tx) if tx.success => {
                if let Err(e) = self
                    .institutions
                    .increment_certificates_issued(&self.issuer.to_string())
                    .await
                {
                    warn!("issued-counter bump failed: {}", e);
                }
                CreateCertificateResult {
                    success: true,
                    certificate: Some(stored),
                    signature: tx.signature,
                    hash: Some(final_hash),
                    partial: None,
                    error: None,
                }
            }
            Ok(tx) => {
                let result = self.flag_chain_pending(stored, &final_hash).await;
                CreateCertificateResult {
                    error: tx.error.or_else(|| Some("chain write failed".to_string())),
                    ..result
                }
            }
            Err(e) => {
                let result = self.flag_chain_pending(stored, &final_hash).await;
                CreateCertificateResult {
                    error: Some(e.to_string()),
                    ..result
                }
            }
        }
    }

    /// Creates a batch of certificates sequentially.
    ///
    /// One invalid request does not abort the rest; the result vector always
    /// has one entry per input, in order. When a signer is held, the
    /// configured batch delay paces the chain writes.
    pub async fn create_certificates(
        &self,
        requests: &[CreateCertificateRequest],
    ) -> Vec<CreateCertificateResult> {
        let delay = self.chain.batch_delay();
        let mut results = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            if i > 0 && self.chain.has_signer() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            results.push(self.create_certificate(request).await);
        }
        results
    }

    /// Verifies a certificate by id.
    ///
    /// Database-first: a missing or revoked row fails immediately, without
    /// any chain call. Otherwise the on-chain copy is cross-checked when
    /// reachable; chain absence degrades to database-only trust. A
    /// caller-provided hash is compared byte-for-byte against the on-chain
    /// hash. The verification counter increments on every read-verification
    /// of an existing row, valid or not.
    pub async fn verify_certificate(
        &self,
        certificate_id: &str,
        provided_hash: Option<&str>,
    ) -> VerificationResult {
        let record = match self.store.find_by_id(certificate_id).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                return VerificationResult::invalid(
                    format!("certificate {} not found", certificate_id),
                    None,
                )
            }
            Err(e) => {
                return VerificationResult::invalid(format!("database lookup failed: {}", e), None)
            }
        };

        if let Err(e) = self
            .store
            .increment_verification_count(certificate_id)
            .await
        {
            warn!("verification counter bump failed for {}: {}", certificate_id, e);
        }

        if record.revoked {
            return VerificationResult::invalid("certificate has been revoked", Some(record));
        }

        if let Some(provided) = provided_hash {
            if !is_valid_hash_format(provided) {
                return VerificationResult::invalid(
                    "provided hash is not a 64-character hex string",
                    Some(record),
                );
            }
        }

        let issuer: ChainAddress = match record.issuer.parse() {
            Ok(a) => a,
            Err(_) => {
                // Unparseable issuer key: chain cross-check impossible.
                return VerificationResult {
                    is_valid: true,
                    certificate: Some(record),
                    chain_checked: false,
                    chain_valid: None,
                    hash_matches: None,
                    message: "valid in database; issuer key unusable for chain check".to_string(),
                };
            }
        };

        match self.chain.fetch_certificate(&issuer, certificate_id).await {
            Ok(Some(account)) => {
                if self.chain.has_signer() {
                    // Best effort: the program keeps its own verification
                    // counters. A rejection never affects the result.
                    match self.chain.verify_certificate(&issuer, certificate_id).await {
                        Ok(tx) if tx.success => {}
                        Ok(tx) => warn!(
                            "on-chain verification record rejected for {}: {}",
                            certificate_id,
                            tx.error.as_deref().unwrap_or("unknown error")
                        ),
                        Err(e) => warn!(
                            "on-chain verification record failed for {}: {}",
                            certificate_id, e
                        ),
                    }
                }
                let hash_matches =
                    provided_hash.map(|p| p.to_ascii_lowercase() == account.certificate_hash);
                let chain_valid =
                    !account.revoked && account.certificate_hash == record.base_hash();
                let is_valid = chain_valid && hash_matches != Some(false);
                let message = if is_valid {
                    "certificate is valid in database and on chain".to_string()
                } else if hash_matches == Some(false) {
                    "provided hash does not match the on-chain record".to_string()
                } else {
                    "on-chain record disagrees with the database copy".to_string()
                };
                VerificationResult {
                    is_valid,
                    certificate: Some(record),
                    chain_checked: true,
                    chain_valid: Some(chain_valid),
                    hash_matches,
                    message,
                }
            }
            Ok(None) => VerificationResult {
                // No chain copy (pending mirror or chainless deployment):
                // degrade to database-only trust.
                is_valid: true,
                certificate: Some(record),
                chain_checked: true,
                chain_valid: None,
                hash_matches: None,
                message: "valid in database; no on-chain copy found".to_string(),
            },
            Err(e) => {
                warn!("chain lookup failed for {}: {}", certificate_id, e);
                VerificationResult {
                    is_valid: true,
                    certificate: Some(record),
                    chain_checked: false,
                    chain_valid: None,
                    hash_matches: None,
                    message: "valid in database; chain unreachable".to_string(),
                }
            }
        }
    }

    /// Revokes a certificate in the database and on chain.
    ///
    /// The database flag flips first; a chain failure afterwards yields a
    /// partial result. Revocation is one-way.
    pub async fn revoke_certificate(&self, certificate_id: &str) -> RevokeResult {
        match self.store.find_by_id(certificate_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return RevokeResult {
                    success: false,
                    partial: None,
                    error: Some(format!("certificate {} not found", certificate_id)),
                }
            }
            Err(e) => {
                return RevokeResult {
                    success: false,
                    partial: None,
                    error: Some(format!("database lookup failed: {}", e)),
                }
            }
        }

        if let Err(e) = self.store.set_revoked(certificate_id).await {
            return RevokeResult {
                success: false,
                partial: None,
                error: Some(format!("database revoke failed: {}", e)),
            };
        }

        if !self.chain.has_signer() {
            return RevokeResult {
                success: true,
                partial: None,
                error: None,
            };
        }

        match self.chain.revoke_certificate(certificate_id).await {
            Ok(tx) if tx.success => RevokeResult {
                success: true,
                partial: None,
                error: None,
            },
            Ok(tx) => RevokeResult {
                success: false,
                partial: Some(PartialSuccess {
                    database: true,
                    chain: false,
                }),
                error: tx.error,
            },
            Err(e) => RevokeResult {
                success: false,
                partial: Some(PartialSuccess {
                    database: true,
                    chain: false,
                }),
                error: Some(e.to_string()),
            },
        }
    }

    /// Registers an institution in the database and on chain.
    pub async fn register_institution(
        &self,
        name: &str,
        location: &str,
    ) -> RegisterInstitutionResult {
        if let Err(e) = validate_name("name", name) {
            return RegisterInstitutionResult {
                success: false,
                institution: None,
                signature: None,
                partial: None,
                error: Some(e.to_string()),
            };
        }

        let institution = Institution::new(name, location, self.issuer.to_string());
        let stored = match self.institutions.insert_institution(&institution).await {
            Ok(i) => i,
            Err(e) => {
                return RegisterInstitutionResult {
                    success: false,
                    institution: None,
                    signature: None,
                    partial: None,
                    error: Some(format!("database insert failed: {}", e)),
                }
            }
        };

        if !self.chain.has_signer() {
            return RegisterInstitutionResult {
                success: true,
                institution: Some(stored),
                signature: None,
                partial: None,
                error: None,
            };
        }

        match self.chain.register_institution(name, location).await {
            Ok(tx) if tx.success => RegisterInstitutionResult {
                success: true,
                institution: Some(stored),
                signature: tx.signature,
                partial: None,
                error: None,
            },
            Ok(tx) => RegisterInstitutionResult {
                success: false,
                institution: Some(stored),
                signature: None,
                partial: Some(PartialSuccess {
                    database: true,
                    chain: false,
                }),
                error: tx.error,
            },
            Err(e) => RegisterInstitutionResult {
                success: false,
                institution: Some(stored),
                signature: None,
                partial: Some(PartialSuccess {
                    database: true,
                    chain: false,
                }),
                error: Some(e.to_string()),
            },
        }
    }

    /// Flips an institution's verified flag. One-way, and reserved for a
    /// privileged caller; the API layer gates it behind the admin allowlist.
    pub async fn verify_institution(&self, authority: &str) -> Result<(), StoreError> {
        self.institutions.set_verified(authority).await
    }

    /// One-directional repair: every database certificate issued by this
    /// service's authority that is missing on chain is re-issued there.
    /// Revoked-flag divergence is reported, never auto-resolved.
    pub async fn sync_certificates(&self) -> Result<SyncReport, StoreError> {
        let certificates = self.store.list_by_issuer(&self.issuer.to_string()).await?;
        let delay = self.chain.batch_delay();
        let mut report = SyncReport::default();

        for (i, record) in certificates.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            report.checked += 1;
            let on_chain = match self
                .chain
                .fetch_certificate(&self.issuer, &record.certificate_id)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    report
                        .failures
                        .push(format!("{}: chain read failed: {}", record.certificate_id, e));
                    continue;
                }
            };

            match on_chain {
                None => match self.reissue_on_chain(record).await {
                    Ok(()) => report.reissued.push(record.certificate_id.clone()),
                    Err(msg) => {
                        report
                            .failures
                            .push(format!("{}: {}", record.certificate_id, msg));
                    }
                },
                Some(account) if account.revoked != record.revoked => {
                    report
                        .revocation_mismatches
                        .push(record.certificate_id.clone());
                }
                Some(_) => {}
            }
        }

        info!(
            "sync complete: {} checked, {} reissued, {} mismatches, {} failures",
            report.checked,
            report.reissued.len(),
            report.revocation_mismatches.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn build_record(&self, request: &CreateCertificateRequest, hash: &str) -> Certificate {
        let now = Utc::now();
        Certificate {
            certificate_id: request.certificate_id.clone(),
            student_name: request.student_name.clone(),
            roll_number: request.roll_number.clone(),
            course_name: request.course_name.clone(),
            grade: request.grade.clone(),
            institution_name: request.institution_name.clone(),
            issuer: self.issuer.to_string(),
            student_wallet: request.student_wallet.clone(),
            issue_date: request.issue_date.clone(),
            certificate_hash: hash.to_string(),
            revoked: false,
            verification_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Inserts the row, retrying exactly once on a hash unique violation
    /// with a freshly forced salt. Any second failure is terminal.
    async fn insert_with_hash_retry(
        &self,
        mut record: Certificate,
        fields: &CertificateFields,
    ) -> Result<Certificate, StoreError> {
        match self.store.insert(&record).await {
            Ok(stored) => Ok(stored),
            Err(e) if e.is_hash_conflict() => {
                warn!(
                    "hash constraint fired for {}; regenerating once",
                    record.certificate_id
                );
                record.certificate_hash =
                    generate_unique_hash(self.store.as_ref(), fields, true).await?;
                self.store.insert(&record).await
            }
            Err(e) => Err(e),
        }
    }

    /// Marks the stored row as awaiting its chain mirror and reports partial
    /// success. The row is never rolled back.
    async fn flag_chain_pending(
        &self,
        mut stored: Certificate,
        hash: &str,
    ) -> CreateCertificateResult {
        let pending_hash = format!("{}{}", hash, PENDING_CHAIN_SUFFIX);
        if let Err(e) = self
            .store
            .update_hash(&stored.certificate_id, &pending_hash)
            .await
        {
            error!(
                "failed to flag {} as chain-pending: {}",
                stored.certificate_id, e
            );
        } else {
            stored.certificate_hash = pending_hash;
        }
        CreateCertificateResult {
            success: false,
            certificate: Some(stored),
            signature: None,
            hash: Some(hash.to_string()),
            partial: Some(PartialSuccess {
                database: true,
                chain: false,
            }),
            error: None,
        }
    }

    /// Re-issues a database certificate on chain, stripping any pending
    /// marker from the stored hash once the mirror exists.
    async fn reissue_on_chain(&self, record: &Certificate) -> Result<(), String> {
        let tx = self
            .chain
            .issue_certificate(record)
            .await
            .map_err(|e| e.to_string())?;
        if !tx.success {
            return Err(tx.error.unwrap_or_else(|| "chain issue failed".to_string()));
        }
        if record.chain_pending() {
            if let Err(e) = self
                .store
                .update_hash(&record.certificate_id, record.base_hash())
                .await
            {
                warn!(
                    "chain mirror repaired but pending marker not cleared for {}: {}",
                    record.certificate_id, e
                );
            }
        }
        Ok(())
    }
}
