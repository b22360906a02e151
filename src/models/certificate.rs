// src/models/certificate.rs
//! Certificate record as stored in the `certificates` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::hash::CertificateFields;

/// Suffix appended to a certificate's stored hash when the database write
/// succeeded but the chain mirror did not. The sync routine strips it once the
/// chain copy is repaired.
pub const PENDING_CHAIN_SUFFIX: &str = "_pending_chain";

/// A certificate row.
///
/// Identity is the human-assigned `certificate_id`, unique within an
/// institution. `certificate_hash` must additionally be unique across the
/// whole store; the database constraint is the source of truth for that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Certificate {
    pub certificate_id: String,
    pub student_name: String,
    pub roll_number: String,
    pub course_name: String,
    pub grade: String,
    pub institution_name: String,
    /// Authority key of the issuing institution (hex).
    pub issuer: String,
    /// Student's wallet identifier (hex, optionally 0x-prefixed).
    pub student_wallet: String,
    /// ISO date (YYYY-MM-DD).
    pub issue_date: String,
    /// 64 hex chars, possibly carrying [`PENDING_CHAIN_SUFFIX`].
    pub certificate_hash: String,
    pub revoked: bool,
    pub verification_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    /// The hash-bound field set of this certificate, in canonical order.
    pub fn fields(&self) -> CertificateFields {
        CertificateFields {
            student_name: self.student_name.clone(),
            roll_number: self.roll_number.clone(),
            course_name: self.course_name.clone(),
            grade: self.grade.clone(),
            institution_name: self.institution_name.clone(),
            certificate_id: self.certificate_id.clone(),
        }
    }

    /// The stored hash with any pending-chain marker stripped.
    pub fn base_hash(&self) -> &str {
        self.certificate_hash
            .strip_suffix(PENDING_CHAIN_SUFFIX)
            .unwrap_or(&self.certificate_hash)
    }

    /// Whether the chain mirror of this certificate is still outstanding.
    pub fn chain_pending(&self) -> bool {
        self.certificate_hash.ends_with(PENDING_CHAIN_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Certificate {
        Certificate {
            certificate_id: "CERT-1".into(),
            student_name: "Ada Lovelace".into(),
            roll_number: "CS-1815".into(),
            course_name: "Analytical Engines".into(),
            grade: "A+".into(),
            institution_name: "Babbage Institute".into(),
            issuer: "ab".repeat(32),
            student_wallet: "cd".repeat(32),
            issue_date: "2024-06-30".into(),
            certificate_hash: "0f".repeat(32),
            revoked: false,
            verification_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn base_hash_strips_pending_marker() {
        let mut cert = sample();
        let clean = cert.certificate_hash.clone();
        assert_eq!(cert.base_hash(), clean);
        assert!(!cert.chain_pending());

        cert.certificate_hash = format!("{}{}", clean, PENDING_CHAIN_SUFFIX);
        assert_eq!(cert.base_hash(), clean);
        assert!(cert.chain_pending());
    }
}
