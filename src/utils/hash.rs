// src/utils/hash.rs
//! Certificate fingerprint hashing.
//!
//! Every certificate carries a SHA-256 fingerprint binding its fields together.
//! Two flavors exist:
//! - a *salted* hash (with a timestamp) stored in the database, required to be
//!   globally unique across all certificates;
//! - a *deterministic* hash (no salt, no timestamp) that anyone holding the
//!   plaintext fields can recompute and compare.
//!
//! All hashes are 64 lowercase hex characters on the wire.

use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Salt length (in bytes) for ordinary hash generation.
pub const DEFAULT_SALT_BYTES: usize = 16;

/// Salt length used as a last resort after repeated collisions.
pub const FALLBACK_SALT_BYTES: usize = 32;

/// The ordered field set bound by a certificate hash.
///
/// Field order is part of the on-wire contract: the fields are joined with a
/// `|` separator in exactly this order before hashing, so reordering them
/// changes every fingerprint in the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFields {
    pub student_name: String,
    pub roll_number: String,
    pub course_name: String,
    pub grade: String,
    pub institution_name: String,
    pub certificate_id: String,
}

impl CertificateFields {
    /// Joins the fields with the pipe separator in canonical order.
    fn joined(&self) -> String {
        [
            self.student_name.as_str(),
            self.roll_number.as_str(),
            self.course_name.as_str(),
            self.grade.as_str(),
            self.institution_name.as_str(),
            self.certificate_id.as_str(),
        ]
        .join("|")
    }
}

/// Draws a fresh random salt of `bytes` length, hex-encoded.
pub fn random_salt(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Generates a salted certificate hash.
///
/// Concatenates the pipe-joined fields, the salt (supplied, or freshly drawn
/// when `None`) and a millisecond timestamp, and returns the SHA-256 digest as
/// 64 lowercase hex characters.
///
/// Because of the salt and timestamp this is NOT reproducible; use
/// [`generate_deterministic_hash`] for verification by recomputation.
pub fn generate_hash(fields: &CertificateFields, salt: Option<&str>) -> String {
    let salt = match salt {
        Some(s) => s.to_string(),
        None => random_salt(DEFAULT_SALT_BYTES),
    };
    let input = format!(
        "{}|{}|{}",
        fields.joined(),
        salt,
        Utc::now().timestamp_millis()
    );
    sha256_hex(&input)
}

/// Generates the unsalted, timestamp-free hash of a certificate's fields.
///
/// Pure: the same fields always produce the same digest. Note that two
/// certificates sharing every field (e.g. an identical re-issue) collide here
/// even though their stored salted hashes differ.
pub fn generate_deterministic_hash(fields: &CertificateFields) -> String {
    sha256_hex(&fields.joined())
}

/// Checks that a string is a well-formed certificate hash: exactly 64 hex
/// characters, case-insensitive.
pub fn is_valid_hash_format(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Recomputes the deterministic hash of `fields` and compares it against
/// `expected` (case-insensitively).
pub fn verify_certificate_hash(fields: &CertificateFields, expected: &str) -> bool {
    is_valid_hash_format(expected)
        && generate_deterministic_hash(fields) == expected.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> CertificateFields {
        CertificateFields {
            student_name: "Ada Lovelace".to_string(),
            roll_number: "CS-1815".to_string(),
            course_name: "Analytical Engines".to_string(),
            grade: "A+".to_string(),
            institution_name: "Babbage Institute".to_string(),
            certificate_id: "CERT-001".to_string(),
        }
    }

    #[test]
    fn deterministic_hash_is_stable() {
        let fields = sample_fields();
        let a = generate_deterministic_hash(&fields);
        let b = generate_deterministic_hash(&fields);
        assert_eq!(a, b);
        assert!(is_valid_hash_format(&a));
    }

    #[test]
    fn deterministic_hash_changes_with_any_field() {
        let fields = sample_fields();
        let base = generate_deterministic_hash(&fields);

        let mut changed = fields.clone();
        changed.grade = "B".to_string();
        assert_ne!(base, generate_deterministic_hash(&changed));

        let mut changed = fields;
        changed.certificate_id = "CERT-002".to_string();
        assert_ne!(base, generate_deterministic_hash(&changed));
    }

    #[test]
    fn salted_hash_is_well_formed() {
        let fields = sample_fields();
        let hash = generate_hash(&fields, None);
        assert!(is_valid_hash_format(&hash));

        let hash = generate_hash(&fields, Some("fixed-salt"));
        assert!(is_valid_hash_format(&hash));
    }

    #[test]
    fn salted_hashes_differ_across_salts() {
        let fields = sample_fields();
        let a = generate_hash(&fields, Some(&random_salt(DEFAULT_SALT_BYTES)));
        let b = generate_hash(&fields, Some(&random_salt(DEFAULT_SALT_BYTES)));
        assert_ne!(a, b);
    }

    #[test]
    fn verify_round_trip() {
        let fields = sample_fields();
        let hash = generate_deterministic_hash(&fields);
        assert!(verify_certificate_hash(&fields, &hash));
        assert!(verify_certificate_hash(&fields, &hash.to_ascii_uppercase()));

        let mut other = sample_fields();
        other.student_name = "Charles Babbage".to_string();
        assert!(!verify_certificate_hash(&other, &hash));
    }

    #[test]
    fn hash_format_validation() {
        assert!(is_valid_hash_format(&"a".repeat(64)));
        assert!(is_valid_hash_format(&"A".repeat(64)));
        assert!(!is_valid_hash_format(&"a".repeat(63)));
        assert!(!is_valid_hash_format(&"a".repeat(65)));
        assert!(!is_valid_hash_format(&"g".repeat(64)));
        assert!(!is_valid_hash_format(""));
    }

    #[test]
    fn random_salt_length() {
        assert_eq!(random_salt(DEFAULT_SALT_BYTES).len(), DEFAULT_SALT_BYTES * 2);
        assert_eq!(
            random_salt(FALLBACK_SALT_BYTES).len(),
            FALLBACK_SALT_BYTES * 2
        );
    }
}
