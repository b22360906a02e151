// src/utils/validation.rs
//! Input validation for certificate and institution requests.
//!
//! All validation runs before any I/O: a request that fails here never touches
//! the database or the chain.

use thiserror::Error;

/// A request field that failed validation, with a human-readable reason.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError {
            field,
            reason: reason.into(),
        }
    }
}

/// Minimum length for human names (student, course, institution).
const MIN_NAME_LEN: usize = 2;

/// Validates a human-entered name: trimmed, at least two characters.
pub fn validate_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().len() < MIN_NAME_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be at least {} characters", MIN_NAME_LEN),
        ));
    }
    Ok(())
}

/// Validates a required free-form field (roll number, grade, certificate id).
pub fn validate_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

/// Checks that a string is shaped like a wallet key: 64 hex characters, with
/// an optional `0x` prefix.
pub fn is_wallet_shaped(value: &str) -> bool {
    let body = value.strip_prefix("0x").unwrap_or(value);
    body.len() == 64 && body.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validates a wallet identifier field.
pub fn validate_wallet(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if !is_wallet_shaped(value) {
        return Err(ValidationError::new(
            field,
            "must be 64 hex characters (optionally 0x-prefixed)",
        ));
    }
    Ok(())
}

/// Validates an ISO `YYYY-MM-DD` issue date.
pub fn validate_issue_date(field: &'static str, value: &str) -> Result<(), ValidationError> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ValidationError::new(field, "must be an ISO date (YYYY-MM-DD)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_rules() {
        assert!(validate_name("student_name", "Ada").is_ok());
        assert!(validate_name("student_name", "A").is_err());
        assert!(validate_name("student_name", "  ").is_err());
    }

    #[test]
    fn required_rules() {
        assert!(validate_required("grade", "A+").is_ok());
        assert!(validate_required("grade", "   ").is_err());
    }

    #[test]
    fn wallet_shapes() {
        let key = "ab".repeat(32);
        assert!(is_wallet_shaped(&key));
        assert!(is_wallet_shaped(&format!("0x{}", key)));
        assert!(!is_wallet_shaped(&key[..62]));
        assert!(!is_wallet_shaped(&"zz".repeat(32)));
        assert!(!is_wallet_shaped(""));
    }

    #[test]
    fn issue_dates() {
        assert!(validate_issue_date("issue_date", "2024-06-30").is_ok());
        assert!(validate_issue_date("issue_date", "30/06/2024").is_err());
        assert!(validate_issue_date("issue_date", "2024-13-01").is_err());
    }
}
