// src/chain/accounts.rs
//! Account shapes owned by the on-chain certificate program.

use serde::{Deserialize, Serialize};

use crate::chain::address::ChainAddress;

/// Singleton program counters, created by `initialize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalState {
    pub institution_count: u64,
    pub certificate_count: u64,
    pub verification_count: u64,
}

/// Per-institution account, derived from the authority key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstitutionAccount {
    pub name: String,
    pub location: String,
    pub authority: ChainAddress,
    pub verified: bool,
    pub certificates_issued: u64,
}

/// Per-certificate account, derived from (institution address, certificate
/// id). Carries the same fingerprint hash the database row stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateAccount {
    pub certificate_id: String,
    pub institution: ChainAddress,
    pub student_name: String,
    pub course_name: String,
    pub certificate_hash: String,
    pub revoked: bool,
    /// Unix timestamp of issuance.
    pub issued_at: i64,
    pub verification_count: u64,
}
