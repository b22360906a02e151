// src/models/institution.rs
//! Institution record as stored in the `institutions` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An institution registered with the platform.
///
/// The `verified` flag flips exactly once, by a privileged authority; there is
/// no un-verify path. `certificates_issued` counts successful issuances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Institution {
    pub name: String,
    pub location: String,
    /// Authority key (hex) that owns and signs for this institution.
    pub authority: String,
    pub verified: bool,
    pub certificates_issued: u64,
    pub created_at: DateTime<Utc>,
}

impl Institution {
    pub fn new(name: impl Into<String>, location: impl Into<String>, authority: impl Into<String>) -> Self {
        Institution {
            name: name.into(),
            location: location.into(),
            authority: authority.into(),
            verified: false,
            certificates_issued: 0,
            created_at: Utc::now(),
        }
    }
}
