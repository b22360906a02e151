// src/chain/address.rs
//! Deterministic on-chain address derivation.
//!
//! The program locates its accounts without a lookup table: every account
//! address is a SHA-256 digest over a fixed seed string plus the parent keys.
//! Two institutions, or two certificate ids under one institution, can never
//! map to the same address. The seed strings are part of the program's wire
//! contract and must not change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Seed for the singleton global-state account.
pub const GLOBAL_STATE_SEED: &[u8] = b"global_state";
/// Seed prefix for per-institution accounts.
pub const INSTITUTION_SEED: &[u8] = b"institution";
/// Seed prefix for per-certificate accounts.
pub const CERTIFICATE_SEED: &[u8] = b"certificate";

/// A 32-byte derived account address, hex-encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainAddress([u8; 32]);

impl ChainAddress {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn from_seeds(seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        ChainAddress(hasher.finalize().into())
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ChainAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(body).map_err(|e| format!("invalid address hex: {}", e))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "address must be 32 bytes".to_string())?;
        Ok(ChainAddress(arr))
    }
}

impl TryFrom<String> for ChainAddress {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChainAddress> for String {
    fn from(a: ChainAddress) -> String {
        a.to_string()
    }
}

impl From<[u8; 32]> for ChainAddress {
    fn from(bytes: [u8; 32]) -> Self {
        ChainAddress(bytes)
    }
}

/// Address of the program's singleton global-state account.
pub fn derive_global_state_address() -> ChainAddress {
    ChainAddress::from_seeds(&[GLOBAL_STATE_SEED])
}

/// Address of the institution account owned by `authority`.
pub fn derive_institution_address(authority: &ChainAddress) -> ChainAddress {
    ChainAddress::from_seeds(&[INSTITUTION_SEED, authority.as_bytes()])
}

/// Address of the certificate account for `certificate_id` under the given
/// institution account.
pub fn derive_certificate_address(
    institution: &ChainAddress,
    certificate_id: &str,
) -> ChainAddress {
    ChainAddress::from_seeds(&[
        CERTIFICATE_SEED,
        institution.as_bytes(),
        certificate_id.as_bytes(),
    ])
}
