// src/chain/signer.rs
//! Signing capability for chain-writing operations.
//!
//! Every state-changing instruction must be signed by an institution
//! authority. Callers hand the transaction manager exactly this capability —
//! a public identity plus sign-one/sign-many — never a richer wallet context.

use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::chain::address::ChainAddress;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid secret key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// A held signing capability: public identity plus signing.
///
/// Implementations must be cheap to call repeatedly; batch issuance signs one
/// message per certificate.
pub trait ChainSigner: Send + Sync {
    /// The authority key this capability signs as.
    fn authority(&self) -> ChainAddress;

    /// Signs a single message, returning the compact signature bytes.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;

    /// Signs many messages in order. The default loops over [`sign`].
    ///
    /// [`sign`]: ChainSigner::sign
    fn sign_batch(&self, messages: &[&[u8]]) -> Result<Vec<Vec<u8>>, SignerError> {
        messages.iter().map(|m| self.sign(m)).collect()
    }
}

/// Signer over a locally held secp256k1 keypair.
pub struct KeypairSigner {
    signing_key: SigningKey,
    authority: ChainAddress,
}

impl KeypairSigner {
    /// Generates a fresh random keypair.
    pub fn random() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let authority = Self::derive_authority(&signing_key);
        KeypairSigner {
            signing_key,
            authority,
        }
    }

    /// Loads a keypair from a hex-encoded secret key (optionally
    /// 0x-prefixed).
    pub fn from_hex(secret_hex: &str) -> Result<Self, SignerError> {
        let body = secret_hex.strip_prefix("0x").unwrap_or(secret_hex);
        let bytes = hex::decode(body).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let authority = Self::derive_authority(&signing_key);
        Ok(KeypairSigner {
            signing_key,
            authority,
        })
    }

    /// The authority key is the SHA-256 of the compressed public key.
    fn derive_authority(signing_key: &SigningKey) -> ChainAddress {
        let compressed = signing_key.verifying_key().to_encoded_point(true);
        let digest: [u8; 32] = Sha256::digest(compressed.as_bytes()).into();
        ChainAddress::from(digest)
    }
}

impl ChainSigner for KeypairSigner {
    fn authority(&self) -> ChainAddress {
        self.authority
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let digest: [u8; 32] = Sha256::digest(message).into();
        let signature: Signature = self
            .signing_key
            .sign_prehash(&digest)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}
