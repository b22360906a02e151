// src/services/diagnostics.rs
//! Operational diagnostics: connectivity, schema and policy probes, plus a
//! batch verification helper. None of this participates in the issuance or
//! verification flows.

use serde::{Deserialize, Serialize};

use crate::chain::address::ChainAddress;
use crate::chain::transaction_manager::TransactionManager;
use crate::storage::store::{CertificateStore, StoreError};
use crate::utils::hash::is_valid_hash_format;

/// Sentinel id used by the write-policy probe; never a real certificate.
const POLICY_PROBE_ID: &str = "__diagnostic_probe__";

/// Snapshot of backend health.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    /// The store answered a read.
    pub store_reachable: bool,
    /// Rows decoded into the expected shape (or the table is empty).
    pub schema_ok: bool,
    /// No write was rejected for the configured identity. An empty match is
    /// counted as permitted; see the details for that caveat.
    pub writes_permitted: bool,
    /// The chain RPC answered an account read.
    pub chain_reachable: bool,
    pub details: Vec<String>,
}

/// Runs the connectivity/schema/policy checks against both backends.
pub async fn run_health_checks(
    store: &dyn CertificateStore,
    chain: &TransactionManager,
) -> DiagnosticsReport {
    let mut details = Vec::new();

    // A full decode of the table doubles as the schema check: a column
    // drift shows up as a deserialization error here.
    let (store_reachable, schema_ok) = match store.list_all().await {
        Ok(rows) => {
            details.push(format!("store answered with {} certificates", rows.len()));
            (true, true)
        }
        Err(StoreError::Malformed(e)) => {
            details.push(format!("store rows failed to decode: {}", e));
            (true, false)
        }
        Err(e) => {
            details.push(format!("store unreachable: {}", e));
            (false, false)
        }
    };

    // Probe write policy against a sentinel row. An explicit rejection means
    // writes are denied; an empty match cannot rule them out, because a
    // row-filtering policy answers exactly like an absent row.
    let writes_permitted = match store.update_hash(POLICY_PROBE_ID, &"0".repeat(64)).await {
        Ok(()) => true,
        Err(StoreError::NotFound(_)) => {
            details.push(
                "write probe matched no row; a row-filtering policy would look identical"
                    .to_string(),
            );
            true
        }
        Err(e) => {
            details.push(format!("write probe rejected: {}", e));
            false
        }
    };

    let chain_reachable = match chain.fetch_certificate(
        &ChainAddress::from([0u8; 32]),
        POLICY_PROBE_ID,
    )
    .await
    {
        Ok(_) => true,
        Err(e) => {
            details.push(format!("chain unreachable: {}", e));
            false
        }
    };

    DiagnosticsReport {
        store_reachable,
        schema_ok,
        writes_permitted,
        chain_reachable,
        details,
    }
}

/// Classification of one batch-verification input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchVerificationStatus {
    Verified,
    HashMismatch,
    Revoked,
    NotFound,
}

/// One `(certificate id, hash, institution key)` triple to classify.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchVerificationInput {
    pub certificate_id: String,
    pub hash: String,
    pub institution_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchVerificationOutcome {
    pub certificate_id: String,
    pub status: BatchVerificationStatus,
    pub message: String,
}

/// Classifies each input against the store, consulting the chain copy when
/// the institution key parses and the chain answers.
pub async fn batch_verify(
    store: &dyn CertificateStore,
    chain: &TransactionManager,
    inputs: &[BatchVerificationInput],
) -> Vec<BatchVerificationOutcome> {
    let mut outcomes = Vec::with_capacity(inputs.len());
    for input in inputs {
        outcomes.push(classify(store, chain, input).await);
    }
    outcomes
}

async fn classify(
    store: &dyn CertificateStore,
    chain: &TransactionManager,
    input: &BatchVerificationInput,
) -> BatchVerificationOutcome {
    let outcome = |status, message: String| BatchVerificationOutcome {
        certificate_id: input.certificate_id.clone(),
        status,
        message,
    };

    let record = match store.find_by_id(&input.certificate_id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return outcome(
                BatchVerificationStatus::NotFound,
                "no such certificate".to_string(),
            )
        }
        Err(e) => {
            return outcome(
                BatchVerificationStatus::NotFound,
                format!("store lookup failed: {}", e),
            )
        }
    };

    if record.revoked {
        return outcome(
            BatchVerificationStatus::Revoked,
            "certificate has been revoked".to_string(),
        );
    }

    if !is_valid_hash_format(&input.hash)
        || input.hash.to_ascii_lowercase() != record.base_hash()
    {
        return outcome(
            BatchVerificationStatus::HashMismatch,
            "hash does not match the stored record".to_string(),
        );
    }

    // Cross-check the chain copy when the institution key is usable.
    if let Ok(authority) = input.institution_key.parse::<ChainAddress>() {
        if let Ok(Some(account)) = chain
            .fetch_certificate(&authority, &input.certificate_id)
            .await
        {
            if account.revoked {
                return outcome(
                    BatchVerificationStatus::Revoked,
                    "revoked on chain".to_string(),
                );
            }
            if account.certificate_hash != record.base_hash() {
                return outcome(
                    BatchVerificationStatus::HashMismatch,
                    "chain copy carries a different hash".to_string(),
                );
            }
        }
    }

    outcome(BatchVerificationStatus::Verified, "verified".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::MemoryChain;
    use crate::models::certificate::Certificate;
    use crate::storage::memory_store::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn cert(id: &str, hash: &str, revoked: bool) -> Certificate {
        Certificate {
            certificate_id: id.to_string(),
            student_name: "Ada Lovelace".into(),
            roll_number: "CS-1815".into(),
            course_name: "Analytical Engines".into(),
            grade: "A+".into(),
            institution_name: "Babbage Institute".into(),
            issuer: "ab".repeat(32),
            student_wallet: "cd".repeat(32),
            issue_date: "2024-06-30".into(),
            certificate_hash: hash.to_string(),
            revoked,
            verification_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn readonly_manager() -> TransactionManager {
        TransactionManager::new(Arc::new(MemoryChain::new()), None, Duration::from_millis(0))
    }

    #[tokio::test]
    async fn health_checks_pass_on_healthy_backends() {
        let store = MemoryStore::new();
        let chain = readonly_manager();
        let report = run_health_checks(&store, &chain).await;
        assert!(report.store_reachable);
        assert!(report.schema_ok);
        assert!(report.writes_permitted);
        assert!(report.chain_reachable);
        // The sentinel row never exists, so the probe reports its blind spot.
        assert!(report
            .details
            .iter()
            .any(|d| d.contains("write probe matched no row")));
    }

    #[tokio::test]
    async fn batch_verify_classifies_all_four_buckets() {
        let store = MemoryStore::new();
        let chain = readonly_manager();
        let good_hash = "0a".repeat(32);
        store.insert(&cert("OK", &good_hash, false)).await.unwrap();
        store.insert(&cert("GONE", &"0b".repeat(32), true)).await.unwrap();
        store.insert(&cert("DRIFT", &"0c".repeat(32), false)).await.unwrap();

        let key = "ab".repeat(32);
        let inputs = vec![
            BatchVerificationInput {
                certificate_id: "OK".into(),
                hash: good_hash.clone(),
                institution_key: key.clone(),
            },
            BatchVerificationInput {
                certificate_id: "GONE".into(),
                hash: "0b".repeat(32),
                institution_key: key.clone(),
            },
            BatchVerificationInput {
                certificate_id: "DRIFT".into(),
                hash: "ff".repeat(32),
                institution_key: key.clone(),
            },
            BatchVerificationInput {
                certificate_id: "MISSING".into(),
                hash: good_hash,
                institution_key: key,
            },
        ];

        let outcomes = batch_verify(&store, &chain, &inputs).await;
        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].status, BatchVerificationStatus::Verified);
        assert_eq!(outcomes[1].status, BatchVerificationStatus::Revoked);
        assert_eq!(outcomes[2].status, BatchVerificationStatus::HashMismatch);
        assert_eq!(outcomes[3].status, BatchVerificationStatus::NotFound);
    }

    #[tokio::test]
    async fn pending_rows_still_verify_by_base_hash() {
        use crate::models::certificate::PENDING_CHAIN_SUFFIX;

        let store = MemoryStore::new();
        let chain = readonly_manager();
        let base = "0a".repeat(32);
        store
            .insert(&cert(
                "PENDING",
                &format!("{}{}", base, PENDING_CHAIN_SUFFIX),
                false,
            ))
            .await
            .unwrap();

        let outcomes = batch_verify(
            &store,
            &chain,
            &[BatchVerificationInput {
                certificate_id: "PENDING".into(),
                hash: base,
                institution_key: "ab".repeat(32),
            }],
        )
        .await;
        assert_eq!(outcomes[0].status, BatchVerificationStatus::Verified);
    }
}
