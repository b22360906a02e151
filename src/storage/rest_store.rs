// src/storage/rest_store.rs
//! REST client for the hosted relational backend.
//!
//! The backend exposes its tables over a PostgREST-style HTTP surface:
//! `GET /certificates?certificate_hash=eq.<h>` filters rows, `POST` inserts,
//! `PATCH` updates, and `POST /rpc/<fn>` calls stored procedures. Row-level
//! policies are enforced server-side against the bearer identity; this client
//! only attaches the credentials.

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::json;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::certificate::Certificate;
use crate::models::institution::Institution;
use crate::storage::store::{CertificateStore, InstitutionStore, StoreError};

/// HTTP client for the `certificates` and `institutions` tables.
pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
}

impl RestStore {
    /// Creates a client for the given REST base URL (e.g.
    /// `https://project.example.co/rest/v1`) with the given API key.
    ///
    /// # Errors
    /// Returns an error if the API key is not a valid header value.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(api_key)
            .map_err(|e| StoreError::Connection(format!("invalid api key: {}", e)))?;
        headers.insert("apikey", key_value);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| StoreError::Connection(format!("invalid api key: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(RestStore {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    /// Maps a non-success response to a [`StoreError`], distinguishing unique
    /// violations (Postgres error 23505) from transport failures.
    async fn error_from_response(resp: reqwest::Response) -> StoreError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || body.contains("23505") {
            // The backend names the violated constraint in the message body.
            let column = if body.contains("certificate_hash") {
                "certificate_hash"
            } else if body.contains("certificate_id") {
                "certificate_id"
            } else if body.contains("authority") {
                "authority"
            } else {
                "unknown"
            };
            return StoreError::UniqueViolation {
                column: column.to_string(),
            };
        }
        StoreError::Connection(format!("status {}: {}", status, body))
    }

    /// Runs a filtered `GET` expecting an array of rows.
    async fn select<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let resp = self
            .http
            .get(self.table_url(table))
            .query(query)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        resp.json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    /// Runs a filtered `PATCH` with a JSON body, requiring at least one row
    /// to have matched.
    async fn patch(
        &self,
        table: &str,
        query: &[(&str, String)],
        body: serde_json::Value,
    ) -> Result<(), StoreError> {
        let resp = self
            .http
            .patch(self.table_url(table))
            .query(query)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let rows: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("{} (no row matched)", table)));
        }
        Ok(())
    }
}

#[async_trait]
impl CertificateStore for RestStore {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Certificate>, StoreError> {
        let rows: Vec<Certificate> = self
            .select(
                "certificates",
                &[
                    ("certificate_hash", format!("eq.{}", hash)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_by_id(&self, certificate_id: &str) -> Result<Option<Certificate>, StoreError> {
        let rows: Vec<Certificate> = self
            .select(
                "certificates",
                &[
                    ("certificate_id", format!("eq.{}", certificate_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, certificate: &Certificate) -> Result<Certificate, StoreError> {
        debug!(
            "inserting certificate {} (hash {})",
            certificate.certificate_id, certificate.certificate_hash
        );
        let resp = self
            .http
            .post(self.table_url("certificates"))
            .header("Prefer", "return=representation")
            .json(certificate)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let rows: Vec<Certificate> = resp
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Malformed("insert returned no row".to_string()))
    }

    async fn update_hash(&self, certificate_id: &str, new_hash: &str) -> Result<(), StoreError> {
        self.patch(
            "certificates",
            &[("certificate_id", format!("eq.{}", certificate_id))],
            json!({
                "certificate_hash": new_hash,
                "updated_at": Utc::now(),
            }),
        )
        .await
    }

    async fn set_revoked(&self, certificate_id: &str) -> Result<(), StoreError> {
        self.patch(
            "certificates",
            &[("certificate_id", format!("eq.{}", certificate_id))],
            json!({
                "revoked": true,
                "updated_at": Utc::now(),
            }),
        )
        .await
    }

    async fn increment_verification_count(
        &self,
        certificate_id: &str,
    ) -> Result<u64, StoreError> {
        // Atomic increment lives in a stored procedure; a read-modify-write
        // from here would race with concurrent verifiers.
        let resp = self
            .http
            .post(format!("{}/rpc/increment_verification_count", self.base_url))
            .json(&json!({ "cert_id": certificate_id }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        resp.json::<u64>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    async fn list_by_issuer(&self, issuer: &str) -> Result<Vec<Certificate>, StoreError> {
        self.select(
            "certificates",
            &[
                ("issuer", format!("eq.{}", issuer)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<Certificate>, StoreError> {
        self.select("certificates", &[("order", "created_at.asc".to_string())])
            .await
    }
}

#[async_trait]
impl InstitutionStore for RestStore {
    async fn insert_institution(
        &self,
        institution: &Institution,
    ) -> Result<Institution, StoreError> {
        let resp = self
            .http
            .post(self.table_url("institutions"))
            .header("Prefer", "return=representation")
            .json(institution)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let rows: Vec<Institution> = resp
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Malformed("insert returned no row".to_string()))
    }

    async fn find_by_authority(&self, authority: &str) -> Result<Option<Institution>, StoreError> {
        let rows: Vec<Institution> = self
            .select(
                "institutions",
                &[
                    ("authority", format!("eq.{}", authority)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn set_verified(&self, authority: &str) -> Result<(), StoreError> {
        self.patch(
            "institutions",
            &[("authority", format!("eq.{}", authority))],
            json!({ "verified": true }),
        )
        .await
    }

    async fn increment_certificates_issued(&self, authority: &str) -> Result<(), StoreError> {
        let resp = self
            .http
            .post(format!("{}/rpc/increment_certificates_issued", self.base_url))
            .json(&json!({ "inst_authority": authority }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{mock, server_url, Matcher};

    #[tokio::test]
    async fn find_by_hash_decodes_empty_result() {
        let _m = mock("GET", Matcher::Regex(r"^/empty/certificates".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create();

        let store = RestStore::new(&format!("{}/empty", server_url()), "test-key").unwrap();
        let found = store.find_by_hash(&"ab".repeat(32)).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn insert_conflict_maps_to_hash_violation() {
        let _m = mock("POST", Matcher::Regex(r"^/conflict/certificates".to_string()))
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"code":"23505","message":"duplicate key value violates unique constraint certificates_certificate_hash_key"}"#,
            )
            .create();

        let store = RestStore::new(&format!("{}/conflict", server_url()), "test-key").unwrap();
        let cert = Certificate {
            certificate_id: "C1".into(),
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
        };
        let err = store.insert(&cert).await.err().unwrap();
        assert!(err.is_hash_conflict());
    }

    #[tokio::test]
    async fn transport_errors_map_to_connection() {
        let _m = mock("GET", Matcher::Regex(r"^/down/certificates".to_string()))
            .with_status(503)
            .with_body("service unavailable")
            .create();

        let store = RestStore::new(&format!("{}/down", server_url()), "test-key").unwrap();
        let err = store.find_by_id("C1").await.err().unwrap();
        assert!(matches!(err, StoreError::Connection(_)));
    }
}
