// src/services/api_server.rs
//! HTTP API for the certificate platform.
//!
//! Axum surface over the certificate service: registration, issuance, the
//! public verification URL, revocation, and the admin-only remediation
//! endpoints. Admin endpoints are gated by an allowlist of authority keys
//! loaded from configuration.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use log::info;
use serde::{Deserialize, Serialize};

use crate::services::certificate_service::{CertificateService, CreateCertificateRequest};
use crate::services::diagnostics::{self, BatchVerificationInput};
use crate::services::hash_conflicts;
use crate::storage::store::{CertificateStore, StoreError};

/// Header carrying the caller's authority key for admin endpoints.
const ADMIN_AUTHORITY_HEADER: &str = "x-admin-authority";

/// Request payload for registering an institution.
#[derive(Deserialize)]
struct RegisterInstitutionRequest {
    name: String,
    location: String,
}

/// Request payload for batch certificate issuance.
#[derive(Deserialize)]
struct BatchCreateRequest {
    certificates: Vec<CreateCertificateRequest>,
}

/// Query parameters of the public verification URL:
/// `/verify/:certificate_id?institution=<key>&hash=<hash>`.
#[derive(Deserialize)]
struct VerifyQuery {
    /// Issuing institution key. Accepted for URL compatibility; the stored
    /// issuer is authoritative for the chain cross-check.
    #[allow(dead_code)]
    institution: Option<String>,
    hash: Option<String>,
}

/// Request payload for batch verification.
#[derive(Deserialize)]
struct BatchVerifyRequest {
    inputs: Vec<BatchVerificationInput>,
}

/// Uniform error body for rejected requests.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// API server state shared across handlers.
pub struct ApiServer {
    service: Arc<CertificateService>,
    store: Arc<dyn CertificateStore>,
    /// Authority keys allowed to call admin endpoints. Loaded from
    /// configuration, never compiled in.
    admin_authorities: HashSet<String>,
}

impl ApiServer {
    pub fn new(
        service: Arc<CertificateService>,
        store: Arc<dyn CertificateStore>,
        admin_authorities: HashSet<String>,
    ) -> Self {
        ApiServer {
            service,
            store,
            admin_authorities,
        }
    }

    /// Starts the server and blocks until it exits.
    pub async fn run(self, addr: SocketAddr) -> anyhow::Result<()> {
        let app = self.router();
        info!("API server listening on http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    fn router(self) -> Router {
        Router::new()
            .route("/institutions", post(Self::register_institution_handler))
            .route(
                "/institutions/:authority/verify",
                post(Self::verify_institution_handler),
            )
            .route("/certificates", post(Self::create_certificate_handler))
            .route("/certificates/batch", post(Self::batch_create_handler))
            .route("/certificates/:id/revoke", post(Self::revoke_handler))
            .route("/verify/:certificate_id", get(Self::verify_handler))
            .route("/verify-batch", post(Self::batch_verify_handler))
            .route(
                "/admin/resolve-conflicts",
                post(Self::resolve_conflicts_handler),
            )
            .route("/admin/sync", post(Self::sync_handler))
            .route("/health", get(Self::health_handler))
            .with_state(Arc::new(self))
    }

    fn authorize_admin(&self, headers: &HeaderMap) -> Result<(), (StatusCode, Json<ErrorBody>)> {
        let caller = headers
            .get(ADMIN_AUTHORITY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if self.admin_authorities.contains(caller) {
            Ok(())
        } else {
            Err((
                StatusCode::FORBIDDEN,
                Json(ErrorBody {
                    error: "caller is not an admin authority".to_string(),
                }),
            ))
        }
    }

    /// POST /institutions
    async fn register_institution_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RegisterInstitutionRequest>,
    ) -> impl IntoResponse {
        let result = state
            .service
            .register_institution(&payload.name, &payload.location)
            .await;
        let status = if result.success || result.partial.is_some() {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, Json(result))
    }

    /// POST /institutions/:authority/verify (admin-gated)
    async fn verify_institution_handler(
        State(state): State<Arc<ApiServer>>,
        Path(authority): Path<String>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        if let Err(denied) = state.authorize_admin(&headers) {
            return denied.into_response();
        }
        match state.service.verify_institution(&authority).await {
            Ok(()) => StatusCode::OK.into_response(),
            Err(StoreError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                Json(ErrorBody {
                    error: format!("no institution with authority {}", authority),
                }),
            )
                .into_response(),
            Err(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody {
                    error: format!("verified flip failed: {}", e),
                }),
            )
                .into_response(),
        }
    }

    /// POST /certificates
    async fn create_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CreateCertificateRequest>,
    ) -> impl IntoResponse {
        let result = state.service.create_certificate(&payload).await;
        let status = if result.success || result.partial.is_some() {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, Json(result))
    }

    /// POST /certificates/batch
    ///
    /// One invalid entry never aborts the rest; the response always carries
    /// one result per input, in order.
    async fn batch_create_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<BatchCreateRequest>,
    ) -> impl IntoResponse {
        let results = state
            .service
            .create_certificates(&payload.certificates)
            .await;
        (StatusCode::OK, Json(results))
    }

    /// POST /certificates/:id/revoke (admin-gated)
    async fn revoke_handler(
        State(state): State<Arc<ApiServer>>,
        Path(certificate_id): Path<String>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        if let Err(denied) = state.authorize_admin(&headers) {
            return denied.into_response();
        }
        let result = state.service.revoke_certificate(&certificate_id).await;
        let status = if result.success || result.partial.is_some() {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        };
        (status, Json(result)).into_response()
    }

    /// GET /verify/:certificate_id?institution=<key>&hash=<hash>
    async fn verify_handler(
        State(state): State<Arc<ApiServer>>,
        Path(certificate_id): Path<String>,
        Query(query): Query<VerifyQuery>,
    ) -> impl IntoResponse {
        let result = state
            .service
            .verify_certificate(&certificate_id, query.hash.as_deref())
            .await;
        (StatusCode::OK, Json(result))
    }

    /// POST /verify-batch
    async fn batch_verify_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<BatchVerifyRequest>,
    ) -> impl IntoResponse {
        let outcomes = diagnostics::batch_verify(
            state.store.as_ref(),
            state.service.chain_manager(),
            &payload.inputs,
        )
        .await;
        (StatusCode::OK, Json(outcomes))
    }

    /// POST /admin/resolve-conflicts (admin-gated)
    async fn resolve_conflicts_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        if let Err(denied) = state.authorize_admin(&headers) {
            return denied.into_response();
        }
        match hash_conflicts::resolve_all_hash_conflicts(state.store.as_ref()).await {
            Ok(report) => (StatusCode::OK, Json(report)).into_response(),
            Err(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody {
                    error: format!("conflict scan failed: {}", e),
                }),
            )
                .into_response(),
        }
    }

    /// POST /admin/sync (admin-gated)
    async fn sync_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        if let Err(denied) = state.authorize_admin(&headers) {
            return denied.into_response();
        }
        match state.service.sync_certificates().await {
            Ok(report) => (StatusCode::OK, Json(report)).into_response(),
            Err(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody {
                    error: format!("sync failed: {}", e),
                }),
            )
                .into_response(),
        }
    }

    /// GET /health
    async fn health_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        let report =
            diagnostics::run_health_checks(state.store.as_ref(), state.service.chain_manager())
                .await;
        let status = if report.store_reachable {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::MemoryChain;
    use crate::chain::signer::{ChainSigner, KeypairSigner};
    use crate::chain::transaction_manager::TransactionManager;
    use crate::storage::memory_store::MemoryStore;
    use std::time::Duration;

    fn server() -> ApiServer {
        let store = Arc::new(MemoryStore::new());
        let signer = Arc::new(KeypairSigner::random());
        let manager = Arc::new(TransactionManager::new(
            Arc::new(MemoryChain::new()),
            Some(signer.clone()),
            Duration::from_millis(0),
        ));
        let service = Arc::new(CertificateService::new(
            store.clone(),
            store.clone(),
            manager,
            signer.authority(),
        ));
        let mut admins = HashSet::new();
        admins.insert("admin-key".to_string());
        ApiServer::new(service, store, admins)
    }

    #[test]
    fn admin_gate_checks_the_header() {
        let server = server();

        let mut headers = HeaderMap::new();
        assert!(server.authorize_admin(&headers).is_err());

        headers.insert(ADMIN_AUTHORITY_HEADER, "stranger".parse().unwrap());
        assert!(server.authorize_admin(&headers).is_err());

        headers.insert(ADMIN_AUTHORITY_HEADER, "admin-key".parse().unwrap());
        assert!(server.authorize_admin(&headers).is_ok());
    }

    #[test]
    fn router_builds() {
        let _app = server().router();
    }
}
