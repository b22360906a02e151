// src/services/mod.rs
//! Business logic: certificate orchestration, hash conflict remediation,
//! diagnostics, and the HTTP API.

pub mod api_server;
pub mod certificate_service;
pub mod diagnostics;
pub mod hash_conflicts;
