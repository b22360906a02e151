// src/storage/mod.rs
//! Relational storage layer: trait surface plus REST and in-memory backends.

pub mod memory_store;
pub mod rest_store;
pub mod store;
