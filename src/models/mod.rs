// src/models/mod.rs
//! Data structures shared across the storage and service layers.

pub mod certificate;
pub mod institution;
