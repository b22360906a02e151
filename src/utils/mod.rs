// src/utils/mod.rs
//! Shared helpers: hashing and input validation.

pub mod hash;
pub mod validation;
