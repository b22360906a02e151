// src/chain/mod.rs
//! On-chain program access: address derivation, signing, instruction clients
//! and the transaction manager.

pub mod accounts;
pub mod address;
pub mod client;
pub mod memory;
pub mod signer;
pub mod transaction_manager;
