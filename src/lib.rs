//! Emberchain - a minimal UTXO cryptocurrency node
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Blockchain
//! - [`blockchain`] - Blocks, UTXO state, validation rules and the ledger
//! - [`transaction`] - Transaction types, signing and validation
//! - [`mempool`] - Pending transaction pool
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work mining
//!
//! ## Cryptography
//! - [`crypto`] - Signatures and verification (secp256k1)
//!
//! ## State Management
//! - [`wallet`] - Key file, coin selection and spend construction
//! - [`service`] - Task that owns the ledger and serializes every mutation
//!
//! ## Networking & Integration
//! - [`network`] - WebSocket peers and the wire codec
//! - [`sync`] - Chain synchronization decisions
//! - [`node`] - Startup wiring
//! - `api` - HTTP facade (feature `api`)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod service;
pub mod wallet;

// ============================================================================
// Networking
// ============================================================================
pub mod network;
pub mod node;
pub mod sync;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
