//! Error types for emberchain

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Malformed block, transaction or wire payload. Rejected before any
    /// semantic validation runs.
    #[error("Structural error: {0}")]
    Structural(String),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Double spend detected: {0}")]
    DoubleSpendDetected(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    /// The tip moved while a block was being mined on top of the old one.
    #[error("Mining race lost: block was built on {expected_parent} but the tip is now {current_tip}")]
    RaceLost {
        expected_parent: String,
        current_tip: String,
    },
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("Mining failed: {0}")]
    MiningFailed(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Wallet error: {0}")]
    WalletError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Ledger task is no longer running")]
    LedgerUnavailable,
}

impl ChainError {
    /// Race losses are a normal outcome of concurrent mining, not a fault.
    pub fn is_race_loss(&self) -> bool {
        matches!(self, ChainError::RaceLost { .. })
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
