//! Transaction module split into types and validation for better modularity

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::{
    find_duplicate_tx_in, process_transactions, validate_block_transactions,
    validate_coinbase_tx, validate_transaction, validate_transaction_structure,
};
