// Thin re-export module: implementation lives in `blockchain/core.rs` and its
// submodules (chain, state, validation, ledger).

pub mod core;
pub use core::*;
