// core.rs splits chain responsibilities into submodules: block structure,
// UTXO state, validation rules and the ledger that ties them together.
pub mod chain;
pub mod ledger;
pub mod state;
pub mod validation;

pub use chain::*;
pub use ledger::*;
pub use state::*;
pub use validation::*;
