//! Wallet: key ownership, coin selection and spend construction

use crate::blockchain::UtxoSet;
use crate::crypto::{is_valid_address, Address, KeyPair};
use crate::error::ChainError;
use crate::transaction::{OutPoint, Transaction, TxIn, TxOut, UnspentTxOut};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

/// Outputs chosen to fund a payment plus the amount returned as change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    pub inputs: Vec<UnspentTxOut>,
    pub change: u64,
}

#[derive(Debug, Clone)]
pub struct Wallet {
    keypair: KeyPair,
}

impl Wallet {
    pub fn new(keypair: KeyPair) -> Self {
        Wallet { keypair }
    }

    pub fn generate() -> Self {
        Wallet::new(KeyPair::generate())
    }

    /// Reads the hex private key at `path`, creating a fresh one if missing.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref();
        if path.exists() {
            let secret_hex = fs::read_to_string(path)?;
            return Ok(Wallet::new(KeyPair::from_secret_hex(&secret_hex)?));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let wallet = Wallet::generate();
        fs::write(path, wallet.keypair.secret_hex())?;
        info!("New wallet key written to {}", path.display());
        Ok(wallet)
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// Signature over a transaction id.
    pub fn sign(&self, tx_id: &str) -> Result<String, ChainError> {
        self.keypair.sign_digest(tx_id)
    }

    pub fn balance(&self, utxos: &UtxoSet) -> u64 {
        utxos.balance(&self.address())
    }

    /// Walks this wallet's outputs, skipping those already referenced by
    /// `pool`, until `amount` is covered.
    pub fn select_coins(
        &self,
        amount: u64,
        utxos: &UtxoSet,
        pool: &[Transaction],
    ) -> Result<CoinSelection, ChainError> {
        let reserved: HashSet<OutPoint> = pool
            .iter()
            .flat_map(|tx| tx.tx_ins.iter().map(TxIn::outpoint))
            .collect();

        let mut inputs = Vec::new();
        let mut collected: u64 = 0;
        for utxo in utxos.owned_by(&self.address()) {
            if reserved.contains(&utxo.outpoint()) {
                continue;
            }
            collected = collected.saturating_add(utxo.amount);
            inputs.push(utxo);
            if collected >= amount {
                return Ok(CoinSelection {
                    inputs,
                    change: collected - amount,
                });
            }
        }

        Err(ChainError::InsufficientFunds {
            required: amount,
            available: collected,
        })
    }

    /// A signed payment of `amount` to `receiver`, with change back to this
    /// wallet when the selected outputs exceed the amount.
    pub fn create_transaction(
        &self,
        receiver: &str,
        amount: u64,
        utxos: &UtxoSet,
        pool: &[Transaction],
    ) -> Result<Transaction, ChainError> {
        if !is_valid_address(receiver) {
            return Err(ChainError::WalletError(format!(
                "Invalid receiver address: {}",
                receiver
            )));
        }
        if amount == 0 {
            return Err(ChainError::WalletError("Amount must be greater than zero".to_string()));
        }

        let selection = self.select_coins(amount, utxos, pool)?;

        let tx_ins = selection
            .inputs
            .iter()
            .map(|u| TxIn::unsigned(u.tx_out_id.clone(), u.tx_out_index))
            .collect();
        let mut tx_outs = vec![TxOut::new(receiver.to_string(), amount)];
        if selection.change > 0 {
            tx_outs.push(TxOut::new(self.address(), selection.change));
        }

        let mut tx = Transaction::new(tx_ins, tx_outs);
        for index in 0..tx.tx_ins.len() {
            tx.sign_input(index, &self.keypair, utxos)?;
        }
        Ok(tx)
    }
}
