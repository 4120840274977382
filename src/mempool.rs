//! Pending transaction pool
//!
//! The ledger only relies on the [`TransactionPool`] contract; [`Mempool`] is
//! the in-memory implementation used by the node.

use crate::blockchain::{Block, UtxoSet};
use crate::error::ChainError;
use crate::transaction::{validate_transaction, OutPoint, Transaction};
use std::collections::HashSet;
use tracing::debug;

pub trait TransactionPool: Send {
    /// Pending transactions in admission order.
    fn transactions(&self) -> Vec<Transaction>;

    /// Admits `tx` if it is valid against `utxos` and does not conflict with
    /// anything already pending.
    fn admit(&mut self, tx: Transaction, utxos: &UtxoSet) -> Result<(), ChainError>;

    /// Drops transactions confirmed by `block` and any that now conflict with it.
    fn remove_confirmed(&mut self, block: &Block);

    /// Drops transactions that spend outputs no longer in `utxos`.
    fn retain_spendable(&mut self, utxos: &UtxoSet);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending_inputs(&self) -> HashSet<OutPoint> {
        self.transactions
            .iter()
            .flat_map(|tx| tx.tx_ins.iter().map(|i| i.outpoint()))
            .collect()
    }
}

impl TransactionPool for Mempool {
    fn transactions(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    fn admit(&mut self, tx: Transaction, utxos: &UtxoSet) -> Result<(), ChainError> {
        validate_transaction(&tx, utxos)?;

        if self.transactions.iter().any(|pending| pending.id == tx.id) {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction {} is already pending",
                tx.id
            )));
        }

        let pending = self.pending_inputs();
        if let Some(conflict) = tx.tx_ins.iter().find(|i| pending.contains(&i.outpoint())) {
            return Err(ChainError::DoubleSpendDetected(format!(
                "Output {} is already spent by a pending transaction",
                conflict.outpoint()
            )));
        }

        debug!("Admitted transaction {} to pool", tx.id);
        self.transactions.push(tx);
        Ok(())
    }

    fn remove_confirmed(&mut self, block: &Block) {
        let confirmed_ids: HashSet<&str> = block.data.iter().map(|tx| tx.id.as_str()).collect();
        let spent: HashSet<OutPoint> = block
            .data
            .iter()
            .flat_map(|tx| tx.tx_ins.iter().map(|i| i.outpoint()))
            .collect();

        self.transactions.retain(|tx| {
            !confirmed_ids.contains(tx.id.as_str())
                && !tx.tx_ins.iter().any(|i| spent.contains(&i.outpoint()))
        });
    }

    fn retain_spendable(&mut self, utxos: &UtxoSet) {
        let before = self.transactions.len();
        self.transactions
            .retain(|tx| tx.tx_ins.iter().all(|i| utxos.contains(&i.outpoint())));
        let dropped = before - self.transactions.len();
        if dropped > 0 {
            debug!("Dropped {} pool transactions with spent inputs", dropped);
        }
    }

    fn len(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::transaction::{TxIn, TxOut, UnspentTxOut};

    fn setup() -> (KeyPair, UtxoSet) {
        let keypair = KeyPair::generate();
        let mut utxos = UtxoSet::new();
        utxos.insert(UnspentTxOut::new("cc".repeat(32), 0, keypair.address(), 50));
        utxos.insert(UnspentTxOut::new("dd".repeat(32), 0, keypair.address(), 50));
        (keypair, utxos)
    }

    fn signed(keypair: &KeyPair, utxos: &UtxoSet, source: &str, to: &str) -> Transaction {
        let mut tx = Transaction::new(
            vec![TxIn::unsigned(source.to_string(), 0)],
            vec![TxOut::new(to.to_string(), 50)],
        );
        tx.sign_input(0, keypair, utxos).unwrap();
        tx
    }

    #[test]
    fn test_admit_and_reject_conflicts() {
        let (keypair, utxos) = setup();
        let to = KeyPair::generate().address();
        let mut pool = Mempool::new();

        let tx = signed(&keypair, &utxos, &"cc".repeat(32), &to);
        assert!(pool.admit(tx.clone(), &utxos).is_ok());
        assert_eq!(pool.len(), 1);

        // same transaction twice
        assert!(pool.admit(tx, &utxos).is_err());

        // different transaction spending the same output
        let conflicting = signed(&keypair, &utxos, &"cc".repeat(32), &keypair.address());
        assert!(matches!(
            pool.admit(conflicting, &utxos),
            Err(ChainError::DoubleSpendDetected(_))
        ));

        let independent = signed(&keypair, &utxos, &"dd".repeat(32), &to);
        assert!(pool.admit(independent, &utxos).is_ok());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_invalid_transaction_not_admitted() {
        let (keypair, utxos) = setup();
        let mut pool = Mempool::new();
        let mut tx = signed(&keypair, &utxos, &"cc".repeat(32), &keypair.address());
        tx.tx_outs[0].amount = 49;
        assert!(pool.admit(tx, &utxos).is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_remove_confirmed_and_retain_spendable() {
        let (keypair, utxos) = setup();
        let to = KeyPair::generate().address();
        let mut pool = Mempool::new();
        let a = signed(&keypair, &utxos, &"cc".repeat(32), &to);
        let b = signed(&keypair, &utxos, &"dd".repeat(32), &to);
        pool.admit(a.clone(), &utxos).unwrap();
        pool.admit(b.clone(), &utxos).unwrap();

        let block = Block::new(
            1,
            "00".repeat(32),
            0,
            vec![Transaction::coinbase(to.clone(), 1), a.clone()],
            0,
            0,
        );
        pool.remove_confirmed(&block);
        assert_eq!(pool.transactions(), vec![b.clone()]);

        let after = utxos.updated(&[b]);
        pool.retain_spendable(&after);
        assert!(pool.is_empty());
    }
}
