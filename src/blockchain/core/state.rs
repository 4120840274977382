use crate::transaction::{OutPoint, Transaction, UnspentTxOut};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unspent outputs keyed by `(txOutId, txOutIndex)`. Always derived by
/// replaying a chain; never persisted on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<UnspentTxOut>", into = "Vec<UnspentTxOut>")]
pub struct UtxoSet {
    entries: HashMap<OutPoint, UnspentTxOut>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, tx_out_id: &str, tx_out_index: u64) -> Option<&UnspentTxOut> {
        self.entries.get(&OutPoint::new(tx_out_id, tx_out_index))
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn insert(&mut self, utxo: UnspentTxOut) {
        self.entries.insert(utxo.outpoint(), utxo);
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnspentTxOut> {
        self.entries.values()
    }

    /// Outputs owned by `address`, in a stable order.
    pub fn owned_by(&self, address: &str) -> Vec<UnspentTxOut> {
        let mut owned: Vec<UnspentTxOut> = self
            .entries
            .values()
            .filter(|u| u.address == address)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.outpoint().cmp(&b.outpoint()));
        owned
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.entries
            .values()
            .filter(|u| u.address == address)
            .map(|u| u.amount)
            .sum()
    }

    pub fn total_supply(&self) -> u64 {
        self.entries.values().map(|u| u.amount).sum()
    }

    /// The set after `txs`: every output consumed by any input is removed,
    /// then one entry per output is added.
    pub fn updated(&self, txs: &[Transaction]) -> UtxoSet {
        let mut next = self.clone();
        for tx_in in txs.iter().flat_map(|tx| tx.tx_ins.iter()) {
            next.entries.remove(&tx_in.outpoint());
        }
        for tx in txs {
            for (index, tx_out) in tx.tx_outs.iter().enumerate() {
                next.insert(UnspentTxOut::new(
                    tx.id.clone(),
                    index as u64,
                    tx_out.address.clone(),
                    tx_out.amount,
                ));
            }
        }
        next
    }

    /// Entries in a stable order, for responses and persistence-free snapshots.
    pub fn to_vec(&self) -> Vec<UnspentTxOut> {
        let mut all: Vec<UnspentTxOut> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| a.outpoint().cmp(&b.outpoint()));
        all
    }
}

impl From<Vec<UnspentTxOut>> for UtxoSet {
    fn from(utxos: Vec<UnspentTxOut>) -> Self {
        let mut set = UtxoSet::new();
        for utxo in utxos {
            set.insert(utxo);
        }
        set
    }
}

impl From<UtxoSet> for Vec<UnspentTxOut> {
    fn from(set: UtxoSet) -> Self {
        set.to_vec()
    }
}
