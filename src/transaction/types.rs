/// Transaction types for emberchain
use crate::crypto::{sha256_hex, Address, KeyPair};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};

use crate::blockchain::UtxoSet;

/// Fixed reward paid by every block's coinbase transaction.
pub const COINBASE_AMOUNT: u64 = 50;

/// Identifies one output of a prior transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutPoint {
    pub tx_out_id: String,
    pub tx_out_index: u64,
}

impl OutPoint {
    pub fn new(tx_out_id: impl Into<String>, tx_out_index: u64) -> Self {
        OutPoint {
            tx_out_id: tx_out_id.into(),
            tx_out_index,
        }
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tx_out_id, self.tx_out_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentTxOut {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    pub address: Address,
    pub amount: u64,
}

impl UnspentTxOut {
    pub fn new(
        tx_out_id: impl Into<String>,
        tx_out_index: u64,
        address: Address,
        amount: u64,
    ) -> Self {
        UnspentTxOut {
            tx_out_id: tx_out_id.into(),
            tx_out_index,
            address,
            amount,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_out_id.clone(), self.tx_out_index)
    }
}

/// Spends one unspent output. For a coinbase input `tx_out_index` carries the
/// block index and `tx_out_id`/`signature` are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxIn {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    pub signature: String,
}

impl TxIn {
    pub fn unsigned(tx_out_id: impl Into<String>, tx_out_index: u64) -> Self {
        TxIn {
            tx_out_id: tx_out_id.into(),
            tx_out_index,
            signature: String::new(),
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_out_id.clone(), self.tx_out_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: Address,
    pub amount: u64,
}

impl TxOut {
    pub fn new(address: Address, amount: u64) -> Self {
        TxOut { address, amount }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

/// Digest over every input reference followed by every output. Signatures are
/// not covered, so signing does not change the id.
pub fn get_transaction_id(tx_ins: &[TxIn], tx_outs: &[TxOut]) -> String {
    let mut content = String::new();
    for tx_in in tx_ins {
        content.push_str(&tx_in.tx_out_id);
        content.push_str(&tx_in.tx_out_index.to_string());
    }
    for tx_out in tx_outs {
        content.push_str(&tx_out.address);
        content.push_str(&tx_out.amount.to_string());
    }
    sha256_hex(content.as_bytes())
}

impl Transaction {
    /// Builds an unsigned transaction with its id already computed.
    pub fn new(tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>) -> Self {
        let id = get_transaction_id(&tx_ins, &tx_outs);
        Transaction { id, tx_ins, tx_outs }
    }

    /// The reward-minting transaction that opens the block at `block_index`.
    pub fn coinbase(address: Address, block_index: u64) -> Self {
        Transaction::new(
            vec![TxIn::unsigned("", block_index)],
            vec![TxOut::new(address, COINBASE_AMOUNT)],
        )
    }

    pub fn compute_id(&self) -> String {
        get_transaction_id(&self.tx_ins, &self.tx_outs)
    }

    pub fn total_output(&self) -> Option<u64> {
        self.tx_outs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.amount))
    }

    /// Signs input `index` with `keypair` after checking that the key owns the
    /// referenced output.
    pub fn sign_input(
        &mut self,
        index: usize,
        keypair: &KeyPair,
        utxos: &UtxoSet,
    ) -> Result<(), ChainError> {
        let signature = sign_tx_in(self, index, keypair, utxos)?;
        self.tx_ins[index].signature = signature;
        Ok(())
    }
}

/// Produces the signature for input `index` of `tx`.
pub fn sign_tx_in(
    tx: &Transaction,
    index: usize,
    keypair: &KeyPair,
    utxos: &UtxoSet,
) -> Result<String, ChainError> {
    let tx_in = tx.tx_ins.get(index).ok_or_else(|| {
        ChainError::WalletError(format!("Transaction {} has no input {}", tx.id, index))
    })?;

    let referenced = utxos
        .get(&tx_in.tx_out_id, tx_in.tx_out_index)
        .ok_or_else(|| {
            ChainError::WalletError(format!(
                "Referenced output {} not found",
                tx_in.outpoint()
            ))
        })?;

    if referenced.address != keypair.address() {
        return Err(ChainError::WalletError(
            "Signing key does not match the address of the referenced output".to_string(),
        ));
    }

    keypair.sign_digest(&tx.id)
}
