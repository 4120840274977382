/// Validation logic for transactions separated from type definitions
use crate::blockchain::UtxoSet;
use crate::crypto::{is_valid_address, verify_signature};
use crate::error::ChainError;
use crate::transaction::types::{OutPoint, Transaction, TxIn, COINBASE_AMOUNT};
use std::collections::HashSet;

/// Shape checks that strict deserialization cannot express.
pub fn validate_transaction_structure(tx: &Transaction) -> Result<(), ChainError> {
    if tx.id.is_empty() {
        return Err(ChainError::Structural("Transaction id missing".to_string()));
    }

    for (i, tx_out) in tx.tx_outs.iter().enumerate() {
        if !is_valid_address(&tx_out.address) {
            return Err(ChainError::Structural(format!(
                "Output {} of transaction {} has an invalid address",
                i, tx.id
            )));
        }
    }

    Ok(())
}

fn validate_id(tx: &Transaction) -> Result<(), ChainError> {
    let expected = tx.compute_id();
    if expected != tx.id {
        return Err(ChainError::InvalidTransaction(format!(
            "Invalid transaction id {}, expected {}",
            tx.id, expected
        )));
    }
    Ok(())
}

/// Looks up the referenced output and checks the signature against its owner.
/// Returns the amount of the spent output.
fn validate_tx_in(tx_in: &TxIn, tx: &Transaction, utxos: &UtxoSet) -> Result<u64, ChainError> {
    let referenced = utxos
        .get(&tx_in.tx_out_id, tx_in.tx_out_index)
        .ok_or_else(|| {
            ChainError::InvalidTransaction(format!(
                "Referenced output {} not found in UTXO set",
                tx_in.outpoint()
            ))
        })?;

    verify_signature(&referenced.address, &tx.id, &tx_in.signature).map_err(|e| {
        ChainError::InvalidTransaction(format!(
            "Invalid signature on input {} of transaction {}: {}",
            tx_in.outpoint(),
            tx.id,
            e
        ))
    })?;

    Ok(referenced.amount)
}

/// Full validation of a regular (non-coinbase) transaction against `utxos`.
pub fn validate_transaction(tx: &Transaction, utxos: &UtxoSet) -> Result<(), ChainError> {
    validate_transaction_structure(tx)?;
    validate_id(tx)?;

    let mut total_in: u64 = 0;
    for tx_in in &tx.tx_ins {
        let amount = validate_tx_in(tx_in, tx, utxos)?;
        total_in = total_in.checked_add(amount).ok_or_else(|| {
            ChainError::InvalidTransaction(format!("Input total overflows in tx {}", tx.id))
        })?;
    }

    let total_out = tx.total_output().ok_or_else(|| {
        ChainError::InvalidTransaction(format!("Output total overflows in tx {}", tx.id))
    })?;

    if total_in != total_out {
        return Err(ChainError::InvalidTransaction(format!(
            "Value not conserved in tx {}: inputs {} != outputs {}",
            tx.id, total_in, total_out
        )));
    }

    Ok(())
}

pub fn validate_coinbase_tx(tx: &Transaction, block_index: u64) -> Result<(), ChainError> {
    validate_transaction_structure(tx)?;
    validate_id(tx)?;

    if tx.tx_ins.len() != 1 {
        return Err(ChainError::InvalidTransaction(
            "Coinbase transaction must have exactly one input".to_string(),
        ));
    }
    if tx.tx_ins[0].tx_out_index != block_index {
        return Err(ChainError::InvalidTransaction(format!(
            "Coinbase input index {} must equal block index {}",
            tx.tx_ins[0].tx_out_index, block_index
        )));
    }
    // a coinbase input references no output
    if !tx.tx_ins[0].tx_out_id.is_empty() || !tx.tx_ins[0].signature.is_empty() {
        return Err(ChainError::InvalidTransaction(
            "Coinbase input must not reference an output or carry a signature".to_string(),
        ));
    }
    if tx.tx_outs.len() != 1 {
        return Err(ChainError::InvalidTransaction(
            "Coinbase transaction must have exactly one output".to_string(),
        ));
    }
    if tx.tx_outs[0].amount != COINBASE_AMOUNT {
        return Err(ChainError::InvalidTransaction(format!(
            "Coinbase amount {} must be {}",
            tx.tx_outs[0].amount, COINBASE_AMOUNT
        )));
    }

    Ok(())
}

/// First input reference that appears more than once across `txs`.
pub fn find_duplicate_tx_in(txs: &[Transaction]) -> Option<OutPoint> {
    let mut seen = HashSet::new();
    txs.iter()
        .flat_map(|tx| tx.tx_ins.iter())
        .map(TxIn::outpoint)
        .find(|outpoint| !seen.insert(outpoint.clone()))
}

/// Validates a block's transaction list. Every regular transaction is checked
/// against the same pre-block snapshot, so a block cannot spend an output it
/// creates.
pub fn validate_block_transactions(
    txs: &[Transaction],
    utxos: &UtxoSet,
    block_index: u64,
) -> Result<(), ChainError> {
    let coinbase = txs.first().ok_or_else(|| {
        ChainError::InvalidBlock("The first transaction in a block must be a coinbase".to_string())
    })?;
    validate_coinbase_tx(coinbase, block_index)?;

    if let Some(duplicate) = find_duplicate_tx_in(txs) {
        return Err(ChainError::DoubleSpendDetected(format!(
            "Output {} is spent more than once in block {}",
            duplicate, block_index
        )));
    }

    for tx in &txs[1..] {
        validate_transaction(tx, utxos)?;
    }

    Ok(())
}

/// Validate-then-update: the UTXO set after applying `txs`, or the reason the
/// block's transactions are invalid.
pub fn process_transactions(
    txs: &[Transaction],
    utxos: &UtxoSet,
    block_index: u64,
) -> Result<UtxoSet, ChainError> {
    validate_block_transactions(txs, utxos, block_index)?;
    Ok(utxos.updated(txs))
}
