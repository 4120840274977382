use super::chain::{genesis_block, Block};
use super::state::UtxoSet;
use super::validation::{
    accumulated_difficulty, next_difficulty, validate_chain, validate_new_block,
};
use crate::config::ConsensusParams;
use crate::crypto::Address;
use crate::error::ChainError;
use crate::mempool::{Mempool, TransactionPool};
use crate::transaction::{
    find_duplicate_tx_in, process_transactions, validate_transaction, Transaction,
};
use tracing::{debug, info};

/// Seconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Everything needed to mine the block that follows the current tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: u64,
    pub difficulty: u32,
    pub data: Vec<Transaction>,
}

/// Snapshot of chain statistics.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChainSummary {
    pub height: u64,
    pub tip_hash: String,
    pub next_difficulty: u32,
    pub accumulated_difficulty: u128,
    pub pool_size: usize,
}

/// Owns the canonical chain, the UTXO set derived from it and the pending
/// pool. The only mutation paths are [`Ledger::add_block`],
/// [`Ledger::replace_chain`] and [`Ledger::admit_transaction`].
pub struct Ledger {
    blocks: Vec<Block>,
    utxos: UtxoSet,
    pool: Box<dyn TransactionPool>,
    params: ConsensusParams,
}

impl Ledger {
    /// A ledger holding only the genesis block, with an in-memory pool.
    pub fn new(params: ConsensusParams) -> Result<Self, ChainError> {
        Self::with_pool(params, Box::new(Mempool::new()))
    }

    pub fn with_pool(
        params: ConsensusParams,
        pool: Box<dyn TransactionPool>,
    ) -> Result<Self, ChainError> {
        let genesis = genesis_block();
        let utxos = process_transactions(&genesis.data, &UtxoSet::new(), genesis.index)?;
        Ok(Ledger {
            blocks: vec![genesis],
            utxos,
            pool,
            params,
        })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn latest_block(&self) -> &Block {
        // `blocks` always holds at least the genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn pool(&self) -> &dyn TransactionPool {
        self.pool.as_ref()
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn next_difficulty(&self) -> u32 {
        next_difficulty(&self.blocks, &self.params)
    }

    pub fn accumulated_difficulty(&self) -> u128 {
        accumulated_difficulty(&self.blocks)
    }

    pub fn find_block(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    pub fn find_transaction(&self, id: &str) -> Option<&Transaction> {
        self.blocks
            .iter()
            .flat_map(|b| b.data.iter())
            .find(|tx| tx.id == id)
    }

    pub fn summary(&self) -> ChainSummary {
        let tip = self.latest_block();
        ChainSummary {
            height: tip.index,
            tip_hash: tip.hash.clone(),
            next_difficulty: self.next_difficulty(),
            accumulated_difficulty: self.accumulated_difficulty(),
            pool_size: self.pool.len(),
        }
    }

    /// Appends `candidate` to the tip. On any failure the ledger is unchanged.
    pub fn add_block(&mut self, candidate: Block) -> Result<(), ChainError> {
        validate_new_block(&candidate, self.latest_block(), current_timestamp(), &self.params)?;

        let required = self.next_difficulty();
        if candidate.difficulty != required {
            return Err(ChainError::InvalidBlock(format!(
                "Block {} difficulty {} does not match required {}",
                candidate.index, candidate.difficulty, required
            )));
        }

        let utxos = process_transactions(&candidate.data, &self.utxos, candidate.index)?;

        info!(
            "Appended block {} ({} transactions) {}",
            candidate.index,
            candidate.data.len(),
            candidate.hash
        );
        self.pool.remove_confirmed(&candidate);
        self.utxos = utxos;
        self.blocks.push(candidate);
        Ok(())
    }

    /// Swaps in `candidate` if it is valid and carries strictly more
    /// accumulated work. `Ok(false)` means it was valid but not heavier.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<bool, ChainError> {
        let utxos = validate_chain(&candidate, current_timestamp(), &self.params)?;

        let ours = self.accumulated_difficulty();
        let theirs = accumulated_difficulty(&candidate);
        if theirs <= ours {
            debug!(
                "Ignoring candidate chain with work {} (ours {})",
                theirs, ours
            );
            return Ok(false);
        }

        info!(
            "Replacing chain: height {} -> {}, work {} -> {}",
            self.latest_block().index,
            candidate.len() - 1,
            ours,
            theirs
        );
        self.blocks = candidate;
        self.utxos = utxos;
        self.pool.retain_spendable(&self.utxos);
        Ok(true)
    }

    /// Validates `tx` against the live UTXO set and pending pool and queues it.
    pub fn admit_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        self.pool.admit(tx, &self.utxos)
    }

    /// Template for the next block: a coinbase to `miner_address` followed by
    /// `transactions`, which must be valid against the current UTXO set and
    /// free of duplicate spends.
    pub fn block_template(
        &self,
        miner_address: Address,
        transactions: Vec<Transaction>,
    ) -> Result<BlockTemplate, ChainError> {
        for tx in &transactions {
            validate_transaction(tx, &self.utxos)?;
        }
        if let Some(duplicate) = find_duplicate_tx_in(&transactions) {
            return Err(ChainError::DoubleSpendDetected(format!(
                "Output {} is spent more than once",
                duplicate
            )));
        }

        let tip = self.latest_block();
        let index = tip.index + 1;
        let mut data = Vec::with_capacity(transactions.len() + 1);
        data.push(Transaction::coinbase(miner_address, index));
        data.extend(transactions);

        Ok(BlockTemplate {
            index,
            previous_hash: tip.hash.clone(),
            timestamp: current_timestamp().max(tip.timestamp),
            difficulty: self.next_difficulty(),
            data,
        })
    }
}
