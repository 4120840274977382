//! Proof-of-work mining
//!
//! The nonce search is CPU-bound and runs on the blocking pool; the ledger is
//! only touched again when the mined block is submitted. If a peer's block
//! advanced the tip in the meantime the submission fails with
//! [`ChainError::RaceLost`].

use crate::blockchain::{current_timestamp, header_hash, transactions_digest, Block, BlockTemplate};
use crate::error::ChainError;
use crate::network::{Message, PeerSet};
use crate::service::LedgerHandle;
use crate::transaction::Transaction;
use crate::wallet::Wallet;
use std::sync::Arc;
use tracing::{debug, info};

/// Searches nonces until the header hash meets the template's difficulty.
/// The timestamp is refreshed from the clock after every `nonce_batch`
/// attempts so long searches still produce a current block.
pub fn mine_block(template: BlockTemplate, nonce_batch: u64) -> Block {
    let BlockTemplate {
        index,
        previous_hash,
        mut timestamp,
        difficulty,
        data,
    } = template;
    let digest = transactions_digest(&data);
    let batch = nonce_batch.max(1);
    let mut nonce: u64 = 0;

    loop {
        let hash = header_hash(index, &previous_hash, timestamp, &digest, difficulty, nonce);
        if Block::hash_matches_difficulty(&hash, difficulty) {
            debug!("Found nonce {} for block {} at difficulty {}", nonce, index, difficulty);
            return Block {
                index,
                hash,
                previous_hash,
                timestamp,
                data,
                difficulty,
                nonce,
            };
        }

        nonce = nonce.wrapping_add(1);
        if nonce % batch == 0 {
            timestamp = current_timestamp().max(timestamp);
        }
    }
}

#[derive(Clone)]
pub struct Miner {
    ledger: LedgerHandle,
    wallet: Arc<Wallet>,
    peers: PeerSet,
    nonce_batch: u64,
}

impl Miner {
    pub fn new(
        ledger: LedgerHandle,
        wallet: Arc<Wallet>,
        peers: PeerSet,
        nonce_batch: u64,
    ) -> Self {
        Miner {
            ledger,
            wallet,
            peers,
            nonce_batch,
        }
    }

    /// Mines a block holding a coinbase to this node's wallet followed by
    /// `transactions`, appends it and announces it to peers.
    pub async fn generate_raw_next_block(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Block, ChainError> {
        let template = self
            .ledger
            .block_template(self.wallet.address(), transactions)
            .await?;

        let nonce_batch = self.nonce_batch;
        let block = tokio::task::spawn_blocking(move || mine_block(template, nonce_batch))
            .await
            .map_err(|e| ChainError::MiningFailed(e.to_string()))?;

        self.ledger.submit_mined_block(block.clone()).await?;
        info!("Mined block {} {}", block.index, block.hash);

        self.peers
            .broadcast(&Message::ResponseChain(vec![block.clone()]))
            .await;
        Ok(block)
    }

    /// Mines the current pool contents.
    pub async fn generate_next_block(&self) -> Result<Block, ChainError> {
        let pending = self.ledger.pool_transactions().await?;
        self.generate_raw_next_block(pending).await
    }

    /// Builds a payment from this node's wallet and mines it straight into a block.
    pub async fn generate_next_block_with_transaction(
        &self,
        receiver: String,
        amount: u64,
    ) -> Result<Block, ChainError> {
        let tx = self.create_transaction(receiver, amount).await?;
        self.generate_raw_next_block(vec![tx]).await
    }

    /// Builds a payment from this node's wallet and queues it in the pool.
    pub async fn send_transaction(
        &self,
        receiver: String,
        amount: u64,
    ) -> Result<Transaction, ChainError> {
        let wallet = Arc::clone(&self.wallet);
        self.ledger
            .call(move |ledger| {
                let pending = ledger.pool().transactions();
                let tx = wallet.create_transaction(&receiver, amount, ledger.utxos(), &pending)?;
                ledger.admit_transaction(tx.clone())?;
                Ok(tx)
            })
            .await?
    }

    async fn create_transaction(
        &self,
        receiver: String,
        amount: u64,
    ) -> Result<Transaction, ChainError> {
        let wallet = Arc::clone(&self.wallet);
        self.ledger
            .call(move |ledger| {
                let pending = ledger.pool().transactions();
                wallet.create_transaction(&receiver, amount, ledger.utxos(), &pending)
            })
            .await?
    }
}
