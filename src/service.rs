//! Ledger-owning task
//!
//! A single tokio task owns the [`Ledger`]. Every other context (peer
//! connections, the miner, the HTTP facade) submits closures through a
//! [`LedgerHandle`]; the task runs them one at a time, so no two mutations
//! can interleave.

use crate::blockchain::{Block, BlockTemplate, ChainSummary, Ledger, UtxoSet};
use crate::crypto::Address;
use crate::error::ChainError;
use crate::transaction::Transaction;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

type Job = Box<dyn FnOnce(&mut Ledger) + Send>;

const JOB_QUEUE_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct LedgerHandle {
    jobs: mpsc::Sender<Job>,
}

impl LedgerHandle {
    /// Moves `ledger` into its own task. The task exits once every handle is dropped.
    pub fn spawn(mut ledger: Ledger) -> (Self, JoinHandle<()>) {
        let (jobs, mut rx) = mpsc::channel::<Job>(JOB_QUEUE_CAPACITY);
        let task = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job(&mut ledger);
            }
            debug!("Ledger task stopped");
        });
        (LedgerHandle { jobs }, task)
    }

    /// Runs `f` on the ledger task and returns its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, ChainError>
    where
        F: FnOnce(&mut Ledger) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |ledger| {
            let _ = reply_tx.send(f(ledger));
        });
        self.jobs
            .send(job)
            .await
            .map_err(|_| ChainError::LedgerUnavailable)?;
        reply_rx.await.map_err(|_| ChainError::LedgerUnavailable)
    }

    pub async fn latest_block(&self) -> Result<Block, ChainError> {
        self.call(|l| l.latest_block().clone()).await
    }

    pub async fn blocks(&self) -> Result<Vec<Block>, ChainError> {
        self.call(|l| l.blocks().to_vec()).await
    }

    pub async fn find_block(&self, hash: String) -> Result<Option<Block>, ChainError> {
        self.call(move |l| l.find_block(&hash).cloned()).await
    }

    pub async fn find_transaction(&self, id: String) -> Result<Option<Transaction>, ChainError> {
        self.call(move |l| l.find_transaction(&id).cloned()).await
    }

    pub async fn utxos(&self) -> Result<UtxoSet, ChainError> {
        self.call(|l| l.utxos().clone()).await
    }

    pub async fn pool_transactions(&self) -> Result<Vec<Transaction>, ChainError> {
        self.call(|l| l.pool().transactions()).await
    }

    pub async fn balance(&self, address: Address) -> Result<u64, ChainError> {
        self.call(move |l| l.utxos().balance(&address)).await
    }

    pub async fn summary(&self) -> Result<ChainSummary, ChainError> {
        self.call(|l| l.summary()).await
    }

    pub async fn add_block(&self, block: Block) -> Result<(), ChainError> {
        self.call(move |l| l.add_block(block)).await?
    }

    pub async fn replace_chain(&self, blocks: Vec<Block>) -> Result<bool, ChainError> {
        self.call(move |l| l.replace_chain(blocks)).await?
    }

    pub async fn admit_transaction(&self, tx: Transaction) -> Result<(), ChainError> {
        self.call(move |l| l.admit_transaction(tx)).await?
    }

    pub async fn block_template(
        &self,
        miner_address: Address,
        transactions: Vec<Transaction>,
    ) -> Result<BlockTemplate, ChainError> {
        self.call(move |l| l.block_template(miner_address, transactions))
            .await?
    }

    /// Appends `block` only if the tip is still the block it was mined on.
    pub async fn submit_mined_block(&self, block: Block) -> Result<(), ChainError> {
        self.call(move |l| {
            let tip = &l.latest_block().hash;
            if *tip != block.previous_hash {
                return Err(ChainError::RaceLost {
                    expected_parent: block.previous_hash.clone(),
                    current_tip: tip.clone(),
                });
            }
            l.add_block(block)
        })
        .await?
    }
}
