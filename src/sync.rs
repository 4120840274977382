//! Chain synchronization
//!
//! Decides what to do with each inbound peer message. A message is handled to
//! completion before the next one; there is no persistent "syncing" state.
//! Chain responses are resolved inside a single ledger call so the tip cannot
//! move between the decision and the mutation.

use crate::blockchain::{validate_block_structure, Block, Ledger};
use crate::error::ChainError;
use crate::network::Message;
use crate::service::LedgerHandle;
use tracing::{debug, info};

/// What the transport should do after a message has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    None,
    /// Send back to the peer the message came from.
    Reply(Message),
    /// Send to every connected peer.
    Broadcast(Message),
}

#[derive(Clone)]
pub struct Synchronizer {
    ledger: LedgerHandle,
}

impl Synchronizer {
    pub fn new(ledger: LedgerHandle) -> Self {
        Synchronizer { ledger }
    }

    pub async fn handle_raw(&self, text: &str) -> Result<SyncAction, ChainError> {
        let message = Message::from_json(text)?;
        self.handle_message(message).await
    }

    pub async fn handle_message(&self, message: Message) -> Result<SyncAction, ChainError> {
        match message {
            Message::QueryLatest => {
                let tip = self.ledger.latest_block().await?;
                Ok(SyncAction::Reply(Message::ResponseChain(vec![tip])))
            }
            Message::QueryAll => {
                let chain = self.ledger.blocks().await?;
                Ok(SyncAction::Reply(Message::ResponseChain(chain)))
            }
            Message::ResponseChain(received) => {
                self.ledger
                    .call(move |ledger| handle_chain_response(ledger, received))
                    .await?
            }
        }
    }
}

fn handle_chain_response(
    ledger: &mut Ledger,
    received: Vec<Block>,
) -> Result<SyncAction, ChainError> {
    let Some(latest_received) = received.last() else {
        debug!("Received empty blockchain response");
        return Ok(SyncAction::None);
    };
    if let Err(e) = validate_block_structure(latest_received) {
        debug!("Discarding response with malformed tip: {}", e);
        return Ok(SyncAction::None);
    }

    let local_tip = ledger.latest_block();
    if latest_received.index <= local_tip.index {
        debug!(
            "Received blockchain is not longer than ours ({} <= {})",
            latest_received.index, local_tip.index
        );
        return Ok(SyncAction::None);
    }

    info!(
        "Blockchain possibly behind. We have {}, peer has {}",
        local_tip.index, latest_received.index
    );

    if latest_received.previous_hash == local_tip.hash {
        let block = latest_received.clone();
        ledger.add_block(block.clone())?;
        return Ok(SyncAction::Broadcast(Message::ResponseChain(vec![block])));
    }

    if received.len() == 1 {
        debug!("Single block does not link to our tip; querying full chain");
        return Ok(SyncAction::Reply(Message::QueryAll));
    }

    if ledger.replace_chain(received)? {
        let tip = ledger.latest_block().clone();
        Ok(SyncAction::Broadcast(Message::ResponseChain(vec![tip])))
    } else {
        Ok(SyncAction::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::genesis_block;
    use crate::config::ConsensusParams;
    use crate::crypto::KeyPair;
    use crate::miner::mine_block;
    use std::time::Duration;

    fn spawn_ledger() -> LedgerHandle {
        LedgerHandle::spawn(Ledger::new(ConsensusParams::default()).unwrap()).0
    }

    async fn mine_on(handle: &LedgerHandle) -> Block {
        let template = handle
            .block_template(KeyPair::generate().address(), vec![])
            .await
            .unwrap();
        let block = mine_block(template, 1_000);
        handle.add_block(block.clone()).await.unwrap();
        block
    }

    #[tokio::test]
    async fn test_queries_answer_with_local_chain() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let ledger = spawn_ledger();
            let b1 = mine_on(&ledger).await;
            let sync = Synchronizer::new(ledger);

            assert_eq!(
                sync.handle_message(Message::QueryLatest).await.unwrap(),
                SyncAction::Reply(Message::ResponseChain(vec![b1.clone()]))
            );
            assert_eq!(
                sync.handle_message(Message::QueryAll).await.unwrap(),
                SyncAction::Reply(Message::ResponseChain(vec![genesis_block(), b1]))
            );
        })
        .await
        .expect("test_queries_answer_with_local_chain timed out");
    }

    #[tokio::test]
    async fn test_linking_block_is_appended_and_rebroadcast() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let remote = spawn_ledger();
            let b1 = mine_on(&remote).await;

            let local = spawn_ledger();
            let sync = Synchronizer::new(local.clone());
            let action = sync
                .handle_message(Message::ResponseChain(vec![b1.clone()]))
                .await
                .unwrap();

            assert_eq!(action, SyncAction::Broadcast(Message::ResponseChain(vec![b1.clone()])));
            assert_eq!(local.latest_block().await.unwrap(), b1);
        })
        .await
        .expect("test_linking_block_is_appended_and_rebroadcast timed out");
    }

    #[tokio::test]
    async fn test_unlinked_single_block_triggers_full_query() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let remote = spawn_ledger();
            mine_on(&remote).await;
            let b2 = mine_on(&remote).await;

            let local = spawn_ledger();
            let sync = Synchronizer::new(local.clone());
            let action = sync
                .handle_message(Message::ResponseChain(vec![b2.clone()]))
                .await
                .unwrap();
            assert_eq!(action, SyncAction::Reply(Message::QueryAll));

            let full = remote.blocks().await.unwrap();
            let action = sync
                .handle_message(Message::ResponseChain(full.clone()))
                .await
                .unwrap();
            assert_eq!(action, SyncAction::Broadcast(Message::ResponseChain(vec![b2])));
            assert_eq!(local.blocks().await.unwrap(), full);
        })
        .await
        .expect("test_unlinked_single_block_triggers_full_query timed out");
    }

    #[tokio::test]
    async fn test_responses_that_do_not_advance_are_ignored() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let local = spawn_ledger();
            let b1 = mine_on(&local).await;
            let sync = Synchronizer::new(local.clone());

            assert_eq!(
                sync.handle_message(Message::ResponseChain(vec![])).await.unwrap(),
                SyncAction::None
            );
            assert_eq!(
                sync.handle_message(Message::ResponseChain(vec![genesis_block()]))
                    .await
                    .unwrap(),
                SyncAction::None
            );

            let mut malformed = b1.clone();
            malformed.index = 9;
            malformed.hash = "zz".to_string();
            assert_eq!(
                sync.handle_message(Message::ResponseChain(vec![malformed])).await.unwrap(),
                SyncAction::None
            );
            assert_eq!(local.blocks().await.unwrap().len(), 2);
        })
        .await
        .expect("test_responses_that_do_not_advance_are_ignored timed out");
    }

    #[tokio::test]
    async fn test_invalid_linking_block_is_rejected() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let remote = spawn_ledger();
            let mut b1 = mine_on(&remote).await;
            b1.nonce += 1;

            let local = spawn_ledger();
            let sync = Synchronizer::new(local.clone());
            assert!(sync.handle_message(Message::ResponseChain(vec![b1])).await.is_err());
            assert_eq!(local.blocks().await.unwrap().len(), 1);
        })
        .await
        .expect("test_invalid_linking_block_is_rejected timed out");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_error() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let sync = Synchronizer::new(spawn_ledger());
            assert!(matches!(
                sync.handle_raw("{\"type\":2}").await,
                Err(ChainError::Structural(_))
            ));
        })
        .await
        .expect("test_malformed_frame_is_error timed out");
    }
}
