use super::chain::{genesis_block, Block};
use super::state::UtxoSet;
use crate::config::ConsensusParams;
use crate::error::ChainError;
use crate::transaction::process_transactions;

fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Shape-only checks on a block received from outside.
pub fn validate_block_structure(block: &Block) -> Result<(), ChainError> {
    if !is_hex_digest(&block.hash) {
        return Err(ChainError::Structural(format!(
            "Block {} hash is not a 32-byte hex digest",
            block.index
        )));
    }
    let genesis_link = block.index == 0 && block.previous_hash.is_empty();
    if !genesis_link && !is_hex_digest(&block.previous_hash) {
        return Err(ChainError::Structural(format!(
            "Block {} previous hash is not a 32-byte hex digest",
            block.index
        )));
    }
    if block.data.is_empty() {
        return Err(ChainError::Structural(format!(
            "Block {} carries no transactions",
            block.index
        )));
    }
    Ok(())
}

/// The stored hash must be reproducible and satisfy the block's difficulty.
pub fn validate_block_hash(block: &Block) -> Result<(), ChainError> {
    let expected = block.compute_hash();
    if expected != block.hash {
        return Err(ChainError::InvalidBlock(format!(
            "Hash mismatch for block {}. Expected {}, but got {}.",
            block.index, expected, block.hash
        )));
    }
    if !Block::hash_matches_difficulty(&block.hash, block.difficulty) {
        return Err(ChainError::InvalidBlock(format!(
            "Invalid Proof-of-Work: hash of block {} does not have {} leading zero bits.",
            block.index, block.difficulty
        )));
    }
    Ok(())
}

/// Rejects blocks stamped too far before their parent or ahead of `now`.
pub fn validate_timestamp(
    candidate: &Block,
    previous: &Block,
    now: u64,
    params: &ConsensusParams,
) -> Result<(), ChainError> {
    let tolerance = params.timestamp_tolerance_secs;
    if candidate.timestamp.saturating_add(tolerance) <= previous.timestamp {
        return Err(ChainError::InvalidBlock(format!(
            "Block {} timestamp {} is too far behind its parent ({})",
            candidate.index, candidate.timestamp, previous.timestamp
        )));
    }
    if candidate.timestamp >= now.saturating_add(tolerance) {
        return Err(ChainError::InvalidBlock(format!(
            "Block {} timestamp {} is too far in the future (now {})",
            candidate.index, candidate.timestamp, now
        )));
    }
    Ok(())
}

/// Linkage, proof-of-work and timestamp checks of `candidate` on top of `previous`.
pub fn validate_new_block(
    candidate: &Block,
    previous: &Block,
    now: u64,
    params: &ConsensusParams,
) -> Result<(), ChainError> {
    validate_block_structure(candidate)?;

    if candidate.index != previous.index + 1 {
        return Err(ChainError::InvalidBlock(format!(
            "Invalid block index. Expected {}, but got {}.",
            previous.index + 1,
            candidate.index
        )));
    }
    if candidate.previous_hash != previous.hash {
        return Err(ChainError::InvalidBlock(format!(
            "Invalid previous block hash. Expected {}, but got {}.",
            previous.hash, candidate.previous_hash
        )));
    }

    validate_timestamp(candidate, previous, now, params)?;
    validate_block_hash(candidate)
}

/// Difficulty required of the block that follows `chain`.
pub fn next_difficulty(chain: &[Block], params: &ConsensusParams) -> u32 {
    let Some(latest) = chain.last() else {
        return 0;
    };
    let interval = params.difficulty_adjustment_interval.max(1);
    if latest.index == 0 || latest.index % interval != 0 {
        return latest.difficulty;
    }

    let Some(start) = chain.len().checked_sub(interval as usize) else {
        return latest.difficulty;
    };
    let adjustment_start = &chain[start];

    let expected = params.block_generation_interval_secs.saturating_mul(interval);
    let taken = latest.timestamp.saturating_sub(adjustment_start.timestamp);

    if taken < expected / 2 {
        adjustment_start.difficulty + 1
    } else if taken > expected.saturating_mul(2) {
        adjustment_start.difficulty.saturating_sub(1)
    } else {
        adjustment_start.difficulty
    }
}

/// Sum of `2^difficulty` over every block.
pub fn accumulated_difficulty(chain: &[Block]) -> u128 {
    chain
        .iter()
        .fold(0u128, |acc, block| acc.saturating_add(block.work()))
}

/// Validates a full candidate chain from genesis and returns the UTXO set it
/// produces.
pub fn validate_chain(
    chain: &[Block],
    now: u64,
    params: &ConsensusParams,
) -> Result<UtxoSet, ChainError> {
    let genesis = chain
        .first()
        .ok_or_else(|| ChainError::InvalidBlock("Chain is empty".to_string()))?;
    if *genesis != genesis_block() {
        return Err(ChainError::InvalidBlock(
            "Chain does not start with the genesis block".to_string(),
        ));
    }

    let mut utxos = process_transactions(&genesis.data, &UtxoSet::new(), 0)?;

    for i in 1..chain.len() {
        let block = &chain[i];
        validate_new_block(block, &chain[i - 1], now, params)?;

        let required = next_difficulty(&chain[..i], params);
        if block.difficulty != required {
            return Err(ChainError::InvalidBlock(format!(
                "Block {} difficulty {} does not match required {}",
                block.index, block.difficulty, required
            )));
        }

        utxos = process_transactions(&block.data, &utxos, block.index)?;
    }

    Ok(utxos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::core::chain::GENESIS_TIMESTAMP;
    use crate::crypto::KeyPair;
    use crate::transaction::Transaction;

    const GENESIS_NOW: u64 = GENESIS_TIMESTAMP + 1_000;

    fn params() -> ConsensusParams {
        ConsensusParams::default()
    }

    fn next(prev: &Block, timestamp: u64, difficulty: u32) -> Block {
        let coinbase = Transaction::coinbase(KeyPair::generate().address(), prev.index + 1);
        let mut nonce = 0;
        loop {
            let block = Block::new(
                prev.index + 1,
                prev.hash.clone(),
                timestamp,
                vec![coinbase.clone()],
                difficulty,
                nonce,
            );
            if Block::hash_matches_difficulty(&block.hash, difficulty) {
                return block;
            }
            nonce += 1;
        }
    }

    #[test]
    fn test_genesis_chain_is_valid() {
        let utxos = validate_chain(&[genesis_block()], GENESIS_NOW, &params()).unwrap();
        assert_eq!(utxos.total_supply(), 50);
    }

    #[test]
    fn test_new_block_linkage() {
        let genesis = genesis_block();
        let block = next(&genesis, GENESIS_NOW, 0);
        assert!(validate_new_block(&block, &genesis, GENESIS_NOW, &params()).is_ok());

        let mut wrong_parent = block.clone();
        wrong_parent.previous_hash = "11".repeat(32);
        wrong_parent.hash = wrong_parent.compute_hash();
        assert!(validate_new_block(&wrong_parent, &genesis, GENESIS_NOW, &params()).is_err());

        let mut tampered = block.clone();
        tampered.nonce += 1;
        assert!(validate_new_block(&tampered, &genesis, GENESIS_NOW, &params()).is_err());

        // re-submitting the tip on top of itself reuses a consumed index
        assert!(validate_new_block(&block, &block, GENESIS_NOW, &params()).is_err());
    }

    #[test]
    fn test_timestamp_window() {
        let genesis = genesis_block();
        let tolerance = params().timestamp_tolerance_secs;

        let future = next(&genesis, GENESIS_NOW + tolerance, 0);
        assert!(validate_new_block(&future, &genesis, GENESIS_NOW, &params()).is_err());

        let stale = next(&genesis, genesis.timestamp - tolerance, 0);
        assert!(validate_new_block(&stale, &genesis, GENESIS_NOW, &params()).is_err());

        let slightly_early = next(&genesis, genesis.timestamp - tolerance + 1, 0);
        assert!(validate_new_block(&slightly_early, &genesis, GENESIS_NOW, &params()).is_ok());
    }

    #[test]
    fn test_proof_of_work_enforced() {
        let genesis = genesis_block();
        let block = next(&genesis, GENESIS_NOW, 8);
        assert!(validate_block_hash(&block).is_ok());

        let mut cheated = block.clone();
        cheated.difficulty = 40;
        cheated.hash = cheated.compute_hash();
        assert!(validate_block_hash(&cheated).is_err());
    }

    #[test]
    fn test_structure_rejects_bad_hashes() {
        let mut block = next(&genesis_block(), GENESIS_NOW, 0);
        assert!(validate_block_structure(&block).is_ok());
        block.hash = "xyz".to_string();
        assert!(matches!(validate_block_structure(&block), Err(ChainError::Structural(_))));
        assert!(validate_block_structure(&genesis_block()).is_ok());
    }

    #[test]
    fn test_chain_must_start_at_genesis() {
        let genesis = genesis_block();
        let block = next(&genesis, GENESIS_NOW, 0);
        assert!(validate_chain(&[block.clone()], GENESIS_NOW, &params()).is_err());
        assert!(validate_chain(&[], GENESIS_NOW, &params()).is_err());

        let utxos = validate_chain(&[genesis, block], GENESIS_NOW, &params()).unwrap();
        assert_eq!(utxos.total_supply(), 100);
    }

    #[test]
    fn test_chain_rejects_unrequired_difficulty() {
        let genesis = genesis_block();
        let block = next(&genesis, GENESIS_NOW, 1);
        assert!(validate_new_block(&block, &genesis, GENESIS_NOW, &params()).is_ok());
        assert!(validate_chain(&[genesis, block], GENESIS_NOW, &params()).is_err());
    }

    #[test]
    fn test_accumulated_difficulty() {
        let genesis = genesis_block();
        let mut b1 = next(&genesis, GENESIS_NOW, 0);
        b1.difficulty = 3;
        assert_eq!(accumulated_difficulty(&[genesis.clone()]), 1);
        assert_eq!(accumulated_difficulty(&[genesis, b1]), 9);
    }

    #[test]
    fn test_next_difficulty_adjustment() {
        let p = ConsensusParams {
            block_generation_interval_secs: 10,
            difficulty_adjustment_interval: 2,
            timestamp_tolerance_secs: 60,
        };
        let genesis = genesis_block();

        // fast blocks raise difficulty by one
        let b1 = next(&genesis, genesis.timestamp + 1, 0);
        let b2 = next(&b1, genesis.timestamp + 2, 0);
        let fast = vec![genesis.clone(), b1.clone(), b2];
        assert_eq!(next_difficulty(&fast[..2], &p), 0);
        assert_eq!(next_difficulty(&fast, &p), 1);

        // slow blocks lower it, but never below zero
        let slow_b2 = next(&b1, genesis.timestamp + 1_000, 0);
        assert_eq!(next_difficulty(&[genesis.clone(), b1.clone(), slow_b2], &p), 0);

        let mut hard_b1 = b1.clone();
        hard_b1.difficulty = 4;
        let slow_after_hard = next(&b1, genesis.timestamp + 1_000, 0);
        assert_eq!(next_difficulty(&[genesis.clone(), hard_b1, slow_after_hard], &p), 3);

        // on-target blocks keep it
        let steady_b2 = next(&b1, b1.timestamp + 20, 0);
        assert_eq!(next_difficulty(&[genesis, b1, steady_b2], &p), 0);
    }

    #[test]
    fn test_next_difficulty_with_huge_interval() {
        let p = ConsensusParams {
            block_generation_interval_secs: u64::MAX,
            difficulty_adjustment_interval: 2,
            timestamp_tolerance_secs: 60,
        };
        let genesis = genesis_block();
        let b1 = next(&genesis, genesis.timestamp + 1, 0);
        let b2 = next(&b1, genesis.timestamp + 2, 0);

        // any real span is far below the saturated expectation
        assert_eq!(next_difficulty(&[genesis, b1, b2], &p), 1);
    }
}
