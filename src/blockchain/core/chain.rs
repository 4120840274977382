use crate::transaction::{Transaction, TxIn, TxOut, COINBASE_AMOUNT};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type Sha256Hash = [u8; 32];

/// Address credited by the genesis coinbase.
pub const GENESIS_ADDRESS: &str = "04bfcab8722991ae774db48f934ca79cfb7dd991229153b9f732ba5334aafcd8e7266e47076996b55a14bf9913ee3145ce0cfc1372ada8ada74bd287450313534a";
pub const GENESIS_TIMESTAMP: u64 = 1_465_154_705;

static GENESIS_BLOCK: Lazy<Block> = Lazy::new(|| {
    let coinbase = Transaction::new(
        vec![TxIn::unsigned("", 0)],
        vec![TxOut::new(GENESIS_ADDRESS.to_string(), COINBASE_AMOUNT)],
    );
    Block::new(0, String::new(), GENESIS_TIMESTAMP, vec![coinbase], 0, 0)
});

/// The block every valid chain starts with. Identical on every node.
pub fn genesis_block() -> Block {
    GENESIS_BLOCK.clone()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub hash: String,
    pub previous_hash: String,
    pub timestamp: u64,
    pub data: Vec<Transaction>,
    pub difficulty: u32,
    pub nonce: u64,
}

/// Hex SHA-256 over every header field and the full transaction list.
pub fn calculate_hash(
    index: u64,
    previous_hash: &str,
    timestamp: u64,
    data: &[Transaction],
    difficulty: u32,
    nonce: u64,
) -> String {
    header_hash(
        index,
        previous_hash,
        timestamp,
        &transactions_digest(data),
        difficulty,
        nonce,
    )
}

/// Hash of a header whose transaction list has already been digested. Lets
/// the nonce search avoid re-encoding the transactions on every attempt.
pub fn header_hash(
    index: u64,
    previous_hash: &str,
    timestamp: u64,
    data_digest: &Sha256Hash,
    difficulty: u32,
    nonce: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_le_bytes());
    hasher.update(previous_hash.as_bytes());
    hasher.update(timestamp.to_le_bytes());
    hasher.update(data_digest);
    hasher.update(difficulty.to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Digest of the canonical JSON encoding of `data`, signatures included.
pub fn transactions_digest(data: &[Transaction]) -> Sha256Hash {
    let mut hasher = Sha256::new();
    for tx in data {
        // Plain structs of strings and integers always serialize.
        let encoded = serde_json::to_vec(tx).unwrap_or_default();
        hasher.update((encoded.len() as u64).to_le_bytes());
        hasher.update(encoded);
    }
    hasher.finalize().into()
}

impl Block {
    /// Builds a block and fills in its hash.
    pub fn new(
        index: u64,
        previous_hash: String,
        timestamp: u64,
        data: Vec<Transaction>,
        difficulty: u32,
        nonce: u64,
    ) -> Self {
        let hash = calculate_hash(index, &previous_hash, timestamp, &data, difficulty, nonce);
        Block {
            index,
            hash,
            previous_hash,
            timestamp,
            data,
            difficulty,
            nonce,
        }
    }

    pub fn compute_hash(&self) -> String {
        calculate_hash(
            self.index,
            &self.previous_hash,
            self.timestamp,
            &self.data,
            self.difficulty,
            self.nonce,
        )
    }

    pub fn is_genesis(&self) -> bool {
        self == &*GENESIS_BLOCK
    }

    /// Largest 256-bit value whose first `difficulty` bits are zero.
    pub fn hash_to_target(difficulty: u32) -> Sha256Hash {
        let mut target = [0xFF; 32];
        let leading_zeros = difficulty / 8;
        let partial_bits = difficulty % 8;

        for item in target.iter_mut().take(leading_zeros as usize) {
            *item = 0;
        }

        if leading_zeros < 32 && partial_bits > 0 {
            target[leading_zeros as usize] = 0xFF >> partial_bits;
        }
        target
    }

    /// True when `hash_hex` has at least `difficulty` leading zero bits.
    pub fn hash_matches_difficulty(hash_hex: &str, difficulty: u32) -> bool {
        let mut hash = [0u8; 32];
        if hex::decode_to_slice(hash_hex, &mut hash).is_err() {
            return false;
        }
        hash <= Self::hash_to_target(difficulty)
    }

    /// Consensus weight of this block.
    pub fn work(&self) -> u128 {
        1u128.checked_shl(self.difficulty).unwrap_or(u128::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_fixed() {
        let a = genesis_block();
        let b = genesis_block();
        assert_eq!(a, b);
        assert_eq!(a.index, 0);
        assert!(a.previous_hash.is_empty());
        assert_eq!(a.hash, a.compute_hash());
        assert_eq!(a.data.len(), 1);
        assert!(a.is_genesis());
    }

    #[test]
    fn test_hash_covers_every_field() {
        let genesis = genesis_block();
        let base = Block::new(1, genesis.hash.clone(), 100, genesis.data.clone(), 0, 0);

        let parent = genesis.hash.clone();
        let data = genesis.data.clone();
        let variants = [
            Block::new(2, parent.clone(), 100, data.clone(), 0, 0),
            Block::new(1, String::new(), 100, data.clone(), 0, 0),
            Block::new(1, parent.clone(), 101, data.clone(), 0, 0),
            Block::new(1, parent.clone(), 100, vec![], 0, 0),
            Block::new(1, parent.clone(), 100, data.clone(), 1, 0),
            Block::new(1, parent, 100, data, 0, 1),
        ];
        for variant in variants {
            assert_ne!(base.hash, variant.hash);
        }
    }

    #[test]
    fn test_hash_to_target() {
        assert_eq!(Block::hash_to_target(0), [0xFF; 32]);
        let t = Block::hash_to_target(12);
        assert_eq!(t[0], 0);
        assert_eq!(t[1], 0x0F);
        assert_eq!(t[2], 0xFF);
        assert_eq!(Block::hash_to_target(300), [0u8; 32]);
    }

    #[test]
    fn test_hash_matches_difficulty() {
        let zeros_4 = format!("0f{}", "ff".repeat(31));
        assert!(Block::hash_matches_difficulty(&zeros_4, 4));
        assert!(!Block::hash_matches_difficulty(&zeros_4, 5));
        assert!(Block::hash_matches_difficulty(&"ff".repeat(32), 0));
        assert!(!Block::hash_matches_difficulty("not-a-hash", 0));
    }

    #[test]
    fn test_work_is_power_of_two() {
        let mut block = genesis_block();
        assert_eq!(block.work(), 1);
        block.difficulty = 5;
        assert_eq!(block.work(), 32);
    }
}
