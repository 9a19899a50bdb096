use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::transaction::Transaction;
use super::GENESIS_PREVIOUS_HASH;

/// Proof stored in the genesis block. It is never checked against the puzzle.
pub const GENESIS_PROOF: u64 = 1;

/// Represents a sealed block in the ledger
///
/// Field order here is the canonical hashing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// 1-based position in the chain
    index: u64,

    /// Transactions sealed into this block, in submission order
    transactions: Vec<Transaction>,

    /// Proof of work
    proof: u64,

    /// Creation time in UTC nanoseconds since the Unix epoch
    timestamp: i64,

    /// Hash of the previous block
    previous_hash: String,
}

impl Block {
    /// Creates a new block
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `transactions` - The transactions to seal
    /// * `proof` - The proof of work
    /// * `timestamp` - Creation time in UTC nanoseconds
    /// * `previous_hash` - The hash of the previous block
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        proof: u64,
        timestamp: i64,
        previous_hash: String,
    ) -> Self {
        Block {
            index,
            transactions,
            proof,
            timestamp,
            previous_hash,
        }
    }

    /// Creates the genesis block (first block in the chain)
    pub fn genesis() -> Self {
        Block::new(
            1,
            Vec::new(),
            GENESIS_PROOF,
            now_nanos(),
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn proof(&self) -> u64 {
        self.proof
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 1 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Returns a copy with its transactions replaced, for tamper tests.
    #[cfg(test)]
    pub(crate) fn with_transactions(&self, transactions: Vec<Transaction>) -> Self {
        Block {
            transactions,
            ..self.clone()
        }
    }

    /// Returns a copy with its proof replaced, for tamper tests.
    #[cfg(test)]
    pub(crate) fn with_proof(&self, proof: u64) -> Self {
        Block {
            proof,
            ..self.clone()
        }
    }
}

/// Current UTC time in nanoseconds.
///
/// chrono only fails past the year 2262, where the value saturates.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
