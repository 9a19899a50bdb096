// Ledger module
//
// This module contains the ledger core:
// - Transaction and Block data model
// - Hashing of blocks and of the proof-of-work puzzle
// - Proof of work search and verification
// - The Ledger itself (pending pool, mining, chain validation)

pub mod block;
pub mod chain;
pub mod hasher;
pub mod pow;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{BlockchainError, ChainViolation, Ledger};
pub use hasher::hash_block;
pub use pow::{CancelToken, ProofOfWork};
pub use transaction::Transaction;

/// Previous hash stored in the genesis block: an all-zero SHA-256 digest.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Default proof-of-work difficulty (leading zero hex nibbles).
pub const DEFAULT_DIFFICULTY: u8 = 4;
