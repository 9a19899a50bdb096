use sha2::{Digest, Sha256};
use thiserror::Error;

use super::block::Block;
use super::transaction::Transaction;

/// Errors that can occur while fingerprinting ledger data
#[derive(Debug, Error)]
pub enum HashError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Calculates the hash of a block
///
/// The block is serialized as JSON in struct field order, so equal blocks
/// always produce equal bytes.
///
/// # Returns
///
/// The SHA-256 hash of the block as a lowercase hexadecimal string
pub fn hash_block(block: &Block) -> Result<String, HashError> {
    let bytes = serde_json::to_vec(block)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Calculates the hash of an ordered batch of transactions
pub fn hash_transactions(transactions: &[Transaction]) -> Result<String, HashError> {
    let bytes = serde_json::to_vec(transactions)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Digest builder for the proof-of-work puzzle.
///
/// Everything except the candidate proof is absorbed once; each candidate
/// clones that state and appends its proof.
#[derive(Clone)]
pub struct PuzzleHasher {
    prefix: Sha256,
}

impl PuzzleHasher {
    pub fn new(previous_proof: u64, previous_hash: &str, transactions_digest: &str) -> Self {
        let mut prefix = Sha256::new();
        prefix.update(previous_proof.to_be_bytes());
        prefix.update(previous_hash.as_bytes());
        prefix.update(transactions_digest.as_bytes());
        PuzzleHasher { prefix }
    }

    pub fn digest(&self, proof: u64) -> String {
        let mut hasher = self.prefix.clone();
        hasher.update(proof.to_be_bytes());
        hex::encode(hasher.finalize())
    }
}
