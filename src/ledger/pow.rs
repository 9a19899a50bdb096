use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use super::block::{now_nanos, Block};
use super::hasher::{hash_transactions, HashError, PuzzleHasher};
use super::transaction::Transaction;

/// Upper bound for the difficulty: a SHA-256 hex digest has 64 nibbles.
pub const MAX_DIFFICULTY: u8 = 64;

/// Errors that can occur during the proof search
#[derive(Debug, Error)]
pub enum PowError {
    #[error("Proof search cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("Difficulty {0} is out of range (maximum 64)")]
    DifficultyOutOfRange(u8),

    #[error("Hash error: {0}")]
    Hash(#[from] HashError),
}

/// Thread-safe flag used to abort a running proof search.
///
/// Once raised it stays raised.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a successful proof search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seal {
    pub proof: u64,

    /// UTC nanoseconds at which the proof was found
    pub timestamp: i64,

    /// Number of candidates hashed, including the winning one
    pub attempts: u64,
}

/// Proof-of-work puzzle with a fixed difficulty
///
/// The puzzle digest is SHA-256 over the previous proof, the previous block
/// hash, the digest of the candidate transactions and the candidate proof.
/// A digest is accepted when it starts with `difficulty` zero hex nibbles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: u8,
}

impl ProofOfWork {
    pub fn new(difficulty: u8) -> Result<Self, PowError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(PowError::DifficultyOutOfRange(difficulty));
        }
        Ok(ProofOfWork { difficulty })
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// Checks whether a hex digest meets the difficulty
    pub fn difficulty_predicate(&self, digest: &str) -> bool {
        let k = self.difficulty as usize;
        digest.len() >= k && digest.bytes().take(k).all(|b| b == b'0')
    }

    /// Searches for a proof sealing `candidate_transactions` on top of the
    /// block with `previous_proof` and `previous_hash`
    ///
    /// Proofs are tried from 0 upwards. `cancel` is polled before every
    /// candidate.
    ///
    /// # Returns
    ///
    /// The first proof whose puzzle digest meets the difficulty, or
    /// `PowError::Cancelled` once `cancel` is raised
    pub fn seal(
        &self,
        previous_proof: u64,
        candidate_transactions: &[Transaction],
        previous_hash: &str,
        cancel: &CancelToken,
    ) -> Result<Seal, PowError> {
        let transactions_digest = hash_transactions(candidate_transactions)?;
        let puzzle = PuzzleHasher::new(previous_proof, previous_hash, &transactions_digest);

        debug!(
            "Searching proof over {} transactions at difficulty {}",
            candidate_transactions.len(),
            self.difficulty
        );

        let mut proof: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                info!("Proof search cancelled after {} attempts", proof);
                return Err(PowError::Cancelled { attempts: proof });
            }

            if self.difficulty_predicate(&puzzle.digest(proof)) {
                return Ok(Seal {
                    proof,
                    timestamp: now_nanos(),
                    attempts: proof + 1,
                });
            }

            proof = proof.wrapping_add(1);
        }
    }

    /// Checks the proof stored in `block` against its predecessor's proof
    pub fn verify(&self, previous_proof: u64, block: &Block) -> Result<bool, HashError> {
        let transactions_digest = hash_transactions(block.transactions())?;
        let puzzle = PuzzleHasher::new(previous_proof, block.previous_hash(), &transactions_digest);
        Ok(self.difficulty_predicate(&puzzle.digest(block.proof())))
    }
}
