use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};

use log::{debug, error, info, warn};
use thiserror::Error;

use super::block::Block;
use super::hasher::{hash_block, HashError};
use super::pow::{CancelToken, PowError, ProofOfWork, Seal, MAX_DIFFICULTY};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error(transparent)]
    InvalidInput(#[from] TransactionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] HashError),

    #[error("Mining cancelled, pending transactions were kept")]
    MiningCancelled,

    #[error("Mining already in progress")]
    MiningInProgress,

    #[error("Ledger has no blocks and refuses further operations")]
    EmptyChain,

    #[error("Invalid difficulty: {0}")]
    InvalidDifficulty(String),

    #[error("System error: {0}")]
    SystemError(String),
}

impl From<PowError> for BlockchainError {
    fn from(err: PowError) -> Self {
        match err {
            PowError::Cancelled { .. } => BlockchainError::MiningCancelled,
            PowError::DifficultyOutOfRange(difficulty) => BlockchainError::InvalidDifficulty(
                format!("{} exceeds the maximum of {}", difficulty, MAX_DIFFICULTY),
            ),
            PowError::Hash(err) => BlockchainError::Serialization(err),
        }
    }
}

/// First problem found while validating a chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainViolation {
    #[error("chain is empty")]
    EmptyChain,

    #[error("genesis block must have index 1 and the zero previous hash")]
    BadGenesis,

    #[error("expected block index {expected}, found {found}")]
    IndexGap { expected: u64, found: u64 },

    #[error("block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: u64 },

    #[error("block {index} carries a proof that misses the difficulty")]
    ProofRejected { index: u64 },

    #[error("block {index} cannot be hashed")]
    Unhashable { index: u64 },
}

/// Everything the proof search needs, captured under lock
struct Candidate {
    last_block: Block,
    previous_hash: String,
    transactions: Vec<Transaction>,
}

/// Represents the ledger: the sealed chain plus the pending pool
///
/// Cloning is cheap and yields another handle onto the same ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    /// The chain of sealed blocks
    chain: Arc<RwLock<Vec<Block>>>,

    /// Transactions waiting for the next block
    pending: Arc<Mutex<Vec<Transaction>>>,

    /// Held for the whole of a mining run; one miner at a time
    miner: Arc<Mutex<()>>,

    /// Raised once the chain is found empty
    halted: Arc<AtomicBool>,

    pow: ProofOfWork,
}

impl Ledger {
    /// Creates a new ledger with a genesis block
    ///
    /// # Arguments
    ///
    /// * `difficulty` - Number of leading zero hex nibbles a proof digest needs
    pub fn new(difficulty: u8) -> Result<Self, BlockchainError> {
        Ok(Self::with_pow(ProofOfWork::new(difficulty)?))
    }

    /// Creates a new ledger with a genesis block and the given puzzle
    pub fn with_pow(pow: ProofOfWork) -> Self {
        let genesis = Block::genesis();
        info!(
            "Created genesis block at {} (difficulty {})",
            genesis.timestamp(),
            pow.difficulty()
        );

        Ledger {
            chain: Arc::new(RwLock::new(vec![genesis])),
            pending: Arc::new(Mutex::new(Vec::new())),
            miner: Arc::new(Mutex::new(())),
            halted: Arc::new(AtomicBool::new(false)),
            pow,
        }
    }

    pub fn difficulty(&self) -> u8 {
        self.pow.difficulty()
    }

    /// Adds a new transaction to the pending pool
    ///
    /// # Returns
    ///
    /// The 1-based position the transaction would take in the next block
    /// if it were sealed right now
    pub fn submit(
        &self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: i64,
    ) -> Result<usize, BlockchainError> {
        self.ensure_live()?;
        let transaction = Transaction::new(sender, recipient, amount)?;

        let mut pending = self.lock_pending()?;
        pending.push(transaction);
        let position = pending.len();

        debug!("Transaction queued at position {}", position);
        Ok(position)
    }

    /// Gets the most recently sealed block
    pub fn last_block(&self) -> Result<Block, BlockchainError> {
        self.ensure_live()?;
        let chain = self.read_chain()?;
        self.tip(&chain)
    }

    /// Gets a copy of the entire chain
    pub fn chain(&self) -> Result<Vec<Block>, BlockchainError> {
        self.ensure_live()?;
        Ok(self.read_chain()?.clone())
    }

    /// Gets a copy of the pending pool
    pub fn pending_transactions(&self) -> Result<Vec<Transaction>, BlockchainError> {
        self.ensure_live()?;
        Ok(self.lock_pending()?.clone())
    }

    /// Mines a new block from the pending pool, waiting for any running miner
    pub fn mine(&self) -> Result<Block, BlockchainError> {
        self.mine_with_cancel(&CancelToken::new())
    }

    /// Like `mine`, but the search stops with `MiningCancelled` once
    /// `cancel` is raised
    pub fn mine_with_cancel(&self, cancel: &CancelToken) -> Result<Block, BlockchainError> {
        self.ensure_live()?;
        let _miner = self.miner.lock().unwrap_or_else(PoisonError::into_inner);
        self.mine_exclusive(cancel)
    }

    /// Like `mine_with_cancel`, but fails with `MiningInProgress` instead of
    /// waiting when another miner is running
    pub fn try_mine(&self, cancel: &CancelToken) -> Result<Block, BlockchainError> {
        self.ensure_live()?;
        let _miner = match self.miner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(BlockchainError::MiningInProgress),
        };
        self.mine_exclusive(cancel)
    }

    /// Validates the ledger's own chain
    pub fn is_valid(&self) -> bool {
        match self.chain() {
            Ok(chain) => self.is_valid_chain(&chain),
            Err(err) => {
                warn!("Cannot validate chain: {}", err);
                false
            }
        }
    }

    /// Validates any chain against this ledger's difficulty
    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        match self.validate(chain) {
            Ok(()) => true,
            Err(violation) => {
                debug!("Chain rejected: {}", violation);
                false
            }
        }
    }

    /// Walks the chain from genesis and reports the first violation
    pub fn validate(&self, chain: &[Block]) -> Result<(), ChainViolation> {
        let genesis = chain.first().ok_or(ChainViolation::EmptyChain)?;
        if !genesis.is_genesis() {
            return Err(ChainViolation::BadGenesis);
        }

        for (expected, pair) in (2u64..).zip(chain.windows(2)) {
            let (previous, current) = (&pair[0], &pair[1]);

            if current.index() != expected {
                return Err(ChainViolation::IndexGap {
                    expected,
                    found: current.index(),
                });
            }

            let previous_hash = hash_block(previous).map_err(|_| ChainViolation::Unhashable {
                index: previous.index(),
            })?;
            if current.previous_hash() != previous_hash {
                return Err(ChainViolation::BrokenLink {
                    index: current.index(),
                });
            }

            match self.pow.verify(previous.proof(), current) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(ChainViolation::ProofRejected {
                        index: current.index(),
                    })
                }
                Err(_) => {
                    return Err(ChainViolation::Unhashable {
                        index: current.index(),
                    })
                }
            }
        }

        Ok(())
    }

    /// Runs one mining round; the caller holds the miner guard
    fn mine_exclusive(&self, cancel: &CancelToken) -> Result<Block, BlockchainError> {
        let candidate = self.snapshot()?;

        let seal = self
            .pow
            .seal(
                candidate.last_block.proof(),
                &candidate.transactions,
                &candidate.previous_hash,
                cancel,
            )
            .map_err(|err| {
                warn!(
                    "Mining on block {} stopped: {}",
                    candidate.last_block.index(),
                    err
                );
                BlockchainError::from(err)
            })?;

        self.commit(candidate, seal)
    }

    /// Captures the chain tip and the pending pool for a proof search
    fn snapshot(&self) -> Result<Candidate, BlockchainError> {
        let last_block = self.last_block()?;
        let previous_hash = hash_block(&last_block)?;
        let transactions = self.pending_transactions()?;

        Ok(Candidate {
            last_block,
            previous_hash,
            transactions,
        })
    }

    /// Appends the sealed block and drops exactly the snapshotted
    /// transactions from the pool
    fn commit(&self, candidate: Candidate, seal: Seal) -> Result<Block, BlockchainError> {
        let mut chain = self.write_chain()?;
        if self.tip(&chain)? != candidate.last_block {
            return Err(BlockchainError::SystemError(
                "chain tip moved while mining".to_string(),
            ));
        }

        let mut pending = self.lock_pending()?;
        let taken = candidate.transactions.len();
        if pending.get(..taken) != Some(candidate.transactions.as_slice()) {
            return Err(BlockchainError::SystemError(
                "pending pool changed under the miner".to_string(),
            ));
        }

        // Proofs never cover the timestamp, so it can be nudged forward.
        let timestamp = seal
            .timestamp
            .max(candidate.last_block.timestamp().saturating_add(1));

        let block = Block::new(
            chain.len() as u64 + 1,
            candidate.transactions,
            seal.proof,
            timestamp,
            candidate.previous_hash,
        );

        chain.push(block.clone());
        pending.drain(..taken);

        info!(
            "Sealed block {} with {} transactions (proof {}, {} attempts)",
            block.index(),
            taken,
            block.proof(),
            seal.attempts
        );
        Ok(block)
    }

    fn tip(&self, chain: &[Block]) -> Result<Block, BlockchainError> {
        match chain.last() {
            Some(block) => Ok(block.clone()),
            None => {
                error!("Chain is empty; halting ledger");
                self.halted.store(true, Ordering::SeqCst);
                Err(BlockchainError::EmptyChain)
            }
        }
    }

    fn ensure_live(&self) -> Result<(), BlockchainError> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(BlockchainError::EmptyChain);
        }
        Ok(())
    }

    fn read_chain(&self) -> Result<RwLockReadGuard<'_, Vec<Block>>, BlockchainError> {
        self.chain
            .read()
            .map_err(|_| BlockchainError::SystemError("chain lock poisoned".to_string()))
    }

    fn write_chain(&self) -> Result<RwLockWriteGuard<'_, Vec<Block>>, BlockchainError> {
        self.chain
            .write()
            .map_err(|_| BlockchainError::SystemError("chain lock poisoned".to_string()))
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, Vec<Transaction>>, BlockchainError> {
        self.pending
            .lock()
            .map_err(|_| BlockchainError::SystemError("pending lock poisoned".to_string()))
    }
}
