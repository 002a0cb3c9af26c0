use chrono::{DateTime, Utc};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::crypto::{CryptoContext, Hasher};
use super::transaction::{Transaction, TransactionError};

/// Hex digits in a SHA-256 digest; no hash can have more leading zeros
pub const MAX_DIFFICULTY: usize = 64;

/// 2019-01-01T00:00:00Z
const GENESIS_TIMESTAMP_MS: i64 = 1_546_300_800_000;

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

const PROGRESS_INTERVAL: u64 = 100_000;

/// Errors that can occur while searching for a proof of work
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MiningError {
    #[error("Difficulty {0} exceeds the hash length of 64 hex digits")]
    DifficultyTooHigh(usize),

    #[error("Mining was cancelled")]
    Cancelled,

    #[error("Nonce space exhausted without meeting difficulty {0}")]
    NonceSpaceExhausted(usize),
}

/// How the nonce search is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningMode {
    #[default]
    Sequential,
    /// Split the nonce space across the rayon thread pool
    Parallel,
}

/// Shared flag that stops an in-flight nonce search
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// True when the first `difficulty` characters of `hash` are all '0'
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Timestamp when the block was created
    pub timestamp: DateTime<Utc>,

    /// List of transactions included in this block, in hashing order
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof of work counter
    pub nonce: u64,

    /// Hash of the current block as of the last mining step
    pub hash: String,
}

impl Block {
    /// Creates a new block with nonce 0 and its hash already computed
    pub fn new(
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
        hasher: &dyn Hasher,
    ) -> Self {
        let mut block = Block {
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };

        block.hash = block.calculate_hash(hasher);
        block
    }

    /// The fixed first block of every chain
    pub fn genesis(hasher: &dyn Hasher) -> Self {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(GENESIS_TIMESTAMP_MS).unwrap_or_default();
        Block::new(timestamp, Vec::new(), GENESIS_PREVIOUS_HASH.to_string(), hasher)
    }

    /// Calculates the hash of the block from its current contents
    pub fn calculate_hash(&self, hasher: &dyn Hasher) -> String {
        hash_with_nonce(&self.hash_prefix(), self.nonce, hasher)
    }

    /// Everything that goes into the hash except the nonce
    fn hash_prefix(&self) -> String {
        // Serializing plain structs with string keys into a String cannot fail
        let transactions = serde_json::to_string(&self.transactions)
            .expect("transaction list serializes to JSON");

        format!(
            "{}{}{}",
            self.previous_hash,
            self.timestamp.timestamp_millis(),
            transactions
        )
    }

    /// Sequential proof of work
    pub fn mine_block(&mut self, difficulty: usize, hasher: &dyn Hasher) -> Result<(), MiningError> {
        self.mine_block_with(difficulty, hasher, MiningMode::Sequential, &CancelToken::new())
    }

    /// Searches nonces from the current one upwards until the hash has
    /// `difficulty` leading zeros, then commits that nonce and hash.
    ///
    /// The block is left untouched when the search fails or is cancelled.
    pub fn mine_block_with(
        &mut self,
        difficulty: usize,
        hasher: &dyn Hasher,
        mode: MiningMode,
        cancel: &CancelToken,
    ) -> Result<(), MiningError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(MiningError::DifficultyTooHigh(difficulty));
        }

        let prefix = self.hash_prefix();

        let (nonce, hash) = match mode {
            MiningMode::Sequential => search_sequential(&prefix, self.nonce, difficulty, hasher, cancel)?,
            MiningMode::Parallel => search_parallel(&prefix, self.nonce, difficulty, hasher, cancel)?,
        };

        self.nonce = nonce;
        self.hash = hash;

        info!("Block mined: {} (nonce {})", self.hash, self.nonce);
        Ok(())
    }

    /// Checks every transaction, stopping at the first invalid one.
    /// Faults such as a missing signature are passed through.
    pub fn has_valid_transactions(&self, crypto: &CryptoContext) -> Result<bool, TransactionError> {
        for transaction in &self.transactions {
            if !transaction.is_valid(crypto)? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

fn hash_with_nonce(prefix: &str, nonce: u64, hasher: &dyn Hasher) -> String {
    hasher.digest(format!("{}{}", prefix, nonce).as_bytes())
}

fn search_sequential(
    prefix: &str,
    start: u64,
    difficulty: usize,
    hasher: &dyn Hasher,
    cancel: &CancelToken,
) -> Result<(u64, String), MiningError> {
    for nonce in start..=u64::MAX {
        if cancel.is_cancelled() {
            return Err(MiningError::Cancelled);
        }

        let hash = hash_with_nonce(prefix, nonce, hasher);
        if meets_difficulty(&hash, difficulty) {
            return Ok((nonce, hash));
        }

        let attempts = nonce - start + 1;
        if attempts % PROGRESS_INTERVAL == 0 {
            debug!("Mining attempts: {}", attempts);
        }
    }

    Err(MiningError::NonceSpaceExhausted(difficulty))
}

fn search_parallel(
    prefix: &str,
    start: u64,
    difficulty: usize,
    hasher: &dyn Hasher,
    cancel: &CancelToken,
) -> Result<(u64, String), MiningError> {
    // find_map_any stops every worker as soon as one returns Some
    let found = (start..=u64::MAX).into_par_iter().find_map_any(|nonce| {
        if cancel.is_cancelled() {
            return Some(Err(MiningError::Cancelled));
        }

        let hash = hash_with_nonce(prefix, nonce, hasher);
        meets_difficulty(&hash, difficulty).then_some(Ok((nonce, hash)))
    });

    found.unwrap_or(Err(MiningError::NonceSpaceExhausted(difficulty)))
}
