use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::block::{Block, CancelToken, MiningError, MiningMode};
use super::crypto::{Address, CryptoContext};
use super::transaction::{Transaction, TransactionError};
use crate::config::ChainConfig;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Mining error: {0}")]
    MiningError(#[from] MiningError),

    #[error("The chain has no blocks")]
    EmptyChain,
}

/// First check a block failed during `verify_chain`
#[derive(Debug, Error)]
pub enum ChainValidationError {
    #[error("Block {index}: stored hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("Block {index}: contains a transaction with an invalid signature")]
    InvalidTransactions { index: usize },

    #[error("Block {index}: transaction could not be validated: {source}")]
    TransactionFault {
        index: usize,
        #[source]
        source: TransactionError,
    },

    #[error("Block {index}: previous hash does not match its predecessor")]
    BrokenLink { index: usize },
}

/// Blocks and pending transactions, guarded together so a mining cycle is atomic
#[derive(Debug)]
struct ChainState {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
}

/// Represents the blockchain
#[derive(Debug, Clone)]
pub struct Blockchain {
    state: Arc<Mutex<ChainState>>,

    /// Mining difficulty (number of leading zeros required in hash)
    difficulty: usize,

    /// Mining reward
    mining_reward: u64,

    mining_mode: MiningMode,

    crypto: CryptoContext,
}

impl Blockchain {
    /// Creates a new blockchain with a genesis block and the default settings
    pub fn new() -> Self {
        Self::with_config(ChainConfig::default())
    }

    pub fn with_config(config: ChainConfig) -> Self {
        Self::with_crypto(config, CryptoContext::default())
    }

    /// Creates a new blockchain using the given hasher and signature scheme
    pub fn with_crypto(config: ChainConfig, crypto: CryptoContext) -> Self {
        let genesis_block = Block::genesis(crypto.hasher());

        Blockchain {
            state: Arc::new(Mutex::new(ChainState {
                chain: vec![genesis_block],
                pending_transactions: Vec::new(),
            })),
            difficulty: config.difficulty,
            mining_reward: config.mining_reward,
            mining_mode: config.mining_mode,
            crypto,
        }
    }

    // Every mutation either completes or leaves the state as it was, so a
    // poisoned lock still guards consistent data.
    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn mining_reward(&self) -> u64 {
        self.mining_reward
    }

    pub fn crypto(&self) -> &CryptoContext {
        &self.crypto
    }

    /// Gets the last block in the chain
    pub fn get_latest_block(&self) -> Result<Block, BlockchainError> {
        self.state()
            .chain
            .last()
            .cloned()
            .ok_or(BlockchainError::EmptyChain)
    }

    /// Validates and queues a transaction for the next block.
    ///
    /// The sender's balance is not checked, so a transfer larger than the
    /// sender's current balance is accepted.
    pub fn add_transaction(&self, transaction: Transaction) -> Result<(), BlockchainError> {
        if transaction.from_address.is_reward() || transaction.to_address.is_reward() {
            warn!("Rejected transaction without sender or recipient");
            return Err(TransactionError::Malformed(
                "Transaction must include from and to address".to_string(),
            )
            .into());
        }

        if !transaction.is_valid(&self.crypto)? {
            warn!(
                "Rejected transaction from {} with an invalid signature",
                transaction.from_address
            );
            return Err(TransactionError::InvalidSignature.into());
        }

        debug!(
            "Queued transaction of {} from {} to {}",
            transaction.amount, transaction.from_address, transaction.to_address
        );
        self.state().pending_transactions.push(transaction);

        Ok(())
    }

    /// Mines every pending transaction plus a reward for `miner_address` into a new block
    pub fn mine_pending_transactions(&self, miner_address: &Address) -> Result<Block, BlockchainError> {
        self.mine_pending_transactions_with_cancel(miner_address, &CancelToken::new())
    }

    /// Like `mine_pending_transactions`, but stops when `cancel` is triggered.
    ///
    /// Chain and pending transactions are only modified once mining succeeds.
    pub fn mine_pending_transactions_with_cancel(
        &self,
        miner_address: &Address,
        cancel: &CancelToken,
    ) -> Result<Block, BlockchainError> {
        if miner_address.is_reward() {
            return Err(TransactionError::Malformed(
                "Mining reward needs a recipient address".to_string(),
            )
            .into());
        }

        let mut state = self.state();

        let mut transactions = state.pending_transactions.clone();
        transactions.push(Transaction::reward(*miner_address, self.mining_reward));

        let previous_hash = state
            .chain
            .last()
            .map(|block| block.hash.clone())
            .ok_or(BlockchainError::EmptyChain)?;

        let mut block = Block::new(Utc::now(), transactions, previous_hash, self.crypto.hasher());
        block.mine_block_with(self.difficulty, self.crypto.hasher(), self.mining_mode, cancel)?;

        state.chain.push(block.clone());
        state.pending_transactions.clear();

        info!(
            "Block {} appended with {} transactions",
            state.chain.len() - 1,
            block.transactions.len()
        );

        Ok(block)
    }

    /// Gets the entire blockchain
    pub fn get_chain(&self) -> Vec<Block> {
        self.state().chain.clone()
    }

    /// Gets all pending transactions
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.state().pending_transactions.clone()
    }

    /// Number of blocks including genesis
    pub fn block_count(&self) -> usize {
        self.state().chain.len()
    }

    /// Net amount received by `address` over the whole chain
    pub fn get_balance_of_address(&self, address: &Address) -> i128 {
        let state = self.state();

        state
            .chain
            .iter()
            .flat_map(|block| &block.transactions)
            .fold(0i128, |mut balance, transaction| {
                if transaction.from_address == *address {
                    balance -= i128::from(transaction.amount);
                }
                if transaction.to_address == *address {
                    balance += i128::from(transaction.amount);
                }
                balance
            })
    }

    /// Replays hashes, signatures and links of every block after genesis,
    /// reporting the first problem found.
    pub fn verify_chain(&self) -> Result<(), ChainValidationError> {
        let state = self.state();
        let hasher = self.crypto.hasher();

        for (index, pair) in state.chain.windows(2).enumerate() {
            let (previous_block, current_block) = (&pair[0], &pair[1]);
            let index = index + 1;

            if current_block.hash != current_block.calculate_hash(hasher) {
                return Err(ChainValidationError::HashMismatch { index });
            }

            match current_block.has_valid_transactions(&self.crypto) {
                Ok(true) => {}
                Ok(false) => return Err(ChainValidationError::InvalidTransactions { index }),
                Err(source) => return Err(ChainValidationError::TransactionFault { index, source }),
            }

            if current_block.previous_hash != previous_block.hash {
                return Err(ChainValidationError::BrokenLink { index });
            }
        }

        Ok(())
    }

    /// Validates the blockchain
    pub fn is_chain_valid(&self) -> bool {
        match self.verify_chain() {
            Ok(()) => true,
            Err(err) => {
                warn!("Chain validation failed: {}", err);
                false
            }
        }
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}
