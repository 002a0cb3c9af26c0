// Blockchain module
//
// This module contains the ledger engine:
// - Transaction structure, signing and verification
// - Block structure and proof of work
// - Blockchain structure, balances and chain validation
// - Cryptography capabilities (hashing, Ed25519 signatures)

pub mod block;
pub mod chain;
pub mod crypto;
pub mod transaction;

// Re-export main components for easier access
pub use block::{Block, CancelToken, MiningError, MiningMode};
pub use chain::{Blockchain, BlockchainError, ChainValidationError};
pub use crypto::{Address, CryptoContext, DigitalSignature, Wallet};
pub use transaction::{Transaction, TransactionError};
