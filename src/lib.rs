// In-memory proof-of-work ledger: signed transfers, mined blocks and
// tamper-evident chain validation.

pub mod blockchain;
pub mod config;

pub use blockchain::{
    Address, Block, Blockchain, BlockchainError, CancelToken, ChainValidationError, CryptoContext,
    DigitalSignature, MiningError, MiningMode, Transaction, TransactionError, Wallet,
};
pub use config::{ChainConfig, ConfigError};
