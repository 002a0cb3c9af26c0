use anyhow::{Context, Result};
use log::info;

use pow_ledger::{Blockchain, ChainConfig, Transaction, Wallet};

// Demo key material; never use for anything of value
const DEMO_SECRET_KEY: &str = "7c4c45907dec40c91bab3480c39032e90049f1a44f3e18c3e07c23e3273995cf";

fn load_config() -> Result<ChainConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            ChainConfig::load(&path).with_context(|| format!("loading config from {}", path))
        }
        None => Ok(ChainConfig::default()),
    }
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = load_config()?;
    info!(
        "Starting ledger with difficulty {} and reward {}",
        config.difficulty, config.mining_reward
    );

    let blockchain = Blockchain::with_config(config);
    let my_wallet = Wallet::from_secret_hex(DEMO_SECRET_KEY)?;
    let my_address = *my_wallet.address();
    info!("Wallet address: {}", my_address);

    for (amount, recipient) in [(100, Wallet::new()), (50, Wallet::new())] {
        let mut transaction = Transaction::new(my_address, *recipient.address(), amount);
        transaction.sign(&my_wallet, blockchain.crypto())?;
        blockchain.add_transaction(transaction)?;

        info!("Mining block...");
        blockchain.mine_pending_transactions(&my_address)?;
        info!("Chain now has {} blocks", blockchain.block_count());
    }

    println!();
    println!(
        "Balance of {} is {}",
        my_address,
        blockchain.get_balance_of_address(&my_address)
    );
    println!();
    println!(
        "Blockchain valid? {}",
        if blockchain.is_chain_valid() { "Yes" } else { "No" }
    );

    Ok(())
}
