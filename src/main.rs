use anyhow::{Context, Result};
use log::{info, warn};

use pow_ledger::ledger::{Identity, KeyHolder, Ledger, LedgerConfig, Transaction, Wallet};

// Load the sending wallet from a hex secret key, or create a fresh one
fn load_wallet(secret_key_hex: Option<String>) -> Result<Wallet> {
    match secret_key_hex {
        Some(hex_key) => {
            Wallet::from_secret_hex(&hex_key).context("Failed to load wallet from secret key")
        }
        None => {
            let wallet = Wallet::new();
            warn!("No secret key given, created a throwaway wallet");
            info!("Wallet secret key: {}", wallet.export_secret_hex());
            Ok(wallet)
        }
    }
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let mut args = std::env::args().skip(1);
    let wallet = load_wallet(args.next())?;
    let recipient: Identity = match args.next() {
        Some(identity) => identity.parse().context("Recipient is not a hex identity")?,
        None => Wallet::new().identity().clone(),
    };

    let config = LedgerConfig::from_env().context("Failed to read ledger configuration")?;
    let mut ledger = Ledger::with_config(config)?;
    info!("Wallet address: {}", wallet.identity());

    let mut transaction = Transaction::new(wallet.identity().clone(), recipient, 10.0);
    transaction.sign(&wallet)?;
    ledger.add_transaction(transaction)?;

    info!("Miner is cooking...");
    ledger.mine_pending_transactions(wallet.identity())?;

    println!(
        "Balance of {}: {}",
        wallet.identity(),
        ledger.get_balance_of_address(wallet.identity())
    );
    println!("Is chain valid? {}", ledger.is_chain_valid()?);
    println!("{}", serde_json::to_string_pretty(ledger.chain())?);

    Ok(())
}
