// Ledger module
//
// This module contains the proof-of-work ledger engine:
// - Signed transactions
// - Blocks and mining
// - The chain with its pending buffer, balances and validation
// - Cryptography utilities
// - Configuration

pub mod block;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod transaction;

// Re-export main components for easier access
pub use block::{Block, CancelToken, MiningError};
pub use chain::{Ledger, LedgerError};
pub use config::{ConfigError, LedgerConfig};
pub use crypto::{DigitalSignature, Ed25519Scheme, Identity, KeyHolder, SignatureScheme, Wallet};
pub use transaction::{Sender, Transaction, TransactionError};
