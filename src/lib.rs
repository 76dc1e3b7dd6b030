//! A minimal in-memory proof-of-work ledger.
//!
//! Transfers are signed with Ed25519 and hashed with SHA-256; blocks are sealed
//! by searching for a nonce whose hash has the configured number of leading
//! zero hex digits.

pub mod ledger;

pub use ledger::{Identity, Ledger, LedgerConfig, LedgerError, Transaction, Wallet};
