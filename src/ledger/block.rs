use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::crypto::{sha256_hex, SignatureScheme};
use super::transaction::{Transaction, TransactionError};

/// Attempts made between two looks at the cancellation flag
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// A SHA-256 hex digest has 64 characters, so no hash can satisfy more
pub const MAX_DIFFICULTY: usize = 64;

/// Errors that can occur while mining
#[derive(Debug, Error)]
pub enum MiningError {
    #[error("Mining cancelled at nonce {nonce}")]
    Cancelled { nonce: u64 },

    #[error("Difficulty {0} can never be met (maximum is 64)")]
    UnreachableDifficulty(usize),
}

fn check_difficulty(difficulty: usize) -> Result<(), MiningError> {
    if difficulty > MAX_DIFFICULTY {
        return Err(MiningError::UnreachableDifficulty(difficulty));
    }
    Ok(())
}

/// Shared flag used to abort a running proof-of-work search
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

/// Hex SHA-256 over the fields that make up a block hash.
///
/// Transactions are not part of the digest; each one is protected only by its
/// own signature.
pub fn block_digest(previous_hash: &str, timestamp: &DateTime<Utc>, nonce: u64) -> String {
    let data = json!({
        "previous_hash": previous_hash,
        "timestamp": timestamp,
        "nonce": nonce,
    });

    sha256_hex(data.to_string().as_bytes())
}

/// Whether the first `difficulty` hex characters of `hash` are all `'0'`
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Represents a block in the chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Time the block was assembled
    pub(crate) timestamp: DateTime<Utc>,

    /// Transactions in inclusion order
    pub(crate) transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub(crate) previous_hash: String,

    /// Proof-of-work counter
    pub(crate) nonce: u64,

    /// Cached digest of the fields above
    hash: String,
}

impl Block {
    /// Creates an unmined block with nonce 0
    ///
    /// # Arguments
    ///
    /// * `timestamp` - When the block was assembled
    /// * `transactions` - The transactions to include, in order
    /// * `previous_hash` - The hash of the previous block
    pub fn new(
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
    ) -> Self {
        let hash = block_digest(&previous_hash, &timestamp, 0);

        Block {
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The stored hash, as last computed by construction or mining
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Recomputes the digest from the current fields
    pub fn calculate_hash(&self) -> String {
        block_digest(&self.previous_hash, &self.timestamp, self.nonce)
    }

    fn rehash(&mut self) {
        self.hash = self.calculate_hash();
    }

    fn advance_nonce(&mut self) {
        self.nonce += 1;
        self.rehash();
    }

    /// Searches nonces until the hash meets `difficulty`.
    ///
    /// There is no bound on the number of attempts. Use [`Block::search`] or
    /// [`Block::mine_until`] when the caller needs to stay in control.
    ///
    /// # Errors
    ///
    /// `MiningError::UnreachableDifficulty` if `difficulty` exceeds
    /// [`MAX_DIFFICULTY`].
    pub fn mine(&mut self, difficulty: usize) -> Result<(), MiningError> {
        check_difficulty(difficulty)?;

        // A deserialized block may carry a hash that does not match its fields
        self.rehash();
        while !meets_difficulty(&self.hash, difficulty) {
            self.advance_nonce();
        }

        info!("Block mined: {} (nonce {})", self.hash, self.nonce);
        Ok(())
    }

    /// Tries at most `max_attempts` further nonces, resuming from the current one.
    ///
    /// Returns `true` once the stored hash meets `difficulty`, and `false`
    /// without trying anything when `difficulty` exceeds [`MAX_DIFFICULTY`].
    pub fn search(&mut self, difficulty: usize, max_attempts: u64) -> bool {
        if difficulty > MAX_DIFFICULTY {
            return false;
        }

        self.rehash();
        for _ in 0..max_attempts {
            if meets_difficulty(&self.hash, difficulty) {
                return true;
            }
            self.advance_nonce();
        }

        meets_difficulty(&self.hash, difficulty)
    }

    /// Mines until the hash meets `difficulty` or `cancel` is triggered
    pub fn mine_until(&mut self, difficulty: usize, cancel: &CancelToken) -> Result<(), MiningError> {
        check_difficulty(difficulty)?;

        while !self.search(difficulty, CANCEL_CHECK_INTERVAL) {
            if cancel.is_cancelled() {
                debug!("Mining cancelled at nonce {}", self.nonce);
                return Err(MiningError::Cancelled { nonce: self.nonce });
            }
        }

        info!("Block mined: {} (nonce {})", self.hash, self.nonce);
        Ok(())
    }

    /// Checks every transaction, stopping at the first invalid one.
    ///
    /// Signature-contract faults such as a missing signature are returned as
    /// errors, not as `Ok(false)`.
    pub fn has_valid_transactions(&self, scheme: &dyn SignatureScheme) -> Result<bool, TransactionError> {
        for transaction in &self.transactions {
            if !transaction.is_valid(scheme)? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
