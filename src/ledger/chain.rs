use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;

use std::sync::Arc;

use super::block::{Block, CancelToken, MiningError};
use super::config::{ConfigError, LedgerConfig};
use super::crypto::{Ed25519Scheme, Identity, SignatureScheme};
use super::transaction::{Sender, Transaction, TransactionError};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Transaction is invalid, can not add it to the chain")]
    InvalidTransaction,

    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Mining error: {0}")]
    Mining(#[from] MiningError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// An append-only chain of blocks plus the transactions waiting to be mined
#[derive(Debug, Clone)]
pub struct Ledger {
    /// The chain of blocks, genesis first
    chain: Vec<Block>,

    /// Admitted transactions not yet in a block
    pending_transactions: Vec<Transaction>,

    config: LedgerConfig,

    /// Verifies transaction signatures
    scheme: Arc<dyn SignatureScheme>,
}

impl Ledger {
    /// Creates a ledger with the default configuration and Ed25519 signatures
    pub fn new() -> Self {
        Self::build(LedgerConfig::default(), Arc::new(Ed25519Scheme))
    }

    /// Creates a ledger with `config` and Ed25519 signatures
    pub fn with_config(config: LedgerConfig) -> Result<Self, LedgerError> {
        Self::with_scheme(config, Arc::new(Ed25519Scheme))
    }

    /// Creates a ledger with `config` and a caller-supplied signature scheme
    pub fn with_scheme(
        config: LedgerConfig,
        scheme: Arc<dyn SignatureScheme>,
    ) -> Result<Self, LedgerError> {
        config.validate()?;
        Ok(Self::build(config, scheme))
    }

    fn build(config: LedgerConfig, scheme: Arc<dyn SignatureScheme>) -> Self {
        let genesis_block = Self::genesis_block(&config);

        Ledger {
            chain: vec![genesis_block],
            pending_transactions: Vec::new(),
            config,
            scheme,
        }
    }

    /// The fixed first block: no transactions, linked to `"0"`, never mined
    fn genesis_block(config: &LedgerConfig) -> Block {
        Block::new(config.genesis_timestamp, Vec::new(), "0".to_string())
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.config.mining_reward
    }

    /// Gets the last block in the chain
    pub fn latest_block(&self) -> &Block {
        // The chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }

    /// Admits a signed transaction into the pending buffer
    ///
    /// # Errors
    ///
    /// * `MalformedTransaction` - no sender (a reward), no recipient, or an
    ///   amount that is negative or not finite
    /// * `InvalidTransaction` - the signature does not verify
    /// * `Transaction` - the transaction is unsigned or its keys cannot be decoded
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<(), LedgerError> {
        let sender = match transaction.sender() {
            Sender::Transfer(identity) if !identity.is_empty() => identity,
            _ => {
                return Err(LedgerError::MalformedTransaction(
                    "Transaction must have from and to address".to_string(),
                ));
            }
        };

        if transaction.recipient().is_empty() {
            return Err(LedgerError::MalformedTransaction(
                "Transaction must have from and to address".to_string(),
            ));
        }

        let amount = transaction.amount();
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::MalformedTransaction(format!(
                "Amount must be a non-negative number: {}",
                amount
            )));
        }

        if !transaction.is_valid(self.scheme.as_ref())? {
            return Err(LedgerError::InvalidTransaction);
        }

        debug!(
            "Admitted transaction {} -> {} ({})",
            sender,
            transaction.recipient(),
            amount
        );
        self.pending_transactions.push(transaction);

        Ok(())
    }

    /// Mines the pending transactions plus a reward for `reward_recipient`
    /// into a new block and appends it.
    ///
    /// Runs proof-of-work to completion; see
    /// [`Ledger::mine_pending_transactions_until`] for a cancellable form.
    pub fn mine_pending_transactions(
        &mut self,
        reward_recipient: &Identity,
    ) -> Result<&Block, LedgerError> {
        let mut block = self.assemble_block(reward_recipient);
        block.mine(self.config.difficulty)?;

        Ok(self.append(block))
    }

    /// Like [`Ledger::mine_pending_transactions`], but gives up when `cancel`
    /// is triggered. A cancelled run leaves the chain and the pending buffer
    /// untouched.
    pub fn mine_pending_transactions_until(
        &mut self,
        reward_recipient: &Identity,
        cancel: &CancelToken,
    ) -> Result<&Block, LedgerError> {
        let mut block = self.assemble_block(reward_recipient);
        block.mine_until(self.config.difficulty, cancel)?;

        Ok(self.append(block))
    }

    fn assemble_block(&self, reward_recipient: &Identity) -> Block {
        let mut transactions = self.pending_transactions.clone();
        transactions.push(Transaction::reward(
            reward_recipient.clone(),
            self.config.mining_reward,
        ));

        Block::new(
            Utc::now(),
            transactions,
            self.latest_block().hash().to_string(),
        )
    }

    fn append(&mut self, block: Block) -> &Block {
        let index = self.chain.len();
        info!(
            "Appending block {} with {} transactions, reward: {} coins",
            index,
            block.transactions().len(),
            self.config.mining_reward
        );

        self.chain.push(block);
        self.pending_transactions.clear();

        &self.chain[index]
    }

    /// Sums every transfer into and out of `identity` across the chain.
    ///
    /// Overdrafts are not prevented, so the result may be negative.
    pub fn get_balance_of_address(&self, identity: &Identity) -> f64 {
        let mut balance = 0.0;

        for block in &self.chain {
            for transaction in block.transactions() {
                if transaction.sender().identity() == Some(identity) {
                    balance -= transaction.amount();
                }
                if transaction.recipient() == identity {
                    balance += transaction.amount();
                }
            }
        }

        balance
    }

    /// Validates every block after genesis.
    ///
    /// A bad signature, stale hash or broken link yields `Ok(false)`. An
    /// unsigned transfer or undecodable key inside a block is an error.
    pub fn is_chain_valid(&self) -> Result<bool, TransactionError> {
        for (offset, pair) in self.chain.windows(2).enumerate() {
            let (previous_block, current_block) = (&pair[0], &pair[1]);
            let index = offset + 1;

            if !current_block.has_valid_transactions(self.scheme.as_ref())? {
                warn!("Block {} contains an invalid transaction", index);
                return Ok(false);
            }

            if current_block.hash() != current_block.calculate_hash() {
                warn!("Block {} hash does not match its contents", index);
                return Ok(false);
            }

            if current_block.previous_hash() != previous_block.hash() {
                warn!("Block {} is not linked to block {}", index, offset);
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::crypto::{CryptoError, DigitalSignature, KeyHolder, Wallet};

    /// Verifier that rejects everything
    #[derive(Debug)]
    struct RejectAll;

    impl SignatureScheme for RejectAll {
        fn verify(&self, _: &Identity, _: &[u8], _: &DigitalSignature) -> Result<bool, CryptoError> {
            Ok(false)
        }
    }

    fn quick_ledger() -> Ledger {
        Ledger::with_config(LedgerConfig::default().with_difficulty(1)).unwrap()
    }

    fn signed_transfer(from: &Wallet, to: &Identity, amount: f64) -> Transaction {
        let mut transaction = Transaction::new(from.identity().clone(), to.clone(), amount);
        transaction.sign(from).unwrap();
        transaction
    }

    #[test]
    fn test_new_ledger() {
        let ledger = Ledger::new();

        assert_eq!(ledger.chain().len(), 1);
        assert_eq!(ledger.chain()[0].previous_hash(), "0");
        assert!(ledger.chain()[0].transactions().is_empty());
        assert!(ledger.pending_transactions().is_empty());
        assert_eq!(ledger.difficulty(), 2);
        assert_eq!(ledger.mining_reward(), 100.0);
        assert!(ledger.is_chain_valid().unwrap());
    }

    #[test]
    fn test_genesis_is_fixed() {
        assert_eq!(Ledger::new().latest_block().hash(), Ledger::new().latest_block().hash());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = Ledger::with_config(LedgerConfig::default().with_difficulty(100));
        assert!(matches!(result, Err(LedgerError::InvalidConfig(_))));
    }

    #[test]
    fn test_add_transaction() {
        let mut ledger = quick_ledger();
        let sender_wallet = Wallet::new();
        let recipient_wallet = Wallet::new();

        ledger
            .add_transaction(signed_transfer(&sender_wallet, recipient_wallet.identity(), 10.0))
            .unwrap();

        assert_eq!(ledger.pending_transactions().len(), 1);
    }

    #[test]
    fn test_reward_cannot_be_submitted() {
        let mut ledger = quick_ledger();
        let reward = Transaction::reward(Wallet::new().identity().clone(), 1_000.0);

        assert!(matches!(
            ledger.add_transaction(reward),
            Err(LedgerError::MalformedTransaction(_))
        ));
        assert!(ledger.pending_transactions().is_empty());
    }

    #[test]
    fn test_missing_recipient_is_malformed() {
        let mut ledger = quick_ledger();
        let sender_wallet = Wallet::new();
        let transaction = signed_transfer(&sender_wallet, &Identity::new(""), 1.0);

        assert!(matches!(
            ledger.add_transaction(transaction),
            Err(LedgerError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_negative_amount_is_malformed() {
        let mut ledger = quick_ledger();
        let sender_wallet = Wallet::new();
        let transaction = signed_transfer(&sender_wallet, Wallet::new().identity(), -5.0);

        assert!(matches!(
            ledger.add_transaction(transaction),
            Err(LedgerError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_unsigned_transaction_is_a_fault() {
        let mut ledger = quick_ledger();
        let transaction = Transaction::new(
            Wallet::new().identity().clone(),
            Wallet::new().identity().clone(),
            1.0,
        );

        assert!(matches!(
            ledger.add_transaction(transaction),
            Err(LedgerError::Transaction(TransactionError::MissingSignature))
        ));
    }

    #[test]
    fn test_tampered_transaction_is_rejected() {
        let mut ledger = quick_ledger();
        let sender_wallet = Wallet::new();
        let mut transaction = signed_transfer(&sender_wallet, Wallet::new().identity(), 10.0);
        transaction.amount = 10_000.0;

        assert!(matches!(
            ledger.add_transaction(transaction),
            Err(LedgerError::InvalidTransaction)
        ));
    }

    #[test]
    fn test_injected_scheme_is_used() {
        let mut ledger = Ledger::with_scheme(
            LedgerConfig::default().with_difficulty(0),
            Arc::new(RejectAll),
        )
        .unwrap();
        let sender_wallet = Wallet::new();

        assert!(matches!(
            ledger.add_transaction(signed_transfer(&sender_wallet, Wallet::new().identity(), 1.0)),
            Err(LedgerError::InvalidTransaction)
        ));
    }

    #[test]
    fn test_mine_pending_transactions() {
        let mut ledger = quick_ledger();
        let sender_wallet = Wallet::new();
        let recipient_wallet = Wallet::new();
        ledger
            .add_transaction(signed_transfer(&sender_wallet, recipient_wallet.identity(), 10.0))
            .unwrap();

        let genesis_hash = ledger.latest_block().hash().to_string();
        let block = ledger.mine_pending_transactions(sender_wallet.identity()).unwrap().clone();

        assert_eq!(block.transactions().len(), 2);
        let reward = &block.transactions()[1];
        assert!(reward.is_reward());
        assert_eq!(reward.recipient(), sender_wallet.identity());
        assert_eq!(reward.amount(), 100.0);
        assert_eq!(block.previous_hash(), genesis_hash);
        assert!(block.hash().starts_with('0'));

        assert_eq!(ledger.chain().len(), 2);
        assert!(ledger.pending_transactions().is_empty());
    }

    #[test]
    fn test_balances() {
        let mut ledger = quick_ledger();
        let alice = Wallet::new();
        let bob = Wallet::new();
        ledger
            .add_transaction(signed_transfer(&alice, bob.identity(), 10.0))
            .unwrap();

        ledger.mine_pending_transactions(alice.identity()).unwrap();

        assert_eq!(ledger.get_balance_of_address(alice.identity()), 90.0);
        assert_eq!(ledger.get_balance_of_address(bob.identity()), 10.0);
        assert_eq!(ledger.get_balance_of_address(Wallet::new().identity()), 0.0);
    }

    #[test]
    fn test_identity_case_does_not_split_accounts() {
        let mut ledger = quick_ledger();
        let alice = Wallet::new();
        let alice_upper = Identity::new(alice.identity().as_str().to_uppercase());
        let bob_upper = Identity::new(Wallet::new().identity().as_str().to_uppercase());

        let mut transaction = Transaction::new(alice_upper.clone(), bob_upper.clone(), 10.0);
        transaction.sign(&alice).unwrap();
        ledger.add_transaction(transaction).unwrap();
        ledger.mine_pending_transactions(&alice_upper).unwrap();

        assert_eq!(ledger.get_balance_of_address(alice.identity()), 90.0);
        assert_eq!(ledger.get_balance_of_address(&alice_upper), 90.0);
        assert_eq!(ledger.get_balance_of_address(&bob_upper), 10.0);
    }

    #[test]
    fn test_overdraft_is_not_prevented() {
        let mut ledger = quick_ledger();
        let alice = Wallet::new();
        let bob = Wallet::new();
        let miner = Wallet::new();
        ledger
            .add_transaction(signed_transfer(&alice, bob.identity(), 25.0))
            .unwrap();

        ledger.mine_pending_transactions(miner.identity()).unwrap();

        assert_eq!(ledger.get_balance_of_address(alice.identity()), -25.0);
        assert_eq!(ledger.get_balance_of_address(miner.identity()), 100.0);
    }

    #[test]
    fn test_chain_validity_across_blocks() {
        let mut ledger = quick_ledger();
        let alice = Wallet::new();
        let bob = Wallet::new();

        for round in 0..3 {
            ledger
                .add_transaction(signed_transfer(&alice, bob.identity(), round as f64))
                .unwrap();
            ledger.mine_pending_transactions(alice.identity()).unwrap();
        }

        assert_eq!(ledger.chain().len(), 4);
        assert!(ledger.is_chain_valid().unwrap());
    }

    #[test]
    fn test_tampered_amount_invalidates_chain() {
        let mut ledger = quick_ledger();
        let alice = Wallet::new();
        let bob = Wallet::new();
        ledger
            .add_transaction(signed_transfer(&alice, bob.identity(), 10.0))
            .unwrap();
        ledger.mine_pending_transactions(alice.identity()).unwrap();

        ledger.chain[1].transactions[0].amount = 1.0;

        assert!(!ledger.is_chain_valid().unwrap());
    }

    #[test]
    fn test_tampered_link_invalidates_chain() {
        let mut ledger = quick_ledger();
        let miner = Wallet::new();
        ledger.mine_pending_transactions(miner.identity()).unwrap();
        ledger.mine_pending_transactions(miner.identity()).unwrap();

        ledger.chain[2].previous_hash = "f".repeat(64);

        assert!(!ledger.is_chain_valid().unwrap());
    }

    #[test]
    fn test_resealed_predecessor_breaks_link() {
        let mut ledger = quick_ledger();
        let miner = Wallet::new();
        ledger.mine_pending_transactions(miner.identity()).unwrap();
        ledger.mine_pending_transactions(miner.identity()).unwrap();

        // A different, properly mined block 1 that still links to genesis
        let timestamp = *ledger.chain[1].timestamp() + chrono::Duration::seconds(1);
        let mut replacement = Block::new(
            timestamp,
            Vec::new(),
            ledger.chain[0].hash().to_string(),
        );
        replacement.mine(ledger.difficulty()).unwrap();
        ledger.chain[1] = replacement;

        assert_eq!(ledger.chain[1].hash(), ledger.chain[1].calculate_hash());
        assert_eq!(ledger.chain[2].hash(), ledger.chain[2].calculate_hash());
        assert_ne!(ledger.chain[2].previous_hash(), ledger.chain[1].hash());
        assert!(!ledger.is_chain_valid().unwrap());
    }

    #[test]
    fn test_tampered_reward_goes_unnoticed() {
        let mut ledger = quick_ledger();
        let miner = Wallet::new();
        ledger.mine_pending_transactions(miner.identity()).unwrap();

        // Rewards carry no signature and the block hash skips transactions
        ledger.chain[1].transactions[0].amount = 1_000_000.0;

        assert!(ledger.is_chain_valid().unwrap());
        assert_eq!(ledger.get_balance_of_address(miner.identity()), 1_000_000.0);
    }

    #[test]
    fn test_unsigned_transfer_in_chain_is_a_fault() {
        let mut ledger = quick_ledger();
        let miner = Wallet::new();
        ledger.mine_pending_transactions(miner.identity()).unwrap();

        ledger.chain[1].transactions.insert(
            0,
            Transaction::new(miner.identity().clone(), Wallet::new().identity().clone(), 1.0),
        );

        assert!(matches!(
            ledger.is_chain_valid(),
            Err(TransactionError::MissingSignature)
        ));
    }

    #[test]
    fn test_cancelled_mining_changes_nothing() {
        let mut ledger = Ledger::with_config(LedgerConfig::default().with_difficulty(64)).unwrap();
        let alice = Wallet::new();
        ledger
            .add_transaction(signed_transfer(&alice, Wallet::new().identity(), 3.0))
            .unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = ledger.mine_pending_transactions_until(alice.identity(), &cancel);

        assert!(matches!(result, Err(LedgerError::Mining(MiningError::Cancelled { .. }))));
        assert_eq!(ledger.chain().len(), 1);
        assert_eq!(ledger.pending_transactions().len(), 1);
    }

    #[test]
    fn test_mine_until_appends_block() {
        let mut ledger = quick_ledger();
        let miner = Wallet::new();

        let hash = ledger
            .mine_pending_transactions_until(miner.identity(), &CancelToken::new())
            .unwrap()
            .hash()
            .to_string();

        assert_eq!(ledger.latest_block().hash(), hash);
        assert_eq!(ledger.get_balance_of_address(miner.identity()), 100.0);
    }
}
