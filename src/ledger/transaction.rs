use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use super::crypto::{sha256_hex, CryptoError, DigitalSignature, Identity, KeyHolder, SignatureScheme};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The signing key does not belong to the sender
    #[error("Cannot sign transactions for other wallets: key {key} does not match sender {sender}")]
    Unauthorized { key: String, sender: String },

    /// A transfer was checked before it was signed
    #[error("No signature in this transaction")]
    MissingSignature,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Who a transaction moves value from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    /// System-issued mining reward; carries no signature
    Reward,
    /// A transfer out of a real account
    Transfer(Identity),
}

impl Sender {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Sender::Reward => None,
            Sender::Transfer(identity) => Some(identity),
        }
    }
}

/// A value transfer, signed by its sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub(crate) sender: Sender,

    pub(crate) recipient: Identity,

    pub(crate) amount: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transfer
    ///
    /// # Arguments
    ///
    /// * `sender` - The identity paying out
    /// * `recipient` - The identity receiving the amount
    /// * `amount` - The amount to transfer
    pub fn new(sender: Identity, recipient: Identity, amount: f64) -> Self {
        Transaction {
            sender: Sender::Transfer(sender),
            recipient,
            amount,
            signature: None,
        }
    }

    /// Creates a mining reward paid to `recipient`
    pub fn reward(recipient: Identity, amount: f64) -> Self {
        Transaction {
            sender: Sender::Reward,
            recipient,
            amount,
            signature: None,
        }
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn recipient(&self) -> &Identity {
        &self.recipient
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn signature(&self) -> Option<&DigitalSignature> {
        self.signature.as_ref()
    }

    pub fn is_reward(&self) -> bool {
        matches!(self.sender, Sender::Reward)
    }

    /// Hex SHA-256 over sender, recipient and amount.
    ///
    /// The signature covers this digest, so changing any of those fields after
    /// signing invalidates the transaction.
    pub fn digest(&self) -> String {
        let data = json!({
            "sender": self.sender.identity().map(Identity::as_str),
            "recipient": self.recipient.as_str(),
            "amount": self.amount,
        });

        sha256_hex(data.to_string().as_bytes())
    }

    /// Signs the transaction with a key belonging to the sender
    ///
    /// # Errors
    ///
    /// `TransactionError::Unauthorized` if the key's identity is not the
    /// sender. Reward transactions have no sender and can never be signed.
    pub fn sign<K: KeyHolder + ?Sized>(&mut self, key: &K) -> Result<(), TransactionError> {
        match self.sender.identity() {
            Some(sender) if sender == key.identity() => {}
            other => {
                return Err(TransactionError::Unauthorized {
                    key: key.identity().to_string(),
                    sender: other.map_or_else(|| "<reward>".to_string(), Identity::to_string),
                });
            }
        }

        let signature = key.sign(self.digest().as_bytes())?;
        self.signature = Some(signature);

        Ok(())
    }

    /// Checks the transaction's signature.
    ///
    /// Rewards are always valid. A transfer without a signature is a contract
    /// violation and returns `MissingSignature` rather than `Ok(false)`.
    pub fn is_valid(&self, scheme: &dyn SignatureScheme) -> Result<bool, TransactionError> {
        let sender = match &self.sender {
            Sender::Reward => return Ok(true),
            Sender::Transfer(identity) => identity,
        };

        let signature = match &self.signature {
            Some(sig) if !sig.is_empty() => sig,
            _ => return Err(TransactionError::MissingSignature),
        };

        Ok(scheme.verify(sender, self.digest().as_bytes(), signature)?)
    }
}
