use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors raised when a transaction cannot be built from caller input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Invalid input: sender must not be empty")]
    EmptySender,

    #[error("Invalid input: recipient must not be empty")]
    EmptyRecipient,
}

/// A single transfer intent waiting in the pool or sealed in a block.
///
/// Fields are private so a transaction cannot change once it has been
/// created. Signatures and balances are the caller's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "RawTransaction")]
pub struct Transaction {
    /// Sender's identifier
    sender: String,

    /// Recipient's identifier
    recipient: String,

    /// Amount being transferred, unrestricted in sign
    amount: i64,
}

impl Transaction {
    /// Creates a new transaction
    ///
    /// # Arguments
    ///
    /// * `sender` - Who sends the amount
    /// * `recipient` - Who receives the amount
    /// * `amount` - Any integer amount
    ///
    /// # Returns
    ///
    /// The transaction, or `TransactionError` when either party is blank
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: i64,
    ) -> Result<Self, TransactionError> {
        let sender = sender.into();
        let recipient = recipient.into();

        if sender.trim().is_empty() {
            return Err(TransactionError::EmptySender);
        }
        if recipient.trim().is_empty() {
            return Err(TransactionError::EmptyRecipient);
        }

        Ok(Transaction {
            sender,
            recipient,
            amount,
        })
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }
}

/// Wire form of a transaction, checked by `Transaction::new` on the way in
#[derive(Deserialize)]
struct RawTransaction {
    sender: String,
    recipient: String,
    amount: i64,
}

impl TryFrom<RawTransaction> for Transaction {
    type Error = TransactionError;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        Transaction::new(raw.sender, raw.recipient, raw.amount)
    }
}
