use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type AccountId = Uuid;

/// Account numbers are handed out sequentially above this base.
pub const ACCOUNT_NUMBER_BASE: i64 = 100_000;

/// A customer's bank account.
///
/// The balance is only ever changed by ledger operations; it always equals the
/// sum of the signed effects of the account's transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// External-facing number used to address transfers
    pub account_number: String,
    pub owner: String,
    pub email: String,
    pub balance: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new empty account. The account number must be assigned by the repository.
    pub fn new(owner: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_number: String::new(),
            owner: owner.into(),
            email: email.into(),
            balance: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_account_number(mut self, sequence: i64) -> Self {
        self.account_number = format_account_number(sequence);
        self
    }

    /// Whether `amount` can be taken out without the balance going negative.
    pub fn covers(&self, amount: Cents) -> bool {
        self.balance >= amount
    }
}

pub fn format_account_number(sequence: i64) -> String {
    (ACCOUNT_NUMBER_BASE + sequence).to_string()
}
