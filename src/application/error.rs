use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::domain::{Cents, LoanStatus, TransactionId};

/// Every variant except `Database` means the operation was refused and nothing
/// was written.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Loan limit reached: {active} approved loans already open (limit {limit})")]
    LoanLimitExceeded { limit: u32, active: i64 },

    #[error("Insufficient funds in account {account_number}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_number: String,
        balance: Cents,
        required: Cents,
    },

    #[error("No account with number {0}")]
    UnknownRecipient(String),

    #[error("Transaction not found: {0}")]
    NotFound(TransactionId),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transaction {0} is not a loan")]
    NotALoan(TransactionId),

    #[error("Loan {id} cannot move from {from} to {to}")]
    InvalidLoanTransition {
        id: TransactionId,
        from: LoanStatus,
        to: LoanStatus,
    },

    #[error("Cannot transfer money to the same account")]
    SelfTransfer,

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Timestamp {at} is in the future")]
    FutureTimestamp { at: DateTime<Utc> },

    #[error("Timestamp {at} is older than account {account_number}'s latest record at {latest}")]
    StaleTimestamp {
        account_number: String,
        at: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
