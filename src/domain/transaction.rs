use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Cents, LoanStatus};

pub type TransactionId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    /// A loan request; stays this type until paid off
    Loan,
    LoanPaid,
    /// Outgoing leg of a transfer
    Transfer,
    /// Incoming leg of a transfer
    Received,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Loan => "loan",
            TransactionType::LoanPaid => "loan_paid",
            TransactionType::Transfer => "transfer",
            TransactionType::Received => "received",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(TransactionType::Deposit),
            "withdrawal" => Some(TransactionType::Withdrawal),
            "loan" => Some(TransactionType::Loan),
            "loan_paid" => Some(TransactionType::LoanPaid),
            "transfer" => Some(TransactionType::Transfer),
            "received" => Some(TransactionType::Received),
            _ => None,
        }
    }

    pub fn is_loan(&self) -> bool {
        matches!(self, TransactionType::Loan | TransactionType::LoanPaid)
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransactionType::Deposit => "Deposit",
            TransactionType::Withdrawal => "Withdrawal",
            TransactionType::Loan => "Loan",
            TransactionType::LoanPaid => "Loan Paid",
            TransactionType::Transfer => "Transfer",
            TransactionType::Received => "Received",
        };
        write!(f, "{}", label)
    }
}

/// One entry in an account's ledger.
///
/// Records are append-only. The single exception is the loan lifecycle, which
/// updates `loan_status`, `loan_approve`, `balance_after_transaction` and, on
/// payoff, `transaction_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Insertion-ordered id, assigned by the repository
    pub id: TransactionId,
    pub account: AccountId,
    /// Always the positive magnitude of the operation
    pub amount: Cents,
    pub transaction_type: TransactionType,
    /// Account balance right after this entry was applied
    pub balance_after_transaction: Cents,
    pub loan_approve: bool,
    /// Set for loan records only
    pub loan_status: Option<LoanStatus>,
    /// The other account of a transfer leg
    pub counterparty: Option<AccountId>,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Create a new record. The id must be assigned by the repository.
    pub fn new(
        account: AccountId,
        transaction_type: TransactionType,
        amount: Cents,
        balance_after_transaction: Cents,
        timestamp: DateTime<Utc>,
    ) -> Self {
        assert!(amount > 0, "Transaction amount must be positive");
        Self {
            id: 0,
            account,
            amount,
            transaction_type,
            balance_after_transaction,
            loan_approve: false,
            loan_status: None,
            counterparty: None,
            timestamp,
        }
    }

    /// A fresh loan request; the balance is left untouched.
    pub fn loan_request(
        account: AccountId,
        amount: Cents,
        current_balance: Cents,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut loan = Self::new(
            account,
            TransactionType::Loan,
            amount,
            current_balance,
            timestamp,
        );
        loan.loan_status = Some(LoanStatus::Requested);
        loan
    }

    pub fn with_counterparty(mut self, counterparty: AccountId) -> Self {
        self.counterparty = Some(counterparty);
        self
    }

    /// The loan status, treating a loan record without an explicit status as a
    /// request.
    pub fn loan_state(&self) -> Option<LoanStatus> {
        if !self.transaction_type.is_loan() {
            return None;
        }
        Some(self.loan_status.unwrap_or(LoanStatus::Requested))
    }

    /// Counts toward the per-account loan limit.
    pub fn is_active_loan(&self) -> bool {
        self.transaction_type == TransactionType::Loan && self.loan_approve
    }
}
