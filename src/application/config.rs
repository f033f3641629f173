/// Whether a debit may take an account below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverdraftPolicy {
    /// Refuse debits larger than the balance.
    #[default]
    Reject,
    /// Let the balance go negative.
    Allow,
}

/// Which transactions a date-filtered report sums for its summary figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryScope {
    /// Only the requesting account.
    #[default]
    Account,
    /// Every account in the ledger.
    AllAccounts,
}

pub const DEFAULT_LOAN_LIMIT: u32 = 3;

/// Policy knobs for [`super::LedgerService`].
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub overdraft: OverdraftPolicy,
    /// Maximum number of approved, unpaid loans per account
    pub loan_limit: u32,
    pub summary_scope: SummaryScope,
    /// Also notify the receiving side of a transfer
    pub notify_recipient: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            overdraft: OverdraftPolicy::Reject,
            loan_limit: DEFAULT_LOAN_LIMIT,
            summary_scope: SummaryScope::Account,
            notify_recipient: true,
        }
    }
}

impl LedgerConfig {
    pub fn with_overdraft(mut self, overdraft: OverdraftPolicy) -> Self {
        self.overdraft = overdraft;
        self
    }

    pub fn with_loan_limit(mut self, limit: u32) -> Self {
        self.loan_limit = limit;
        self
    }

    pub fn with_summary_scope(mut self, scope: SummaryScope) -> Self {
        self.summary_scope = scope;
        self
    }

    pub fn with_notify_recipient(mut self, notify: bool) -> Self {
        self.notify_recipient = notify;
        self
    }
}
