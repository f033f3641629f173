use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, Transaction};

use super::SummaryScope;

/// Inclusive range of calendar dates (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportQuery {
    pub range: Option<DateRange>,
}

impl ReportQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            range: Some(DateRange::new(start, end)),
        }
    }
}

/// What the report's summary figure means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// The account's balance at query time
    CurrentBalance,
    /// Sum of amounts moved inside the range by the requesting account
    AccountRangeTotal,
    /// Sum of amounts moved inside the range across the whole ledger
    LedgerRangeTotal,
}

impl From<SummaryScope> for SummaryKind {
    fn from(scope: SummaryScope) -> Self {
        match scope {
            SummaryScope::Account => SummaryKind::AccountRangeTotal,
            SummaryScope::AllAccounts => SummaryKind::LedgerRangeTotal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReport {
    pub account_number: String,
    pub owner: String,
    pub range: Option<DateRange>,
    pub transactions: Vec<Transaction>,
    pub summary: Cents,
    pub summary_kind: SummaryKind,
}
