use serde::{Deserialize, Serialize};

/// Lifecycle of a loan record.
///
/// ```text
/// Requested --approve--> Approved --pay--> Paid
///     \
///      `----reject--> Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Requested,
    Approved,
    Paid,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Requested => "requested",
            LoanStatus::Approved => "approved",
            LoanStatus::Paid => "paid",
            LoanStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "requested" => Some(LoanStatus::Requested),
            "approved" => Some(LoanStatus::Approved),
            "paid" => Some(LoanStatus::Paid),
            "rejected" => Some(LoanStatus::Rejected),
            _ => None,
        }
    }

    /// The `loan_approve` flag as stored on the record. It stays set once a
    /// loan has been approved, including after it is paid off.
    pub fn is_approved(&self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Paid)
    }

    pub fn approve(self) -> Result<Self, LoanTransitionError> {
        self.transition(LoanStatus::Approved)
    }

    pub fn reject(self) -> Result<Self, LoanTransitionError> {
        self.transition(LoanStatus::Rejected)
    }

    pub fn pay(self) -> Result<Self, LoanTransitionError> {
        self.transition(LoanStatus::Paid)
    }

    fn transition(self, to: LoanStatus) -> Result<Self, LoanTransitionError> {
        let allowed = matches!(
            (self, to),
            (LoanStatus::Requested, LoanStatus::Approved)
                | (LoanStatus::Requested, LoanStatus::Rejected)
                | (LoanStatus::Approved, LoanStatus::Paid)
        );
        if allowed {
            Ok(to)
        } else {
            Err(LoanTransitionError { from: self, to })
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanTransitionError {
    pub from: LoanStatus,
    pub to: LoanStatus,
}

impl std::fmt::Display for LoanTransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loan cannot move from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for LoanTransitionError {}
