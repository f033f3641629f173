use chrono::{DateTime, Utc};

use crate::domain::AccountId;

/// Who is acting, and when.
///
/// Every ledger operation takes one of these instead of looking up an ambient
/// current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub account: AccountId,
    pub at: DateTime<Utc>,
}

impl RequestContext {
    pub fn now(account: AccountId) -> Self {
        Self {
            account,
            at: Utc::now(),
        }
    }

    /// Stamp the operation with an earlier instant, e.g. when replaying history
    /// in order. The service refuses an instant in the future or one older than
    /// the latest record of any account the operation writes to.
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }
}
