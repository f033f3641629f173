use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Account, Cents, format_cents};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Deposit,
    Withdrawal,
    LoanRequest,
    LoanApproved,
    LoanRejected,
    LoanPaid,
    TransferSent,
    TransferReceived,
}

impl NotificationKind {
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::Deposit => "Deposit Message",
            NotificationKind::Withdrawal => "Withdrawal Message",
            NotificationKind::LoanRequest => "Loan Request Message",
            NotificationKind::LoanApproved => "Loan Approved Message",
            NotificationKind::LoanRejected => "Loan Rejected Message",
            NotificationKind::LoanPaid => "Loan Paid Message",
            NotificationKind::TransferSent => "Money Transfer Message",
            NotificationKind::TransferReceived => "Money Received Message",
        }
    }

    pub fn body(&self, owner: &str, amount: Cents) -> String {
        let amount = format_cents(amount);
        let line = match self {
            NotificationKind::Deposit => {
                format!("{amount} was deposited to your account successfully.")
            }
            NotificationKind::Withdrawal => {
                format!("Successfully withdrawn {amount} from your account.")
            }
            NotificationKind::LoanRequest => {
                format!("Your loan request for {amount} was submitted successfully.")
            }
            NotificationKind::LoanApproved => {
                format!("Your loan of {amount} was approved and credited to your account.")
            }
            NotificationKind::LoanRejected => format!("Your loan request for {amount} was rejected."),
            NotificationKind::LoanPaid => format!("Your loan of {amount} has been paid off."),
            NotificationKind::TransferSent => format!("You transferred {amount} successfully."),
            NotificationKind::TransferReceived => {
                format!("You received a transfer of {amount}.")
            }
        };
        format!("Dear {owner},\n\n{line}\n")
    }
}

/// Tells an account holder that something happened to their money.
///
/// Called after the change has been committed. Errors are logged by the caller
/// and never undo the operation. Implementations are synchronous and may block;
/// the service runs them on tokio's blocking pool.
pub trait Notifier: Send + Sync {
    fn notify(&self, account: &Account, amount: Cents, kind: NotificationKind) -> Result<()>;
}

/// Discards every notification.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _account: &Account, _amount: Cents, _kind: NotificationKind) -> Result<()> {
        Ok(())
    }
}

/// Emits notifications as log events.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, account: &Account, amount: Cents, kind: NotificationKind) -> Result<()> {
        tracing::info!(
            to = %account.email,
            account = %account.account_number,
            amount = %format_cents(amount),
            "{}",
            kind.subject()
        );
        Ok(())
    }
}

/// A rendered message waiting to be picked up by a mail relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub kind: NotificationKind,
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn render(account: &Account, amount: Cents, kind: NotificationKind) -> Self {
        Self {
            to: account.email.clone(),
            subject: kind.subject().to_string(),
            body: kind.body(&account.owner, amount),
            kind,
            amount,
            created_at: Utc::now(),
        }
    }
}

/// Appends rendered messages to a JSON-lines file.
pub struct MailOutbox {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MailOutbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Read every message written so far.
    pub fn messages(&self) -> Result<Vec<OutboxMessage>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to read outbox"),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Malformed outbox entry"))
            .collect()
    }
}

impl Notifier for MailOutbox {
    fn notify(&self, account: &Account, amount: Cents, kind: NotificationKind) -> Result<()> {
        let message = OutboxMessage::render(account, amount, kind);
        let line = serde_json::to_string(&message)?;

        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Outbox lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open outbox {}", self.path.display()))?;
        writeln!(file, "{}", line).context("Failed to write outbox entry")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn account() -> Account {
        Account::new("Ada", "ada@example.com").with_account_number(1)
    }

    #[test]
    fn test_body_mentions_owner_and_amount() {
        let body = NotificationKind::Deposit.body("Ada", 20000);
        assert!(body.starts_with("Dear Ada,"));
        assert!(body.contains("200.00 was deposited"));
    }

    #[test]
    fn test_silent_notifiers_never_fail() {
        let notifiers: [Box<dyn Notifier>; 2] = [Box::new(NoopNotifier), Box::new(LogNotifier)];
        for notifier in &notifiers {
            assert!(notifier.notify(&account(), 100, NotificationKind::LoanApproved).is_ok());
        }
    }

    #[test]
    fn test_outbox_appends_messages() {
        let dir = TempDir::new().unwrap();
        let outbox = MailOutbox::new(dir.path().join("outbox.jsonl"));
        assert!(outbox.messages().unwrap().is_empty());

        outbox
            .notify(&account(), 500, NotificationKind::Withdrawal)
            .unwrap();
        outbox
            .notify(&account(), 700, NotificationKind::TransferSent)
            .unwrap();

        let messages = outbox.messages().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].to, "ada@example.com");
        assert_eq!(messages[0].subject, "Withdrawal Message");
        assert_eq!(messages[1].kind, NotificationKind::TransferSent);
        assert_eq!(messages[1].amount, 700);
    }

    #[test]
    fn test_outbox_in_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let outbox = MailOutbox::new(dir.path().join("missing").join("outbox.jsonl"));
        assert!(outbox.notify(&account(), 1, NotificationKind::Deposit).is_err());
    }
}
