// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use bankbook::application::{
    LedgerConfig, LedgerService, NotificationKind, Notifier, RequestContext,
};
use bankbook::domain::{Account, Cents};
use chrono::{DateTime, NaiveDate, Utc};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let (service, _notifier, temp_dir) = test_service_with(LedgerConfig::default()).await?;
    Ok((service, temp_dir))
}

/// Helper to create a test service with the given policy and a recording notifier
pub async fn test_service_with(
    config: LedgerConfig,
) -> Result<(LedgerService, Arc<RecordingNotifier>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let notifier = Arc::new(RecordingNotifier::default());
    let service = LedgerService::init(db_path.to_str().unwrap())
        .await?
        .with_config(config)
        .with_notifier(notifier.clone());
    Ok((service, notifier, temp_dir))
}

/// Helper to parse a date string into NaiveDate
pub fn date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Helper to build a UTC timestamp on the given day
pub fn at(date_str: &str, hour: u32, minute: u32) -> DateTime<Utc> {
    date(date_str)
        .and_hms_opt(hour, minute, 0)
        .unwrap()
        .and_utc()
}

/// Open an account and optionally fund it with a deposit
pub async fn open_funded(
    service: &LedgerService,
    owner: &str,
    opening_deposit: Cents,
) -> Result<(Account, RequestContext)> {
    let account = service
        .open_account(owner, format!("{}@example.com", owner.to_lowercase()))
        .await?;
    let ctx = RequestContext::now(account.id);
    if opening_deposit > 0 {
        service.deposit(&ctx, opening_deposit).await?;
    }
    let account = service.get_account(account.id).await?;
    Ok((account, ctx))
}

/// Notifier that keeps every notification in memory, optionally failing them all
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Cents, NotificationKind)>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<(String, Cents, NotificationKind)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds_for(&self, account_number: &str) -> Vec<NotificationKind> {
        self.sent()
            .into_iter()
            .filter(|(number, _, _)| number == account_number)
            .map(|(_, _, kind)| kind)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, account: &Account, amount: Cents, kind: NotificationKind) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((account.account_number.clone(), amount, kind));
        if self.failing {
            anyhow::bail!("mail server unavailable");
        }
        Ok(())
    }
}
