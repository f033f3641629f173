use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, Cents, LoanStatus, Transaction, TransactionId, TransactionType,
};

use super::{MIGRATION_001_INITIAL, UnitOfWork};

pub(crate) const ACCOUNT_COLUMNS: &str = "id, account_number, owner, email, balance, created_at";

pub(crate) const TRANSACTION_COLUMNS: &str = "id, account_id, amount, transaction_type, balance_after_transaction, loan_approve, loan_status, counterparty_id, timestamp";

/// Repository for persisting and querying accounts and their transactions.
///
/// Reads go straight to the pool. Anything that changes a balance goes through
/// a [`UnitOfWork`] obtained from [`Repository::begin`].
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    ///
    /// The pool holds a single connection, so units of work from this process
    /// queue for it instead of racing for SQLite's write lock.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run against an initialised database.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a unit of work. Dropping it without committing rolls back.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin database transaction")?;
        Ok(UnitOfWork::new(tx))
    }

    // ========================
    // Account operations
    // ========================

    /// Save a new account under the next account number and return it as stored.
    pub async fn save_account(&self, account: Account) -> Result<Account> {
        let mut uow = self.begin().await?;
        let sequence = uow.next_sequence("account_number").await?;
        let account = account.with_account_number(sequence);
        uow.insert_account(&account).await?;
        uow.commit().await?;
        Ok(account)
    }

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Get an account by its external account number.
    pub async fn get_account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = ?"
        ))
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by number")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// List all accounts, ordered by account number.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY account_number"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(row_to_account).collect()
    }

    // ========================
    // Transaction queries
    // ========================

    /// Get a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch transaction")?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    /// List every transaction in insertion order.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// List an account's transactions in insertion order.
    pub async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = ? ORDER BY id"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions for account")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// List an account's distinct transactions whose UTC date lies in
    /// `[start, end]`, both ends inclusive.
    pub async fn list_transactions_in_range(
        &self,
        account_id: AccountId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT DISTINCT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE account_id = ?
              AND substr(timestamp, 1, 10) >= ?
              AND substr(timestamp, 1, 10) <= ?
            ORDER BY id
            "#
        ))
        .bind(account_id.to_string())
        .bind(encode_date(start))
        .bind(encode_date(end))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions in range")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// Sum of `amount` over transactions dated within `[start, end]`.
    /// With no account, the sum runs over every account in the ledger.
    pub async fn sum_amount_in_range(
        &self,
        account_id: Option<AccountId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) as total
            FROM transactions
            WHERE (? IS NULL OR account_id = ?)
              AND substr(timestamp, 1, 10) >= ?
              AND substr(timestamp, 1, 10) <= ?
            "#,
        )
        .bind(account_id.map(|id| id.to_string()))
        .bind(account_id.map(|id| id.to_string()))
        .bind(encode_date(start))
        .bind(encode_date(end))
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum transactions in range")?;

        Ok(row.get("total"))
    }

    /// List the account's records that are still of type Loan.
    pub async fn list_loans_for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = ? AND transaction_type = ? ORDER BY id"
        ))
        .bind(account_id.to_string())
        .bind(TransactionType::Loan.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list loans")?;

        rows.iter().map(row_to_transaction).collect()
    }
}

/// Timestamps are stored as fixed-width UTC RFC 3339 strings, so string order is
/// time order and the first ten characters are the UTC date.
pub(crate) fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn encode_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn decode_timestamp(value: &str, what: &'static str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {what} timestamp"))?
        .with_timezone(&Utc))
}

pub(crate) fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
    let id_str: String = row.get("id");
    let created_at_str: String = row.get("created_at");

    Ok(Account {
        id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
        account_number: row.get("account_number"),
        owner: row.get("owner"),
        email: row.get("email"),
        balance: row.get("balance"),
        created_at: decode_timestamp(&created_at_str, "created_at")?,
    })
}

pub(crate) fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
    let account_str: String = row.get("account_id");
    let type_str: String = row.get("transaction_type");
    let status_str: Option<String> = row.get("loan_status");
    let counterparty_str: Option<String> = row.get("counterparty_id");
    let timestamp_str: String = row.get("timestamp");

    Ok(Transaction {
        id: row.get("id"),
        account: Uuid::parse_str(&account_str).context("Invalid account ID")?,
        amount: row.get("amount"),
        transaction_type: TransactionType::from_str(&type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", type_str))?,
        balance_after_transaction: row.get("balance_after_transaction"),
        loan_approve: row.get::<i64, _>("loan_approve") != 0,
        loan_status: status_str
            .map(|s| {
                LoanStatus::from_str(&s).ok_or_else(|| anyhow::anyhow!("Invalid loan status: {}", s))
            })
            .transpose()?,
        counterparty: counterparty_str
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .context("Invalid counterparty ID")?,
        timestamp: decode_timestamp(&timestamp_str, "transaction")?,
    })
}
