use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite};

use crate::domain::{Account, AccountId, Cents, Transaction, TransactionId, TransactionType};

use super::repository::{
    ACCOUNT_COLUMNS, TRANSACTION_COLUMNS, decode_timestamp, encode_timestamp, row_to_account,
    row_to_transaction,
};

/// One atomic ledger mutation.
///
/// Wraps a SQLite transaction: every statement issued through it commits
/// together on [`UnitOfWork::commit`], and dropping it without committing rolls
/// everything back. Mutating callers start with [`UnitOfWork::lock_account`] so
/// that the write lock is taken before any balance is read.
pub struct UnitOfWork {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub(crate) fn new(tx: sqlx::Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit database transaction")
    }

    /// Read an account while taking the database write lock.
    ///
    /// The no-op update makes SQLite acquire its reserved lock up front, so two
    /// concurrent read-modify-write sequences on the ledger serialize instead of
    /// losing an update.
    pub async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "UPDATE accounts SET balance = balance WHERE id = ? RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to lock account")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Like [`UnitOfWork::lock_account`], addressed by account number.
    pub async fn lock_account_by_number(&mut self, account_number: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "UPDATE accounts SET balance = balance WHERE account_number = ? RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(account_number)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to lock account by number")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Add `delta` to the account's balance and return the new balance.
    pub async fn adjust_balance(&mut self, id: AccountId, delta: Cents) -> Result<Cents> {
        let row = sqlx::query("UPDATE accounts SET balance = balance + ? WHERE id = ? RETURNING balance")
            .bind(delta)
            .bind(id.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .context("Failed to adjust balance")?;

        Ok(row.get("balance"))
    }

    pub(crate) async fn insert_account(&mut self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, account_number, owner, email, balance, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.account_number)
        .bind(&account.owner)
        .bind(&account.email)
        .bind(account.balance)
        .bind(encode_timestamp(account.created_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    /// Append a record to the ledger, filling in its assigned id.
    pub async fn insert_transaction(&mut self, transaction: &mut Transaction) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (account_id, amount, transaction_type, balance_after_transaction, loan_approve, loan_status, counterparty_id, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(transaction.account.to_string())
        .bind(transaction.amount)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.balance_after_transaction)
        .bind(transaction.loan_approve)
        .bind(transaction.loan_status.map(|s| s.as_str()))
        .bind(transaction.counterparty.map(|id| id.to_string()))
        .bind(encode_timestamp(transaction.timestamp))
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to save transaction")?;

        transaction.id = row.get("id");
        Ok(())
    }

    /// Get a transaction by ID, seeing this unit's own uncommitted writes.
    pub async fn get_transaction(&mut self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to fetch transaction")?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    /// Count approved loans that have not been paid off.
    pub async fn count_active_loans(&mut self, account_id: AccountId) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM transactions
            WHERE account_id = ? AND transaction_type = ? AND loan_approve = 1
            "#,
        )
        .bind(account_id.to_string())
        .bind(TransactionType::Loan.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to count active loans")?;

        Ok(row.get("count"))
    }

    /// Timestamp of the account's most recent record, if it has any.
    pub async fn latest_timestamp(&mut self, account_id: AccountId) -> Result<Option<DateTime<Utc>>> {
        // Fixed-width encoding keeps MAX() chronological
        let row = sqlx::query("SELECT MAX(timestamp) as latest FROM transactions WHERE account_id = ?")
            .bind(account_id.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .context("Failed to fetch latest transaction timestamp")?;

        let latest: Option<String> = row.get("latest");
        latest
            .map(|value| decode_timestamp(&value, "transaction"))
            .transpose()
    }

    /// Persist a loan record's lifecycle fields.
    pub async fn update_loan(&mut self, loan: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET transaction_type = ?, balance_after_transaction = ?, loan_approve = ?, loan_status = ?
            WHERE id = ?
            "#,
        )
        .bind(loan.transaction_type.as_str())
        .bind(loan.balance_after_transaction)
        .bind(loan.loan_approve)
        .bind(loan.loan_status.map(|s| s.as_str()))
        .bind(loan.id)
        .execute(&mut *self.tx)
        .await
        .context("Failed to update loan")?;
        Ok(())
    }

    /// Get and increment a named counter.
    pub(crate) async fn next_sequence(&mut self, name: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = ?
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }
}
