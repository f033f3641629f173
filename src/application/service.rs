use std::sync::Arc;

use chrono::Utc;

use crate::domain::{
    Account, AccountId, Cents, IntegrityReport, LoanStatus, LoanTransitionError, Transaction,
    TransactionId, TransactionType, build_integrity_report,
};
use crate::storage::{Repository, UnitOfWork};

use super::{
    LedgerConfig, LedgerError, LogNotifier, NotificationKind, Notifier, OverdraftPolicy,
    ReportQuery, RequestContext, SummaryKind, SummaryScope, TransactionReport,
};

/// Application service providing the ledger operations.
/// This is the primary interface for any front-end (CLI, web, tests).
pub struct LedgerService {
    repo: Repository,
    config: LedgerConfig,
    notifier: Arc<dyn Notifier>,
}

/// A committed single-account operation.
#[derive(Debug, Clone)]
pub struct Posting {
    /// The account as it stands after the operation
    pub account: Account,
    pub transaction: Transaction,
}

/// A committed transfer: both legs, both updated accounts.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub sender: Account,
    pub recipient: Account,
    pub sent: Transaction,
    pub received: Transaction,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            config: LedgerConfig::default(),
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Accounts
    // ========================

    /// Open a new account with a zero balance.
    pub async fn open_account(
        &self,
        owner: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Account, LedgerError> {
        let account = self.repo.save_account(Account::new(owner, email)).await?;
        tracing::info!(account = %account.account_number, "opened account");
        Ok(account)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.repo
            .get_account(id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    pub async fn get_account_by_number(&self, account_number: &str) -> Result<Account, LedgerError> {
        self.repo
            .get_account_by_number(account_number)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_number.to_string()))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.repo.list_accounts().await?)
    }

    /// Resolve the caller's account number into a context stamped with the current time.
    pub async fn context_for(&self, account_number: &str) -> Result<RequestContext, LedgerError> {
        let account = self.get_account_by_number(account_number).await?;
        Ok(RequestContext::now(account.id))
    }

    // ========================
    // Deposits and withdrawals
    // ========================

    /// Credit the caller's account.
    pub async fn deposit(&self, ctx: &RequestContext, amount: Cents) -> Result<Posting, LedgerError> {
        validate_amount(amount)?;
        let posting = self
            .post(ctx, TransactionType::Deposit, amount, amount)
            .await?;
        self.notify(&posting.account, amount, NotificationKind::Deposit).await;
        Ok(posting)
    }

    /// Debit the caller's account, subject to the overdraft policy.
    pub async fn withdraw(&self, ctx: &RequestContext, amount: Cents) -> Result<Posting, LedgerError> {
        validate_amount(amount)?;
        let posting = self
            .post(ctx, TransactionType::Withdrawal, amount, -amount)
            .await?;
        self.notify(&posting.account, amount, NotificationKind::Withdrawal).await;
        Ok(posting)
    }

    async fn post(
        &self,
        ctx: &RequestContext,
        transaction_type: TransactionType,
        amount: Cents,
        delta: Cents,
    ) -> Result<Posting, LedgerError> {
        let mut uow = self.repo.begin().await?;
        let account = lock(&mut uow, ctx.account).await?;
        ensure_in_order(&mut uow, &account, ctx).await?;
        if delta < 0 {
            self.ensure_can_debit(&account, amount)?;
        }

        let balance = uow.adjust_balance(account.id, delta).await?;
        let mut transaction =
            Transaction::new(account.id, transaction_type, amount, balance, ctx.at);
        uow.insert_transaction(&mut transaction).await?;
        uow.commit().await?;

        tracing::info!(
            account = %account.account_number,
            kind = transaction_type.as_str(),
            amount,
            balance,
            "posted transaction"
        );
        Ok(Posting {
            account: Account { balance, ..account },
            transaction,
        })
    }

    // ========================
    // Loans
    // ========================

    /// Record a loan request. The balance does not change until approval.
    pub async fn request_loan(
        &self,
        ctx: &RequestContext,
        amount: Cents,
    ) -> Result<Posting, LedgerError> {
        validate_amount(amount)?;

        let mut uow = self.repo.begin().await?;
        let account = lock(&mut uow, ctx.account).await?;
        ensure_in_order(&mut uow, &account, ctx).await?;
        self.ensure_below_loan_limit(&mut uow, account.id).await?;

        let mut loan = Transaction::loan_request(account.id, amount, account.balance, ctx.at);
        uow.insert_transaction(&mut loan).await?;
        uow.commit().await?;

        tracing::info!(account = %account.account_number, loan = loan.id, amount, "loan requested");
        self.notify(&account, amount, NotificationKind::LoanRequest).await;
        Ok(Posting {
            account,
            transaction: loan,
        })
    }

    /// Approve a requested loan and credit its amount to the borrower.
    pub async fn approve_loan(&self, loan_id: TransactionId) -> Result<Posting, LedgerError> {
        let (mut uow, account, mut loan, status) = self.lock_loan(loan_id).await?;
        let next = status.approve().map_err(|e| transition_error(loan_id, e))?;
        self.ensure_below_loan_limit(&mut uow, account.id).await?;

        let balance = uow.adjust_balance(account.id, loan.amount).await?;
        loan.loan_status = Some(next);
        loan.loan_approve = next.is_approved();
        loan.balance_after_transaction = balance;
        uow.update_loan(&loan).await?;
        uow.commit().await?;

        tracing::info!(account = %account.account_number, loan = loan_id, balance, "loan approved");
        let account = Account { balance, ..account };
        self.notify(&account, loan.amount, NotificationKind::LoanApproved).await;
        Ok(Posting {
            account,
            transaction: loan,
        })
    }

    /// Turn down a requested loan. Nothing is credited.
    pub async fn reject_loan(&self, loan_id: TransactionId) -> Result<Posting, LedgerError> {
        let (mut uow, account, mut loan, status) = self.lock_loan(loan_id).await?;
        let next = status.reject().map_err(|e| transition_error(loan_id, e))?;

        loan.loan_status = Some(next);
        uow.update_loan(&loan).await?;
        uow.commit().await?;

        tracing::info!(account = %account.account_number, loan = loan_id, "loan rejected");
        self.notify(&account, loan.amount, NotificationKind::LoanRejected).await;
        Ok(Posting {
            account,
            transaction: loan,
        })
    }

    /// Settle an approved loan from the caller's balance.
    ///
    /// The balance must be strictly greater than the loan amount.
    pub async fn pay_loan(
        &self,
        ctx: &RequestContext,
        loan_id: TransactionId,
    ) -> Result<Posting, LedgerError> {
        let (mut uow, account, mut loan, status) = self.lock_loan(loan_id).await?;
        if loan.account != ctx.account {
            return Err(LedgerError::NotFound(loan_id));
        }
        let next = status.pay().map_err(|e| transition_error(loan_id, e))?;

        if loan.amount >= account.balance {
            return Err(LedgerError::InsufficientFunds {
                account_number: account.account_number,
                balance: account.balance,
                required: loan.amount,
            });
        }

        let balance = uow.adjust_balance(account.id, -loan.amount).await?;
        loan.transaction_type = TransactionType::LoanPaid;
        loan.loan_status = Some(next);
        loan.loan_approve = next.is_approved();
        loan.balance_after_transaction = balance;
        uow.update_loan(&loan).await?;
        uow.commit().await?;

        tracing::info!(account = %account.account_number, loan = loan_id, balance, "loan paid");
        let account = Account { balance, ..account };
        self.notify(&account, loan.amount, NotificationKind::LoanPaid).await;
        Ok(Posting {
            account,
            transaction: loan,
        })
    }

    /// Loan-type records of the caller's account, in any approval state.
    pub async fn list_loans(&self, ctx: &RequestContext) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.repo.list_loans_for_account(ctx.account).await?)
    }

    /// Open a unit of work holding the borrower's lock and the loan as read under it.
    async fn lock_loan(
        &self,
        loan_id: TransactionId,
    ) -> Result<(UnitOfWork, Account, Transaction, LoanStatus), LedgerError> {
        let borrower = self
            .repo
            .get_transaction(loan_id)
            .await?
            .ok_or(LedgerError::NotFound(loan_id))?
            .account;

        let mut uow = self.repo.begin().await?;
        let account = lock(&mut uow, borrower).await?;
        let loan = uow
            .get_transaction(loan_id)
            .await?
            .ok_or(LedgerError::NotFound(loan_id))?;
        let status = loan.loan_state().ok_or(LedgerError::NotALoan(loan_id))?;

        Ok((uow, account, loan, status))
    }

    async fn ensure_below_loan_limit(
        &self,
        uow: &mut UnitOfWork,
        account_id: AccountId,
    ) -> Result<(), LedgerError> {
        let active = uow.count_active_loans(account_id).await?;
        if active >= i64::from(self.config.loan_limit) {
            return Err(LedgerError::LoanLimitExceeded {
                limit: self.config.loan_limit,
                active,
            });
        }
        Ok(())
    }

    // ========================
    // Transfers
    // ========================

    /// Move money from the caller's account to the account with `recipient_number`.
    ///
    /// Both balances and both ledger legs are written in one unit of work.
    pub async fn transfer(
        &self,
        ctx: &RequestContext,
        recipient_number: &str,
        amount: Cents,
    ) -> Result<TransferReceipt, LedgerError> {
        validate_amount(amount)?;

        let mut uow = self.repo.begin().await?;
        let sender = lock(&mut uow, ctx.account).await?;
        let recipient = uow
            .lock_account_by_number(recipient_number)
            .await?
            .ok_or_else(|| LedgerError::UnknownRecipient(recipient_number.to_string()))?;
        if recipient.id == sender.id {
            return Err(LedgerError::SelfTransfer);
        }
        ensure_in_order(&mut uow, &sender, ctx).await?;
        ensure_in_order(&mut uow, &recipient, ctx).await?;
        self.ensure_can_debit(&sender, amount)?;

        let sender_balance = uow.adjust_balance(sender.id, -amount).await?;
        let recipient_balance = uow.adjust_balance(recipient.id, amount).await?;

        let mut sent = Transaction::new(
            sender.id,
            TransactionType::Transfer,
            amount,
            sender_balance,
            ctx.at,
        )
        .with_counterparty(recipient.id);
        let mut received = Transaction::new(
            recipient.id,
            TransactionType::Received,
            amount,
            recipient_balance,
            ctx.at,
        )
        .with_counterparty(sender.id);
        uow.insert_transaction(&mut sent).await?;
        uow.insert_transaction(&mut received).await?;
        uow.commit().await?;

        tracing::info!(
            from = %sender.account_number,
            to = %recipient.account_number,
            amount,
            "transfer committed"
        );

        let sender = Account {
            balance: sender_balance,
            ..sender
        };
        let recipient = Account {
            balance: recipient_balance,
            ..recipient
        };
        self.notify(&sender, amount, NotificationKind::TransferSent).await;
        if self.config.notify_recipient {
            self.notify(&recipient, amount, NotificationKind::TransferReceived).await;
        }

        Ok(TransferReceipt {
            sender,
            recipient,
            sent,
            received,
        })
    }

    // ========================
    // Reporting
    // ========================

    /// The caller's transactions, optionally limited to an inclusive date range.
    ///
    /// Without a range the summary is the current balance; with one it is the
    /// total amount moved inside the range, scoped by the configured
    /// [`SummaryScope`].
    pub async fn transaction_report(
        &self,
        ctx: &RequestContext,
        query: ReportQuery,
    ) -> Result<TransactionReport, LedgerError> {
        let account = self.get_account(ctx.account).await?;

        let (transactions, summary, summary_kind) = match query.range {
            None => {
                let transactions = self.repo.list_transactions_for_account(account.id).await?;
                (transactions, account.balance, SummaryKind::CurrentBalance)
            }
            Some(range) => {
                if !range.is_valid() {
                    return Err(LedgerError::InvalidDateRange {
                        start: range.start,
                        end: range.end,
                    });
                }
                let transactions = self
                    .repo
                    .list_transactions_in_range(account.id, range.start, range.end)
                    .await?;
                let scope = match self.config.summary_scope {
                    SummaryScope::Account => Some(account.id),
                    SummaryScope::AllAccounts => None,
                };
                let summary = self
                    .repo
                    .sum_amount_in_range(scope, range.start, range.end)
                    .await?;
                (
                    transactions,
                    summary,
                    SummaryKind::from(self.config.summary_scope),
                )
            }
        };

        tracing::debug!(
            account = %account.account_number,
            count = transactions.len(),
            "built transaction report"
        );
        Ok(TransactionReport {
            account_number: account.account_number,
            owner: account.owner,
            range: query.range,
            transactions,
            summary,
            summary_kind,
        })
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.repo
            .get_transaction(id)
            .await?
            .ok_or(LedgerError::NotFound(id))
    }

    // ========================
    // Integrity
    // ========================

    /// Recompute every balance from the ledger and compare.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let accounts = self.repo.list_accounts().await?;
        let transactions = self.repo.list_transactions().await?;
        Ok(build_integrity_report(&accounts, &transactions))
    }

    // ========================
    // Helpers
    // ========================

    fn ensure_can_debit(&self, account: &Account, amount: Cents) -> Result<(), LedgerError> {
        if self.config.overdraft == OverdraftPolicy::Reject && !account.covers(amount) {
            return Err(LedgerError::InsufficientFunds {
                account_number: account.account_number.clone(),
                balance: account.balance,
                required: amount,
            });
        }
        Ok(())
    }

    /// Deliver a notification on the blocking pool. Failures are logged only.
    async fn notify(&self, account: &Account, amount: Cents, kind: NotificationKind) {
        let notifier = Arc::clone(&self.notifier);
        let recipient = account.clone();
        let delivered =
            tokio::task::spawn_blocking(move || notifier.notify(&recipient, amount, kind)).await;

        if let Err(e) = delivered.map_err(anyhow::Error::from).and_then(|outcome| outcome) {
            tracing::warn!(
                account = %account.account_number,
                subject = kind.subject(),
                "notification failed: {e:#}"
            );
        }
    }
}

fn validate_amount(amount: Cents) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

async fn lock(uow: &mut UnitOfWork, account_id: AccountId) -> Result<Account, LedgerError> {
    uow.lock_account(account_id)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
}

/// Refuse an operation stamped in the future or before the account's latest record.
async fn ensure_in_order(
    uow: &mut UnitOfWork,
    account: &Account,
    ctx: &RequestContext,
) -> Result<(), LedgerError> {
    if ctx.at > Utc::now() {
        return Err(LedgerError::FutureTimestamp { at: ctx.at });
    }
    if let Some(latest) = uow.latest_timestamp(account.id).await? {
        if ctx.at < latest {
            return Err(LedgerError::StaleTimestamp {
                account_number: account.account_number.clone(),
                at: ctx.at,
                latest,
            });
        }
    }
    Ok(())
}

fn transition_error(id: TransactionId, e: LoanTransitionError) -> LedgerError {
    LedgerError::InvalidLoanTransition {
        id,
        from: e.from,
        to: e.to,
    }
}
