use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::application::{
    DEFAULT_LOAN_LIMIT, LedgerConfig, LedgerService, LogNotifier, MailOutbox, Notifier, OverdraftPolicy, ReportQuery,
    SummaryKind, SummaryScope,
};
use crate::domain::{Account, Transaction, TransactionId, format_cents, parse_cents};
use crate::io::Exporter;

/// Bankbook - a small banking ledger
#[derive(Parser)]
#[command(name = "bankbook")]
#[command(about = "Accounts, deposits, withdrawals, loans and transfers on a local ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "bankbook.db", global = true)]
    pub database: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Let withdrawals and transfers take a balance below zero
    #[arg(long, global = true)]
    pub allow_overdraft: bool,

    /// Sum date-filtered report totals over every account, not just the caller's
    #[arg(long, global = true)]
    pub global_summary: bool,

    /// Do not notify the receiving side of a transfer
    #[arg(long, global = true)]
    pub no_recipient_notice: bool,

    /// Maximum number of approved, unpaid loans per account
    #[arg(long, global = true, default_value_t = DEFAULT_LOAN_LIMIT)]
    pub loan_limit: u32,

    /// Write notifications to this JSON-lines file instead of the log
    #[arg(long, global = true)]
    pub outbox: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Deposit money into an account
    Deposit {
        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Account number
        #[arg(short, long)]
        account: String,
    },

    /// Withdraw money from an account
    Withdraw {
        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Account number
        #[arg(short, long)]
        account: String,
    },

    /// Loan commands
    #[command(subcommand)]
    Loan(LoanCommands),

    /// Send money to another account
    Transfer {
        /// Amount to transfer
        amount: String,

        /// Sending account number
        #[arg(long)]
        from: String,

        /// Receiving account number
        #[arg(long)]
        to: String,
    },

    /// Show an account's transactions
    Report {
        /// Account number
        #[arg(short, long)]
        account: String,

        /// First day to include (YYYY-MM-DD)
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long, requires = "start")]
        end: Option<String>,

        /// Output format: table, json
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Export an account's transactions to CSV or JSON
    Export {
        /// Account number
        #[arg(short, long)]
        account: String,

        /// First day to include (YYYY-MM-DD)
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long, requires = "start")]
        end: Option<String>,

        /// Format: csv, json
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Verify ledger integrity
    Check,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Open {
        /// Account holder's name
        owner: String,

        /// Address for notifications
        #[arg(short, long)]
        email: String,
    },

    /// List all accounts
    List,

    /// Show account details
    Show {
        /// Account number
        number: String,
    },
}

#[derive(Subcommand)]
pub enum LoanCommands {
    /// Ask for a loan
    Request {
        /// Loan amount
        amount: String,

        /// Account number
        #[arg(short, long)]
        account: String,
    },

    /// Approve a requested loan and credit the borrower
    Approve {
        /// Loan transaction ID
        id: TransactionId,
    },

    /// Reject a requested loan
    Reject {
        /// Loan transaction ID
        id: TransactionId,
    },

    /// Pay off an approved loan
    Pay {
        /// Loan transaction ID
        id: TransactionId,

        /// Account number
        #[arg(short, long)]
        account: String,
    },

    /// List an account's loans
    List {
        /// Account number
        #[arg(short, long)]
        account: String,
    },
}

impl Cli {
    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_overdraft(if self.allow_overdraft {
                OverdraftPolicy::Allow
            } else {
                OverdraftPolicy::Reject
            })
            .with_summary_scope(if self.global_summary {
                SummaryScope::AllAccounts
            } else {
                SummaryScope::Account
            })
            .with_notify_recipient(!self.no_recipient_notice)
            .with_loan_limit(self.loan_limit)
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        match &self.outbox {
            Some(path) => Arc::new(MailOutbox::new(path)),
            None => Arc::new(LogNotifier),
        }
    }

    async fn service(&self) -> Result<LedgerService> {
        let service = LedgerService::connect(&self.database)
            .await
            .with_context(|| format!("Cannot open database {}", self.database))?;
        Ok(service
            .with_config(self.ledger_config())
            .with_notifier(self.notifier()))
    }

    pub async fn run(self) -> Result<()> {
        if matches!(self.command, Commands::Init) {
            LedgerService::init(&self.database).await?;
            println!("Database initialized: {}", self.database);
            return Ok(());
        }

        let service = self.service().await?;

        match self.command {
            Commands::Init => {}

            Commands::Account(account_cmd) => {
                run_account_command(&service, account_cmd).await?;
            }

            Commands::Deposit { amount, account } => {
                let ctx = service.context_for(&account).await?;
                let posting = service.deposit(&ctx, parse_amount(&amount)?).await?;
                println!(
                    "{} was deposited to account {} (balance {})",
                    format_cents(posting.transaction.amount),
                    posting.account.account_number,
                    format_cents(posting.account.balance)
                );
            }

            Commands::Withdraw { amount, account } => {
                let ctx = service.context_for(&account).await?;
                let posting = service.withdraw(&ctx, parse_amount(&amount)?).await?;
                println!(
                    "Successfully withdrawn {} from account {} (balance {})",
                    format_cents(posting.transaction.amount),
                    posting.account.account_number,
                    format_cents(posting.account.balance)
                );
            }

            Commands::Loan(loan_cmd) => {
                run_loan_command(&service, loan_cmd).await?;
            }

            Commands::Transfer { amount, from, to } => {
                let ctx = service.context_for(&from).await?;
                let receipt = service.transfer(&ctx, &to, parse_amount(&amount)?).await?;
                println!(
                    "Transferred {} {} -> {}",
                    format_cents(receipt.sent.amount),
                    receipt.sender.account_number,
                    receipt.recipient.account_number
                );
                println!(
                    "  {} balance: {}",
                    receipt.sender.account_number,
                    format_cents(receipt.sender.balance)
                );
            }

            Commands::Report {
                account,
                start,
                end,
                format,
            } => {
                run_report_command(&service, &account, start, end, &format).await?;
            }

            Commands::Export {
                account,
                start,
                end,
                format,
                output,
            } => {
                let ctx = service.context_for(&account).await?;
                let query = parse_query(start, end)?;
                let exporter = Exporter::new(&service);

                let writer: Box<dyn std::io::Write> = match &output {
                    Some(path) => Box::new(
                        std::fs::File::create(path)
                            .with_context(|| format!("Cannot create {}", path))?,
                    ),
                    None => Box::new(std::io::stdout()),
                };

                let count = match format.as_str() {
                    "csv" => exporter.export_report_csv(&ctx, query, writer).await?,
                    "json" => exporter.export_report_json(&ctx, query, writer).await?,
                    other => anyhow::bail!("Unknown export format '{}'. Use csv or json", other),
                };
                eprintln!("Exported {} transactions", count);
            }

            Commands::Check => {
                run_check_command(&service).await?;
            }
        }

        Ok(())
    }
}

async fn run_account_command(service: &LedgerService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Open { owner, email } => {
            let account = service.open_account(owner, email).await?;
            println!(
                "Opened account {} for {}",
                account.account_number, account.owner
            );
        }

        AccountCommands::List => {
            let accounts = service.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<10} {:<24} {:>14}", "NUMBER", "OWNER", "BALANCE");
                println!("{}", "-".repeat(50));
                for account in accounts {
                    println!(
                        "{:<10} {:<24} {:>14}",
                        account.account_number,
                        truncate(&account.owner, 24),
                        format_cents(account.balance)
                    );
                }
            }
        }

        AccountCommands::Show { number } => {
            let account = service.get_account_by_number(&number).await?;
            print_account(&account);
        }
    }
    Ok(())
}

async fn run_loan_command(service: &LedgerService, cmd: LoanCommands) -> Result<()> {
    match cmd {
        LoanCommands::Request { amount, account } => {
            let ctx = service.context_for(&account).await?;
            let posting = service.request_loan(&ctx, parse_amount(&amount)?).await?;
            println!(
                "Loan request for {} submitted successfully (loan {})",
                format_cents(posting.transaction.amount),
                posting.transaction.id
            );
        }

        LoanCommands::Approve { id } => {
            let posting = service.approve_loan(id).await?;
            println!(
                "Approved loan {}: {} credited to {} (balance {})",
                id,
                format_cents(posting.transaction.amount),
                posting.account.account_number,
                format_cents(posting.account.balance)
            );
        }

        LoanCommands::Reject { id } => {
            let posting = service.reject_loan(id).await?;
            println!(
                "Rejected loan {} of {} for {}",
                id,
                format_cents(posting.transaction.amount),
                posting.account.account_number
            );
        }

        LoanCommands::Pay { id, account } => {
            let ctx = service.context_for(&account).await?;
            let posting = service.pay_loan(&ctx, id).await?;
            println!(
                "Paid off loan {} of {} (balance {})",
                id,
                format_cents(posting.transaction.amount),
                format_cents(posting.account.balance)
            );
        }

        LoanCommands::List { account } => {
            let ctx = service.context_for(&account).await?;
            let loans = service.list_loans(&ctx).await?;
            if loans.is_empty() {
                println!("No loans found.");
            } else {
                println!("{:<8} {:<12} {:>14} {:<10}", "ID", "DATE", "AMOUNT", "STATUS");
                println!("{}", "-".repeat(47));
                for loan in loans {
                    println!(
                        "{:<8} {:<12} {:>14} {:<10}",
                        loan.id,
                        loan.timestamp.format("%Y-%m-%d"),
                        format_cents(loan.amount),
                        loan.loan_state()
                            .map(|s| s.to_string())
                            .unwrap_or_default()
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_report_command(
    service: &LedgerService,
    account: &str,
    start: Option<String>,
    end: Option<String>,
    format: &str,
) -> Result<()> {
    let ctx = service.context_for(account).await?;
    let query = parse_query(start, end)?;
    let report = service.transaction_report(&ctx, query).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Transaction Report: {} ({})", report.account_number, report.owner);
    if let Some(range) = report.range {
        println!("Period: {} to {}", range.start, range.end);
    }
    println!();

    if report.transactions.is_empty() {
        println!("No transactions found.");
    } else {
        println!(
            "{:<8} {:<20} {:<12} {:>14} {:>14}",
            "ID", "DATE", "TYPE", "AMOUNT", "BALANCE"
        );
        println!("{}", "-".repeat(72));
        for tx in &report.transactions {
            print_transaction_row(tx);
        }
    }

    println!("{}", "-".repeat(72));
    let label = match report.summary_kind {
        SummaryKind::CurrentBalance => "Current balance",
        SummaryKind::AccountRangeTotal => "Total in period",
        SummaryKind::LedgerRangeTotal => "Ledger total in period",
    };
    println!("{:<24} {:>14}", label, format_cents(report.summary));
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    let report = service.check_integrity().await?;

    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.transaction_count);
    println!();

    for mismatch in &report.balance_mismatches {
        println!(
            "✗ Account {}: stored balance {} but ledger says {}",
            mismatch.account_number,
            format_cents(mismatch.stored),
            format_cents(mismatch.computed)
        );
    }
    for mismatch in &report.snapshot_mismatches {
        println!("✗ {}", mismatch);
    }
    for id in &report.unpaired_transfers {
        println!("✗ Transfer leg {} has no matching leg", id);
    }
    for id in &report.invalid_amounts {
        println!("✗ Transaction {} has a non-positive amount", id);
    }

    if report.is_ok() {
        println!("✓ Ledger is consistent");
        Ok(())
    } else {
        anyhow::bail!("Ledger integrity check failed")
    }
}

fn print_account(account: &Account) {
    println!("Account: {}", account.account_number);
    println!("  Owner:    {}", account.owner);
    println!("  Email:    {}", account.email);
    println!("  Balance:  {}", format_cents(account.balance));
    println!("  Opened:   {}", account.created_at.format("%Y-%m-%d %H:%M:%S"));
}

fn print_transaction_row(tx: &Transaction) {
    println!(
        "{:<8} {:<20} {:<12} {:>14} {:>14}",
        tx.id,
        tx.timestamp.format("%Y-%m-%d %H:%M"),
        truncate(&tx.transaction_type.to_string(), 12),
        format_cents(tx.amount),
        format_cents(tx.balance_after_transaction)
    );
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn parse_amount(input: &str) -> Result<i64> {
    parse_cents(input).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", input))
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))
}

fn parse_query(start: Option<String>, end: Option<String>) -> Result<ReportQuery> {
    match (start, end) {
        (Some(start), Some(end)) => Ok(ReportQuery::between(parse_date(&start)?, parse_date(&end)?)),
        (None, None) => Ok(ReportQuery::all()),
        _ => anyhow::bail!("--start and --end must be given together"),
    }
}
