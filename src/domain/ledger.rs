use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Account, AccountId, Cents, Transaction, TransactionId, TransactionType};

/// Net effect a record has had on its account's balance.
///
/// An approved loan has been disbursed; a paid loan has been disbursed and
/// repaid, so it nets to zero, as do requested and rejected loans.
pub fn signed_effect(tx: &Transaction) -> Cents {
    match tx.transaction_type {
        TransactionType::Deposit | TransactionType::Received => tx.amount,
        TransactionType::Withdrawal | TransactionType::Transfer => -tx.amount,
        TransactionType::Loan if tx.loan_state().is_some_and(|s| s.is_approved()) => {
            tx.amount
        }
        TransactionType::Loan => 0,
        TransactionType::LoanPaid => 0,
    }
}

/// Compute the balance of a single account from its records.
pub fn compute_balance(account_id: AccountId, transactions: &[Transaction]) -> Cents {
    transactions
        .iter()
        .filter(|tx| tx.account == account_id)
        .map(signed_effect)
        .sum()
}

/// Compute balances for every account that appears in `transactions`.
pub fn compute_all_balances(transactions: &[Transaction]) -> HashMap<AccountId, Cents> {
    let mut balances: HashMap<AccountId, Cents> = HashMap::new();
    for tx in transactions {
        *balances.entry(tx.account).or_insert(0) += signed_effect(tx);
    }
    balances
}

/// Number of approved, not yet repaid loans.
pub fn count_active_loans(transactions: &[Transaction]) -> usize {
    transactions.iter().filter(|tx| tx.is_active_loan()).count()
}

/// Check that each record's snapshot equals the previous one plus its effect.
///
/// Only meaningful for a single account whose records are in time order and
/// that carries no loan records, since loans are re-snapshotted when they
/// change state.
pub fn verify_snapshots(
    opening_balance: Cents,
    transactions: &[Transaction],
) -> Result<Cents, SnapshotMismatch> {
    transactions
        .iter()
        .try_fold(opening_balance, |running, tx| {
            let expected = running + signed_effect(tx);
            if tx.balance_after_transaction == expected {
                Ok(expected)
            } else {
                Err(SnapshotMismatch {
                    transaction_id: tx.id,
                    expected,
                    recorded: tx.balance_after_transaction,
                })
            }
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMismatch {
    pub transaction_id: TransactionId,
    pub expected: Cents,
    pub recorded: Cents,
}

impl std::fmt::Display for SnapshotMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "transaction {} records balance {} but the running total is {}",
            self.transaction_id, self.recorded, self.expected
        )
    }
}

impl std::error::Error for SnapshotMismatch {}

/// Transfer legs that have no matching leg on the other account.
///
/// Legs are paired on (sender, recipient, amount, timestamp), which both legs
/// share because they are written in the same unit of work.
pub fn unpaired_transfer_legs(transactions: &[Transaction]) -> Vec<TransactionId> {
    type LegKey = (AccountId, Option<AccountId>, Cents, i64);

    let mut outgoing: HashMap<LegKey, Vec<TransactionId>> = HashMap::new();
    let mut incoming: HashMap<LegKey, Vec<TransactionId>> = HashMap::new();

    for tx in transactions {
        let stamp = tx.timestamp.timestamp_micros();
        match tx.transaction_type {
            TransactionType::Transfer => outgoing
                .entry((tx.account, tx.counterparty, tx.amount, stamp))
                .or_default()
                .push(tx.id),
            TransactionType::Received => {
                // Key incoming legs from the sender's point of view
                let sender = tx.counterparty.unwrap_or_default();
                incoming
                    .entry((sender, Some(tx.account), tx.amount, stamp))
                    .or_default()
                    .push(tx.id)
            }
            _ => {}
        }
    }

    let mut unpaired = Vec::new();
    for (key, legs) in &outgoing {
        let matched = incoming.get(key).map_or(0, Vec::len);
        unpaired.extend(legs.iter().skip(matched));
    }
    for (key, legs) in &incoming {
        let matched = outgoing.get(key).map_or(0, Vec::len);
        unpaired.extend(legs.iter().skip(matched));
    }
    unpaired.sort_unstable();
    unpaired
}

/// Result of a ledger consistency check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub transaction_count: usize,
    pub balance_mismatches: Vec<BalanceMismatch>,
    pub snapshot_mismatches: Vec<SnapshotMismatch>,
    pub unpaired_transfers: Vec<TransactionId>,
    pub invalid_amounts: Vec<TransactionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMismatch {
    pub account_number: String,
    pub stored: Cents,
    pub computed: Cents,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.balance_mismatches.is_empty()
            && self.snapshot_mismatches.is_empty()
            && self.unpaired_transfers.is_empty()
            && self.invalid_amounts.is_empty()
    }
}

/// Build an integrity report from every account and every record.
///
/// Snapshots are replayed per account in timestamp order, ties broken by id.
pub fn build_integrity_report(
    accounts: &[Account],
    transactions: &[Transaction],
) -> IntegrityReport {
    let computed = compute_all_balances(transactions);

    let balance_mismatches = accounts
        .iter()
        .filter_map(|account| {
            let computed = computed.get(&account.id).copied().unwrap_or(0);
            (computed != account.balance).then(|| BalanceMismatch {
                account_number: account.account_number.clone(),
                stored: account.balance,
                computed,
            })
        })
        .collect();

    let mut by_account: HashMap<AccountId, Vec<Transaction>> = HashMap::new();
    for tx in transactions {
        by_account.entry(tx.account).or_default().push(tx.clone());
    }
    for txs in by_account.values_mut() {
        txs.sort_by_key(|tx| (tx.timestamp, tx.id));
    }
    let snapshot_mismatches = by_account
        .values()
        .filter(|txs| !txs.iter().any(|tx| tx.transaction_type.is_loan()))
        .filter_map(|txs| verify_snapshots(0, txs).err())
        .collect();

    IntegrityReport {
        account_count: accounts.len(),
        transaction_count: transactions.len(),
        balance_mismatches,
        snapshot_mismatches,
        unpaired_transfers: unpaired_transfer_legs(transactions),
        invalid_amounts: transactions
            .iter()
            .filter(|tx| tx.amount <= 0)
            .map(|tx| tx.id)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::domain::LoanStatus;

    fn record(
        id: TransactionId,
        account: AccountId,
        tt: TransactionType,
        amount: Cents,
        after: Cents,
    ) -> Transaction {
        let mut tx = Transaction::new(account, tt, amount, after, Utc::now());
        tx.id = id;
        tx
    }

    #[test]
    fn test_compute_balance_mixed() {
        let account = Uuid::new_v4();
        let txs = vec![
            record(1, account, TransactionType::Deposit, 5000, 5000),
            record(2, account, TransactionType::Withdrawal, 1500, 3500),
            record(3, account, TransactionType::Received, 500, 4000),
            record(4, account, TransactionType::Transfer, 1000, 3000),
        ];

        assert_eq!(compute_balance(account, &txs), 3000);
        assert_eq!(compute_balance(Uuid::new_v4(), &txs), 0);
    }

    #[test]
    fn test_loan_effects() {
        let account = Uuid::new_v4();
        let mut requested = Transaction::loan_request(account, 5000, 0, Utc::now());
        requested.id = 1;

        let mut approved = requested.clone();
        approved.id = 2;
        approved.loan_status = Some(LoanStatus::Approved);
        approved.loan_approve = true;

        let mut paid = approved.clone();
        paid.id = 3;
        paid.loan_status = Some(LoanStatus::Paid);
        paid.transaction_type = TransactionType::LoanPaid;

        assert_eq!(signed_effect(&requested), 0);
        assert_eq!(signed_effect(&approved), 5000);
        assert_eq!(signed_effect(&paid), 0);
        assert_eq!(count_active_loans(&[requested, approved, paid]), 1);
    }

    #[test]
    fn test_verify_snapshots() {
        let account = Uuid::new_v4();
        let good = vec![
            record(1, account, TransactionType::Deposit, 1000, 1000),
            record(2, account, TransactionType::Withdrawal, 300, 700),
        ];
        assert_eq!(verify_snapshots(0, &good), Ok(700));

        let bad = vec![
            record(1, account, TransactionType::Deposit, 1000, 1000),
            record(2, account, TransactionType::Withdrawal, 300, 800),
        ];
        let err = verify_snapshots(0, &bad).unwrap_err();
        assert_eq!(err.transaction_id, 2);
        assert_eq!(err.expected, 700);
        assert_eq!(err.recorded, 800);
    }

    #[test]
    fn test_unpaired_transfer_legs() {
        let sender = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let now = Utc::now();

        let mut out_leg = Transaction::new(sender, TransactionType::Transfer, 300, 700, now)
            .with_counterparty(recipient);
        out_leg.id = 1;
        let mut in_leg = Transaction::new(recipient, TransactionType::Received, 300, 500, now)
            .with_counterparty(sender);
        in_leg.id = 2;

        assert!(unpaired_transfer_legs(&[out_leg.clone(), in_leg]).is_empty());
        assert_eq!(unpaired_transfer_legs(&[out_leg]), vec![1]);
    }

    #[test]
    fn test_integrity_report_replays_in_time_order() {
        let mut account = Account::new("Ada", "ada@example.com").with_account_number(1);
        account.balance = 600;
        let feb = Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap();
        let jan = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();

        let mut deposit = record(1, account.id, TransactionType::Deposit, 1000, 1000);
        deposit.timestamp = feb;
        let mut withdrawal = record(2, account.id, TransactionType::Withdrawal, 400, 600);
        withdrawal.timestamp = jan;

        // Consistent in id order, but the withdrawal predates the deposit
        assert_eq!(verify_snapshots(0, &[deposit.clone(), withdrawal.clone()]), Ok(600));

        let report = build_integrity_report(&[account], &[deposit, withdrawal]);
        assert!(!report.is_ok());
        assert!(report.balance_mismatches.is_empty());
        assert_eq!(report.snapshot_mismatches[0].transaction_id, 2);
        assert_eq!(report.snapshot_mismatches[0].expected, -400);
    }

    #[test]
    fn test_integrity_report_flags_balance_drift() {
        let mut account = Account::new("Ada", "ada@example.com").with_account_number(1);
        let txs = vec![record(1, account.id, TransactionType::Deposit, 1000, 1000)];

        account.balance = 1000;
        assert!(build_integrity_report(&[account.clone()], &txs).is_ok());

        account.balance = 900;
        let report = build_integrity_report(&[account], &txs);
        assert!(!report.is_ok());
        assert_eq!(report.balance_mismatches[0].computed, 1000);
        assert_eq!(report.balance_mismatches[0].stored, 900);
    }
}
