use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;

use crate::application::{LedgerService, ReportQuery, RequestContext, TransactionReport};
use crate::domain::AccountId;

/// Writes transaction reports in machine-readable formats.
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export an account's report as CSV, one row per transaction.
    pub async fn export_report_csv<W: Write>(
        &self,
        ctx: &RequestContext,
        query: ReportQuery,
        writer: W,
    ) -> Result<usize> {
        let report = self.service.transaction_report(ctx, query).await?;
        let counterparties = self.counterparty_numbers(&report).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "timestamp",
            "type",
            "amount_cents",
            "balance_after_cents",
            "loan_status",
            "counterparty",
        ])?;

        for tx in &report.transactions {
            csv_writer.write_record([
                tx.id.to_string(),
                tx.timestamp.to_rfc3339(),
                tx.transaction_type.as_str().to_string(),
                tx.amount.to_string(),
                tx.balance_after_transaction.to_string(),
                tx.loan_status
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                tx.counterparty
                    .and_then(|id| counterparties.get(&id).cloned())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(report.transactions.len())
    }

    /// Export an account's report, summary included, as pretty JSON.
    pub async fn export_report_json<W: Write>(
        &self,
        ctx: &RequestContext,
        query: ReportQuery,
        mut writer: W,
    ) -> Result<usize> {
        let report = self.service.transaction_report(ctx, query).await?;
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writeln!(writer)?;
        Ok(report.transactions.len())
    }

    async fn counterparty_numbers(
        &self,
        report: &TransactionReport,
    ) -> Result<HashMap<AccountId, String>> {
        let mut numbers = HashMap::new();
        for id in report.transactions.iter().filter_map(|tx| tx.counterparty) {
            if !numbers.contains_key(&id) {
                let account = self.service.get_account(id).await?;
                numbers.insert(id, account.account_number);
            }
        }
        Ok(numbers)
    }
}
