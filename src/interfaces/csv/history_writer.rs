use crate::domain::account::AccountId;
use crate::domain::amount::Balance;
use crate::domain::entry::LedgerEntry;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct EntryRow<'a> {
    entry_id: String,
    account: &'a str,
    kind: String,
    amount: Balance,
    external_ref: Option<&'a str>,
    payment_ref: Option<&'a str>,
    subject_ref: Option<&'a str>,
    reverses: Option<String>,
    created_at: String,
}

impl<'a> From<&'a LedgerEntry> for EntryRow<'a> {
    fn from(entry: &'a LedgerEntry) -> Self {
        Self {
            entry_id: entry.entry_id.to_string(),
            account: entry.account_id.as_str(),
            kind: entry.kind.to_string(),
            amount: entry.signed_amount,
            external_ref: entry.external_ref.as_deref(),
            payment_ref: entry.payment_ref.as_deref(),
            subject_ref: entry.subject_ref.as_deref(),
            reverses: entry.reverses.map(|id| id.to_string()),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct BalanceRow<'a> {
    account: &'a str,
    balance: Balance,
}

/// Writes ledger output as CSV to any `Write` sink.
pub struct HistoryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> HistoryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_entries<'a>(&mut self, entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Result<()> {
        let mut wrote_any = false;
        for entry in entries {
            self.writer.serialize(EntryRow::from(entry))?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "entry_id",
                "account",
                "kind",
                "amount",
                "external_ref",
                "payment_ref",
                "subject_ref",
                "reverses",
                "created_at",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_balances<'a>(
        &mut self,
        balances: impl IntoIterator<Item = (&'a AccountId, Balance)>,
    ) -> Result<()> {
        let mut wrote_any = false;
        for (account, balance) in balances {
            self.writer.serialize(BalanceRow {
                account: account.as_str(),
                balance,
            })?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record(["account", "balance"])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
