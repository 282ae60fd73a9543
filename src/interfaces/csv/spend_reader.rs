use crate::application::consumption::SpendRequest;
use crate::domain::account::AccountId;
use crate::domain::amount::Amount;
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct SpendRow {
    account: AccountId,
    amount: Amount,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    key: Option<String>,
}

impl From<SpendRow> for SpendRequest {
    fn from(row: SpendRow) -> Self {
        SpendRequest {
            account_id: row.account,
            amount: row.amount,
            subject_ref: row.subject.filter(|s| !s.is_empty()),
            idempotency_key: row.key.filter(|k| !k.is_empty()),
        }
    }
}

/// Reads spend requests from a CSV source with an
/// `account,amount,subject,key` header; the last two columns are optional.
pub struct SpendReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SpendReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes one request per row. A bad row yields an error
    /// and does not stop the stream.
    pub fn requests(self) -> impl Iterator<Item = Result<SpendRequest>> {
        self.reader
            .into_deserialize::<SpendRow>()
            .map(|row| row.map(SpendRequest::from).map_err(LedgerError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = "account, amount, subject, key\nuser_1, 300, asset_7, req-1\nuser_2, 0.5";
        let results: Vec<Result<SpendRequest>> = SpendReader::new(data.as_bytes()).requests().collect();

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.account_id.as_str(), "user_1");
        assert_eq!(first.amount.value(), dec!(300));
        assert_eq!(first.subject_ref.as_deref(), Some("asset_7"));
        assert_eq!(first.idempotency_key.as_deref(), Some("req-1"));

        let second = results[1].as_ref().unwrap();
        assert_eq!(second.subject_ref, None);
        assert_eq!(second.idempotency_key, None);
    }

    #[test]
    fn test_reader_bad_rows_do_not_stop_stream() {
        let data = "account, amount\nuser_1, -5\nuser_1, lots\n, 5\nuser_1, 5";
        let results: Vec<Result<SpendRequest>> = SpendReader::new(data.as_bytes()).requests().collect();

        assert_eq!(results.len(), 4);
        assert!(results[..3].iter().all(|r| r.is_err()));
        assert!(results[3].is_ok());
    }
}
