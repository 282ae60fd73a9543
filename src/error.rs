use thiserror::Error;

/// Failures surfaced by the ledger core.
///
/// Domain rejections (insufficient balance, duplicate refunds, unknown refund
/// targets) are not errors: they are reported through the outcome types of the
/// application layer so callers can branch on them without string matching.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Spend on account {account} gave up after {attempts} conflicting attempts")]
    Contention { account: String, attempts: u32 },
    #[error("Corrupted ledger data: {0}")]
    Corrupted(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl LedgerError {
    /// Whether retrying the same request may succeed.
    ///
    /// A transient failure never means the write did not happen: callers must
    /// treat the request as possibly committed and rely on idempotency keys
    /// when they retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::StorageUnavailable(_) | LedgerError::Contention { .. }
        )
    }

    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::StorageUnavailable(Box::new(std::io::Error::other(message.into())))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        LedgerError::StorageUnavailable(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Failures of webhook ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The signature did not match the raw payload; nothing was parsed or written.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
    #[error(transparent)]
    Storage(#[from] LedgerError),
}

impl IngestError {
    /// Rejections are final for the delivery; anything else may be redelivered.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidSignature(_) | IngestError::MalformedEvent(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LedgerError::storage("disk gone").is_transient());
        assert!(
            LedgerError::Contention {
                account: "u1".to_string(),
                attempts: 3
            }
            .is_transient()
        );
        assert!(!LedgerError::Validation("bad".to_string()).is_transient());
        assert!(!LedgerError::Corrupted("bad".to_string()).is_transient());
    }

    #[test]
    fn test_ingest_rejections() {
        assert!(IngestError::InvalidSignature("mismatch".to_string()).is_rejection());
        assert!(IngestError::MalformedEvent("no userId".to_string()).is_rejection());
        assert!(!IngestError::from(LedgerError::storage("down")).is_rejection());
    }
}
