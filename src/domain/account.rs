use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identity of an end user's credit account.
///
/// Any non-empty string without surrounding whitespace or NUL bytes; the NUL
/// byte is reserved as a key separator by the persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn new(value: impl Into<String>) -> Result<Self, LedgerError> {
        let value = value.into();
        if value.is_empty() {
            return Err(LedgerError::Validation(
                "Account id must not be empty".to_string(),
            ));
        }
        if value.trim() != value || value.contains('\0') {
            return Err(LedgerError::Validation(format!(
                "Account id {value:?} contains forbidden characters"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl FromStr for AccountId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One account per end user, created lazily on first purchase.
///
/// The ledger never deletes accounts. Its balance is not stored here: it is
/// always derived from the entry log.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub account_id: AccountId,
    /// Customer identity at the payment provider, set on the first purchase
    /// that carries one and never overwritten afterwards.
    pub external_payment_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            external_payment_customer_id: None,
            created_at: Utc::now(),
        }
    }

    /// Records the provider customer id if none is known yet.
    ///
    /// Returns `true` when the account changed.
    pub fn link_customer(&mut self, customer_id: &str) -> bool {
        if self.external_payment_customer_id.is_some() {
            return false;
        }
        self.external_payment_customer_id = Some(customer_id.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_validation() {
        assert!(AccountId::new("user_1").is_ok());
        assert!(matches!(AccountId::new(""), Err(LedgerError::Validation(_))));
        assert!(AccountId::new(" user_1").is_err());
        assert!(AccountId::new("user\01").is_err());
    }

    #[test]
    fn test_account_id_deserialization_validates() {
        let id: AccountId = serde_json::from_str("\"user_1\"").unwrap();
        assert_eq!(id.as_str(), "user_1");
        assert!(serde_json::from_str::<AccountId>("\"\"").is_err());
    }

    #[test]
    fn test_link_customer_only_once() {
        let mut account = Account::new(AccountId::new("user_1").unwrap());
        assert!(account.link_customer("cus_A"));
        assert!(!account.link_customer("cus_B"));
        assert_eq!(account.external_payment_customer_id.as_deref(), Some("cus_A"));
    }
}
