//! Runtime settings of the ledger core.
//!
//! The binary fills these from command-line flags and environment variables
//! (see `main.rs`); library users construct them directly.

use crate::error::{LedgerError, Result};
use std::time::Duration;

pub const DEFAULT_SPEND_MAX_ATTEMPTS: u32 = 64;
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Optimistic attempts a single `spend` may make before reporting contention.
    pub spend_max_attempts: u32,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            spend_max_attempts: DEFAULT_SPEND_MAX_ATTEMPTS,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl LedgerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.spend_max_attempts == 0 {
            return Err(LedgerError::Validation(
                "spend_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(LedgerError::Validation(format!(
                "default_page_size must be within 1..={}",
                self.max_page_size
            )));
        }
        Ok(())
    }

    /// The page size to serve for a requested `limit`.
    pub fn page_size(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

/// Shared secret and replay window for provider webhooks.
#[derive(Clone)]
pub struct WebhookSettings {
    pub secret: String,
    /// Maximum age of a signed delivery; `None` disables the check.
    pub tolerance: Option<Duration>,
}

impl WebhookSettings {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Webhook secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            secret,
            tolerance: (tolerance_secs > 0).then(|| Duration::from_secs(tolerance_secs)),
        })
    }
}

impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}
