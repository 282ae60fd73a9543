use crate::domain::account::AccountId;
use crate::domain::amount::Balance;
use crate::domain::entry::{EntryId, EntryKind, fold_balance};
use crate::domain::ports::LedgerStoreRef;
use crate::error::Result;
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

const AUDIT_PAGE: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    /// The materialized read-path balance differs from the fold of the log.
    BalanceDrift {
        account: AccountId,
        folded: Balance,
        cached: Option<Balance>,
    },
    /// A refund whose `reverses` does not name a purchase of the same account.
    OrphanRefund { account: AccountId, refund: EntryId },
    /// A purchase reversed more than once.
    RepeatedRefund { account: AccountId, purchase: EntryId },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::BalanceDrift {
                account,
                folded,
                cached,
            } => match cached {
                Some(cached) => write!(f, "{account}: cached balance {cached} != folded {folded}"),
                None => write!(f, "{account}: no cached balance, folded {folded}"),
            },
            Finding::OrphanRefund { account, refund } => {
                write!(f, "{account}: refund {refund} reverses no purchase")
            }
            Finding::RepeatedRefund { account, purchase } => {
                write!(f, "{account}: purchase {purchase} refunded more than once")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditReport {
    pub accounts: usize,
    pub entries: usize,
    pub findings: Vec<Finding>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Reconciles the read-path balances with the entry log.
pub struct Auditor {
    store: LedgerStoreRef,
}

impl Auditor {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    pub async fn audit(&self) -> Result<AuditReport> {
        let mut report = AuditReport::default();
        for account in self.store.account_ids().await? {
            self.audit_account(&account, &mut report).await?;
            report.accounts += 1;
        }
        if report.is_clean() {
            info!(accounts = report.accounts, entries = report.entries, "audit clean");
        } else {
            warn!(findings = report.findings.len(), "audit found inconsistencies");
        }
        Ok(report)
    }

    /// Rewrites drifted read-path balances from the log. Returns the audit
    /// taken before repairing.
    ///
    /// Each drifted account is refolded by the store at write time, so
    /// entries appended after the audit are not lost from the cache.
    pub async fn repair(&self) -> Result<AuditReport> {
        let report = self.audit().await?;
        for finding in &report.findings {
            if let Finding::BalanceDrift { account, .. } = finding {
                let balance = self.store.reconcile_cached_balance(account).await?;
                info!(%account, %balance, "cached balance repaired");
            }
        }
        Ok(report)
    }

    async fn audit_account(&self, account: &AccountId, report: &mut AuditReport) -> Result<()> {
        let mut entries = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.store.list_entries(account, AUDIT_PAGE, offset).await?;
            let done = page.len() < AUDIT_PAGE;
            offset += page.len();
            entries.extend(page);
            if done {
                break;
            }
        }
        report.entries += entries.len();

        let folded = fold_balance(&entries);
        let cached = self.store.cached_balance(account).await?;
        if cached != Some(folded) {
            report.findings.push(Finding::BalanceDrift {
                account: account.clone(),
                folded,
                cached,
            });
        }

        let purchases: HashSet<EntryId> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Purchase)
            .map(|e| e.entry_id)
            .collect();
        let mut reversed = HashSet::new();
        for refund in entries.iter().filter(|e| e.kind == EntryKind::Refund) {
            match refund.reverses {
                Some(purchase) if purchases.contains(&purchase) => {
                    if !reversed.insert(purchase) {
                        report.findings.push(Finding::RepeatedRefund {
                            account: account.clone(),
                            purchase,
                        });
                    }
                }
                _ => report.findings.push(Finding::OrphanRefund {
                    account: account.clone(),
                    refund: refund.entry_id,
                }),
            }
        }
        Ok(())
    }
}
