use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use roids_ledger::application::consumption::{SpendOutcome, SpendRequest};
use roids_ledger::application::ledger::Ledger;
use roids_ledger::application::refund::RefundOutcome;
use roids_ledger::application::webhook::Ack;
use roids_ledger::config::{
    DEFAULT_SIGNATURE_TOLERANCE_SECS, DEFAULT_SPEND_MAX_ATTEMPTS, LedgerSettings, WebhookSettings,
};
use roids_ledger::domain::account::AccountId;
use roids_ledger::domain::amount::Amount;
use roids_ledger::domain::ports::{AccountStoreRef, LedgerStoreRef};
use roids_ledger::infrastructure::in_memory::{InMemoryAccountStore, InMemoryLedgerStore};
#[cfg(feature = "storage-rocksdb")]
use roids_ledger::infrastructure::rocksdb::RocksDBStore;
use roids_ledger::interfaces::csv::history_writer::HistoryWriter;
use roids_ledger::interfaces::csv::spend_reader::SpendReader;
use roids_ledger::interfaces::http;
use roids_ledger::interfaces::stripe::StripeEventDecoder;
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "LEDGER_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Optimistic attempts a single spend may make under contention.
    #[arg(long, env = "LEDGER_SPEND_MAX_RETRIES", default_value_t = DEFAULT_SPEND_MAX_ATTEMPTS, global = true)]
    spend_max_retries: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct WebhookArgs {
    /// Signing secret of the webhook endpoint.
    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: String,

    /// Maximum age of a signed delivery in seconds; 0 disables the check.
    #[arg(long, env = "STRIPE_SIGNATURE_TOLERANCE_SECS", default_value_t = DEFAULT_SIGNATURE_TOLERANCE_SECS)]
    signature_tolerance_secs: u64,
}

impl WebhookArgs {
    fn settings(&self) -> Result<WebhookSettings> {
        WebhookSettings::new(self.webhook_secret.clone(), self.signature_tolerance_secs)
            .into_diagnostic()
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook HTTP server.
    Serve {
        #[arg(long, env = "LEDGER_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
        #[command(flatten)]
        webhook: WebhookArgs,
    },
    /// Feed one captured webhook delivery.
    Ingest {
        payload: PathBuf,
        /// Value of the Stripe-Signature header the delivery arrived with.
        #[arg(long)]
        signature: Option<String>,
        #[command(flatten)]
        webhook: WebhookArgs,
    },
    /// Print an account's balance.
    Balance { account: AccountId },
    /// Print an account's entries, most recent first.
    History {
        account: AccountId,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Debit credits from an account.
    Spend {
        account: AccountId,
        amount: Amount,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Reverse the purchase anchored at a payment reference.
    Refund { purchase_ref: String },
    /// Apply spends from a CSV file (account,amount,subject,key).
    Import { input: PathBuf },
    /// Reconcile cached balances with the entry log.
    Audit {
        #[arg(long)]
        repair: bool,
    },
}

fn open_stores(db_path: Option<PathBuf>) -> Result<(LedgerStoreRef, AccountStoreRef)> {
    if let Some(db_path) = db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            let ledger: LedgerStoreRef = Arc::new(store.clone());
            let accounts: AccountStoreRef = Arc::new(store);
            return Ok((ledger, accounts));
        }

        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = db_path;
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }
    let ledger: LedgerStoreRef = Arc::new(InMemoryLedgerStore::new());
    let accounts: AccountStoreRef = Arc::new(InMemoryAccountStore::new());
    Ok((ledger, accounts))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    roids_ledger::telemetry::init();
    let cli = Cli::parse();

    let (store, accounts) = open_stores(cli.db_path)?;
    let settings = LedgerSettings {
        spend_max_attempts: cli.spend_max_retries,
        ..Default::default()
    };
    let ledger = Ledger::new(store, accounts, settings).into_diagnostic()?;

    let stdout = io::stdout();
    match cli.command {
        Command::Serve { bind, webhook } => {
            let decoder = StripeEventDecoder::new(&webhook.settings()?);
            let ingestor = Arc::new(ledger.ingestor(Arc::new(decoder)));
            http::serve(bind, http::router(ingestor))
                .await
                .into_diagnostic()?;
        }
        Command::Ingest {
            payload,
            signature,
            webhook,
        } => {
            let decoder = StripeEventDecoder::new(&webhook.settings()?);
            let body = std::fs::read(payload).into_diagnostic()?;
            let ack = ledger
                .ingestor(Arc::new(decoder))
                .ingest(&body, signature.as_deref())
                .await
                .into_diagnostic()?;
            match &ack {
                Ack::Applied(entry) | Ack::AlreadyApplied(entry) => {
                    println!("{},{}", ack.label(), entry.entry_id)
                }
                Ack::Ignored(reason) => println!("{},{}", ack.label(), reason),
            }
        }
        Command::Balance { account } => {
            let balance = ledger.get_balance(&account).await.into_diagnostic()?;
            HistoryWriter::new(stdout.lock())
                .write_balances([(&account, balance)])
                .into_diagnostic()?;
        }
        Command::History {
            account,
            limit,
            offset,
        } => {
            let page = ledger
                .get_history(&account, limit, offset)
                .await
                .into_diagnostic()?;
            HistoryWriter::new(stdout.lock())
                .write_entries(&page.entries)
                .into_diagnostic()?;
        }
        Command::Spend {
            account,
            amount,
            subject,
            idempotency_key,
        } => {
            let request = SpendRequest {
                account_id: account,
                amount,
                subject_ref: subject,
                idempotency_key,
            };
            match ledger.spend(request).await.into_diagnostic()? {
                SpendOutcome::Committed(entry) => println!("committed,{}", entry.entry_id),
                SpendOutcome::Replayed(entry) => println!("replayed,{}", entry.entry_id),
                SpendOutcome::Insufficient { balance, requested } => {
                    return Err(miette!(
                        "Insufficient balance: {balance} available, {requested} requested"
                    ));
                }
            }
        }
        Command::Refund { purchase_ref } => match ledger.refund(&purchase_ref).await.into_diagnostic()? {
            RefundOutcome::Committed(entry) => println!("refunded,{}", entry.entry_id),
            RefundOutcome::AlreadyRefunded(entry) => println!("already_refunded,{}", entry.entry_id),
            RefundOutcome::NotFound => {
                return Err(miette!("No purchase recorded for {purchase_ref}"));
            }
        },
        Command::Import { input } => {
            let file = File::open(input).into_diagnostic()?;
            let mut touched = BTreeSet::new();
            for request in SpendReader::new(file).requests() {
                match request {
                    Ok(request) => {
                        let account = request.account_id.clone();
                        match ledger.spend(request).await {
                            Ok(SpendOutcome::Insufficient { balance, requested }) => eprintln!(
                                "Insufficient balance on {account}: {balance} available, {requested} requested"
                            ),
                            Ok(_) => {}
                            Err(e) => eprintln!("Error processing spend: {}", e),
                        }
                        touched.insert(account);
                    }
                    Err(e) => eprintln!("Error reading spend: {}", e),
                }
            }

            let mut balances = Vec::with_capacity(touched.len());
            for account in &touched {
                balances.push((account, ledger.get_balance(account).await.into_diagnostic()?));
            }
            HistoryWriter::new(stdout.lock())
                .write_balances(balances)
                .into_diagnostic()?;
        }
        Command::Audit { repair } => {
            let report = ledger.audit(repair).await.into_diagnostic()?;
            for finding in &report.findings {
                println!("{finding}");
            }
            println!(
                "accounts={},entries={},findings={}",
                report.accounts,
                report.entries,
                report.findings.len()
            );
            if !report.is_clean() && !repair {
                return Err(miette!("Audit found {} inconsistencies", report.findings.len()));
            }
        }
    }

    Ok(())
}
