//! Operator entry point wiring the source client, parsers, driver, warehouse
//! writer, and receivables reconciler into one binary (`tally-ingest`).

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use chrono::NaiveDate;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use ingest_driver::BackfillMode;
use ingest_driver::IngestDriver;
use receivables_reconciler::ReceivablesReconciler;
use sqlx::postgres::PgPoolOptions;
use tally_client::MasterKind;
use tally_client::TallyClient;
use tally_client::TallyClientConfig;
use tally_client::TallySource;
use warehouse_writer::PostgresWarehouseStore;
use warehouse_writer::WarehouseStore;

mod reconcile_adapter;

use reconcile_adapter::WarehouseReconcilerStore;

#[derive(Debug, Parser)]
#[command(name = "tally-ingest", about = "Tally ERP to warehouse ingestion engine")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one incremental tick: fetch since the last checkpoint, up to today.
    Run {
        #[arg(long)]
        dry_run: bool,
    },

    /// Load a historical date range without touching the incremental checkpoint.
    Backfill {
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: NaiveDate,
        #[arg(long, value_name = "YYYY-MM-DD")]
        to: NaiveDate,
        /// Fetch one day at a time instead of the whole range in one request.
        #[arg(long)]
        day_by_day: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete existing rows in a date range, then backfill the same range.
    ClearAndReload {
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: NaiveDate,
        #[arg(long, value_name = "YYYY-MM-DD")]
        to: NaiveDate,
        #[arg(long)]
        day_by_day: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch and upsert one master-data kind.
    SyncMasters {
        #[arg(long, value_enum)]
        kind: MasterKindArg,
        /// Read the export from a local XML file instead of querying the source.
        #[arg(long, value_name = "PATH", conflicts_with = "from_source")]
        from_file: Option<std::path::PathBuf>,
        /// Query the source directly (the default; explicit only to mirror the operator surface).
        #[arg(long, conflicts_with = "from_file")]
        from_source: bool,
        #[arg(long)]
        dry_run: bool,
        /// Print at most N records that would be written, without persisting anything.
        #[arg(long, value_name = "N")]
        preview: Option<usize>,
    },

    /// Recompute `bill_receivable_fact` from opening balances and loaded bill allocations.
    ReconcileBills {
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MasterKindArg {
    All,
    Ledgers,
    StockItems,
    Units,
    OpeningBills,
}

impl From<MasterKindArg> for MasterKind {
    fn from(value: MasterKindArg) -> Self {
        match value {
            MasterKindArg::All => MasterKind::AllMasters,
            MasterKindArg::Ledgers => MasterKind::Ledgers,
            MasterKindArg::StockItems => MasterKind::StockItems,
            MasterKindArg::Units => MasterKind::Units,
            MasterKindArg::OpeningBills => MasterKind::OpeningBills,
        }
    }
}

/// Connection details for the Tally source. Required by every command that
/// talks to Tally directly (everything except `sync-masters --from-file`
/// with `--preview`, which only needs a local XML file).
struct TallyConfig {
    tally_url: String,
    tally_company: String,
}

impl TallyConfig {
    fn from_env() -> Result<Self> {
        let tally_url = std::env::var("TALLY_URL").context("TALLY_URL must be set")?;
        let tally_company = std::env::var("TALLY_COMPANY").context("TALLY_COMPANY must be set")?;
        Ok(Self { tally_url, tally_company })
    }

    fn build_client(self) -> Result<TallyClient> {
        TallyClient::new(TallyClientConfig::new(self.tally_url, self.tally_company)).map_err(|err| anyhow!(err))
    }
}

fn batch_days_from_env() -> i64 {
    std::env::var("TALLY_BATCH_DAYS").ok().and_then(|raw| raw.parse().ok()).unwrap_or(15)
}

/// Stands in for a real `TallySource` when a driver is only ever going to
/// call `sync_masters_from_xml` on an already-read `--from-file` export,
/// which never reaches the source. Any call into it is a programming error.
struct UnreachableTallySource;

#[async_trait::async_trait]
impl TallySource for UnreachableTallySource {
    async fn fetch_vouchers(
        &self,
        _from_date: chrono::NaiveDate,
        _to_date: chrono::NaiveDate,
    ) -> Result<String, tally_client::TallyClientError> {
        Err(tally_client::TallyClientError::Config("no Tally source configured for a file-backed run".to_string()))
    }

    async fn fetch_masters(&self, _kind: tally_client::MasterKind) -> Result<String, tally_client::TallyClientError> {
        Err(tally_client::TallyClientError::Config("no Tally source configured for a file-backed run".to_string()))
    }
}

/// Connects to the warehouse and ensures its tables exist. Only called by
/// commands that actually read or write warehouse rows — `sync-masters
/// --preview` never touches the store, so it must not require
/// `WAREHOUSE_URL` or pay for a database round trip.
async fn connect_store() -> Result<Arc<dyn WarehouseStore>> {
    let warehouse_url = std::env::var("WAREHOUSE_URL").context("WAREHOUSE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&warehouse_url)
        .await
        .context("failed to connect to warehouse database")?;
    let store = PostgresWarehouseStore::new(pool);
    store.ensure_schema().await.map_err(|err| anyhow!(err))?;
    Ok(Arc::new(store))
}

fn build_driver(client: Arc<dyn TallySource>, store: Arc<dyn WarehouseStore>) -> IngestDriver {
    IngestDriver::new(
        client,
        store,
        ingest_driver::DriverConfig { batch_days: batch_days_from_env(), ..Default::default() },
    )
}

pub async fn run(cli: Cli) -> Result<()> {
    dotenvy::dotenv().ok();

    match cli.command {
        Command::Run { dry_run } => {
            if dry_run {
                println!("run: dry-run is not supported for the incremental command (it advances the checkpoint)");
                return Ok(());
            }
            let client = TallyConfig::from_env()?.build_client()?;
            let store = connect_store().await?;
            let driver = build_driver(Arc::new(client), store);
            let summary = driver.run_incremental().await.map_err(|err| anyhow!(err))?;
            println!(
                "incremental run complete: {} rows written, {} errored, status {}",
                summary.rows_written,
                summary.rows_errored,
                summary.status.as_str()
            );
        }
        Command::Backfill { from, to, day_by_day, dry_run } => {
            let client = TallyConfig::from_env()?.build_client()?;
            let store = connect_store().await?;
            let driver = build_driver(Arc::new(client), store);
            let mode = if day_by_day { BackfillMode::DayByDay } else { BackfillMode::Range };
            let summary = driver.run_backfill(from, to, mode, dry_run).await.map_err(|err| anyhow!(err))?;
            println!(
                "backfill {from} to {to} complete: {} rows written, {} errored, status {}",
                summary.rows_written,
                summary.rows_errored,
                summary.status.as_str()
            );
        }
        Command::ClearAndReload { from, to, day_by_day, dry_run } => {
            let client = TallyConfig::from_env()?.build_client()?;
            let store = connect_store().await?;
            let driver = build_driver(Arc::new(client), store);
            let mode = if day_by_day { BackfillMode::DayByDay } else { BackfillMode::Range };
            let summary = driver.clear_and_reload(from, to, mode, dry_run).await.map_err(|err| anyhow!(err))?;
            println!(
                "clear-and-reload {from} to {to} complete: {} rows written, {} errored, status {}",
                summary.rows_written,
                summary.rows_errored,
                summary.status.as_str()
            );
        }
        Command::SyncMasters { kind, from_file, from_source: _, dry_run, preview } => {
            let kind = kind.into();

            // A file-backed preview needs neither a Tally connection nor a
            // warehouse connection: it is pure local inspection.
            if let Some(limit) = preview {
                let xml = match &from_file {
                    Some(path) => tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("failed to read master export from {}", path.display()))?,
                    None => {
                        let client = TallyConfig::from_env()?.build_client()?;
                        client.fetch_masters(kind).await.map_err(|err| anyhow!(err))?
                    }
                };
                let lines = ingest_driver::IngestDriver::preview_masters(kind, &xml, limit)
                    .map_err(|err| anyhow!(err))?;
                for line in &lines {
                    println!("{line}");
                }
                println!("preview complete: {} record(s) shown, nothing persisted", lines.len());
                return Ok(());
            }

            let (xml, source): (String, Arc<dyn TallySource>) = match from_file {
                Some(path) => {
                    let xml = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("failed to read master export from {}", path.display()))?;
                    (xml, Arc::new(UnreachableTallySource))
                }
                None => {
                    let client = TallyConfig::from_env()?.build_client()?;
                    let xml = client.fetch_masters(kind).await.map_err(|err| anyhow!(err))?;
                    (xml, Arc::new(client))
                }
            };

            let store = connect_store().await?;
            let driver = build_driver(source, store);
            let summary = driver.sync_masters_from_xml(kind, &xml, dry_run).await.map_err(|err| anyhow!(err))?;
            println!("master sync complete: {} rows written", summary.rows_written);
        }
        Command::ReconcileBills { dry_run } => {
            let store = connect_store().await?;
            let reconciler_store = Arc::new(WarehouseReconcilerStore::new(store, dry_run));
            let reconciler = ReceivablesReconciler::new(reconciler_store);
            let today = chrono::Utc::now().date_naive();
            let facts = reconciler.reconcile(today).await.map_err(|err| anyhow!(err))?;
            println!(
                "bill reconciliation complete: {} fact rows{}",
                facts.len(),
                if dry_run { " (dry run, not persisted)" } else { "" }
            );
        }
    }

    Ok(())
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
