#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Drives the source client -> parsers -> warehouse writer pipeline for a
//! requested date range: a single incremental tick, a historical backfill,
//! or a destructive clear-and-reload.

use std::sync::Arc;
use std::time::Duration;

use chrono::Datelike;
use chrono::Days;
use chrono::NaiveDate;
use chrono::Utc;
use tally_client::MasterKind;
use tally_client::TallyClientError;
use tally_client::TallySource;
use tally_master_parser::MasterParseError;
use tally_voucher_parser::BillType;
use tally_voucher_parser::VoucherParseError;
use tally_voucher_parser::parse_vouchers;
use thiserror::Error;
use warehouse_writer::BillAllocationRecord;
use warehouse_writer::CustomerUpsert;
use warehouse_writer::InvoiceHeader;
use warehouse_writer::InvoiceLineInput;
use warehouse_writer::ItemUpsert;
use warehouse_writer::LedgerGroupUpsert;
use warehouse_writer::OpeningBillUpsert;
use warehouse_writer::Receipt;
use warehouse_writer::RunLogEntry;
use warehouse_writer::RunStatus;
use warehouse_writer::StockGroupUpsert;
use warehouse_writer::UomUpsert;
use warehouse_writer::WarehouseError;
use warehouse_writer::WarehouseStore;

const INVOICE_STREAM: &str = "invoices";

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Source(#[from] TallyClientError),
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error("master parse error: {0}")]
    MasterParse(#[from] MasterParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillMode {
    Range,
    DayByDay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_written: i64,
    pub rows_errored: i64,
    pub status: RunStatus,
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Day-by-day backfills batch every this many days, pausing briefly
    /// between batches.
    pub batch_days: i64,
    /// Fallback start month (1-12) for the incremental run's default
    /// checkpoint when none has been recorded yet.
    pub fiscal_year_start_month: u32,
    /// Pause between batches; kept at or below 1s in production. Tests set
    /// this to `Duration::ZERO` to run instantly.
    pub batch_pause: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            batch_days: 15,
            fiscal_year_start_month: 4,
            batch_pause: Duration::from_millis(500),
        }
    }
}

/// Injected clock so the incremental run's default-checkpoint computation
/// and "today" comparisons are deterministically testable.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

pub struct IngestDriver {
    source: Arc<dyn TallySource>,
    store: Arc<dyn WarehouseStore>,
    clock: Arc<dyn Clock>,
    config: DriverConfig,
}

impl IngestDriver {
    pub fn new(source: Arc<dyn TallySource>, store: Arc<dyn WarehouseStore>, config: DriverConfig) -> Self {
        Self { source, store, clock: Arc::new(SystemClock), config }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Reads the `"invoices"` checkpoint, defaulting to April 1 of the
    /// current fiscal year if absent, and fetches `[checkpoint - 1 day,
    /// today]`. The 1-day overlap absorbs late edits to yesterday's
    /// vouchers. On success the checkpoint advances to `today`.
    pub async fn run_incremental(&self) -> Result<RunSummary, DriverError> {
        let today = self.clock.today();
        let checkpoint = self.store.read_checkpoint(INVOICE_STREAM).await?;
        let from_date = match checkpoint {
            Some(checkpoint) => checkpoint.pred_opt().unwrap_or(checkpoint),
            None => fiscal_year_start(today, self.config.fiscal_year_start_month),
        };

        let (written, errored) = self.fetch_and_write_window(from_date, today, false).await?;
        self.record_run(written, errored).await?;
        self.store.write_checkpoint(INVOICE_STREAM, today).await?;

        Ok(RunSummary { rows_written: written, rows_errored: errored, status: run_status(written, errored) })
    }

    /// Historical load over `[from_date, to_date]`. Does not touch the
    /// incremental checkpoint — this is always a manual, explicitly-ranged
    /// operation.
    pub async fn run_backfill(
        &self,
        from_date: NaiveDate,
        to_date: NaiveDate,
        mode: BackfillMode,
        dry_run: bool,
    ) -> Result<RunSummary, DriverError> {
        let (written, errored) = match mode {
            BackfillMode::Range => self.fetch_and_write_window(from_date, to_date, dry_run).await?,
            BackfillMode::DayByDay => self.run_day_by_day(from_date, to_date, dry_run).await?,
        };
        self.record_run(written, errored).await?;
        Ok(RunSummary { rows_written: written, rows_errored: errored, status: run_status(written, errored) })
    }

    /// Deletes existing rows in `[from_date, to_date]`, then backfills the
    /// same window. Like `run_backfill`, never advances the checkpoint.
    pub async fn clear_and_reload(
        &self,
        from_date: NaiveDate,
        to_date: NaiveDate,
        mode: BackfillMode,
        dry_run: bool,
    ) -> Result<RunSummary, DriverError> {
        if !dry_run {
            let deleted = self.store.delete_invoices_in_range(from_date, to_date).await?;
            tracing::info!(deleted, %from_date, %to_date, "cleared existing rows before reload");
        }
        self.run_backfill(from_date, to_date, mode, dry_run).await
    }

    async fn run_day_by_day(
        &self,
        from_date: NaiveDate,
        to_date: NaiveDate,
        dry_run: bool,
    ) -> Result<(i64, i64), DriverError> {
        let mut written = 0i64;
        let mut errored = 0i64;
        let mut current = from_date;
        let mut days_in_batch = 0i64;

        while current <= to_date {
            let (day_written, day_errored) = self.fetch_and_write_window(current, current, dry_run).await?;
            written += day_written;
            errored += day_errored;
            days_in_batch += 1;

            let Some(next) = current.checked_add_days(Days::new(1)) else {
                break;
            };
            current = next;

            if days_in_batch >= self.config.batch_days && current <= to_date {
                tracing::info!(%current, "backfill batch boundary, pausing");
                tokio::time::sleep(self.config.batch_pause).await;
                days_in_batch = 0;
            }
        }

        Ok((written, errored))
    }

    /// Fetches one window, parses it, filters by date (defense-in-depth
    /// against source variants that ignore `SVFROMDATE`/`SVTODATE`), and
    /// writes each voucher in its own transaction. A bad voucher is
    /// skipped with a warning, not fatal to the window.
    async fn fetch_and_write_window(
        &self,
        from_date: NaiveDate,
        to_date: NaiveDate,
        dry_run: bool,
    ) -> Result<(i64, i64), DriverError> {
        let xml = self.source.fetch_vouchers(from_date, to_date).await?;

        let mut written = 0i64;
        let mut errored = 0i64;

        for parsed in parse_vouchers(&xml) {
            let voucher = match parsed {
                Ok(voucher) => voucher,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unparseable voucher");
                    errored += 1;
                    continue;
                }
            };

            if voucher.date < from_date || voucher.date > to_date {
                tracing::debug!(date = %voucher.date, "voucher outside requested window, dropping");
                continue;
            }

            if dry_run {
                written += 1;
                continue;
            }

            let (header, customer, lines, allocations) = project_voucher(&voucher);
            match self.store.write_voucher(header, customer, lines, allocations).await {
                Ok(()) => written += 1,
                Err(err) => {
                    tracing::warn!(error = %err, voucher_key = %voucher.voucher_key, "voucher write failed");
                    errored += 1;
                    continue;
                }
            }

            if voucher.voucher_type.eq_ignore_ascii_case("receipt") {
                let receipt = Receipt {
                    receipt_key: voucher.voucher_key.clone(),
                    date: voucher.date,
                    customer_id: voucher.party.clone(),
                    amount_minor: voucher.total_minor,
                };
                if let Err(err) = self.store.upsert_receipt(receipt).await {
                    tracing::warn!(error = %err, voucher_key = %voucher.voucher_key, "receipt projection failed");
                }
            }
        }

        Ok((written, errored))
    }

    async fn record_run(&self, written: i64, errored: i64) -> Result<(), DriverError> {
        self.store
            .append_run_log(RunLogEntry {
                stream_name: INVOICE_STREAM.to_string(),
                run_at: Utc::now(),
                rows: written,
                status: run_status(written, errored),
                error: if errored > 0 { Some(format!("{errored} voucher(s) failed")) } else { None },
            })
            .await?;
        Ok(())
    }

    /// Fetches and applies one master kind. `AllMasters` applies every
    /// dimension; the narrower kinds apply only the slice of the parse
    /// result relevant to them (e.g. `Units` only touches `uom_dim`).
    pub async fn sync_masters(&self, kind: MasterKind, dry_run: bool) -> Result<RunSummary, DriverError> {
        let xml = self.source.fetch_masters(kind).await?;
        self.sync_masters_from_xml(kind, &xml, dry_run).await
    }

    pub async fn sync_masters_from_xml(
        &self,
        kind: MasterKind,
        xml: &str,
        dry_run: bool,
    ) -> Result<RunSummary, DriverError> {
        let mut written = 0i64;

        if matches!(kind, MasterKind::AllMasters | MasterKind::Ledgers | MasterKind::OpeningBills) {
            written += self.apply_ledger_master(xml, dry_run).await?;
        }
        if matches!(kind, MasterKind::AllMasters | MasterKind::StockItems) {
            written += self.apply_stock_group_master(xml, dry_run).await?;
            written += self.apply_item_master(xml, dry_run).await?;
        }
        if matches!(kind, MasterKind::AllMasters | MasterKind::Units) {
            written += self.apply_unit_master(xml, dry_run).await?;
        }

        self.store
            .append_run_log(RunLogEntry {
                stream_name: "masters".to_string(),
                run_at: Utc::now(),
                rows: written,
                status: RunStatus::Ok,
                error: None,
            })
            .await?;

        Ok(RunSummary { rows_written: written, rows_errored: 0, status: RunStatus::Ok })
    }

    /// Renders up to `limit` human-readable lines describing what a master
    /// sync would write, without touching the store. Used by the CLI's
    /// `--preview N` flag so an operator can sanity-check a source export
    /// (or a `--from-file` snapshot) before committing it.
    pub fn preview_masters(kind: MasterKind, xml: &str, limit: usize) -> Result<Vec<String>, DriverError> {
        let mut lines = Vec::new();

        if matches!(kind, MasterKind::AllMasters | MasterKind::Ledgers | MasterKind::OpeningBills) {
            let parsed = tally_master_parser::parse_ledger_groups(xml)?;
            for group in &parsed.groups {
                lines.push(format!("ledger_group: {} (parent={:?})", group.name, group.parent_name));
            }
            for ledger in &parsed.ledgers {
                lines.push(format!("customer: {} (group={:?})", ledger.name, ledger.parent_group));
            }
            for opening in &parsed.opening_bills {
                lines.push(format!(
                    "opening_bill: {}/{} = {}",
                    opening.ledger, opening.ref_name, opening.opening_balance_minor
                ));
            }
        }
        if matches!(kind, MasterKind::AllMasters | MasterKind::StockItems) {
            for group in tally_master_parser::parse_stock_groups(xml)? {
                lines.push(format!("stock_group: {} (parent={:?})", group.name, group.parent_name));
            }
            for item in tally_master_parser::parse_items(xml)? {
                lines.push(format!("item: {} (hsn={:?})", item.name, item.hsn_code));
            }
        }
        if matches!(kind, MasterKind::AllMasters | MasterKind::Units) {
            for unit in tally_master_parser::parse_units(xml)? {
                lines.push(format!("uom: {}", unit.name));
            }
        }

        lines.truncate(limit);
        Ok(lines)
    }

    async fn apply_ledger_master(&self, xml: &str, dry_run: bool) -> Result<i64, DriverError> {
        let parsed = tally_master_parser::parse_ledger_groups(xml)?;
        if dry_run {
            return Ok((parsed.groups.len() + parsed.ledgers.len() + parsed.opening_bills.len()) as i64);
        }

        let mut written = 0i64;
        for group in parsed.groups {
            self.store
                .upsert_ledger_group(LedgerGroupUpsert {
                    guid: group.guid,
                    name: group.name,
                    parent_name: group.parent_name,
                    alter_id: group.alter_id,
                })
                .await?;
            written += 1;
        }
        for ledger in parsed.ledgers {
            self.store
                .upsert_customer(CustomerUpsert {
                    customer_id: ledger.name.clone(),
                    name: ledger.name,
                    gstin: None,
                    pincode: None,
                    city: None,
                    ledger_group_name: ledger.parent_group,
                })
                .await?;
            written += 1;
        }
        for opening in parsed.opening_bills {
            self.store
                .upsert_opening_bill(OpeningBillUpsert {
                    ledger: opening.ledger,
                    ref_name: opening.ref_name,
                    bill_date: opening.bill_date,
                    opening_balance_minor: opening.opening_balance_minor,
                    credit_period_days: opening.credit_period_days,
                    is_advance: opening.is_advance,
                })
                .await?;
            written += 1;
        }
        Ok(written)
    }

    async fn apply_stock_group_master(&self, xml: &str, dry_run: bool) -> Result<i64, DriverError> {
        let groups = tally_master_parser::parse_stock_groups(xml)?;
        if dry_run {
            return Ok(groups.len() as i64);
        }
        let mut written = 0i64;
        for group in groups {
            self.store
                .upsert_stock_group(StockGroupUpsert { guid: group.guid, name: group.name, parent_name: group.parent_name })
                .await?;
            written += 1;
        }
        Ok(written)
    }

    async fn apply_item_master(&self, xml: &str, dry_run: bool) -> Result<i64, DriverError> {
        let items = tally_master_parser::parse_items(xml)?;
        if dry_run {
            return Ok(items.len() as i64);
        }
        let mut written = 0i64;
        for item in items {
            self.store
                .upsert_item(ItemUpsert {
                    guid: item.guid,
                    name: item.name,
                    parent_name: item.parent_name,
                    base_units: item.base_units,
                    hsn_code: item.hsn_code,
                })
                .await?;
            written += 1;
        }
        Ok(written)
    }

    async fn apply_unit_master(&self, xml: &str, dry_run: bool) -> Result<i64, DriverError> {
        let units = tally_master_parser::parse_units(xml)?;
        if dry_run {
            return Ok(units.len() as i64);
        }
        let mut written = 0i64;
        for unit in units {
            self.store.upsert_uom(UomUpsert { name: unit.name, formal_name: unit.formal_name }).await?;
            written += 1;
        }
        Ok(written)
    }
}

fn run_status(written: i64, errored: i64) -> RunStatus {
    if errored == 0 {
        RunStatus::Ok
    } else if written > 0 {
        RunStatus::Partial
    } else {
        RunStatus::Error
    }
}

fn fiscal_year_start(today: NaiveDate, start_month: u32) -> NaiveDate {
    let year = if today.month() >= start_month { today.year() } else { today.year() - 1 };
    NaiveDate::from_ymd_opt(year, start_month, 1).unwrap_or(today)
}

fn project_voucher(
    voucher: &tally_voucher_parser::Voucher,
) -> (InvoiceHeader, CustomerUpsert, Vec<InvoiceLineInput>, Vec<BillAllocationRecord>) {
    let customer = CustomerUpsert {
        customer_id: voucher.party.clone(),
        name: voucher.party.clone(),
        gstin: voucher.party_gstin.clone(),
        pincode: voucher.party_pincode.clone(),
        city: voucher.party_city.clone(),
        ledger_group_name: None,
    };

    let header = InvoiceHeader {
        voucher_key: voucher.voucher_key.clone(),
        voucher_type: voucher.voucher_type.clone(),
        date: voucher.date,
        customer_id: voucher.party.clone(),
        salesperson_id: None,
        subtotal_minor: voucher.subtotal_minor,
        tax_minor: voucher.tax_minor,
        total_minor: voucher.total_minor,
        roundoff_minor: voucher.roundoff_minor,
    };

    let line_basics: Vec<i64> = voucher.inventory_entries.iter().map(|entry| entry.amount_minor).collect();
    let line_taxes = warehouse_writer::allocate_line_tax(&line_basics, voucher.tax_minor);

    let lines: Vec<InvoiceLineInput> = voucher
        .inventory_entries
        .iter()
        .zip(line_taxes.iter())
        .enumerate()
        .map(|(index, (entry, line_tax_minor))| {
            let (qty_milli, uom_from_qty) = parse_qty_milli(&entry.billed_qty);
            let rate_minor = parse_rate_minor(&entry.rate);
            InvoiceLineInput {
                line_ordinal: index as i32,
                item_id: None,
                item_name: entry.stock_item_name.clone(),
                qty_milli,
                uom: uom_from_qty,
                rate_minor,
                discount: non_empty(&entry.discount),
                line_basic_minor: entry.amount_minor,
                line_tax_minor: *line_tax_minor,
                line_total_minor: entry.amount_minor + line_tax_minor,
            }
        })
        .collect();

    let allocations: Vec<BillAllocationRecord> = voucher
        .bill_allocations
        .iter()
        .map(|allocation| BillAllocationRecord {
            ledger: voucher.party.clone(),
            ref_name: allocation.ref_name.clone(),
            voucher_key: voucher.voucher_key.clone(),
            date: voucher.date,
            amount_minor: allocation.amount_minor,
            bill_type: bill_type_wire(&allocation.bill_type),
            credit_period_days: allocation.credit_period_days,
        })
        .collect();

    (header, customer, lines, allocations)
}

fn bill_type_wire(bill_type: &BillType) -> String {
    match bill_type {
        BillType::NewRef => "New Ref".to_string(),
        BillType::AgstRef => "Agst Ref".to_string(),
        BillType::Advance => "Advance".to_string(),
        BillType::OnAccount => "On Account".to_string(),
        BillType::Other(raw) => raw.clone(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// `"2 Nos"` -> `(2000, Some("Nos"))`; thousandths, per the quantity
/// column's 3 fractional digits.
fn parse_qty_milli(raw: &str) -> (i64, Option<String>) {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let number = parts.next().unwrap_or("0");
    let uom = parts.next().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    (parse_decimal_scaled(number, 1000), uom)
}

/// `"35000 / Nos"` -> `3500000` (hundredths); the unit after the slash is
/// already captured from `BILLEDQTY`, so it is discarded here.
fn parse_rate_minor(raw: &str) -> i64 {
    let number = raw.split('/').next().unwrap_or("0").trim();
    parse_decimal_scaled(number, 100)
}

fn parse_decimal_scaled(raw: &str, scale: i64) -> i64 {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
    let mut parts = cleaned.splitn(2, '.');
    let whole: i64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let frac_digits = scale.to_string().len() as u32 - 1;
    let frac_raw = parts.next().unwrap_or("");
    let frac_padded = format!("{frac_raw:0<width$}", width = frac_digits as usize);
    let frac: i64 = frac_padded.get(0..frac_digits as usize).and_then(|s| s.parse().ok()).unwrap_or(0);
    whole * scale + frac.min(scale - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use warehouse_writer::InMemoryWarehouseStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(|| panic!("invalid test date {y}-{m}-{d}"))
    }

    struct FixedClock(NaiveDate);
    impl Clock for FixedClock {
        fn today(&self) -> NaiveDate {
            self.0
        }
    }

    struct FakeSource {
        voucher_xml_by_window: Vec<((NaiveDate, NaiveDate), String)>,
    }

    #[async_trait]
    impl TallySource for FakeSource {
        async fn fetch_vouchers(&self, from_date: NaiveDate, to_date: NaiveDate) -> Result<String, TallyClientError> {
            self.voucher_xml_by_window
                .iter()
                .find(|((from, to), _)| *from == from_date && *to == to_date)
                .map(|(_, xml)| xml.clone())
                .ok_or_else(|| TallyClientError::Config("no fixture for window".to_string()))
        }

        async fn fetch_masters(&self, _kind: MasterKind) -> Result<String, TallyClientError> {
            Ok("<ENVELOPE><STATUS>1</STATUS></ENVELOPE>".to_string())
        }
    }

    fn voucher_xml(vchnumber: &str, date: &str, amount: &str) -> String {
        format!(
            r#"<ENVELOPE><BODY><VOUCHER>
                <VCHTYPE>Sales</VCHTYPE>
                <VCHNUMBER>{vchnumber}</VCHNUMBER>
                <GUID>guid-{vchnumber}</GUID>
                <DATE>{date}</DATE>
                <PARTYLEDGERNAME>Acme Distributors</PARTYLEDGERNAME>
                <ALLINVENTORYENTRIES.LIST>
                    <STOCKITEMNAME>Widget</STOCKITEMNAME>
                    <BILLEDQTY>1 Nos</BILLEDQTY>
                    <RATE>{amount} / Nos</RATE>
                    <AMOUNT>{amount}</AMOUNT>
                    <DISCOUNT></DISCOUNT>
                </ALLINVENTORYENTRIES.LIST>
                <LEDGERENTRIES.LIST>
                    <LEDGERNAME>Acme Distributors</LEDGERNAME>
                    <AMOUNT>{amount}</AMOUNT>
                </LEDGERENTRIES.LIST>
            </VOUCHER></BODY></ENVELOPE>"#
        )
    }

    #[tokio::test]
    async fn run_incremental_defaults_to_fiscal_year_start_when_no_checkpoint() {
        let today = date(2025, 10, 11);
        let xml = voucher_xml("S-1", "20251011", "1000.00");
        let source = Arc::new(FakeSource {
            voucher_xml_by_window: vec![((date(2025, 4, 1), today), xml)],
        });
        let store = Arc::new(InMemoryWarehouseStore::new());
        let driver = IngestDriver::new(source, store.clone(), DriverConfig::default())
            .with_clock(Arc::new(FixedClock(today)));

        let summary = driver.run_incremental().await.expect("run ok");
        assert_eq!(summary.rows_written, 1);
        assert_eq!(store.invoice_count().await, 1);
        assert_eq!(store.read_checkpoint(INVOICE_STREAM).await.expect("ok"), Some(today));
    }

    // Client-side date filtering drops vouchers outside the window.
    #[tokio::test]
    async fn fetch_and_write_window_drops_out_of_range_vouchers() {
        let from = date(2025, 10, 9);
        let to = date(2025, 10, 11);
        let mut xml = String::from("<ENVELOPE><BODY>");
        xml.push_str(&voucher_xml("IN-RANGE", "20251010", "500.00"));
        xml.push_str(&voucher_xml("OUT-OF-RANGE", "20251015", "700.00"));
        xml.push_str("</BODY></ENVELOPE>");

        let source = Arc::new(FakeSource { voucher_xml_by_window: vec![((from, to), xml)] });
        let store = Arc::new(InMemoryWarehouseStore::new());
        let driver = IngestDriver::new(source, store.clone(), DriverConfig::default());

        let (written, errored) = driver.fetch_and_write_window(from, to, false).await.expect("fetch ok");
        assert_eq!(written, 1);
        assert_eq!(errored, 0);
        assert_eq!(store.invoice_count().await, 1);
    }

    #[tokio::test]
    async fn run_backfill_range_mode_does_not_touch_checkpoint() {
        let from = date(2025, 10, 9);
        let to = date(2025, 10, 11);
        let xml = voucher_xml("S-2", "20251010", "250.00");
        let source = Arc::new(FakeSource { voucher_xml_by_window: vec![((from, to), xml)] });
        let store = Arc::new(InMemoryWarehouseStore::new());
        let driver = IngestDriver::new(source, store.clone(), DriverConfig::default());

        driver.run_backfill(from, to, BackfillMode::Range, false).await.expect("backfill ok");
        assert_eq!(store.read_checkpoint(INVOICE_STREAM).await.expect("ok"), None);
    }

    // Backfill of 3 distinct days, day-by-day mode, 37/28/9 vouchers
    // per day; every written header's date must stay within the window.
    #[tokio::test]
    async fn day_by_day_backfill_sums_vouchers_across_three_days() {
        let day1 = date(2025, 10, 9);
        let day2 = date(2025, 10, 10);
        let day3 = date(2025, 10, 11);

        let mut windows = Vec::new();
        for (day, count) in [(day1, 37), (day2, 28), (day3, 9)] {
            let mut xml = String::from("<ENVELOPE><BODY>");
            for i in 0..count {
                xml.push_str(&voucher_xml(&format!("{day}-{i}"), &day.format("%Y%m%d").to_string(), "1000.00"));
            }
            xml.push_str("</BODY></ENVELOPE>");
            windows.push(((day, day), xml));
        }

        let source = Arc::new(FakeSource { voucher_xml_by_window: windows });
        let store = Arc::new(InMemoryWarehouseStore::new());
        let driver = IngestDriver::new(source, store.clone(), DriverConfig::default());

        let summary = driver
            .run_backfill(day1, day3, BackfillMode::DayByDay, false)
            .await
            .expect("backfill ok");

        assert_eq!(summary.rows_written, 74);
        assert_eq!(store.invoice_count().await, 74);
        assert_eq!(store.read_checkpoint(INVOICE_STREAM).await.expect("ok"), None);
    }

    #[test]
    fn preview_masters_truncates_to_limit() {
        let xml = r#"
            <ENVELOPE><BODY>
            <GROUP NAME="Sundry Debtors"><PARENT></PARENT></GROUP>
            <LEDGER NAME="Acme Distributors"><PARENT>Sundry Debtors</PARENT></LEDGER>
            <LEDGER NAME="Bravo Traders"><PARENT>Sundry Debtors</PARENT></LEDGER>
            </BODY></ENVELOPE>
        "#;
        let lines = IngestDriver::preview_masters(MasterKind::Ledgers, xml, 2).expect("preview ok");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ledger_group:"));
    }

    #[test]
    fn fiscal_year_start_rolls_back_before_april() {
        assert_eq!(fiscal_year_start(date(2025, 2, 15), 4), date(2024, 4, 1));
        assert_eq!(fiscal_year_start(date(2025, 6, 15), 4), date(2025, 4, 1));
    }

    #[test]
    fn parse_qty_milli_splits_number_and_uom() {
        assert_eq!(parse_qty_milli("2 Nos"), (2000, Some("Nos".to_string())));
        assert_eq!(parse_qty_milli("1.5 Kgs"), (1500, Some("Kgs".to_string())));
    }

    #[test]
    fn parse_rate_minor_ignores_trailing_unit() {
        assert_eq!(parse_rate_minor("35000 / Nos"), 3_500_000);
    }
}
