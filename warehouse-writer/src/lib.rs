#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Idempotent upsert layer into the analytics warehouse. Every warehouse
//! row is owned by this crate; nothing else mutates warehouse tables. The
//! parser crates hand this crate in-memory records; this crate is the only
//! one that talks to storage.

mod memory;
#[cfg(feature = "postgres-store")]
mod postgres;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use thiserror::Error;

pub use memory::InMemoryWarehouseStore;
#[cfg(feature = "postgres-store")]
pub use postgres::PostgresWarehouseStore;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("database error: {0}")]
    Database(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerUpsert {
    pub customer_id: String,
    pub name: String,
    pub gstin: Option<String>,
    pub pincode: Option<String>,
    pub city: Option<String>,
    pub ledger_group_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceHeader {
    pub voucher_key: String,
    pub voucher_type: String,
    pub date: NaiveDate,
    pub customer_id: String,
    pub salesperson_id: Option<String>,
    pub subtotal_minor: i64,
    pub tax_minor: i64,
    pub total_minor: i64,
    pub roundoff_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLineInput {
    pub line_ordinal: i32,
    pub item_id: Option<String>,
    pub item_name: String,
    pub qty_milli: i64,
    pub uom: Option<String>,
    pub rate_minor: i64,
    pub discount: Option<String>,
    pub line_basic_minor: i64,
    pub line_tax_minor: i64,
    pub line_total_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub receipt_key: String,
    pub date: NaiveDate,
    pub customer_id: String,
    pub amount_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerGroupUpsert {
    pub guid: Option<String>,
    pub name: String,
    pub parent_name: Option<String>,
    pub alter_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockGroupUpsert {
    pub guid: Option<String>,
    pub name: String,
    pub parent_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpsert {
    pub guid: Option<String>,
    pub name: String,
    pub parent_name: Option<String>,
    pub base_units: Option<String>,
    pub hsn_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UomUpsert {
    pub name: String,
    pub formal_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningBillUpsert {
    pub ledger: String,
    pub ref_name: String,
    pub bill_date: Option<NaiveDate>,
    pub opening_balance_minor: i64,
    pub credit_period_days: Option<i64>,
    pub is_advance: bool,
}

/// A bill allocation as attached to a voucher. Not part of the warehouse's
/// externally-queried schema, but required storage: the reconciler is a
/// second pass over already-loaded bill allocations, so something durable
/// must hold them between the voucher load and the reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillAllocationRecord {
    pub ledger: String,
    pub ref_name: String,
    pub voucher_key: String,
    pub date: NaiveDate,
    pub amount_minor: i64,
    pub bill_type: String,
    pub credit_period_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Partial,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Partial => "partial",
            RunStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogEntry {
    pub stream_name: String,
    pub run_at: DateTime<Utc>,
    pub rows: i64,
    pub status: RunStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillReceivableFact {
    pub ledger: String,
    pub ref_name: String,
    pub bill_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub original_amount_minor: i64,
    pub adjusted_amount_minor: i64,
    pub pending_amount_minor: i64,
    pub last_adjusted_date: Option<NaiveDate>,
}

/// Storage contract for the warehouse. One method per write responsibility,
/// plus the read-back methods the receivables reconciler needs.
///
/// `write_voucher` is the single-transaction entry point the ingest driver
/// actually calls: it composes `upsert_customer` + `upsert_invoice` +
/// `replace_invoice_lines` + `replace_bill_allocations` for one voucher.
/// The default implementation runs them sequentially under whatever
/// atomicity the implementor's individual methods provide; the Postgres
/// implementation overrides it to wrap all four in one `sqlx::Transaction`
/// so a voucher is never partially visible to readers.
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    async fn upsert_customer(&self, customer: CustomerUpsert) -> Result<(), WarehouseError>;

    async fn upsert_invoice(
        &self,
        header: InvoiceHeader,
        customer: CustomerUpsert,
    ) -> Result<(), WarehouseError>;

    async fn replace_invoice_lines(
        &self,
        invoice_key: &str,
        lines: Vec<InvoiceLineInput>,
    ) -> Result<(), WarehouseError>;

    async fn replace_bill_allocations(
        &self,
        invoice_key: &str,
        allocations: Vec<BillAllocationRecord>,
    ) -> Result<(), WarehouseError>;

    async fn upsert_receipt(&self, receipt: Receipt) -> Result<(), WarehouseError>;

    async fn upsert_ledger_group(&self, record: LedgerGroupUpsert) -> Result<(), WarehouseError>;
    async fn upsert_stock_group(&self, record: StockGroupUpsert) -> Result<(), WarehouseError>;
    async fn upsert_item(&self, record: ItemUpsert) -> Result<(), WarehouseError>;
    async fn upsert_uom(&self, record: UomUpsert) -> Result<(), WarehouseError>;
    async fn upsert_opening_bill(&self, record: OpeningBillUpsert) -> Result<(), WarehouseError>;

    async fn write_checkpoint(&self, stream: &str, end_date: NaiveDate) -> Result<(), WarehouseError>;
    async fn read_checkpoint(&self, stream: &str) -> Result<Option<NaiveDate>, WarehouseError>;
    async fn append_run_log(&self, entry: RunLogEntry) -> Result<(), WarehouseError>;

    async fn delete_invoices_in_range(
        &self,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<u64, WarehouseError>;

    async fn read_opening_bills(&self) -> Result<Vec<OpeningBillUpsert>, WarehouseError>;
    async fn read_bill_allocations(&self) -> Result<Vec<BillAllocationRecord>, WarehouseError>;
    async fn write_bill_receivable_facts(
        &self,
        facts: Vec<BillReceivableFact>,
    ) -> Result<(), WarehouseError>;

    async fn write_voucher(
        &self,
        header: InvoiceHeader,
        customer: CustomerUpsert,
        lines: Vec<InvoiceLineInput>,
        bill_allocations: Vec<BillAllocationRecord>,
    ) -> Result<(), WarehouseError> {
        let voucher_key = header.voucher_key.clone();
        self.upsert_invoice(header, customer).await?;
        self.replace_invoice_lines(&voucher_key, lines).await?;
        self.replace_bill_allocations(&voucher_key, bill_allocations).await?;
        Ok(())
    }
}

/// `line_tax = round(line_basic / Σ line_basic * voucher_tax)`, computed
/// directly in minor units (so "round to 2dp" is already satisfied by
/// working in integers); the last line absorbs whatever residual integer
/// division leaves behind.
pub fn allocate_line_tax(line_basics_minor: &[i64], voucher_tax_minor: i64) -> Vec<i64> {
    if line_basics_minor.is_empty() {
        return Vec::new();
    }
    let total_basic: i64 = line_basics_minor.iter().sum();
    if total_basic == 0 {
        let mut allocated = vec![0; line_basics_minor.len()];
        if let Some(last) = allocated.last_mut() {
            *last = voucher_tax_minor;
        }
        return allocated;
    }

    let mut allocated = Vec::with_capacity(line_basics_minor.len());
    let mut running = 0i64;
    let last_index = line_basics_minor.len() - 1;
    for (index, basic) in line_basics_minor.iter().enumerate() {
        if index == last_index {
            allocated.push(voucher_tax_minor - running);
        } else {
            let share = (i128::from(*basic) * i128::from(voucher_tax_minor) / i128::from(total_basic)) as i64;
            running += share;
            allocated.push(share);
        }
    }
    allocated
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn allocate_line_tax_splits_proportionally_with_residual_on_last_line() {
        let allocated = allocate_line_tax(&[10_000_00, 5_000_00, 2_500_00], 1_750_01);
        assert_eq!(allocated.iter().sum::<i64>(), 1_750_01);
        assert_eq!(allocated.len(), 3);
        assert!(allocated[2] >= allocated[2].min(allocated[0]));
    }

    #[test]
    fn allocate_line_tax_handles_single_line() {
        let allocated = allocate_line_tax(&[100_00], 18_00);
        assert_eq!(allocated, vec![18_00]);
    }

    #[test]
    fn allocate_line_tax_handles_zero_basic_total() {
        let allocated = allocate_line_tax(&[0, 0], 500);
        assert_eq!(allocated, vec![0, 500]);
    }

    #[test]
    fn allocate_line_tax_empty_lines_returns_empty() {
        assert_eq!(allocate_line_tax(&[], 100), Vec::<i64>::new());
    }
}
