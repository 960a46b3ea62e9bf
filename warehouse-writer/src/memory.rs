use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::BillAllocationRecord;
use crate::BillReceivableFact;
use crate::CustomerUpsert;
use crate::InvoiceHeader;
use crate::InvoiceLineInput;
use crate::ItemUpsert;
use crate::LedgerGroupUpsert;
use crate::OpeningBillUpsert;
use crate::Receipt;
use crate::RunLogEntry;
use crate::StockGroupUpsert;
use crate::UomUpsert;
use crate::WarehouseError;
use crate::WarehouseStore;

/// Test double: one `RwLock` over plain `HashMap`s, enough to exercise the
/// driver and the reconciler without a database.
#[derive(Default)]
pub struct InMemoryWarehouseStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    customers: HashMap<String, CustomerUpsert>,
    invoice_headers: HashMap<String, InvoiceHeader>,
    invoice_lines: HashMap<String, Vec<InvoiceLineInput>>,
    bill_allocations_by_invoice: HashMap<String, Vec<BillAllocationRecord>>,
    receipts: HashMap<String, Receipt>,
    ledger_groups: HashMap<String, LedgerGroupUpsert>,
    stock_groups: HashMap<String, StockGroupUpsert>,
    items: HashMap<String, ItemUpsert>,
    uoms: HashMap<String, UomUpsert>,
    opening_bills: HashMap<(String, String), OpeningBillUpsert>,
    bill_receivable_facts: HashMap<(String, String), BillReceivableFact>,
    checkpoints: HashMap<String, NaiveDate>,
    run_log: Vec<RunLogEntry>,
}

impl InMemoryWarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn invoice_count(&self) -> usize {
        self.tables.read().await.invoice_headers.len()
    }

    pub async fn run_log_len(&self) -> usize {
        self.tables.read().await.run_log.len()
    }

    pub async fn invoice(&self, voucher_key: &str) -> Option<InvoiceHeader> {
        self.tables.read().await.invoice_headers.get(voucher_key).cloned()
    }
}

fn merge_non_empty(existing: Option<String>, incoming: Option<String>) -> Option<String> {
    match incoming {
        Some(value) if !value.trim().is_empty() => Some(value),
        _ => existing,
    }
}

#[async_trait]
impl WarehouseStore for InMemoryWarehouseStore {
    async fn upsert_customer(&self, customer: CustomerUpsert) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        let merged = match tables.customers.remove(&customer.customer_id) {
            Some(existing) => CustomerUpsert {
                customer_id: customer.customer_id.clone(),
                name: if customer.name.trim().is_empty() { existing.name } else { customer.name },
                gstin: merge_non_empty(existing.gstin, customer.gstin),
                pincode: merge_non_empty(existing.pincode, customer.pincode),
                city: merge_non_empty(existing.city, customer.city),
                ledger_group_name: merge_non_empty(existing.ledger_group_name, customer.ledger_group_name),
            },
            None => customer.clone(),
        };
        tables.customers.insert(customer.customer_id.clone(), merged);
        Ok(())
    }

    async fn upsert_invoice(
        &self,
        header: InvoiceHeader,
        customer: CustomerUpsert,
    ) -> Result<(), WarehouseError> {
        self.upsert_customer(customer).await?;
        let mut tables = self.tables.write().await;
        tables.invoice_headers.insert(header.voucher_key.clone(), header);
        Ok(())
    }

    async fn replace_invoice_lines(
        &self,
        invoice_key: &str,
        lines: Vec<InvoiceLineInput>,
    ) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        tables.invoice_lines.insert(invoice_key.to_string(), lines);
        Ok(())
    }

    async fn replace_bill_allocations(
        &self,
        invoice_key: &str,
        allocations: Vec<BillAllocationRecord>,
    ) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        tables.bill_allocations_by_invoice.insert(invoice_key.to_string(), allocations);
        Ok(())
    }

    async fn upsert_receipt(&self, receipt: Receipt) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        tables.receipts.insert(receipt.receipt_key.clone(), receipt);
        Ok(())
    }

    async fn upsert_ledger_group(&self, record: LedgerGroupUpsert) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        tables.ledger_groups.insert(record.name.clone(), record);
        Ok(())
    }

    async fn upsert_stock_group(&self, record: StockGroupUpsert) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        tables.stock_groups.insert(record.name.clone(), record);
        Ok(())
    }

    async fn upsert_item(&self, record: ItemUpsert) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        let key = record.guid.clone().unwrap_or_else(|| record.name.clone());
        tables.items.insert(key, record);
        Ok(())
    }

    async fn upsert_uom(&self, record: UomUpsert) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        tables.uoms.insert(record.name.clone(), record);
        Ok(())
    }

    async fn upsert_opening_bill(&self, record: OpeningBillUpsert) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        tables
            .opening_bills
            .insert((record.ledger.clone(), record.ref_name.clone()), record);
        Ok(())
    }

    async fn write_checkpoint(&self, stream: &str, end_date: NaiveDate) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        tables.checkpoints.insert(stream.to_string(), end_date);
        Ok(())
    }

    async fn read_checkpoint(&self, stream: &str) -> Result<Option<NaiveDate>, WarehouseError> {
        Ok(self.tables.read().await.checkpoints.get(stream).copied())
    }

    async fn append_run_log(&self, entry: RunLogEntry) -> Result<(), WarehouseError> {
        self.tables.write().await.run_log.push(entry);
        Ok(())
    }

    async fn delete_invoices_in_range(
        &self,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<u64, WarehouseError> {
        let mut tables = self.tables.write().await;
        let doomed: Vec<String> = tables
            .invoice_headers
            .iter()
            .filter(|(_, header)| header.date >= from_date && header.date <= to_date)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            tables.invoice_headers.remove(key);
            tables.invoice_lines.remove(key);
            tables.bill_allocations_by_invoice.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn read_opening_bills(&self) -> Result<Vec<OpeningBillUpsert>, WarehouseError> {
        Ok(self.tables.read().await.opening_bills.values().cloned().collect())
    }

    async fn read_bill_allocations(&self) -> Result<Vec<BillAllocationRecord>, WarehouseError> {
        Ok(self
            .tables
            .read()
            .await
            .bill_allocations_by_invoice
            .values()
            .flat_map(|allocations| allocations.iter().cloned())
            .collect())
    }

    async fn write_bill_receivable_facts(
        &self,
        facts: Vec<BillReceivableFact>,
    ) -> Result<(), WarehouseError> {
        let mut tables = self.tables.write().await;
        tables.bill_receivable_facts.clear();
        for fact in facts {
            tables
                .bill_receivable_facts
                .insert((fact.ledger.clone(), fact.ref_name.clone()), fact);
        }
        Ok(())
    }
}
