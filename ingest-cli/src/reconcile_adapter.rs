//! Bridges `warehouse-writer`'s storage types to `receivables-reconciler`'s
//! own types. The two crates are deliberately decoupled (the reconciler has
//! no dependency on the warehouse's concrete schema); this CLI is the one
//! place that owns both stores and knows how to translate between them.

use async_trait::async_trait;
use receivables_reconciler::BillMovement;
use receivables_reconciler::BillMovementType;
use receivables_reconciler::BillReceivableFact as ReconcilerFact;
use receivables_reconciler::OpeningBalance;
use receivables_reconciler::ReconcileError;
use receivables_reconciler::ReconcilerStore;
use std::sync::Arc;
use warehouse_writer::BillReceivableFact as WarehouseFact;
use warehouse_writer::WarehouseStore;

pub struct WarehouseReconcilerStore {
    warehouse: Arc<dyn WarehouseStore>,
    dry_run: bool,
}

impl WarehouseReconcilerStore {
    pub fn new(warehouse: Arc<dyn WarehouseStore>, dry_run: bool) -> Self {
        Self { warehouse, dry_run }
    }
}

fn parse_movement_type(raw: &str) -> Option<BillMovementType> {
    match raw.trim().to_lowercase().as_str() {
        "new ref" => Some(BillMovementType::NewRef),
        "agst ref" => Some(BillMovementType::AgstRef),
        "advance" => Some(BillMovementType::Advance),
        "on account" => Some(BillMovementType::OnAccount),
        _ => None,
    }
}

#[async_trait]
impl ReconcilerStore for WarehouseReconcilerStore {
    async fn read_openings(&self) -> Result<Vec<OpeningBalance>, ReconcileError> {
        let openings = self
            .warehouse
            .read_opening_bills()
            .await
            .map_err(|err| ReconcileError::Store(err.to_string()))?;
        Ok(openings
            .into_iter()
            .map(|opening| OpeningBalance {
                ledger: opening.ledger,
                ref_name: opening.ref_name,
                bill_date: opening.bill_date,
                opening_balance_minor: opening.opening_balance_minor,
                credit_period_days: opening.credit_period_days,
            })
            .collect())
    }

    async fn read_movements(&self) -> Result<Vec<BillMovement>, ReconcileError> {
        let allocations = self
            .warehouse
            .read_bill_allocations()
            .await
            .map_err(|err| ReconcileError::Store(err.to_string()))?;
        Ok(allocations
            .into_iter()
            .filter_map(|allocation| {
                let movement_type = parse_movement_type(&allocation.bill_type)?;
                Some(BillMovement {
                    ledger: allocation.ledger,
                    ref_name: allocation.ref_name,
                    date: allocation.date,
                    amount_minor: allocation.amount_minor,
                    movement_type,
                    credit_period_days: allocation.credit_period_days,
                })
            })
            .collect())
    }

    async fn write_facts(&self, facts: Vec<ReconcilerFact>) -> Result<(), ReconcileError> {
        if self.dry_run {
            return Ok(());
        }
        let mapped = facts
            .into_iter()
            .map(|fact| WarehouseFact {
                ledger: fact.ledger,
                ref_name: fact.ref_name,
                bill_date: fact.bill_date,
                due_date: fact.due_date,
                original_amount_minor: fact.original_amount_minor,
                adjusted_amount_minor: fact.adjusted_amount_minor,
                pending_amount_minor: fact.pending_amount_minor,
                last_adjusted_date: fact.last_adjusted_date,
            })
            .collect();
        self.warehouse
            .write_bill_receivable_facts(mapped)
            .await
            .map_err(|err| ReconcileError::Store(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use warehouse_writer::InMemoryWarehouseStore;
    use warehouse_writer::OpeningBillUpsert;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(|| panic!("invalid test date {y}-{m}-{d}"))
    }

    #[tokio::test]
    async fn reads_opening_bills_through_the_adapter() {
        let warehouse: Arc<dyn WarehouseStore> = Arc::new(InMemoryWarehouseStore::new());
        warehouse
            .upsert_opening_bill(OpeningBillUpsert {
                ledger: "Acme Distributors".to_string(),
                ref_name: "BILL-1".to_string(),
                bill_date: Some(date(2025, 6, 1)),
                opening_balance_minor: -50_000_00,
                credit_period_days: Some(30),
                is_advance: false,
            })
            .await
            .expect("seed ok");

        let adapter = WarehouseReconcilerStore::new(warehouse, false);
        let openings = adapter.read_openings().await.expect("read ok");
        assert_eq!(openings.len(), 1);
        assert_eq!(openings[0].ledger, "Acme Distributors");
        assert_eq!(openings[0].opening_balance_minor, -50_000_00);
    }

    #[test]
    fn parse_movement_type_recognizes_known_bill_types() {
        assert_eq!(parse_movement_type("New Ref"), Some(BillMovementType::NewRef));
        assert_eq!(parse_movement_type("agst ref"), Some(BillMovementType::AgstRef));
        assert_eq!(parse_movement_type("Something Else"), None);
    }
}
