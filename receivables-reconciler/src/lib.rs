#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Rebuilds `bill_receivable_fact` from opening balances and the
//! bill-allocation movements emitted while parsing vouchers. This is a
//! second pass over already-loaded data: it has no dependency on the
//! source client, and it is not mutated incrementally — every run
//! recomputes the full fact table from scratch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Days;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningBalance {
    pub ledger: String,
    pub ref_name: String,
    pub bill_date: Option<NaiveDate>,
    pub opening_balance_minor: i64,
    pub credit_period_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillMovementType {
    NewRef,
    AgstRef,
    Advance,
    OnAccount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillMovement {
    pub ledger: String,
    pub ref_name: String,
    pub date: NaiveDate,
    pub amount_minor: i64,
    pub movement_type: BillMovementType,
    /// Only meaningful on a `NewRef` movement, which is the only movement
    /// type that carries its own due-date basis in Tally's bill allocations.
    pub credit_period_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgingBucket {
    NoDueDate,
    NotDue,
    Days0To30,
    Days31To60,
    Days61To90,
    Days90Plus,
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
    pub aging_bucket: AgingBucket,
}

#[async_trait]
pub trait ReconcilerStore: Send + Sync {
    async fn read_openings(&self) -> Result<Vec<OpeningBalance>, ReconcileError>;
    async fn read_movements(&self) -> Result<Vec<BillMovement>, ReconcileError>;
    async fn write_facts(&self, facts: Vec<BillReceivableFact>) -> Result<(), ReconcileError>;
}

pub struct ReceivablesReconciler {
    store: Arc<dyn ReconcilerStore>,
}

impl ReceivablesReconciler {
    pub fn new(store: Arc<dyn ReconcilerStore>) -> Self {
        Self { store }
    }

    /// Recomputes the entire `bill_receivable_fact` table and persists it.
    /// `today` is an injected parameter (not read from the system clock
    /// internally) so aging buckets are deterministically testable.
    pub async fn reconcile(&self, today: NaiveDate) -> Result<Vec<BillReceivableFact>, ReconcileError> {
        let openings = self.store.read_openings().await?;
        let movements = self.store.read_movements().await?;
        let facts = compute_bill_receivable_facts(&openings, &movements, today);
        self.store.write_facts(facts.clone()).await?;
        Ok(facts)
    }
}

#[derive(Default)]
struct KeyAggregate {
    opening_minor: i64,
    has_opening: bool,
    opening_bill_date: Option<NaiveDate>,
    credit_period_days: Option<i64>,
    new_ref_total_minor: i64,
    has_new_ref: bool,
    new_ref_min_date: Option<NaiveDate>,
    agst_ref_total_minor: i64,
    agst_ref_max_date: Option<NaiveDate>,
    advance_total_minor: i64,
}

/// Pure aggregation of opening balances and bill movements into facts.
/// Kept free of any storage dependency so it is unit-testable in isolation.
pub fn compute_bill_receivable_facts(
    openings: &[OpeningBalance],
    movements: &[BillMovement],
    today: NaiveDate,
) -> Vec<BillReceivableFact> {
    let mut aggregates: HashMap<(String, String), KeyAggregate> = HashMap::new();

    for opening in openings {
        let key = (opening.ledger.clone(), opening.ref_name.clone());
        let entry = aggregates.entry(key).or_default();
        entry.opening_minor += opening.opening_balance_minor;
        entry.has_opening = true;
        entry.opening_bill_date = min_date(entry.opening_bill_date, opening.bill_date);
        entry.credit_period_days = entry.credit_period_days.or(opening.credit_period_days);
    }

    for movement in movements {
        let key = (movement.ledger.clone(), movement.ref_name.clone());
        let entry = aggregates.entry(key).or_default();
        match movement.movement_type {
            BillMovementType::NewRef => {
                entry.new_ref_total_minor += movement.amount_minor;
                entry.has_new_ref = true;
                entry.new_ref_min_date = min_date(entry.new_ref_min_date, Some(movement.date));
                entry.credit_period_days = entry.credit_period_days.or(movement.credit_period_days);
            }
            BillMovementType::AgstRef => {
                entry.agst_ref_total_minor += movement.amount_minor;
                entry.agst_ref_max_date = max_date(entry.agst_ref_max_date, Some(movement.date));
            }
            BillMovementType::Advance => {
                entry.advance_total_minor += movement.amount_minor;
            }
            BillMovementType::OnAccount => {}
        }
    }

    let mut facts: Vec<BillReceivableFact> = aggregates
        .into_iter()
        .filter_map(|((ledger, ref_name), aggregate)| {
            let original_amount_minor = if aggregate.has_new_ref {
                aggregate.new_ref_total_minor.abs()
            } else {
                aggregate.opening_minor.abs() + aggregate.agst_ref_total_minor.abs()
            };
            let adjusted_amount_minor = aggregate.agst_ref_total_minor.abs();
            // When a New Ref is present it already represents the full bill
            // amount; folding the opening balance in too would double-count
            // the same bill against itself. Only carry the opening balance
            // forward when there is no New Ref to anchor the original amount.
            let pending_signed = if aggregate.has_new_ref {
                aggregate.new_ref_total_minor + aggregate.advance_total_minor + aggregate.agst_ref_total_minor
            } else {
                aggregate.opening_minor + aggregate.advance_total_minor + aggregate.agst_ref_total_minor
            };
            let pending_amount_minor = pending_signed.abs();

            if pending_amount_minor <= 1 {
                return None;
            }

            let bill_date = min_date(aggregate.new_ref_min_date, aggregate.opening_bill_date);
            let due_date = match (bill_date, aggregate.credit_period_days) {
                (Some(bill_date), Some(days)) if days >= 0 => {
                    bill_date.checked_add_days(Days::new(days as u64))
                }
                _ => None,
            };

            Some(BillReceivableFact {
                ledger,
                ref_name,
                bill_date,
                due_date,
                original_amount_minor,
                adjusted_amount_minor,
                pending_amount_minor,
                last_adjusted_date: aggregate.agst_ref_max_date,
                aging_bucket: aging_bucket(today, due_date),
            })
        })
        .collect();

    facts.sort_by(|a, b| (a.ledger.clone(), a.ref_name.clone()).cmp(&(b.ledger.clone(), b.ref_name.clone())));
    facts
}

fn min_date(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn max_date(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn aging_bucket(today: NaiveDate, due_date: Option<NaiveDate>) -> AgingBucket {
    let Some(due_date) = due_date else {
        return AgingBucket::NoDueDate;
    };
    if today <= due_date {
        return AgingBucket::NotDue;
    }
    let days_overdue = (today - due_date).num_days();
    match days_overdue {
        1..=30 => AgingBucket::Days0To30,
        31..=60 => AgingBucket::Days31To60,
        61..=90 => AgingBucket::Days61To90,
        _ => AgingBucket::Days90Plus,
    }
}

/// Always-available test double; not gated behind a feature since the
/// driver and CLI both use it in `--dry-run`/integration-test wiring.
pub struct InMemoryReconcilerStore {
    openings: tokio::sync::RwLock<Vec<OpeningBalance>>,
    movements: tokio::sync::RwLock<Vec<BillMovement>>,
    facts: tokio::sync::RwLock<Vec<BillReceivableFact>>,
}

impl InMemoryReconcilerStore {
    pub fn new(openings: Vec<OpeningBalance>, movements: Vec<BillMovement>) -> Self {
        Self {
            openings: tokio::sync::RwLock::new(openings),
            movements: tokio::sync::RwLock::new(movements),
            facts: tokio::sync::RwLock::new(Vec::new()),
        }
    }

    pub async fn facts(&self) -> Vec<BillReceivableFact> {
        self.facts.read().await.clone()
    }
}

#[async_trait]
impl ReconcilerStore for InMemoryReconcilerStore {
    async fn read_openings(&self) -> Result<Vec<OpeningBalance>, ReconcileError> {
        Ok(self.openings.read().await.clone())
    }

    async fn read_movements(&self) -> Result<Vec<BillMovement>, ReconcileError> {
        Ok(self.movements.read().await.clone())
    }

    async fn write_facts(&self, facts: Vec<BillReceivableFact>) -> Result<(), ReconcileError> {
        *self.facts.write().await = facts;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(|| panic!("invalid test date {y}-{m}-{d}"))
    }

    // Opening balance + New Ref + two Agst Ref settlements.
    #[test]
    fn reconciles_opening_balance_with_new_ref_and_two_agst_ref() {
        let openings = vec![OpeningBalance {
            ledger: "Acme".to_string(),
            ref_name: "BILL-1".to_string(),
            bill_date: None,
            opening_balance_minor: -50_000_00,
            credit_period_days: None,
        }];
        let movements = vec![
            BillMovement {
                ledger: "Acme".to_string(),
                ref_name: "BILL-1".to_string(),
                date: date(2025, 6, 1),
                amount_minor: -100_000_00,
                movement_type: BillMovementType::NewRef,
                credit_period_days: Some(30),
            },
            BillMovement {
                ledger: "Acme".to_string(),
                ref_name: "BILL-1".to_string(),
                date: date(2025, 7, 15),
                amount_minor: 40_000_00,
                movement_type: BillMovementType::AgstRef,
                credit_period_days: None,
            },
            BillMovement {
                ledger: "Acme".to_string(),
                ref_name: "BILL-1".to_string(),
                date: date(2025, 7, 15),
                amount_minor: 30_000_00,
                movement_type: BillMovementType::AgstRef,
                credit_period_days: None,
            },
        ];

        let facts = compute_bill_receivable_facts(&openings, &movements, date(2025, 7, 28));
        assert_eq!(facts.len(), 1);
        let fact = &facts[0];
        assert_eq!(fact.original_amount_minor, 100_000_00);
        assert_eq!(fact.adjusted_amount_minor, 70_000_00);
        assert_eq!(fact.pending_amount_minor, 30_000_00);
        assert_eq!(fact.last_adjusted_date, Some(date(2025, 7, 15)));
        assert_eq!(fact.bill_date, Some(date(2025, 6, 1)));
        assert_eq!(fact.due_date, Some(date(2025, 7, 1)));
    }

    #[test]
    fn zero_pending_bills_are_excluded() {
        let movements = vec![
            BillMovement {
                ledger: "Acme".to_string(),
                ref_name: "BILL-2".to_string(),
                date: date(2025, 6, 1),
                amount_minor: -10_000_00,
                movement_type: BillMovementType::NewRef,
                credit_period_days: Some(15),
            },
            BillMovement {
                ledger: "Acme".to_string(),
                ref_name: "BILL-2".to_string(),
                date: date(2025, 6, 20),
                amount_minor: 10_000_00,
                movement_type: BillMovementType::AgstRef,
                credit_period_days: None,
            },
        ];
        let facts = compute_bill_receivable_facts(&[], &movements, date(2025, 7, 28));
        assert!(facts.is_empty());
    }

    #[test]
    fn aging_buckets_match_days_overdue() {
        let due_date = date(2025, 6, 1);
        assert!(matches!(aging_bucket(date(2025, 5, 1), Some(due_date)), AgingBucket::NotDue));
        assert!(matches!(aging_bucket(date(2025, 6, 15), Some(due_date)), AgingBucket::Days0To30));
        assert!(matches!(aging_bucket(date(2025, 7, 15), Some(due_date)), AgingBucket::Days31To60));
        assert!(matches!(aging_bucket(date(2025, 8, 15), Some(due_date)), AgingBucket::Days61To90));
        assert!(matches!(aging_bucket(date(2025, 12, 1), Some(due_date)), AgingBucket::Days90Plus));
        assert!(matches!(aging_bucket(date(2025, 6, 1), None), AgingBucket::NoDueDate));
    }

    #[tokio::test]
    async fn reconciler_reads_store_and_writes_facts_back() {
        let openings = vec![OpeningBalance {
            ledger: "Acme".to_string(),
            ref_name: "BILL-9".to_string(),
            bill_date: Some(date(2025, 1, 1)),
            opening_balance_minor: -5_000_00,
            credit_period_days: Some(30),
        }];
        let store = Arc::new(InMemoryReconcilerStore::new(openings, Vec::new()));
        let reconciler = ReceivablesReconciler::new(store.clone());

        let facts = reconciler.reconcile(date(2025, 7, 28)).await.expect("reconcile ok");
        assert_eq!(facts.len(), 1);
        assert_eq!(store.facts().await.len(), 1);
    }
}
