use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use sqlx::Row;

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

/// Postgres-backed `WarehouseStore`. Uses the `sqlx` query-builder form
/// (`sqlx::query` + `.bind()`) rather than the compile-time-checked query
/// macros, so this crate builds without a live database connection. Sits
/// behind the same `WarehouseStore` trait as the in-memory store, so callers
/// can swap between them without changing any call site.
pub struct PostgresWarehouseStore {
    pool: PgPool,
}

impl PostgresWarehouseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the warehouse's own tables if absent. A real deployment would
    /// likely own its schema through a separate migration tool, but a
    /// standalone-runnable crate needs to be able to bootstrap one.
    pub async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS customer_dim (
                customer_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                gstin TEXT,
                pincode TEXT,
                city TEXT,
                ledger_group_name TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS invoice_header (
                voucher_key TEXT PRIMARY KEY,
                voucher_type TEXT NOT NULL,
                date DATE NOT NULL,
                customer_id TEXT NOT NULL REFERENCES customer_dim(customer_id),
                salesperson_id TEXT,
                subtotal_minor BIGINT NOT NULL,
                tax_minor BIGINT NOT NULL,
                total_minor BIGINT NOT NULL,
                roundoff_minor BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS invoice_line (
                line_id BIGSERIAL PRIMARY KEY,
                invoice_key TEXT NOT NULL REFERENCES invoice_header(voucher_key) ON DELETE CASCADE,
                line_ordinal INT NOT NULL,
                item_id TEXT,
                item_name TEXT NOT NULL,
                qty_milli BIGINT NOT NULL,
                uom TEXT,
                rate_minor BIGINT NOT NULL,
                discount TEXT,
                line_basic_minor BIGINT NOT NULL,
                line_tax_minor BIGINT NOT NULL,
                line_total_minor BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS bill_allocation (
                id BIGSERIAL PRIMARY KEY,
                invoice_key TEXT NOT NULL REFERENCES invoice_header(voucher_key) ON DELETE CASCADE,
                ledger TEXT NOT NULL,
                ref_name TEXT NOT NULL,
                date DATE NOT NULL,
                amount_minor BIGINT NOT NULL,
                bill_type TEXT NOT NULL,
                credit_period_days BIGINT
            )",
            "CREATE TABLE IF NOT EXISTS receipt (
                receipt_key TEXT PRIMARY KEY,
                date DATE NOT NULL,
                customer_id TEXT NOT NULL REFERENCES customer_dim(customer_id),
                amount_minor BIGINT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS ledger_group_dim (
                name TEXT PRIMARY KEY,
                guid TEXT UNIQUE,
                parent_name TEXT,
                alter_id BIGINT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS stock_group_dim (
                name TEXT PRIMARY KEY,
                guid TEXT UNIQUE,
                parent_name TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS item_dim (
                item_id TEXT PRIMARY KEY,
                guid TEXT UNIQUE,
                name TEXT NOT NULL,
                parent_name TEXT,
                base_units TEXT,
                hsn_code TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS uom_dim (
                name TEXT PRIMARY KEY,
                formal_name TEXT
            )",
            "CREATE TABLE IF NOT EXISTS opening_bill (
                ledger TEXT NOT NULL,
                ref_name TEXT NOT NULL,
                bill_date DATE,
                opening_balance_minor BIGINT NOT NULL,
                credit_period_days BIGINT,
                is_advance BOOLEAN NOT NULL,
                PRIMARY KEY (ledger, ref_name)
            )",
            "CREATE TABLE IF NOT EXISTS bill_receivable_fact (
                ledger TEXT NOT NULL,
                ref_name TEXT NOT NULL,
                bill_date DATE,
                due_date DATE,
                original_amount_minor BIGINT NOT NULL,
                adjusted_amount_minor BIGINT NOT NULL,
                pending_amount_minor BIGINT NOT NULL,
                last_adjusted_date DATE,
                PRIMARY KEY (ledger, ref_name)
            )",
            "CREATE TABLE IF NOT EXISTS checkpoint (
                stream_name TEXT PRIMARY KEY,
                last_date DATE NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS run_log (
                id BIGSERIAL PRIMARY KEY,
                stream_name TEXT NOT NULL,
                run_at TIMESTAMPTZ NOT NULL,
                rows BIGINT NOT NULL,
                status TEXT NOT NULL,
                error TEXT
            )",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|err| WarehouseError::Database(err.to_string()))?;
        }
        Ok(())
    }
}

fn db_err(err: sqlx::Error) -> WarehouseError {
    WarehouseError::Database(err.to_string())
}

#[async_trait]
impl WarehouseStore for PostgresWarehouseStore {
    async fn upsert_customer(&self, customer: CustomerUpsert) -> Result<(), WarehouseError> {
        sqlx::query(
            "INSERT INTO customer_dim (customer_id, name, gstin, pincode, city, ledger_group_name)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (customer_id) DO UPDATE SET
                name = EXCLUDED.name,
                gstin = COALESCE(NULLIF(EXCLUDED.gstin, ''), customer_dim.gstin),
                pincode = COALESCE(NULLIF(EXCLUDED.pincode, ''), customer_dim.pincode),
                city = COALESCE(NULLIF(EXCLUDED.city, ''), customer_dim.city),
                ledger_group_name = COALESCE(NULLIF(EXCLUDED.ledger_group_name, ''), customer_dim.ledger_group_name)",
        )
        .bind(&customer.customer_id)
        .bind(&customer.name)
        .bind(customer.gstin.unwrap_or_default())
        .bind(customer.pincode.unwrap_or_default())
        .bind(customer.city.unwrap_or_default())
        .bind(customer.ledger_group_name.unwrap_or_default())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_invoice(
        &self,
        header: InvoiceHeader,
        customer: CustomerUpsert,
    ) -> Result<(), WarehouseError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO customer_dim (customer_id, name, gstin, pincode, city, ledger_group_name)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (customer_id) DO UPDATE SET
                name = EXCLUDED.name,
                gstin = COALESCE(NULLIF(EXCLUDED.gstin, ''), customer_dim.gstin),
                pincode = COALESCE(NULLIF(EXCLUDED.pincode, ''), customer_dim.pincode),
                city = COALESCE(NULLIF(EXCLUDED.city, ''), customer_dim.city),
                ledger_group_name = COALESCE(NULLIF(EXCLUDED.ledger_group_name, ''), customer_dim.ledger_group_name)",
        )
        .bind(&customer.customer_id)
        .bind(&customer.name)
        .bind(customer.gstin.unwrap_or_default())
        .bind(customer.pincode.unwrap_or_default())
        .bind(customer.city.unwrap_or_default())
        .bind(customer.ledger_group_name.unwrap_or_default())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO invoice_header
                (voucher_key, voucher_type, date, customer_id, salesperson_id,
                 subtotal_minor, tax_minor, total_minor, roundoff_minor, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
             ON CONFLICT (voucher_key) DO UPDATE SET
                voucher_type = EXCLUDED.voucher_type,
                date = EXCLUDED.date,
                customer_id = EXCLUDED.customer_id,
                salesperson_id = EXCLUDED.salesperson_id,
                subtotal_minor = EXCLUDED.subtotal_minor,
                tax_minor = EXCLUDED.tax_minor,
                total_minor = EXCLUDED.total_minor,
                roundoff_minor = EXCLUDED.roundoff_minor,
                updated_at = now()",
        )
        .bind(&header.voucher_key)
        .bind(&header.voucher_type)
        .bind(header.date)
        .bind(&header.customer_id)
        .bind(&header.salesperson_id)
        .bind(header.subtotal_minor)
        .bind(header.tax_minor)
        .bind(header.total_minor)
        .bind(header.roundoff_minor)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn replace_invoice_lines(
        &self,
        invoice_key: &str,
        lines: Vec<InvoiceLineInput>,
    ) -> Result<(), WarehouseError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM invoice_line WHERE invoice_key = $1")
            .bind(invoice_key)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for line in lines {
            sqlx::query(
                "INSERT INTO invoice_line
                    (invoice_key, line_ordinal, item_id, item_name, qty_milli, uom, rate_minor,
                     discount, line_basic_minor, line_tax_minor, line_total_minor)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(invoice_key)
            .bind(line.line_ordinal)
            .bind(&line.item_id)
            .bind(&line.item_name)
            .bind(line.qty_milli)
            .bind(&line.uom)
            .bind(line.rate_minor)
            .bind(&line.discount)
            .bind(line.line_basic_minor)
            .bind(line.line_tax_minor)
            .bind(line.line_total_minor)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn replace_bill_allocations(
        &self,
        invoice_key: &str,
        allocations: Vec<BillAllocationRecord>,
    ) -> Result<(), WarehouseError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM bill_allocation WHERE invoice_key = $1")
            .bind(invoice_key)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for allocation in allocations {
            sqlx::query(
                "INSERT INTO bill_allocation
                    (invoice_key, ledger, ref_name, date, amount_minor, bill_type, credit_period_days)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(invoice_key)
            .bind(&allocation.ledger)
            .bind(&allocation.ref_name)
            .bind(allocation.date)
            .bind(allocation.amount_minor)
            .bind(&allocation.bill_type)
            .bind(allocation.credit_period_days)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn write_voucher(
        &self,
        header: InvoiceHeader,
        customer: CustomerUpsert,
        lines: Vec<InvoiceLineInput>,
        bill_allocations: Vec<BillAllocationRecord>,
    ) -> Result<(), WarehouseError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO customer_dim (customer_id, name, gstin, pincode, city, ledger_group_name)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (customer_id) DO UPDATE SET
                name = EXCLUDED.name,
                gstin = COALESCE(NULLIF(EXCLUDED.gstin, ''), customer_dim.gstin),
                pincode = COALESCE(NULLIF(EXCLUDED.pincode, ''), customer_dim.pincode),
                city = COALESCE(NULLIF(EXCLUDED.city, ''), customer_dim.city),
                ledger_group_name = COALESCE(NULLIF(EXCLUDED.ledger_group_name, ''), customer_dim.ledger_group_name)",
        )
        .bind(&customer.customer_id)
        .bind(&customer.name)
        .bind(customer.gstin.unwrap_or_default())
        .bind(customer.pincode.unwrap_or_default())
        .bind(customer.city.unwrap_or_default())
        .bind(customer.ledger_group_name.unwrap_or_default())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO invoice_header
                (voucher_key, voucher_type, date, customer_id, salesperson_id,
                 subtotal_minor, tax_minor, total_minor, roundoff_minor, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
             ON CONFLICT (voucher_key) DO UPDATE SET
                voucher_type = EXCLUDED.voucher_type,
                date = EXCLUDED.date,
                customer_id = EXCLUDED.customer_id,
                salesperson_id = EXCLUDED.salesperson_id,
                subtotal_minor = EXCLUDED.subtotal_minor,
                tax_minor = EXCLUDED.tax_minor,
                total_minor = EXCLUDED.total_minor,
                roundoff_minor = EXCLUDED.roundoff_minor,
                updated_at = now()",
        )
        .bind(&header.voucher_key)
        .bind(&header.voucher_type)
        .bind(header.date)
        .bind(&header.customer_id)
        .bind(&header.salesperson_id)
        .bind(header.subtotal_minor)
        .bind(header.tax_minor)
        .bind(header.total_minor)
        .bind(header.roundoff_minor)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM invoice_line WHERE invoice_key = $1")
            .bind(&header.voucher_key)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for line in lines {
            sqlx::query(
                "INSERT INTO invoice_line
                    (invoice_key, line_ordinal, item_id, item_name, qty_milli, uom, rate_minor,
                     discount, line_basic_minor, line_tax_minor, line_total_minor)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(&header.voucher_key)
            .bind(line.line_ordinal)
            .bind(&line.item_id)
            .bind(&line.item_name)
            .bind(line.qty_milli)
            .bind(&line.uom)
            .bind(line.rate_minor)
            .bind(&line.discount)
            .bind(line.line_basic_minor)
            .bind(line.line_tax_minor)
            .bind(line.line_total_minor)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query("DELETE FROM bill_allocation WHERE invoice_key = $1")
            .bind(&header.voucher_key)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for allocation in bill_allocations {
            sqlx::query(
                "INSERT INTO bill_allocation
                    (invoice_key, ledger, ref_name, date, amount_minor, bill_type, credit_period_days)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&header.voucher_key)
            .bind(&allocation.ledger)
            .bind(&allocation.ref_name)
            .bind(allocation.date)
            .bind(allocation.amount_minor)
            .bind(&allocation.bill_type)
            .bind(allocation.credit_period_days)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn upsert_receipt(&self, receipt: Receipt) -> Result<(), WarehouseError> {
        sqlx::query(
            "INSERT INTO receipt (receipt_key, date, customer_id, amount_minor)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (receipt_key) DO UPDATE SET
                date = EXCLUDED.date, customer_id = EXCLUDED.customer_id, amount_minor = EXCLUDED.amount_minor",
        )
        .bind(&receipt.receipt_key)
        .bind(receipt.date)
        .bind(&receipt.customer_id)
        .bind(receipt.amount_minor)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_ledger_group(&self, record: LedgerGroupUpsert) -> Result<(), WarehouseError> {
        sqlx::query(
            "INSERT INTO ledger_group_dim (name, guid, parent_name, alter_id, updated_at)
             VALUES ($1, $2, $3, $4, now())
             ON CONFLICT (name) DO UPDATE SET
                guid = EXCLUDED.guid, parent_name = EXCLUDED.parent_name, alter_id = EXCLUDED.alter_id, updated_at = now()",
        )
        .bind(&record.name)
        .bind(&record.guid)
        .bind(&record.parent_name)
        .bind(record.alter_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_stock_group(&self, record: StockGroupUpsert) -> Result<(), WarehouseError> {
        sqlx::query(
            "INSERT INTO stock_group_dim (name, guid, parent_name, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (name) DO UPDATE SET
                guid = EXCLUDED.guid, parent_name = EXCLUDED.parent_name, updated_at = now()",
        )
        .bind(&record.name)
        .bind(&record.guid)
        .bind(&record.parent_name)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_item(&self, record: ItemUpsert) -> Result<(), WarehouseError> {
        let item_id = record.guid.clone().unwrap_or_else(|| record.name.clone());
        sqlx::query(
            "INSERT INTO item_dim (item_id, guid, name, parent_name, base_units, hsn_code, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, now())
             ON CONFLICT (item_id) DO UPDATE SET
                guid = EXCLUDED.guid, name = EXCLUDED.name, parent_name = EXCLUDED.parent_name,
                base_units = EXCLUDED.base_units, hsn_code = EXCLUDED.hsn_code, updated_at = now()",
        )
        .bind(&item_id)
        .bind(&record.guid)
        .bind(&record.name)
        .bind(&record.parent_name)
        .bind(&record.base_units)
        .bind(&record.hsn_code)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_uom(&self, record: UomUpsert) -> Result<(), WarehouseError> {
        sqlx::query(
            "INSERT INTO uom_dim (name, formal_name) VALUES ($1, $2)
             ON CONFLICT (name) DO UPDATE SET formal_name = EXCLUDED.formal_name",
        )
        .bind(&record.name)
        .bind(&record.formal_name)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_opening_bill(&self, record: OpeningBillUpsert) -> Result<(), WarehouseError> {
        sqlx::query(
            "INSERT INTO opening_bill (ledger, ref_name, bill_date, opening_balance_minor, credit_period_days, is_advance)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (ledger, ref_name) DO UPDATE SET
                bill_date = EXCLUDED.bill_date,
                opening_balance_minor = EXCLUDED.opening_balance_minor,
                credit_period_days = EXCLUDED.credit_period_days,
                is_advance = EXCLUDED.is_advance",
        )
        .bind(&record.ledger)
        .bind(&record.ref_name)
        .bind(record.bill_date)
        .bind(record.opening_balance_minor)
        .bind(record.credit_period_days)
        .bind(record.is_advance)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn write_checkpoint(&self, stream: &str, end_date: NaiveDate) -> Result<(), WarehouseError> {
        sqlx::query(
            "INSERT INTO checkpoint (stream_name, last_date, updated_at) VALUES ($1, $2, now())
             ON CONFLICT (stream_name) DO UPDATE SET last_date = EXCLUDED.last_date, updated_at = now()",
        )
        .bind(stream)
        .bind(end_date)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn read_checkpoint(&self, stream: &str) -> Result<Option<NaiveDate>, WarehouseError> {
        let row = sqlx::query("SELECT last_date FROM checkpoint WHERE stream_name = $1")
            .bind(stream)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|row| row.get::<NaiveDate, _>("last_date")))
    }

    async fn append_run_log(&self, entry: RunLogEntry) -> Result<(), WarehouseError> {
        sqlx::query(
            "INSERT INTO run_log (stream_name, run_at, rows, status, error) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&entry.stream_name)
        .bind(entry.run_at)
        .bind(entry.rows)
        .bind(entry.status.as_str())
        .bind(&entry.error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_invoices_in_range(
        &self,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<u64, WarehouseError> {
        let result = sqlx::query("DELETE FROM invoice_header WHERE date >= $1 AND date <= $2")
            .bind(from_date)
            .bind(to_date)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn read_opening_bills(&self) -> Result<Vec<OpeningBillUpsert>, WarehouseError> {
        let rows = sqlx::query(
            "SELECT ledger, ref_name, bill_date, opening_balance_minor, credit_period_days, is_advance FROM opening_bill",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| OpeningBillUpsert {
                ledger: row.get("ledger"),
                ref_name: row.get("ref_name"),
                bill_date: row.get("bill_date"),
                opening_balance_minor: row.get("opening_balance_minor"),
                credit_period_days: row.get("credit_period_days"),
                is_advance: row.get("is_advance"),
            })
            .collect())
    }

    async fn read_bill_allocations(&self) -> Result<Vec<BillAllocationRecord>, WarehouseError> {
        let rows = sqlx::query(
            "SELECT invoice_key, ledger, ref_name, date, amount_minor, bill_type, credit_period_days FROM bill_allocation",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| BillAllocationRecord {
                ledger: row.get("ledger"),
                ref_name: row.get("ref_name"),
                voucher_key: row.get("invoice_key"),
                date: row.get("date"),
                amount_minor: row.get("amount_minor"),
                bill_type: row.get("bill_type"),
                credit_period_days: row.get("credit_period_days"),
            })
            .collect())
    }

    async fn write_bill_receivable_facts(
        &self,
        facts: Vec<BillReceivableFact>,
    ) -> Result<(), WarehouseError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM bill_receivable_fact")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for fact in facts {
            sqlx::query(
                "INSERT INTO bill_receivable_fact
                    (ledger, ref_name, bill_date, due_date, original_amount_minor,
                     adjusted_amount_minor, pending_amount_minor, last_adjusted_date)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(&fact.ledger)
            .bind(&fact.ref_name)
            .bind(fact.bill_date)
            .bind(fact.due_date)
            .bind(fact.original_amount_minor)
            .bind(fact.adjusted_amount_minor)
            .bind(fact.pending_amount_minor)
            .bind(fact.last_adjusted_date)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
