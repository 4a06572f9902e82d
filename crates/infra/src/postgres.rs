//! Postgres-backed stock ledger.
//!
//! Same unit-of-work guarantees as [`crate::services::StockLedger`], enforced
//! by the database: the material row is locked with `SELECT ... FOR UPDATE`
//! before the availability check, and the balance update, the ledger row and
//! the audit rows share one SQL transaction.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError |
//! |-----------------------|------------|
//! | `23505` (unique violation) | `UniqueViolation` |
//! | `23503` (foreign key violation) | `ForeignKeyViolation` |
//! | `23514` (check violation) | `Database` |
//! | other | `Database` |

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, info, instrument};

use buildtrack_audit::{AuditAction, AuditContext, AuditEntryId, AuditLogEntry, Auditable, record_change};
use buildtrack_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion, Quantity, UserId,
};
use buildtrack_inventory::{
    CategoryId, CreateMaterial, Material, MaterialCategory, MaterialCommand, MaterialDetails,
    MaterialId, NewStockTransaction, RecordMovement, ReverseMovement, StockTransaction,
    StockTransactionId, SubcategoryId, WarehouseId,
};
use buildtrack_projects::ProjectId;

use crate::config::DatabaseConfig;
use crate::error::{ServiceError, ServiceResult, StoreError};
use crate::services::log_events;

/// Schema applied by [`PostgresLedger::migrate`].
pub const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: Arc<PgPool>,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self, category, ctx), fields(category_id = %category.id), err)]
    pub async fn insert_category(&self, category: &MaterialCategory, ctx: &AuditContext) -> ServiceResult<()> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO material_categories (id, name, description, parent_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.parent.map(|p| *p.as_uuid()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_category", e))?;

        audit(&mut tx, AuditAction::Create, ctx, None, Some(category)).await?;
        commit(tx).await
    }

    /// Catalogue a material with an opening balance.
    #[instrument(skip(self, details, ctx), fields(code = %details.code), err)]
    pub async fn create_material(
        &self,
        details: MaterialDetails,
        opening_stock: Decimal,
        ctx: &AuditContext,
    ) -> ServiceResult<Material> {
        let id = MaterialId::generate();
        let mut material = Material::empty(id);
        log_events(&material.execute(&MaterialCommand::Create(CreateMaterial {
            material_id: id,
            details,
            opening_stock,
            occurred_at: ctx.occurred_at,
        }))?);

        let mut tx = self.begin().await?;
        let d = material.details();
        sqlx::query(
            r#"
            INSERT INTO materials (
                id, code, name, category_id, subcategory_id, description,
                unit, unit_price, minimum_stock, current_stock, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&d.code)
        .bind(&d.name)
        .bind(d.category_id.as_uuid())
        .bind(d.subcategory_id.map(|s| *s.as_uuid()))
        .bind(&d.description)
        .bind(d.unit.symbol())
        .bind(d.unit_price)
        .bind(d.minimum_stock)
        .bind(material.current_stock())
        .bind(material.version() as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| match map_sqlx_error("insert_material", e) {
            StoreError::UniqueViolation(_) => {
                ServiceError::Conflict(format!("material code '{}' already exists", material.code()))
            }
            other => ServiceError::Persistence(other),
        })?;

        audit(&mut tx, AuditAction::Create, ctx, None, Some(&material)).await?;
        commit(tx).await?;
        Ok(material)
    }

    #[instrument(skip(self), err)]
    pub async fn load_material(&self, id: MaterialId) -> ServiceResult<Material> {
        let row = sqlx::query(&format!("{MATERIAL_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_material", e))?
            .ok_or_else(|| ServiceError::not_found(format!("material {id}")))?;
        decode_material(&row)
    }

    /// Record a delivery or consumption atomically.
    #[instrument(
        skip(self, draft, ctx),
        fields(material_id = %draft.material_id, kind = draft.kind.code(), balance),
        err
    )]
    pub async fn record(&self, draft: NewStockTransaction, ctx: &AuditContext) -> ServiceResult<StockTransaction> {
        let txn = StockTransaction::record(StockTransactionId::generate(), draft, ctx.actor, ctx.occurred_at)?;

        let mut tx = self.begin().await?;
        let before = lock_material(&mut tx, txn.material_id).await?;
        let mut after = before.clone();
        log_events(&after.execute(&MaterialCommand::RecordMovement(RecordMovement {
            material_id: txn.material_id,
            kind: txn.kind,
            quantity: txn.quantity,
            occurred_at: ctx.occurred_at,
        }))?);

        store_balance(&mut tx, &after, ExpectedVersion::Exact(before.version())).await?;
        insert_transaction(&mut tx, &txn).await?;
        audit(&mut tx, AuditAction::Create, ctx, None, Some(&txn)).await?;
        audit(&mut tx, AuditAction::Update, ctx, Some(&before), Some(&after)).await?;
        commit(tx).await?;

        Span::current().record("balance", tracing::field::display(after.current_stock()));
        info!(transaction_id = %txn.id, "stock movement recorded");
        Ok(txn)
    }

    /// Delete a ledger row and apply the opposite movement.
    #[instrument(skip(self, ctx), err)]
    pub async fn reverse(&self, id: StockTransactionId, ctx: &AuditContext) -> ServiceResult<StockTransaction> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!("{TRANSACTION_SELECT} WHERE id = $1 FOR UPDATE"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("load_transaction", e))?
            .ok_or_else(|| ServiceError::not_found(format!("stock transaction {id}")))?;
        let txn = decode_transaction(&row)?;

        let before = lock_material(&mut tx, txn.material_id).await?;
        let mut after = before.clone();
        log_events(&after.execute(&MaterialCommand::ReverseMovement(ReverseMovement {
            material_id: txn.material_id,
            kind: txn.kind,
            quantity: txn.quantity,
            occurred_at: ctx.occurred_at,
        }))?);

        store_balance(&mut tx, &after, ExpectedVersion::Exact(before.version())).await?;
        sqlx::query("DELETE FROM stock_transactions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_transaction", e))?;
        audit(&mut tx, AuditAction::Delete, ctx, Some(&txn), None).await?;
        audit(&mut tx, AuditAction::Update, ctx, Some(&before), Some(&after)).await?;
        commit(tx).await?;

        info!(transaction_id = %id, "stock movement reversed");
        Ok(txn)
    }

    /// Newest first: movement date, then recording time.
    #[instrument(skip(self), err)]
    pub async fn history_for_material(&self, material_id: MaterialId) -> ServiceResult<Vec<StockTransaction>> {
        let rows = sqlx::query(&format!(
            "{TRANSACTION_SELECT} WHERE material_id = $1 ORDER BY date DESC, recorded_at DESC"
        ))
        .bind(material_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("history_for_material", e))?;
        rows.iter().map(decode_transaction).collect()
    }

    /// Audit entries of one entity, newest first.
    #[instrument(skip(self, entity), err)]
    pub async fn audit_for_entity(&self, entity: &dyn Auditable) -> ServiceResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, action, entity_type, entity_id, entity_repr,
                   changes, recorded_at, ip_address, user_agent
            FROM audit_log
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(entity.entity_type())
        .bind(entity.entity_id())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("audit_for_entity", e))?;

        rows.iter()
            .map(|row| {
                AuditRow::from_row(row)
                    .map_err(|e| StoreError::database("decode_audit", e.to_string()))?
                    .try_into()
            })
            .collect()
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

const MATERIAL_SELECT: &str = r#"
    SELECT id, code, name, category_id, subcategory_id, description,
           unit, unit_price, minimum_stock, current_stock, version
    FROM materials
"#;

const TRANSACTION_SELECT: &str = r#"
    SELECT id, material_id, transaction_type, quantity, unit_price, date,
           project_id, warehouse_id, supplier, invoice_number, notes,
           recorded_by, recorded_at
    FROM stock_transactions
"#;

async fn commit(tx: Transaction<'_, Postgres>) -> ServiceResult<()> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))?;
    Ok(())
}

/// Load a material holding its row lock until the transaction ends.
async fn lock_material(tx: &mut Transaction<'_, Postgres>, id: MaterialId) -> ServiceResult<Material> {
    let row = sqlx::query(&format!("{MATERIAL_SELECT} WHERE id = $1 FOR UPDATE"))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_material", e))?
        .ok_or_else(|| ServiceError::not_found(format!("material {id}")))?;
    decode_material(&row)
}

/// Write the new balance, guarded by the version the row was locked at.
async fn store_balance(
    tx: &mut Transaction<'_, Postgres>,
    material: &Material,
    expected: ExpectedVersion,
) -> ServiceResult<()> {
    let guard = match expected {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v as i64),
    };
    let result = sqlx::query(
        r#"
        UPDATE materials SET current_stock = $2, version = $3
        WHERE id = $1 AND ($4::BIGINT IS NULL OR version = $4)
        "#,
    )
    .bind(material.id_typed().as_uuid())
    .bind(material.current_stock())
    .bind(material.version() as i64)
    .bind(guard)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_balance", e))?;

    if result.rows_affected() == 0 {
        let actual: i64 = sqlx::query_scalar("SELECT version FROM materials WHERE id = $1")
            .bind(material.id_typed().as_uuid())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_balance", e))?;
        expected.check(actual as u64)?;
    }
    Ok(())
}

async fn insert_transaction(tx: &mut Transaction<'_, Postgres>, txn: &StockTransaction) -> ServiceResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_transactions (
            id, material_id, transaction_type, quantity, unit_price, date,
            project_id, warehouse_id, supplier, invoice_number, notes,
            recorded_by, recorded_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(txn.id.as_uuid())
    .bind(txn.material_id.as_uuid())
    .bind(txn.kind.code())
    .bind(txn.quantity.value())
    .bind(txn.unit_price)
    .bind(txn.date)
    .bind(txn.project_id.map(|p| *p.as_uuid()))
    .bind(txn.warehouse_id.map(|w| *w.as_uuid()))
    .bind(txn.supplier.as_deref())
    .bind(txn.invoice_number.as_deref())
    .bind(&txn.notes)
    .bind(txn.recorded_by.map(|u| *u.as_uuid()))
    .bind(txn.recorded_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;
    Ok(())
}

/// Write the audit row for a change; no-op updates write nothing.
async fn audit<T: Auditable + ?Sized>(
    tx: &mut Transaction<'_, Postgres>,
    action: AuditAction,
    ctx: &AuditContext,
    before: Option<&T>,
    after: Option<&T>,
) -> ServiceResult<()> {
    let Some(entry) = record_change(action, ctx, before, after)? else {
        return Ok(());
    };
    sqlx::query(
        r#"
        INSERT INTO audit_log (
            id, actor_id, action, entity_type, entity_id, entity_repr,
            changes, recorded_at, ip_address, user_agent
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.actor.map(|u| *u.as_uuid()))
    .bind(entry.action.as_str())
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.entity_repr)
    .bind(&entry.changes)
    .bind(entry.recorded_at)
    .bind(entry.ip_address.map(|ip| ip.to_string()))
    .bind(entry.user_agent.as_deref())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_audit", e))?;
    Ok(())
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let constraint = db_err.constraint().unwrap_or(operation).to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(constraint),
                Some("23503") => StoreError::ForeignKeyViolation(constraint),
                _ => StoreError::database(operation, db_err.message()),
            }
        }
        sqlx::Error::RowNotFound => StoreError::RowNotFound(operation.to_string()),
        sqlx::Error::PoolClosed => StoreError::database(operation, "connection pool closed"),
        other => StoreError::database(operation, other.to_string()),
    }
}

fn decode_error(what: &str) -> impl Fn(DomainError) -> ServiceError + '_ {
    move |e| ServiceError::Persistence(StoreError::database(what, e.to_string()))
}

fn decode_material(row: &PgRow) -> ServiceResult<Material> {
    let r = MaterialRow::from_row(row).map_err(|e| StoreError::database("decode_material", e.to_string()))?;
    let details = MaterialDetails {
        code: r.code,
        name: r.name,
        category_id: CategoryId::new(AggregateId::from_uuid(r.category_id)),
        subcategory_id: r.subcategory_id.map(|s| SubcategoryId::new(AggregateId::from_uuid(s))),
        description: r.description,
        unit: r.unit.parse().map_err(decode_error("decode_material"))?,
        unit_price: r.unit_price,
        minimum_stock: r.minimum_stock,
    };
    Ok(Material::rehydrate(
        MaterialId::new(AggregateId::from_uuid(r.id)),
        details,
        r.current_stock,
        r.version as u64,
    ))
}

fn decode_transaction(row: &PgRow) -> ServiceResult<StockTransaction> {
    let r = TransactionRow::from_row(row).map_err(|e| StoreError::database("decode_transaction", e.to_string()))?;
    Ok(StockTransaction {
        id: StockTransactionId::new(AggregateId::from_uuid(r.id)),
        material_id: MaterialId::new(AggregateId::from_uuid(r.material_id)),
        kind: r.transaction_type.parse().map_err(decode_error("decode_transaction"))?,
        quantity: Quantity::new(r.quantity).map_err(decode_error("decode_transaction"))?,
        unit_price: r.unit_price,
        date: r.date,
        project_id: r.project_id.map(|p| ProjectId::new(AggregateId::from_uuid(p))),
        warehouse_id: r.warehouse_id.map(|w| WarehouseId::new(AggregateId::from_uuid(w))),
        supplier: r.supplier,
        invoice_number: r.invoice_number,
        notes: r.notes,
        recorded_by: r.recorded_by.map(UserId::from_uuid),
        recorded_at: r.recorded_at,
    })
}

// SQLx row types

#[derive(Debug)]
struct MaterialRow {
    id: uuid::Uuid,
    code: String,
    name: String,
    category_id: uuid::Uuid,
    subcategory_id: Option<uuid::Uuid>,
    description: String,
    unit: String,
    unit_price: Decimal,
    minimum_stock: Decimal,
    current_stock: Decimal,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for MaterialRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MaterialRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            category_id: row.try_get("category_id")?,
            subcategory_id: row.try_get("subcategory_id")?,
            description: row.try_get("description")?,
            unit: row.try_get("unit")?,
            unit_price: row.try_get("unit_price")?,
            minimum_stock: row.try_get("minimum_stock")?,
            current_stock: row.try_get("current_stock")?,
            version: row.try_get("version")?,
        })
    }
}

#[derive(Debug)]
struct TransactionRow {
    id: uuid::Uuid,
    material_id: uuid::Uuid,
    transaction_type: String,
    quantity: Decimal,
    unit_price: Decimal,
    date: NaiveDate,
    project_id: Option<uuid::Uuid>,
    warehouse_id: Option<uuid::Uuid>,
    supplier: Option<String>,
    invoice_number: Option<String>,
    notes: String,
    recorded_by: Option<uuid::Uuid>,
    recorded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TransactionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransactionRow {
            id: row.try_get("id")?,
            material_id: row.try_get("material_id")?,
            transaction_type: row.try_get("transaction_type")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            date: row.try_get("date")?,
            project_id: row.try_get("project_id")?,
            warehouse_id: row.try_get("warehouse_id")?,
            supplier: row.try_get("supplier")?,
            invoice_number: row.try_get("invoice_number")?,
            notes: row.try_get("notes")?,
            recorded_by: row.try_get("recorded_by")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

#[derive(Debug)]
struct AuditRow {
    id: uuid::Uuid,
    actor_id: Option<uuid::Uuid>,
    action: String,
    entity_type: String,
    entity_id: String,
    entity_repr: String,
    changes: Option<serde_json::Value>,
    recorded_at: DateTime<Utc>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for AuditRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AuditRow {
            id: row.try_get("id")?,
            actor_id: row.try_get("actor_id")?,
            action: row.try_get("action")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            entity_repr: row.try_get("entity_repr")?,
            changes: row.try_get("changes")?,
            recorded_at: row.try_get("recorded_at")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
        })
    }
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = ServiceError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditLogEntry {
            id: AuditEntryId::new(AggregateId::from_uuid(row.id)),
            actor: row.actor_id.map(UserId::from_uuid),
            action: row.action.parse().map_err(decode_error("decode_audit"))?,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            entity_repr: row.entity_repr,
            changes: row.changes,
            recorded_at: row.recorded_at,
            ip_address: row.ip_address.and_then(|ip| ip.parse::<IpAddr>().ok()),
            user_agent: row.user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildtrack_inventory::{TransactionType, UnitOfMeasure};
    use rust_decimal_macros::dec;

    #[test]
    fn schema_declares_the_unique_material_code() {
        assert!(SCHEMA.contains("CONSTRAINT materials_code_key UNIQUE (code)"));
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS audit_log"));
    }

    #[test]
    fn ledger_rows_never_vanish_with_their_project_or_warehouse() {
        let start = SCHEMA
            .find("CREATE TABLE IF NOT EXISTS stock_transactions")
            .unwrap();
        let ledger = &SCHEMA[start..start + SCHEMA[start..].find(");").unwrap()];
        assert!(ledger.contains("REFERENCES projects (id) ON DELETE RESTRICT"));
        assert!(ledger.contains("REFERENCES warehouses (id) ON DELETE RESTRICT"));
        assert!(!ledger.contains("CASCADE"));
        assert!(!ledger.contains("SET NULL"));
    }

    #[test]
    fn row_not_found_maps_to_store_error() {
        assert_eq!(
            map_sqlx_error("load", sqlx::Error::RowNotFound),
            StoreError::RowNotFound("load".to_string())
        );
    }

    /// Runs against a live database when `BUILDTRACK_TEST_DATABASE_URL` is set.
    #[tokio::test]
    #[ignore = "requires a Postgres database"]
    async fn consumption_beyond_balance_leaves_database_untouched() {
        let Ok(url) = std::env::var("BUILDTRACK_TEST_DATABASE_URL") else {
            return;
        };
        let ledger = PostgresLedger::connect(&DatabaseConfig {
            url,
            max_connections: 2,
        })
        .await
        .unwrap();
        ledger.migrate().await.unwrap();

        let ctx = AuditContext::new(UserId::new(), Utc::now());
        let category = MaterialCategory::create(CategoryId::generate(), "Binders", "", None).unwrap();
        ledger.insert_category(&category, &ctx).await.unwrap();

        let code = format!("CEM-{}", uuid::Uuid::now_v7().simple());
        let material = ledger
            .create_material(
                MaterialDetails {
                    code,
                    name: "Portland cement".to_string(),
                    category_id: category.id,
                    subcategory_id: None,
                    description: String::new(),
                    unit: UnitOfMeasure::Bag,
                    unit_price: dec!(10),
                    minimum_stock: dec!(20),
                },
                dec!(100),
                &ctx,
            )
            .await
            .unwrap();
        let id = material.id_typed();

        let draft = |kind, qty| NewStockTransaction {
            material_id: id,
            kind,
            quantity: Quantity::new(qty).unwrap(),
            unit_price: dec!(10),
            date: ctx.today(),
            project_id: None,
            warehouse_id: None,
            supplier: None,
            invoice_number: None,
            notes: String::new(),
        };

        ledger.record(draft(TransactionType::Consumption, dec!(30)), &ctx).await.unwrap();
        let err = ledger
            .record(draft(TransactionType::Consumption, dec!(80)), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { .. }));

        assert_eq!(ledger.load_material(id).await.unwrap().current_stock(), dec!(70));
        assert_eq!(ledger.history_for_material(id).await.unwrap().len(), 1);
        // CREATE plus one UPDATE from the accepted consumption.
        assert_eq!(ledger.audit_for_entity(&material).await.unwrap().len(), 2);
    }
}
