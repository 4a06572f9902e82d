//! Stock ledger service.
//!
//! Recording or reversing a movement is one unit of work: the material
//! balance, the ledger row and both audit entries commit together or not at
//! all. The availability check runs under the store's write lock, so two
//! consumptions can never both pass against the same balance.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use buildtrack_audit::AuditContext;
use buildtrack_core::Aggregate;
use buildtrack_inventory::{
    MaterialCommand, MaterialId, NewStockTransaction, RecordMovement, ReverseMovement,
    StockTransaction, StockTransactionId,
};
use buildtrack_projects::ProjectId;

use crate::error::{ServiceError, ServiceResult};
use crate::services::{audit, fetch, log_events};
use crate::store::{InMemoryStore, Tables};

#[derive(Debug, Clone)]
pub struct StockLedger {
    store: Arc<InMemoryStore>,
}

/// Newest first: movement date, then recording time.
fn newest_first(rows: &mut [StockTransaction]) {
    rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.recorded_at.cmp(&a.recorded_at)));
}

/// Remove a ledger row and undo its effect on the balance, staged on `t`.
pub(crate) fn reverse_staged(t: &mut Tables, txn: &StockTransaction, ctx: &AuditContext) -> ServiceResult<()> {
    let before = fetch(&t.materials, txn.material_id, "material")?;
    let mut after = before.clone();
    log_events(&after.execute(&MaterialCommand::ReverseMovement(ReverseMovement {
        material_id: txn.material_id,
        kind: txn.kind,
        quantity: txn.quantity,
        occurred_at: ctx.occurred_at,
    }))?);

    t.put_material(after.clone())?;
    t.transactions.remove(&txn.id);
    audit::deleted(t, ctx, txn)?;
    audit::updated(t, ctx, &before, &after)?;
    Ok(())
}

impl StockLedger {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }

    /// Record a delivery or consumption.
    ///
    /// A consumption larger than the current balance fails with
    /// [`ServiceError::InsufficientStock`] and changes nothing. The material's
    /// catalog unit price is left as is.
    #[instrument(
        skip(self, draft, ctx),
        fields(material_id = %draft.material_id, kind = draft.kind.code(), quantity = %draft.quantity),
        err
    )]
    pub fn record(&self, draft: NewStockTransaction, ctx: &AuditContext) -> ServiceResult<StockTransaction> {
        let txn = StockTransaction::record(StockTransactionId::generate(), draft, ctx.actor, ctx.occurred_at)?;

        let result = self.store.transaction(|t| {
            let before = fetch(&t.materials, txn.material_id, "material")?;
            let mut after = before.clone();
            log_events(&after.execute(&MaterialCommand::RecordMovement(RecordMovement {
                material_id: txn.material_id,
                kind: txn.kind,
                quantity: txn.quantity,
                occurred_at: ctx.occurred_at,
            }))?);

            t.put_material(after.clone())?;
            t.insert_transaction(txn.clone())?;
            audit::created(t, ctx, &txn)?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after.current_stock())
        });

        match result {
            Ok(balance) => {
                info!(transaction_id = %txn.id, %balance, "stock movement recorded");
                Ok(txn)
            }
            Err(err @ ServiceError::InsufficientStock { .. }) => {
                warn!(%err, "stock movement rejected");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Delete a ledger row, applying the opposite movement.
    ///
    /// Reversing a delivery whose stock has since been consumed fails with
    /// [`ServiceError::InsufficientStock`].
    #[instrument(skip(self, ctx), err)]
    pub fn reverse(&self, id: StockTransactionId, ctx: &AuditContext) -> ServiceResult<StockTransaction> {
        let txn = self.store.transaction(|t| {
            let txn = fetch(&t.transactions, id, "stock transaction")?;
            reverse_staged(t, &txn, ctx)?;
            Ok::<_, ServiceError>(txn)
        })?;
        info!(transaction_id = %id, "stock movement reversed");
        Ok(txn)
    }

    pub fn get(&self, id: StockTransactionId) -> ServiceResult<StockTransaction> {
        self.store.read(|t| fetch(&t.transactions, id, "stock transaction"))?
    }

    pub fn history_for_material(&self, material_id: MaterialId) -> ServiceResult<Vec<StockTransaction>> {
        let mut rows = self.store.read(|t| {
            t.transactions
                .values()
                .filter(|x| x.material_id == material_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        newest_first(&mut rows);
        Ok(rows)
    }

    pub fn history_for_project(&self, project_id: ProjectId) -> ServiceResult<Vec<StockTransaction>> {
        let mut rows = self.store.read(|t| {
            t.transactions
                .values()
                .filter(|x| x.project_id == Some(project_id))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        newest_first(&mut rows);
        Ok(rows)
    }
}
