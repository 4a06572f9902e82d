use std::collections::BTreeMap;
use std::sync::RwLock;

use buildtrack_audit::AuditLogEntry;
use buildtrack_core::Entity;
use buildtrack_inventory::{
    CategoryId, Material, MaterialCategory, MaterialId, MaterialSubcategory, StockTransaction,
    StockTransactionId, SubcategoryId, Warehouse, WarehouseId,
};
use buildtrack_projects::{
    AllocationId, BudgetItem, BudgetItemId, Milestone, MilestoneId, Project, ProjectId,
    ResourceAllocation, Task, TaskId,
};
use buildtrack_resources::{
    Assignment, AssignmentId, CostCenter, CostCenterId, CostItem, CostItemId, Equipment,
    EquipmentId, EquipmentTransfer, EquipmentUsage, MaintenanceId, MaintenanceRecord, Payment,
    PaymentId, Subcontractor, SubcontractorId, TransferId, UsageId,
};

use crate::error::StoreError;

/// Every table held by the in-memory store.
///
/// The `put_*` / `insert_*` methods enforce the same unique and foreign-key
/// constraints as the SQL schema.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub categories: BTreeMap<CategoryId, MaterialCategory>,
    pub subcategories: BTreeMap<SubcategoryId, MaterialSubcategory>,
    pub materials: BTreeMap<MaterialId, Material>,
    pub warehouses: BTreeMap<WarehouseId, Warehouse>,
    pub transactions: BTreeMap<StockTransactionId, StockTransaction>,

    pub projects: BTreeMap<ProjectId, Project>,
    pub tasks: BTreeMap<TaskId, Task>,
    pub milestones: BTreeMap<MilestoneId, Milestone>,
    pub budget_items: BTreeMap<BudgetItemId, BudgetItem>,
    pub allocations: BTreeMap<AllocationId, ResourceAllocation>,

    pub equipment: BTreeMap<EquipmentId, Equipment>,
    pub maintenance: BTreeMap<MaintenanceId, MaintenanceRecord>,
    pub usage: BTreeMap<UsageId, EquipmentUsage>,
    pub transfers: BTreeMap<TransferId, EquipmentTransfer>,

    pub subcontractors: BTreeMap<SubcontractorId, Subcontractor>,
    pub assignments: BTreeMap<AssignmentId, Assignment>,
    pub payments: BTreeMap<PaymentId, Payment>,

    pub cost_centers: BTreeMap<CostCenterId, CostCenter>,
    pub cost_items: BTreeMap<CostItemId, CostItem>,

    /// Audit entries written by the unit of work in progress. Moved to the
    /// store's append-only log on commit; always empty outside a transaction.
    pub pending_audit: Vec<AuditLogEntry>,
}

fn references<K: Ord, V>(table: &BTreeMap<K, V>, key: &K, constraint: &str) -> Result<(), StoreError> {
    if table.contains_key(key) {
        Ok(())
    } else {
        Err(StoreError::ForeignKeyViolation(constraint.to_string()))
    }
}

fn references_opt<K: Ord, V>(
    table: &BTreeMap<K, V>,
    key: Option<&K>,
    constraint: &str,
) -> Result<(), StoreError> {
    match key {
        Some(key) => references(table, key, constraint),
        None => Ok(()),
    }
}

/// Insert or replace `row` under its own id.
fn upsert<E: Entity>(table: &mut BTreeMap<E::Id, E>, row: E) {
    table.insert(*row.id(), row);
}

fn unique<'a, K: Ord + 'a, V: 'a>(
    rows: impl IntoIterator<Item = (&'a K, &'a V)>,
    own_key: &K,
    clashes: impl Fn(&V) -> bool,
    constraint: &str,
) -> Result<(), StoreError> {
    if rows.into_iter().any(|(k, v)| k != own_key && clashes(v)) {
        Err(StoreError::UniqueViolation(constraint.to_string()))
    } else {
        Ok(())
    }
}

impl Tables {
    pub fn put_category(&mut self, category: MaterialCategory) -> Result<(), StoreError> {
        references_opt(&self.categories, category.parent.as_ref(), "material_categories.parent_id")?;
        upsert(&mut self.categories, category);
        Ok(())
    }

    pub fn put_subcategory(&mut self, sub: MaterialSubcategory) -> Result<(), StoreError> {
        references(&self.categories, &sub.category_id, "material_subcategories.category_id")?;
        upsert(&mut self.subcategories, sub);
        Ok(())
    }

    pub fn put_material(&mut self, material: Material) -> Result<(), StoreError> {
        let id = material.id_typed();
        unique(&self.materials, &id, |m| m.code() == material.code(), "materials.code")?;
        references(&self.categories, &material.category_id(), "materials.category_id")?;
        references_opt(
            &self.subcategories,
            material.subcategory_id().as_ref(),
            "materials.subcategory_id",
        )?;
        self.materials.insert(id, material);
        Ok(())
    }

    pub fn put_warehouse(&mut self, warehouse: Warehouse) -> Result<(), StoreError> {
        unique(&self.warehouses, &warehouse.id, |w| w.code == warehouse.code, "warehouses.code")?;
        references_opt(&self.projects, warehouse.project_id.as_ref(), "warehouses.project_id")?;
        upsert(&mut self.warehouses, warehouse);
        Ok(())
    }

    /// Ledger rows are insert-only.
    pub fn insert_transaction(&mut self, txn: StockTransaction) -> Result<(), StoreError> {
        if self.transactions.contains_key(&txn.id) {
            return Err(StoreError::UniqueViolation("stock_transactions.id".to_string()));
        }
        references(&self.materials, &txn.material_id, "stock_transactions.material_id")?;
        references_opt(&self.projects, txn.project_id.as_ref(), "stock_transactions.project_id")?;
        references_opt(&self.warehouses, txn.warehouse_id.as_ref(), "stock_transactions.warehouse_id")?;
        upsert(&mut self.transactions, txn);
        Ok(())
    }

    pub fn put_project(&mut self, project: Project) -> Result<(), StoreError> {
        unique(&self.projects, &project.id, |p| p.code == project.code, "projects.code")?;
        upsert(&mut self.projects, project);
        Ok(())
    }

    pub fn put_task(&mut self, task: Task) -> Result<(), StoreError> {
        references(&self.projects, &task.project_id, "tasks.project_id")?;
        upsert(&mut self.tasks, task);
        Ok(())
    }

    pub fn put_milestone(&mut self, milestone: Milestone) -> Result<(), StoreError> {
        references(&self.projects, &milestone.project_id, "milestones.project_id")?;
        upsert(&mut self.milestones, milestone);
        Ok(())
    }

    pub fn put_budget_item(&mut self, item: BudgetItem) -> Result<(), StoreError> {
        references(&self.projects, &item.project_id, "budget_items.project_id")?;
        upsert(&mut self.budget_items, item);
        Ok(())
    }

    pub fn put_allocation(&mut self, allocation: ResourceAllocation) -> Result<(), StoreError> {
        references(&self.projects, &allocation.project_id, "resource_allocations.project_id")?;
        upsert(&mut self.allocations, allocation);
        Ok(())
    }

    pub fn put_equipment(&mut self, equipment: Equipment) -> Result<(), StoreError> {
        unique(&self.equipment, &equipment.id, |e| e.code == equipment.code, "equipment.code")?;
        unique(
            &self.equipment,
            &equipment.id,
            |e| e.serial_number == equipment.serial_number,
            "equipment.serial_number",
        )?;
        upsert(&mut self.equipment, equipment);
        Ok(())
    }

    pub fn put_maintenance(&mut self, record: MaintenanceRecord) -> Result<(), StoreError> {
        references(&self.equipment, &record.equipment_id, "equipment_maintenance.equipment_id")?;
        upsert(&mut self.maintenance, record);
        Ok(())
    }

    pub fn put_usage(&mut self, usage: EquipmentUsage) -> Result<(), StoreError> {
        references(&self.equipment, &usage.equipment_id, "equipment_usage.equipment_id")?;
        references(&self.projects, &usage.project_id, "equipment_usage.project_id")?;
        references_opt(&self.tasks, usage.task_id.as_ref(), "equipment_usage.task_id")?;
        upsert(&mut self.usage, usage);
        Ok(())
    }

    pub fn put_transfer(&mut self, transfer: EquipmentTransfer) -> Result<(), StoreError> {
        references(&self.equipment, &transfer.equipment_id, "equipment_transfers.equipment_id")?;
        upsert(&mut self.transfers, transfer);
        Ok(())
    }

    pub fn put_subcontractor(&mut self, sub: Subcontractor) -> Result<(), StoreError> {
        unique(&self.subcontractors, &sub.id, |s| s.code == sub.code, "subcontractors.code")?;
        unique(&self.subcontractors, &sub.id, |s| s.tax_id == sub.tax_id, "subcontractors.tax_id")?;
        upsert(&mut self.subcontractors, sub);
        Ok(())
    }

    pub fn put_assignment(&mut self, assignment: Assignment) -> Result<(), StoreError> {
        references(
            &self.subcontractors,
            &assignment.subcontractor_id,
            "subcontractor_assignments.subcontractor_id",
        )?;
        references(&self.projects, &assignment.project_id, "subcontractor_assignments.project_id")?;
        references_opt(&self.tasks, assignment.task_id.as_ref(), "subcontractor_assignments.task_id")?;
        upsert(&mut self.assignments, assignment);
        Ok(())
    }

    pub fn put_payment(&mut self, payment: Payment) -> Result<(), StoreError> {
        references(&self.assignments, &payment.assignment_id, "subcontractor_payments.assignment_id")?;
        upsert(&mut self.payments, payment);
        Ok(())
    }

    pub fn put_cost_center(&mut self, center: CostCenter) -> Result<(), StoreError> {
        references(&self.projects, &center.project_id, "cost_centers.project_id")?;
        upsert(&mut self.cost_centers, center);
        Ok(())
    }

    pub fn put_cost_item(&mut self, item: CostItem) -> Result<(), StoreError> {
        references(&self.cost_centers, &item.cost_center_id, "cost_items.cost_center_id")?;
        upsert(&mut self.cost_items, item);
        Ok(())
    }

    pub fn append_audit(&mut self, entry: AuditLogEntry) {
        self.pending_audit.push(entry);
    }
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    audit_log: Vec<AuditLogEntry>,
}

/// In-memory transactional store.
///
/// Intended for tests/dev.
///
/// A single `RwLock` guards every table and the audit log.
/// [`InMemoryStore::transaction`] holds the write lock for the whole unit of
/// work, which serializes writers and makes check-then-update sequences (e.g.
/// stock availability) atomic. The audit log is kept outside the staged copy
/// so a write costs nothing per historical entry.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a consistent read view.
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&state.tables))
    }

    /// Run `f` over the committed audit log, oldest entry first.
    pub fn read_audit<R>(&self, f: impl FnOnce(&[AuditLogEntry]) -> R) -> Result<R, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&state.audit_log))
    }

    /// Run `f` as one all-or-nothing unit of work.
    ///
    /// Writes are staged on a copy of the tables and become visible only when
    /// `f` returns `Ok`; on `Err` nothing changes, audit entries included.
    pub fn transaction<R, E>(&self, f: impl FnOnce(&mut Tables) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut staged = state.tables.clone();
        let out = f(&mut staged)?;
        let entries = std::mem::take(&mut staged.pending_audit);
        state.audit_log.extend(entries);
        state.tables = staged;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildtrack_audit::{AuditAction, AuditContext, record_change};
    use buildtrack_core::UserId;
    use chrono::Utc;

    use crate::error::ServiceError;

    fn category(name: &str) -> MaterialCategory {
        MaterialCategory::create(CategoryId::generate(), name, "", None).unwrap()
    }

    #[test]
    fn failed_transaction_discards_staged_writes() {
        let store = InMemoryStore::new();
        let cat = category("Aggregates");

        let result: Result<(), ServiceError> = store.transaction(|t| {
            t.put_category(cat.clone())?;
            Err(ServiceError::Validation("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(store.read(|t| t.categories.is_empty()).unwrap());

        store
            .transaction(|t| t.put_category(cat.clone()).map_err(ServiceError::from))
            .unwrap();
        assert_eq!(store.read(|t| t.categories.len()).unwrap(), 1);
    }

    #[test]
    fn audit_entries_commit_with_their_unit_of_work() {
        let store = InMemoryStore::new();
        let ctx = AuditContext::new(UserId::new(), Utc::now());
        let stage = |t: &mut Tables, cat: &MaterialCategory| -> Result<(), ServiceError> {
            t.put_category(cat.clone())?;
            let entry = record_change(AuditAction::Create, &ctx, None, Some(cat))?
                .ok_or_else(|| ServiceError::Validation("no entry".to_string()))?;
            t.append_audit(entry);
            Ok(())
        };

        let kept = category("Aggregates");
        store.transaction(|t| stage(t, &kept)).unwrap();
        let dropped = category("Timber");
        let result: Result<(), ServiceError> = store.transaction(|t| {
            stage(t, &dropped)?;
            Err(ServiceError::Validation("abort".to_string()))
        });
        assert!(result.is_err());

        let log = store.read_audit(|log| log.to_vec()).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].entity_id, kept.id.to_string());
        assert!(store.read(|t| t.pending_audit.is_empty()).unwrap());
    }

    #[test]
    fn subcategory_needs_existing_category() {
        let store = InMemoryStore::new();
        let orphan =
            MaterialSubcategory::create(SubcategoryId::generate(), CategoryId::generate(), "Sand", "").unwrap();
        let err = store
            .transaction(|t| t.put_subcategory(orphan.clone()))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::ForeignKeyViolation("material_subcategories.category_id".to_string())
        );
    }
}
