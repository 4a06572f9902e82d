//! Resource service: equipment fleet, subcontractors and cost centers.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use buildtrack_audit::{AuditAction, AuditContext};
use buildtrack_projects::ProjectId;
use buildtrack_resources::{
    Assignment, AssignmentDetails, AssignmentId, AssignmentStatus, CostCenter, CostCenterId,
    CostItem, CostItemDetails, CostItemId, Equipment, EquipmentDetails, EquipmentId,
    EquipmentStatus, EquipmentTransfer, EquipmentUsage, MaintenanceDetails, MaintenanceId,
    MaintenanceRecord, Payment, PaymentDetails, PaymentId, Subcontractor, SubcontractorDetails,
    SubcontractorId, SubcontractorStatus, TransferDetails, TransferId, UsageDetails, UsageId,
};

use crate::error::{ServiceError, ServiceResult};
use crate::services::{audit, fetch};
use crate::store::{InMemoryStore, Tables};

/// Spending position of one cost center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostCenterSummary {
    pub budget: Decimal,
    pub spent: Decimal,
    pub remaining: Decimal,
}

#[derive(Debug, Clone)]
pub struct ResourceService {
    store: Arc<InMemoryStore>,
}

fn equipment_code_is_free(t: &Tables, details: &EquipmentDetails, own: Option<EquipmentId>) -> ServiceResult<()> {
    let code = details.code.trim();
    let serial = details.serial_number.trim();
    for other in t.equipment.values().filter(|e| Some(e.id) != own) {
        if other.code == code {
            return Err(ServiceError::Conflict(format!("equipment code '{code}' already exists")));
        }
        if other.serial_number == serial {
            return Err(ServiceError::Conflict(format!("serial number '{serial}' already registered")));
        }
    }
    Ok(())
}

fn subcontractor_is_free(
    t: &Tables,
    details: &SubcontractorDetails,
    own: Option<SubcontractorId>,
) -> ServiceResult<()> {
    let code = details.code.trim();
    let tax_id = details.tax_id.trim();
    for other in t.subcontractors.values().filter(|s| Some(s.id) != own) {
        if other.code == code {
            return Err(ServiceError::Conflict(format!("subcontractor code '{code}' already exists")));
        }
        if other.tax_id == tax_id {
            return Err(ServiceError::Conflict(format!("tax id '{tax_id}' already registered")));
        }
    }
    Ok(())
}

fn payments_of(t: &Tables, assignment: AssignmentId) -> Vec<Payment> {
    t.payments
        .values()
        .filter(|p| p.assignment_id == assignment)
        .cloned()
        .collect()
}

fn items_of(t: &Tables, center: CostCenterId) -> Vec<CostItem> {
    t.cost_items
        .values()
        .filter(|i| i.cost_center_id == center)
        .cloned()
        .collect()
}

impl ResourceService {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }

    // -- equipment ---------------------------------------------------------

    #[instrument(skip(self, details, ctx), fields(code = %details.code), err)]
    pub fn create_equipment(&self, details: EquipmentDetails, ctx: &AuditContext) -> ServiceResult<Equipment> {
        self.store.transaction(|t| {
            equipment_code_is_free(t, &details, None)?;
            let equipment = Equipment::create(EquipmentId::generate(), details)?;
            t.put_equipment(equipment.clone())?;
            audit::created(t, ctx, &equipment)?;
            Ok(equipment)
        })
    }

    #[instrument(skip(self, details, ctx), err)]
    pub fn update_equipment(
        &self,
        id: EquipmentId,
        details: EquipmentDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<Equipment> {
        self.store.transaction(|t| {
            let before = fetch(&t.equipment, id, "equipment")?;
            equipment_code_is_free(t, &details, Some(id))?;
            let mut after = before.clone();
            after.update(details)?;
            t.put_equipment(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    #[instrument(skip(self, ctx), err)]
    pub fn set_equipment_status(
        &self,
        id: EquipmentId,
        status: EquipmentStatus,
        ctx: &AuditContext,
    ) -> ServiceResult<Equipment> {
        self.store.transaction(|t| {
            let before = fetch(&t.equipment, id, "equipment")?;
            let mut after = before.clone();
            after.set_status(status)?;
            t.put_equipment(after.clone())?;
            audit::stage(t, AuditAction::StatusChange, ctx, Some(&before), Some(&after))?;
            Ok(after)
        })
    }

    /// Delete equipment along with its maintenance, usage and transfer history.
    #[instrument(skip(self, ctx), err)]
    pub fn delete_equipment(&self, id: EquipmentId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let equipment = fetch(&t.equipment, id, "equipment")?;
            let maintenance: Vec<_> = t.maintenance.values().filter(|m| m.equipment_id == id).cloned().collect();
            for record in &maintenance {
                t.maintenance.remove(&record.id);
                audit::deleted(t, ctx, record)?;
            }
            let usage: Vec<_> = t.usage.values().filter(|u| u.equipment_id == id).cloned().collect();
            for record in &usage {
                t.usage.remove(&record.id);
                audit::deleted(t, ctx, record)?;
            }
            let transfers: Vec<_> = t.transfers.values().filter(|x| x.equipment_id == id).cloned().collect();
            for record in &transfers {
                t.transfers.remove(&record.id);
                audit::deleted(t, ctx, record)?;
            }
            t.equipment.remove(&id);
            audit::deleted(t, ctx, &equipment)
        })
    }

    pub fn get_equipment(&self, id: EquipmentId) -> ServiceResult<Equipment> {
        self.store.read(|t| fetch(&t.equipment, id, "equipment"))?
    }

    /// Equipment sorted by code, optionally only one status.
    pub fn list_equipment(&self, status: Option<EquipmentStatus>) -> ServiceResult<Vec<Equipment>> {
        let mut out = self.store.read(|t| {
            t.equipment
                .values()
                .filter(|e| status.is_none_or(|s| e.status() == s))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        out.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(out)
    }

    /// Open a maintenance record and take the equipment out of service.
    #[instrument(skip(self, details, ctx), err)]
    pub fn start_maintenance(
        &self,
        equipment_id: EquipmentId,
        details: MaintenanceDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<MaintenanceRecord> {
        self.store.transaction(|t| {
            let before = fetch(&t.equipment, equipment_id, "equipment")?;
            let record = MaintenanceRecord::schedule(MaintenanceId::generate(), equipment_id, details)?;
            let mut after = before.clone();
            after.start_maintenance()?;

            t.put_maintenance(record.clone())?;
            t.put_equipment(after.clone())?;
            audit::created(t, ctx, &record)?;
            audit::stage(t, AuditAction::StatusChange, ctx, Some(&before), Some(&after))?;
            Ok(record)
        })
    }

    /// Close a maintenance record. The equipment returns to service once no
    /// other record for it is still open.
    #[instrument(skip(self, ctx), err)]
    pub fn complete_maintenance(
        &self,
        id: MaintenanceId,
        on: NaiveDate,
        ctx: &AuditContext,
    ) -> ServiceResult<MaintenanceRecord> {
        self.store.transaction(|t| {
            let before = fetch(&t.maintenance, id, "maintenance record")?;
            let mut record = before.clone();
            record.complete(on)?;
            t.put_maintenance(record.clone())?;
            audit::updated(t, ctx, &before, &record)?;

            let still_open = t
                .maintenance
                .values()
                .any(|m| m.equipment_id == record.equipment_id && m.is_open());
            if !still_open {
                let before = fetch(&t.equipment, record.equipment_id, "equipment")?;
                let mut after = before.clone();
                after.finish_maintenance()?;
                t.put_equipment(after.clone())?;
                audit::stage(t, AuditAction::StatusChange, ctx, Some(&before), Some(&after))?;
            }
            Ok(record)
        })
    }

    pub fn maintenance_history(&self, equipment_id: EquipmentId) -> ServiceResult<Vec<MaintenanceRecord>> {
        let mut out = self.store.read(|t| {
            t.maintenance
                .values()
                .filter(|m| m.equipment_id == equipment_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        out.sort_by(|a, b| b.scheduled_date.cmp(&a.scheduled_date));
        Ok(out)
    }

    #[instrument(skip(self, details, ctx), fields(project_id = %details.project_id), err)]
    pub fn record_usage(
        &self,
        equipment_id: EquipmentId,
        details: UsageDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<EquipmentUsage> {
        self.store.transaction(|t| {
            let equipment = fetch(&t.equipment, equipment_id, "equipment")?;
            let usage = EquipmentUsage::record(UsageId::generate(), &equipment, details)?;
            t.put_usage(usage.clone())?;
            audit::created(t, ctx, &usage)?;
            Ok(usage)
        })
    }

    /// Total hours logged for `equipment_id` on `project_id`.
    pub fn hours_on_project(&self, equipment_id: EquipmentId, project_id: ProjectId) -> ServiceResult<Decimal> {
        Ok(self.store.read(|t| {
            t.usage
                .values()
                .filter(|u| u.equipment_id == equipment_id && u.project_id == project_id)
                .map(|u| u.hours_used)
                .sum()
        })?)
    }

    #[instrument(skip(self, details, ctx), fields(to = %details.to_location), err)]
    pub fn transfer_equipment(
        &self,
        equipment_id: EquipmentId,
        details: TransferDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<EquipmentTransfer> {
        let transfer = self.store.transaction(|t| {
            let before = fetch(&t.equipment, equipment_id, "equipment")?;
            let mut after = before.clone();
            let transfer = after.transfer(TransferId::generate(), details)?;
            t.put_equipment(after.clone())?;
            t.put_transfer(transfer.clone())?;
            audit::created(t, ctx, &transfer)?;
            audit::updated(t, ctx, &before, &after)?;
            Ok::<_, ServiceError>(transfer)
        })?;
        info!(%equipment_id, from = %transfer.from_location, to = %transfer.to_location, "equipment transferred");
        Ok(transfer)
    }

    // -- subcontractors ----------------------------------------------------

    #[instrument(skip(self, details, ctx), fields(code = %details.code), err)]
    pub fn create_subcontractor(
        &self,
        details: SubcontractorDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<Subcontractor> {
        self.store.transaction(|t| {
            subcontractor_is_free(t, &details, None)?;
            let sub = Subcontractor::create(SubcontractorId::generate(), details)?;
            t.put_subcontractor(sub.clone())?;
            audit::created(t, ctx, &sub)?;
            Ok(sub)
        })
    }

    #[instrument(skip(self, details, ctx), err)]
    pub fn update_subcontractor(
        &self,
        id: SubcontractorId,
        details: SubcontractorDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<Subcontractor> {
        self.store.transaction(|t| {
            let before = fetch(&t.subcontractors, id, "subcontractor")?;
            subcontractor_is_free(t, &details, Some(id))?;
            let mut after = before.clone();
            after.update(details)?;
            t.put_subcontractor(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    #[instrument(skip(self, ctx), err)]
    pub fn set_subcontractor_status(
        &self,
        id: SubcontractorId,
        status: SubcontractorStatus,
        ctx: &AuditContext,
    ) -> ServiceResult<Subcontractor> {
        self.store.transaction(|t| {
            let before = fetch(&t.subcontractors, id, "subcontractor")?;
            let mut after = before.clone();
            after.status = status;
            t.put_subcontractor(after.clone())?;
            audit::stage(t, AuditAction::StatusChange, ctx, Some(&before), Some(&after))?;
            Ok(after)
        })
    }

    /// Subcontractors with assignments on record cannot be deleted.
    #[instrument(skip(self, ctx), err)]
    pub fn delete_subcontractor(&self, id: SubcontractorId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let sub = fetch(&t.subcontractors, id, "subcontractor")?;
            if t.assignments.values().any(|a| a.subcontractor_id == id) {
                return Err(ServiceError::ReferentialIntegrity(format!(
                    "subcontractor '{}' has assignments",
                    sub.code
                )));
            }
            t.subcontractors.remove(&id);
            audit::deleted(t, ctx, &sub)
        })
    }

    pub fn get_subcontractor(&self, id: SubcontractorId) -> ServiceResult<Subcontractor> {
        self.store.read(|t| fetch(&t.subcontractors, id, "subcontractor"))?
    }

    pub fn list_subcontractors(&self) -> ServiceResult<Vec<Subcontractor>> {
        let mut out = self.store.read(|t| t.subcontractors.values().cloned().collect::<Vec<_>>())?;
        out.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(out)
    }

    #[instrument(skip(self, details, ctx), fields(project_id = %details.project_id), err)]
    pub fn assign_subcontractor(
        &self,
        subcontractor_id: SubcontractorId,
        details: AssignmentDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<Assignment> {
        self.store.transaction(|t| {
            let sub = fetch(&t.subcontractors, subcontractor_id, "subcontractor")?;
            let assignment = sub.assign(AssignmentId::generate(), details)?;
            t.put_assignment(assignment.clone())?;
            audit::created(t, ctx, &assignment)?;
            Ok(assignment)
        })
    }

    #[instrument(skip(self, details, ctx), err)]
    pub fn update_assignment(
        &self,
        id: AssignmentId,
        details: AssignmentDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<Assignment> {
        self.store.transaction(|t| {
            let before = fetch(&t.assignments, id, "assignment")?;
            let paid = before.paid_total(&payments_of(t, id));
            let mut after = before.clone();
            after.update(details, paid)?;
            t.put_assignment(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    #[instrument(skip(self, ctx), err)]
    pub fn set_assignment_status(
        &self,
        id: AssignmentId,
        status: AssignmentStatus,
        ctx: &AuditContext,
    ) -> ServiceResult<Assignment> {
        self.store.transaction(|t| {
            let before = fetch(&t.assignments, id, "assignment")?;
            let mut after = before.clone();
            after.set_status(status)?;
            t.put_assignment(after.clone())?;
            audit::stage(t, AuditAction::StatusChange, ctx, Some(&before), Some(&after))?;
            Ok(after)
        })
    }

    /// Record a payment. The running total may not exceed the contract.
    #[instrument(skip(self, details, ctx), fields(amount = %details.amount), err)]
    pub fn record_payment(
        &self,
        assignment_id: AssignmentId,
        details: PaymentDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<Payment> {
        self.store.transaction(|t| {
            let assignment = fetch(&t.assignments, assignment_id, "assignment")?;
            let payment = assignment.pay(PaymentId::generate(), details, &payments_of(t, assignment_id))?;
            t.put_payment(payment.clone())?;
            audit::created(t, ctx, &payment)?;
            Ok(payment)
        })
    }

    pub fn payments(&self, assignment_id: AssignmentId) -> ServiceResult<Vec<Payment>> {
        let mut out = self.store.read(|t| payments_of(t, assignment_id))?;
        out.sort_by_key(|p| p.payment_date);
        Ok(out)
    }

    /// Contract amount still unpaid.
    pub fn outstanding(&self, assignment_id: AssignmentId) -> ServiceResult<Decimal> {
        self.store.read(|t| {
            let assignment = fetch(&t.assignments, assignment_id, "assignment")?;
            Ok(assignment.outstanding(&payments_of(t, assignment_id)))
        })?
    }

    // -- cost centers ------------------------------------------------------

    pub fn create_cost_center(
        &self,
        project_id: ProjectId,
        name: &str,
        description: &str,
        budget: Decimal,
        ctx: &AuditContext,
    ) -> ServiceResult<CostCenter> {
        let center = CostCenter::create(CostCenterId::generate(), project_id, name, description, budget)?;
        self.store.transaction(|t| {
            t.put_cost_center(center.clone())?;
            audit::created(t, ctx, &center)?;
            Ok(center)
        })
    }

    pub fn update_cost_center(
        &self,
        id: CostCenterId,
        name: &str,
        description: &str,
        budget: Decimal,
        ctx: &AuditContext,
    ) -> ServiceResult<CostCenter> {
        self.store.transaction(|t| {
            let before = fetch(&t.cost_centers, id, "cost center")?;
            let mut after = before.clone();
            after.update(name, description, budget)?;
            t.put_cost_center(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    /// Delete a cost center together with its items.
    pub fn delete_cost_center(&self, id: CostCenterId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let center = fetch(&t.cost_centers, id, "cost center")?;
            for item in items_of(t, id) {
                t.cost_items.remove(&item.id);
                audit::deleted(t, ctx, &item)?;
            }
            t.cost_centers.remove(&id);
            audit::deleted(t, ctx, &center)
        })
    }

    pub fn add_cost_item(
        &self,
        center_id: CostCenterId,
        details: CostItemDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<CostItem> {
        let item = CostItem::create(CostItemId::generate(), center_id, details)?;
        self.store.transaction(|t| {
            t.put_cost_item(item.clone())?;
            audit::created(t, ctx, &item)?;
            Ok(item)
        })
    }

    pub fn update_cost_item(
        &self,
        id: CostItemId,
        details: CostItemDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<CostItem> {
        self.store.transaction(|t| {
            let before = fetch(&t.cost_items, id, "cost item")?;
            let mut after = before.clone();
            after.update(details)?;
            t.put_cost_item(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    pub fn delete_cost_item(&self, id: CostItemId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let item = fetch(&t.cost_items, id, "cost item")?;
            t.cost_items.remove(&id);
            audit::deleted(t, ctx, &item)
        })
    }

    pub fn cost_center_summary(&self, id: CostCenterId) -> ServiceResult<CostCenterSummary> {
        self.store.read(|t| {
            let center = fetch(&t.cost_centers, id, "cost center")?;
            let items = items_of(t, id);
            Ok(CostCenterSummary {
                budget: center.budget,
                spent: center.spent(&items),
                remaining: center.remaining(&items),
            })
        })?
    }

    pub fn list_cost_centers(&self, project_id: ProjectId) -> ServiceResult<Vec<CostCenter>> {
        let mut out = self.store.read(|t| {
            t.cost_centers
                .values()
                .filter(|c| c.project_id == project_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}
