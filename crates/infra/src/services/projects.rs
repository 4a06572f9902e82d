//! Project service: projects, tasks and the planning records they own.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, instrument};

use buildtrack_audit::{AuditAction, AuditContext};
use buildtrack_core::Percent;
use buildtrack_inventory::{StockTransaction, TransactionType};
use buildtrack_projects::{
    AllocationId, BudgetItem, BudgetItemDetails, BudgetItemId, BudgetSummary, Milestone,
    MilestoneDetails, MilestoneId, Project, ProjectDetails, ProjectId, ProjectStatus,
    ResourceAllocation, ResourceAllocationDetails, ResourceKind, Task, TaskDetails, TaskId,
    TaskStatus,
};
use buildtrack_inventory::MaterialId;
use buildtrack_resources::{EquipmentId, SubcontractorId};
use rust_decimal::Decimal;

use crate::error::{ServiceError, ServiceResult};
use crate::services::{audit, fetch, ledger};
use crate::store::{InMemoryStore, Tables};

#[derive(Debug, Clone)]
pub struct ProjectService {
    store: Arc<InMemoryStore>,
}

/// Recompute a project's progress from its tasks, auditing the change.
fn refresh_progress(t: &mut Tables, project_id: ProjectId, ctx: &AuditContext) -> ServiceResult<Percent> {
    let before = fetch(&t.projects, project_id, "project")?;
    let mut after = before.clone();
    let progress = after.recompute_progress(t.tasks.values());
    if after != before {
        t.put_project(after.clone())?;
        audit::updated(t, ctx, &before, &after)?;
    }
    Ok(progress)
}

fn code_is_free(t: &Tables, code: &str, own: Option<ProjectId>) -> ServiceResult<()> {
    let code = code.trim();
    if t.projects.values().any(|p| p.code == code && Some(p.id) != own) {
        Err(ServiceError::Conflict(format!("project code '{code}' already exists")))
    } else {
        Ok(())
    }
}

/// An allocation must point at an existing resource of its kind.
fn check_allocation_target(t: &Tables, details: &ResourceAllocationDetails) -> ServiceResult<()> {
    let Some(resource) = details.resource else {
        return Ok(());
    };
    let exists = match details.kind {
        ResourceKind::Material => t.materials.contains_key(&MaterialId::new(resource)),
        ResourceKind::Equipment => t.equipment.contains_key(&EquipmentId::new(resource)),
        ResourceKind::Subcontractor => t.subcontractors.contains_key(&SubcontractorId::new(resource)),
        ResourceKind::Labor => true,
    };
    if exists {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!("{:?} {resource} does not exist", details.kind)))
    }
}

impl ProjectService {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }

    // -- projects ----------------------------------------------------------

    #[instrument(skip(self, details, ctx), fields(code = %details.code), err)]
    pub fn create_project(
        &self,
        details: ProjectDetails,
        status: ProjectStatus,
        ctx: &AuditContext,
    ) -> ServiceResult<Project> {
        let project = Project::create(ProjectId::generate(), details, status, ctx.occurred_at)?;
        let project = self.store.transaction(|t| {
            code_is_free(t, &project.code, None)?;
            t.put_project(project.clone())?;
            audit::created(t, ctx, &project)?;
            Ok::<_, ServiceError>(project)
        })?;
        info!(project_id = %project.id, "project created");
        Ok(project)
    }

    #[instrument(skip(self, details, ctx), err)]
    pub fn update_project(&self, id: ProjectId, details: ProjectDetails, ctx: &AuditContext) -> ServiceResult<Project> {
        self.store.transaction(|t| {
            let before = fetch(&t.projects, id, "project")?;
            code_is_free(t, &details.code, Some(id))?;
            let mut after = before.clone();
            after.update(details)?;
            t.put_project(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    /// Status changes are audited as `STATUS_CHANGE`.
    #[instrument(skip(self, ctx), err)]
    pub fn change_status(&self, id: ProjectId, status: ProjectStatus, ctx: &AuditContext) -> ServiceResult<Project> {
        self.store.transaction(|t| {
            let before = fetch(&t.projects, id, "project")?;
            let mut after = before.clone();
            after.change_status(status);
            t.put_project(after.clone())?;
            audit::stage(t, AuditAction::StatusChange, ctx, Some(&before), Some(&after))?;
            Ok(after)
        })
    }

    /// Delete a project with everything it owns.
    ///
    /// The project's stock movements are reversed (consumptions first, so
    /// returned stock is available when its deliveries are backed out). The
    /// whole cascade fails if any reversal would drive a balance negative.
    #[instrument(skip(self, ctx), err)]
    pub fn delete_project(&self, id: ProjectId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let project = fetch(&t.projects, id, "project")?;

            let mut movements: Vec<StockTransaction> = t
                .transactions
                .values()
                .filter(|x| x.project_id == Some(id))
                .cloned()
                .collect();
            movements.sort_by_key(|x| (x.kind == TransactionType::Delivery, x.recorded_at));
            for txn in &movements {
                ledger::reverse_staged(t, txn, ctx)?;
            }

            let warehouses: Vec<_> = t
                .warehouses
                .values()
                .filter(|w| w.project_id == Some(id))
                .cloned()
                .collect();
            for w in &warehouses {
                if t.transactions.values().any(|x| x.warehouse_id == Some(w.id)) {
                    return Err(ServiceError::ReferentialIntegrity(format!(
                        "warehouse '{}' of project '{}' holds stock transactions of other projects",
                        w.code, project.code
                    )));
                }
                t.warehouses.remove(&w.id);
                audit::deleted(t, ctx, w)?;
            }

            cascade(t, ctx, id)?;
            t.projects.remove(&id);
            audit::deleted(t, ctx, &project)?;
            Ok(())
        })?;
        info!(project_id = %id, "project deleted");
        Ok(())
    }

    pub fn get_project(&self, id: ProjectId) -> ServiceResult<Project> {
        self.store.read(|t| fetch(&t.projects, id, "project"))?
    }

    pub fn list_projects(&self) -> ServiceResult<Vec<Project>> {
        let mut out = self.store.read(|t| t.projects.values().cloned().collect::<Vec<_>>())?;
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    /// Projects past their planned end date that are still open.
    pub fn overdue_projects(&self, today: NaiveDate) -> ServiceResult<Vec<Project>> {
        Ok(self.list_projects()?.into_iter().filter(|p| p.is_overdue(today)).collect())
    }

    /// Recompute and persist progress from the project's current tasks.
    #[instrument(skip(self, ctx), err)]
    pub fn recompute_progress(&self, id: ProjectId, ctx: &AuditContext) -> ServiceResult<Percent> {
        self.store.transaction(|t| refresh_progress(t, id, ctx))
    }

    // -- tasks -------------------------------------------------------------

    /// Insert or replace a task, then refresh the owning project's progress.
    #[instrument(skip(self, task, ctx), fields(task_id = %task.id, project_id = %task.project_id), err)]
    pub fn save_task(&self, task: Task, ctx: &AuditContext) -> ServiceResult<Task> {
        self.store.transaction(|t| {
            let previous = t.tasks.get(&task.id).cloned();
            if let Some(prev) = &previous {
                if prev.project_id != task.project_id {
                    return Err(ServiceError::Validation("a task cannot move between projects".to_string()));
                }
            }
            t.put_task(task.clone())?;
            match &previous {
                Some(before) => audit::updated(t, ctx, before, &task)?,
                None => audit::created(t, ctx, &task)?,
            }
            refresh_progress(t, task.project_id, ctx)?;
            Ok(task)
        })
    }

    pub fn create_task(
        &self,
        project_id: ProjectId,
        details: TaskDetails,
        status: TaskStatus,
        ctx: &AuditContext,
    ) -> ServiceResult<Task> {
        let task = Task::create(TaskId::generate(), project_id, details, status, ctx.today())?;
        self.save_task(task, ctx)
    }

    pub fn update_task(&self, id: TaskId, details: TaskDetails, ctx: &AuditContext) -> ServiceResult<Task> {
        let mut task = self.get_task(id)?;
        task.update(details)?;
        self.save_task(task, ctx)
    }

    /// Move a task to `status`; completion stamps today's date.
    pub fn transition_task(&self, id: TaskId, status: TaskStatus, ctx: &AuditContext) -> ServiceResult<Task> {
        let mut task = self.get_task(id)?;
        task.transition_status(status, ctx.today());
        self.save_task(task, ctx)
    }

    pub fn set_task_progress(&self, id: TaskId, progress: Percent, ctx: &AuditContext) -> ServiceResult<Task> {
        let mut task = self.get_task(id)?;
        task.set_progress(progress);
        self.save_task(task, ctx)
    }

    #[instrument(skip(self, ctx), err)]
    pub fn delete_task(&self, id: TaskId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let task = fetch(&t.tasks, id, "task")?;
            drop_task_records(t, ctx, id)?;
            t.tasks.remove(&id);
            audit::deleted(t, ctx, &task)?;
            refresh_progress(t, task.project_id, ctx)?;
            Ok(())
        })
    }

    pub fn get_task(&self, id: TaskId) -> ServiceResult<Task> {
        self.store.read(|t| fetch(&t.tasks, id, "task"))?
    }

    /// Tasks of a project, most pressing first, then by due date.
    pub fn list_tasks(&self, project_id: ProjectId) -> ServiceResult<Vec<Task>> {
        let mut out = self.store.read(|t| {
            t.tasks
                .values()
                .filter(|x| x.project_id == project_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.due_date.cmp(&b.due_date)));
        Ok(out)
    }

    // -- milestones --------------------------------------------------------

    pub fn add_milestone(
        &self,
        project_id: ProjectId,
        details: MilestoneDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<Milestone> {
        let milestone = Milestone::create(MilestoneId::generate(), project_id, details)?;
        self.store.transaction(|t| {
            t.put_milestone(milestone.clone())?;
            audit::created(t, ctx, &milestone)?;
            Ok(milestone)
        })
    }

    pub fn update_milestone(
        &self,
        id: MilestoneId,
        details: MilestoneDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<Milestone> {
        self.modify_milestone(id, ctx, |m| m.update(details).map_err(ServiceError::from))
    }

    pub fn mark_milestone_achieved(&self, id: MilestoneId, on: NaiveDate, ctx: &AuditContext) -> ServiceResult<Milestone> {
        self.modify_milestone(id, ctx, |m| {
            m.mark_achieved(on);
            Ok(())
        })
    }

    pub fn reopen_milestone(&self, id: MilestoneId, ctx: &AuditContext) -> ServiceResult<Milestone> {
        self.modify_milestone(id, ctx, |m| {
            m.reopen();
            Ok(())
        })
    }

    fn modify_milestone(
        &self,
        id: MilestoneId,
        ctx: &AuditContext,
        change: impl FnOnce(&mut Milestone) -> ServiceResult<()>,
    ) -> ServiceResult<Milestone> {
        self.store.transaction(|t| {
            let before = fetch(&t.milestones, id, "milestone")?;
            let mut after = before.clone();
            change(&mut after)?;
            t.put_milestone(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    pub fn delete_milestone(&self, id: MilestoneId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let milestone = fetch(&t.milestones, id, "milestone")?;
            t.milestones.remove(&id);
            audit::deleted(t, ctx, &milestone)
        })
    }

    pub fn list_milestones(&self, project_id: ProjectId) -> ServiceResult<Vec<Milestone>> {
        let mut out = self.store.read(|t| {
            t.milestones
                .values()
                .filter(|m| m.project_id == project_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        out.sort_by_key(|m| m.due_date);
        Ok(out)
    }

    // -- budget ------------------------------------------------------------

    pub fn add_budget_item(
        &self,
        project_id: ProjectId,
        details: BudgetItemDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<BudgetItem> {
        let item = BudgetItem::create(BudgetItemId::generate(), project_id, details)?;
        self.store.transaction(|t| {
            t.put_budget_item(item.clone())?;
            audit::created(t, ctx, &item)?;
            Ok(item)
        })
    }

    pub fn update_budget_item(
        &self,
        id: BudgetItemId,
        details: BudgetItemDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<BudgetItem> {
        self.store.transaction(|t| {
            let before = fetch(&t.budget_items, id, "budget item")?;
            let mut after = before.clone();
            after.update(details)?;
            t.put_budget_item(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    pub fn delete_budget_item(&self, id: BudgetItemId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let item = fetch(&t.budget_items, id, "budget item")?;
            t.budget_items.remove(&id);
            audit::deleted(t, ctx, &item)
        })
    }

    pub fn budget_summary(&self, project_id: ProjectId) -> ServiceResult<BudgetSummary> {
        self.store.read(|t| {
            let project = fetch(&t.projects, project_id, "project")?;
            Ok(project.budget_summary(t.budget_items.values()))
        })?
    }

    /// `Σ actual − Σ estimated` over the project's budget items.
    pub fn budget_variance(&self, project_id: ProjectId) -> ServiceResult<Decimal> {
        Ok(self.budget_summary(project_id)?.variance)
    }

    // -- resource allocations ----------------------------------------------

    pub fn allocate_resource(
        &self,
        project_id: ProjectId,
        details: ResourceAllocationDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<ResourceAllocation> {
        let allocation = ResourceAllocation::create(AllocationId::generate(), project_id, details.clone())?;
        self.store.transaction(|t| {
            check_allocation_target(t, &details)?;
            t.put_allocation(allocation.clone())?;
            audit::created(t, ctx, &allocation)?;
            Ok(allocation)
        })
    }

    pub fn update_allocation(
        &self,
        id: AllocationId,
        details: ResourceAllocationDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<ResourceAllocation> {
        self.store.transaction(|t| {
            let before = fetch(&t.allocations, id, "resource allocation")?;
            check_allocation_target(t, &details)?;
            let mut after = before.clone();
            after.update(details)?;
            t.put_allocation(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    pub fn delete_allocation(&self, id: AllocationId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let allocation = fetch(&t.allocations, id, "resource allocation")?;
            t.allocations.remove(&id);
            audit::deleted(t, ctx, &allocation)
        })
    }

    pub fn list_allocations(&self, project_id: ProjectId) -> ServiceResult<Vec<ResourceAllocation>> {
        Ok(self.store.read(|t| {
            t.allocations
                .values()
                .filter(|a| a.project_id == project_id)
                .cloned()
                .collect()
        })?)
    }
}

/// Remove the usage records and subcontractor assignments (with their
/// payments) booked against a task being deleted, auditing each delete.
fn drop_task_records(t: &mut Tables, ctx: &AuditContext, task_id: TaskId) -> ServiceResult<()> {
    let usage: Vec<_> = t.usage.values().filter(|u| u.task_id == Some(task_id)).cloned().collect();
    for row in &usage {
        t.usage.remove(&row.id);
        audit::deleted(t, ctx, row)?;
    }

    let assignments: Vec<_> = t
        .assignments
        .values()
        .filter(|a| a.task_id == Some(task_id))
        .cloned()
        .collect();
    for job in &assignments {
        let payments: Vec<_> = t
            .payments
            .values()
            .filter(|p| p.assignment_id == job.id)
            .cloned()
            .collect();
        for payment in &payments {
            t.payments.remove(&payment.id);
            audit::deleted(t, ctx, payment)?;
        }
        t.assignments.remove(&job.id);
        audit::deleted(t, ctx, job)?;
    }
    Ok(())
}

/// Remove every record owned by `project_id` (except warehouses and stock
/// movements, handled by the caller), auditing each delete.
fn cascade(t: &mut Tables, ctx: &AuditContext, project_id: ProjectId) -> ServiceResult<()> {
    macro_rules! drain {
        ($table:ident, $pred:expr) => {{
            let doomed: Vec<_> = t.$table.values().filter($pred).cloned().collect();
            for row in &doomed {
                t.$table.remove(&row.id);
                audit::deleted(t, ctx, row)?;
            }
            doomed
        }};
    }

    drain!(tasks, |x| x.project_id == project_id);
    drain!(milestones, |x| x.project_id == project_id);
    drain!(budget_items, |x| x.project_id == project_id);
    drain!(allocations, |x| x.project_id == project_id);
    drain!(usage, |x| x.project_id == project_id);

    let assignments = drain!(assignments, |x| x.project_id == project_id);
    let assignment_ids: Vec<_> = assignments.iter().map(|a| a.id).collect();
    drain!(payments, |x| assignment_ids.contains(&x.assignment_id));

    let centers = drain!(cost_centers, |x| x.project_id == project_id);
    let center_ids: Vec<_> = centers.iter().map(|c| c.id).collect();
    drain!(cost_items, |x| center_ids.contains(&x.cost_center_id));
    Ok(())
}
