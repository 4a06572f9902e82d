//! Projects module: projects and the records they own (tasks, milestones,
//! budget items, resource allocations), plus the aggregates derived from them.
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod planning;
pub mod project;
pub mod task;

pub use planning::{
    AllocationId, BudgetItem, BudgetItemDetails, BudgetItemId, CostType, Milestone,
    MilestoneDetails, MilestoneId, ResourceAllocation, ResourceAllocationDetails, ResourceKind,
};
pub use project::{BudgetSummary, Project, ProjectDetails, ProjectId, ProjectStatus, average_progress};
pub use task::{Task, TaskDetails, TaskId, TaskPhase, TaskPriority, TaskStatus};
