use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildtrack_audit::{Auditable, FieldMap};
use buildtrack_core::{
    DomainResult, Entity, Percent, UserId, require_date_order, require_max_len,
    require_non_negative, require_text,
};

use crate::planning::BudgetItem;
use crate::task::Task;

buildtrack_core::entity_id!(
    /// Project identifier.
    ProjectId
);

/// Project lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Ongoing,
    Paused,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn label(self) -> &'static str {
        match self {
            ProjectStatus::Planning => "Planning Phase",
            ProjectStatus::Ongoing => "Ongoing",
            ProjectStatus::Paused => "Paused",
            ProjectStatus::Completed => "Completed",
            ProjectStatus::Cancelled => "Cancelled",
        }
    }

    /// Completed or cancelled; closed projects are never overdue.
    pub fn is_closed(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }
}

/// Editable project fields (create + update payload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    pub code: String,
    pub name: String,
    pub location: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub planned_end_date: NaiveDate,
    pub total_budget: Decimal,
    pub manager: Option<UserId>,
}

impl ProjectDetails {
    fn validate(&self) -> DomainResult<ProjectDetails> {
        let code = require_text("code", &self.code)?;
        require_max_len("code", &code, 50)?;
        let name = require_text("name", &self.name)?;
        require_max_len("name", &name, 200)?;
        require_max_len("location", self.location.trim(), 200)?;
        require_date_order(
            "start_date",
            self.start_date,
            "planned_end_date",
            self.planned_end_date,
        )?;
        require_non_negative("total_budget", self.total_budget)?;

        Ok(ProjectDetails {
            code,
            name,
            location: self.location.trim().to_string(),
            description: self.description.clone(),
            ..self.clone()
        })
    }
}

/// Budget roll-up over a project's budget items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub total_budget: Decimal,
    pub estimated: Decimal,
    pub actual: Decimal,
    /// `actual - estimated`; positive means over estimate.
    pub variance: Decimal,
    /// `total_budget - actual`.
    pub remaining: Decimal,
}

/// Project: owns tasks, milestones, budget items, allocations and warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub code: String,
    pub name: String,
    pub location: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub planned_end_date: NaiveDate,
    pub total_budget: Decimal,
    pub manager: Option<UserId>,
    pub created_at: DateTime<Utc>,
    status: ProjectStatus,
    progress: Percent,
}

impl Project {
    pub fn create(
        id: ProjectId,
        details: ProjectDetails,
        status: ProjectStatus,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let d = details.validate()?;
        Ok(Self {
            id,
            code: d.code,
            name: d.name,
            location: d.location,
            description: d.description,
            start_date: d.start_date,
            planned_end_date: d.planned_end_date,
            total_budget: d.total_budget,
            manager: d.manager,
            created_at,
            status,
            progress: Percent::ZERO,
        })
    }

    /// Replace the editable fields. Status and progress are untouched.
    pub fn update(&mut self, details: ProjectDetails) -> DomainResult<()> {
        let d = details.validate()?;
        self.code = d.code;
        self.name = d.name;
        self.location = d.location;
        self.description = d.description;
        self.start_date = d.start_date;
        self.planned_end_date = d.planned_end_date;
        self.total_budget = d.total_budget;
        self.manager = d.manager;
        Ok(())
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    /// Any status is reachable from any other.
    pub fn change_status(&mut self, status: ProjectStatus) {
        self.status = status;
    }

    pub fn progress(&self) -> Percent {
        self.progress
    }

    /// Recompute progress as the truncating mean of this project's task progress.
    ///
    /// Tasks of other projects are ignored. With no tasks, progress is left as is.
    pub fn recompute_progress<'a>(&mut self, tasks: impl IntoIterator<Item = &'a Task>) -> Percent {
        let id = self.id;
        let own = tasks
            .into_iter()
            .filter(|t| t.project_id == id)
            .map(|t| t.progress());
        if let Some(avg) = average_progress(own) {
            self.progress = avg;
        }
        self.progress
    }

    /// `Σ actual_cost − Σ estimated_cost` over this project's budget items;
    /// a missing actual cost counts as zero.
    pub fn budget_variance<'a>(&self, items: impl IntoIterator<Item = &'a BudgetItem>) -> Decimal {
        self.budget_summary(items).variance
    }

    pub fn budget_summary<'a>(&self, items: impl IntoIterator<Item = &'a BudgetItem>) -> BudgetSummary {
        let (estimated, actual) = items
            .into_iter()
            .filter(|i| i.project_id == self.id)
            .fold((Decimal::ZERO, Decimal::ZERO), |(est, act), item| {
                (
                    est + item.estimated_cost,
                    act + item.actual_cost.unwrap_or(Decimal::ZERO),
                )
            });

        BudgetSummary {
            total_budget: self.total_budget,
            estimated,
            actual,
            variance: actual - estimated,
            remaining: self.total_budget - actual,
        }
    }

    /// Past its planned end date and not closed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_closed() && today > self.planned_end_date
    }
}

/// Truncating integer mean; `None` for an empty input.
pub fn average_progress(values: impl IntoIterator<Item = Percent>) -> Option<Percent> {
    let (sum, count) = values
        .into_iter()
        .fold((0u64, 0u64), |(sum, count), p| (sum + u64::from(p.value()), count + 1));
    if count == 0 {
        return None;
    }
    // Mean of values in 0..=100 stays in range.
    Percent::new((sum / count) as u8).ok()
}

impl Entity for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Auditable for Project {
    fn entity_type(&self) -> &'static str {
        "project"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("code", &self.code)
            .with("name", &self.name)
            .with("location", &self.location)
            .with("description", &self.description)
            .with("start_date", self.start_date)
            .with("planned_end_date", self.planned_end_date)
            .with("status", self.status)
            .with("progress", self.progress)
            .with("total_budget", self.total_budget)
            .with("manager", self.manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::{BudgetItemDetails, BudgetItemId, CostType};
    use crate::task::{TaskDetails, TaskId, TaskPhase, TaskPriority, TaskStatus};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn details() -> ProjectDetails {
        ProjectDetails {
            code: " PRJ-001 ".to_string(),
            name: "Riverside Tower".to_string(),
            location: "Dock Road".to_string(),
            description: String::new(),
            start_date: date(2024, 1, 1),
            planned_end_date: date(2024, 12, 31),
            total_budget: dec!(1000000),
            manager: None,
        }
    }

    fn project() -> Project {
        Project::create(ProjectId::generate(), details(), ProjectStatus::Planning, Utc::now()).unwrap()
    }

    fn task_with_progress(project_id: ProjectId, progress: u8) -> Task {
        let mut task = Task::create(
            TaskId::generate(),
            project_id,
            TaskDetails {
                title: "Pour slab".to_string(),
                description: String::new(),
                assignee: None,
                priority: TaskPriority::Medium,
                phase: TaskPhase::Execution,
                start_date: date(2024, 2, 1),
                due_date: date(2024, 2, 10),
            },
            TaskStatus::InProgress,
            date(2024, 2, 1),
        )
        .unwrap();
        task.set_progress(Percent::new(progress).unwrap());
        task
    }

    fn budget_item(project_id: ProjectId, estimated: Decimal, actual: Option<Decimal>) -> BudgetItem {
        BudgetItem::create(
            BudgetItemId::generate(),
            project_id,
            BudgetItemDetails {
                description: "Concrete".to_string(),
                cost_type: CostType::Material,
                estimated_cost: estimated,
                actual_cost: actual,
            },
        )
        .unwrap()
    }

    #[test]
    fn create_trims_code_and_starts_at_zero_progress() {
        let p = project();
        assert_eq!(p.code, "PRJ-001");
        assert_eq!(p.progress(), Percent::ZERO);
        assert_eq!(p.status(), ProjectStatus::Planning);
    }

    #[test]
    fn start_after_end_is_rejected() {
        let mut d = details();
        d.start_date = date(2025, 1, 1);
        assert!(Project::create(ProjectId::generate(), d, ProjectStatus::Planning, Utc::now()).is_err());
    }

    #[test]
    fn progress_is_truncating_mean_of_own_tasks() {
        let mut p = project();
        let other = ProjectId::generate();
        let tasks = vec![
            task_with_progress(p.id, 50),
            task_with_progress(p.id, 33),
            task_with_progress(p.id, 0),
            task_with_progress(other, 100),
        ];
        assert_eq!(p.recompute_progress(&tasks).value(), 27);
    }

    #[test]
    fn progress_unchanged_without_tasks() {
        let mut p = project();
        assert_eq!(p.recompute_progress(std::iter::empty::<&Task>()), Percent::ZERO);
    }

    #[test]
    fn budget_variance_treats_missing_actual_as_zero() {
        let p = project();
        let items = vec![
            budget_item(p.id, dec!(1000), Some(dec!(1200.50))),
            budget_item(p.id, dec!(500), None),
            budget_item(ProjectId::generate(), dec!(9999), Some(dec!(1))),
        ];
        assert_eq!(p.budget_variance(&items), dec!(-299.50));

        let summary = p.budget_summary(&items);
        assert_eq!(summary.estimated, dec!(1500));
        assert_eq!(summary.actual, dec!(1200.50));
        assert_eq!(summary.remaining, dec!(998799.50));
    }

    #[test]
    fn closed_projects_are_never_overdue() {
        let mut p = project();
        assert!(p.is_overdue(date(2025, 6, 1)));
        p.change_status(ProjectStatus::Completed);
        assert!(!p.is_overdue(date(2025, 6, 1)));
    }

    proptest! {
        #[test]
        fn average_progress_stays_within_bounds(values in prop::collection::vec(0u8..=100, 1..50)) {
            let avg = average_progress(values.iter().map(|v| Percent::new(*v).unwrap())).unwrap();
            let min = *values.iter().min().unwrap();
            let max = *values.iter().max().unwrap();
            prop_assert!(avg.value() >= min && avg.value() <= max);
        }
    }
}
