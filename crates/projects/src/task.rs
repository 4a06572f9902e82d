use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use buildtrack_audit::{Auditable, FieldMap};
use buildtrack_core::{
    DomainResult, Entity, Percent, UserId, require_date_order, require_max_len, require_text,
};

use crate::project::ProjectId;

buildtrack_core::entity_id!(
    /// Task identifier.
    TaskId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

/// Ordered from least to most pressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Planning-stage vs execution-stage work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPhase {
    Planning,
    #[default]
    Execution,
}

/// Editable task fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub title: String,
    pub description: String,
    pub assignee: Option<UserId>,
    pub priority: TaskPriority,
    pub phase: TaskPhase,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl TaskDetails {
    fn validate(&self) -> DomainResult<TaskDetails> {
        let title = require_text("title", &self.title)?;
        require_max_len("title", &title, 200)?;
        require_date_order("start_date", self.start_date, "due_date", self.due_date)?;
        Ok(TaskDetails {
            title,
            ..self.clone()
        })
    }
}

/// Work item belonging to exactly one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: String,
    pub assignee: Option<UserId>,
    pub priority: TaskPriority,
    pub phase: TaskPhase,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    status: TaskStatus,
    progress: Percent,
    completed_date: Option<NaiveDate>,
}

impl Task {
    pub fn create(
        id: TaskId,
        project_id: ProjectId,
        details: TaskDetails,
        status: TaskStatus,
        today: NaiveDate,
    ) -> DomainResult<Self> {
        let d = details.validate()?;
        let mut task = Self {
            id,
            project_id,
            title: d.title,
            description: d.description,
            assignee: d.assignee,
            priority: d.priority,
            phase: d.phase,
            start_date: d.start_date,
            due_date: d.due_date,
            status: TaskStatus::NotStarted,
            progress: Percent::ZERO,
            completed_date: None,
        };
        task.transition_status(status, today);
        Ok(task)
    }

    pub fn update(&mut self, details: TaskDetails) -> DomainResult<()> {
        let d = details.validate()?;
        self.title = d.title;
        self.description = d.description;
        self.assignee = d.assignee;
        self.priority = d.priority;
        self.phase = d.phase;
        self.start_date = d.start_date;
        self.due_date = d.due_date;
        Ok(())
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> Percent {
        self.progress
    }

    pub fn completed_date(&self) -> Option<NaiveDate> {
        self.completed_date
    }

    pub fn set_progress(&mut self, progress: Percent) {
        self.progress = progress;
    }

    /// Move to `status`. No transition guards: any status is reachable.
    ///
    /// Completing a task that has no completion date stamps `today` and forces
    /// progress to 100. Every non-completed status clears the completion date.
    pub fn transition_status(&mut self, status: TaskStatus, today: NaiveDate) {
        if status == TaskStatus::Completed {
            if self.completed_date.is_none() {
                self.completed_date = Some(today);
                self.progress = Percent::COMPLETE;
            }
        } else {
            self.completed_date = None;
        }
        self.status = status;
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !matches!(self.status, TaskStatus::Completed | TaskStatus::Cancelled) && today > self.due_date
    }
}

impl Entity for Task {
    type Id = TaskId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Auditable for Task {
    fn entity_type(&self) -> &'static str {
        "task"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        self.title.clone()
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("project", self.project_id)
            .with("title", &self.title)
            .with("description", &self.description)
            .with("assignee", self.assignee)
            .with("status", self.status)
            .with("priority", self.priority)
            .with("phase", self.phase)
            .with("progress", self.progress)
            .with("start_date", self.start_date)
            .with("due_date", self.due_date)
            .with("completed_date", self.completed_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn details() -> TaskDetails {
        TaskDetails {
            title: "Install rebar".to_string(),
            description: "Level 2".to_string(),
            assignee: None,
            priority: TaskPriority::High,
            phase: TaskPhase::Execution,
            start_date: date(2024, 3, 1),
            due_date: date(2024, 3, 15),
        }
    }

    fn task(status: TaskStatus) -> Task {
        Task::create(TaskId::generate(), ProjectId::generate(), details(), status, date(2024, 3, 1))
            .unwrap()
    }

    #[test]
    fn completing_stamps_today_and_forces_full_progress() {
        let mut t = task(TaskStatus::InProgress);
        t.set_progress(Percent::new(40).unwrap());

        t.transition_status(TaskStatus::Completed, date(2024, 3, 12));
        assert_eq!(t.status(), TaskStatus::Completed);
        assert_eq!(t.progress(), Percent::COMPLETE);
        assert_eq!(t.completed_date(), Some(date(2024, 3, 12)));
    }

    #[test]
    fn completing_again_keeps_original_date() {
        let mut t = task(TaskStatus::Completed);
        assert_eq!(t.completed_date(), Some(date(2024, 3, 1)));
        t.transition_status(TaskStatus::Completed, date(2024, 4, 1));
        assert_eq!(t.completed_date(), Some(date(2024, 3, 1)));
    }

    #[test]
    fn any_other_status_clears_completed_date() {
        for status in [
            TaskStatus::NotStarted,
            TaskStatus::InProgress,
            TaskStatus::OnHold,
            TaskStatus::Cancelled,
        ] {
            let mut t = task(TaskStatus::Completed);
            t.transition_status(status, date(2024, 3, 20));
            assert_eq!(t.completed_date(), None, "status {status:?}");
            assert_eq!(t.status(), status);
        }
    }

    #[test]
    fn reopened_task_restamps_on_next_completion() {
        let mut t = task(TaskStatus::Completed);
        t.transition_status(TaskStatus::InProgress, date(2024, 3, 5));
        t.set_progress(Percent::new(60).unwrap());
        t.transition_status(TaskStatus::Completed, date(2024, 3, 9));
        assert_eq!(t.completed_date(), Some(date(2024, 3, 9)));
        assert_eq!(t.progress(), Percent::COMPLETE);
    }

    #[test]
    fn due_before_start_is_rejected() {
        let mut d = details();
        d.due_date = date(2024, 2, 1);
        assert!(
            Task::create(TaskId::generate(), ProjectId::generate(), d, TaskStatus::NotStarted, date(2024, 1, 1))
                .is_err()
        );
    }

    #[test]
    fn priority_orders_urgent_highest() {
        assert!(TaskPriority::Urgent > TaskPriority::High);
        assert!(TaskPriority::Low < TaskPriority::Medium);
    }
}
