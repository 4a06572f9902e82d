//! Planning records owned by a project: milestones, budget items and
//! resource allocations.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildtrack_audit::{Auditable, FieldMap};
use buildtrack_core::{
    AggregateId, DomainError, DomainResult, Entity, Quantity, require_date_order,
    require_non_negative, require_text,
};

use crate::project::ProjectId;

buildtrack_core::entity_id!(
    /// Milestone identifier.
    MilestoneId
);

buildtrack_core::entity_id!(
    /// Budget line identifier.
    BudgetItemId
);

buildtrack_core::entity_id!(
    /// Resource allocation identifier.
    AllocationId
);

/// Cost classification shared by budget lines and cost items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostType {
    Material,
    Labor,
    Equipment,
    Subcontractor,
    Overhead,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneDetails {
    pub name: String,
    pub description: String,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    pub due_date: NaiveDate,
    pub achieved_on: Option<NaiveDate>,
}

impl Milestone {
    pub fn create(id: MilestoneId, project_id: ProjectId, details: MilestoneDetails) -> DomainResult<Self> {
        Ok(Self {
            id,
            project_id,
            name: require_text("name", &details.name)?,
            description: details.description,
            due_date: details.due_date,
            achieved_on: None,
        })
    }

    pub fn update(&mut self, details: MilestoneDetails) -> DomainResult<()> {
        self.name = require_text("name", &details.name)?;
        self.description = details.description;
        self.due_date = details.due_date;
        Ok(())
    }

    pub fn mark_achieved(&mut self, on: NaiveDate) {
        self.achieved_on = Some(on);
    }

    pub fn reopen(&mut self) {
        self.achieved_on = None;
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.achieved_on.is_none() && today > self.due_date
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetItemDetails {
    pub description: String,
    pub cost_type: CostType,
    pub estimated_cost: Decimal,
    pub actual_cost: Option<Decimal>,
}

/// Planned vs actual spend for one budget line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetItem {
    pub id: BudgetItemId,
    pub project_id: ProjectId,
    pub description: String,
    pub cost_type: CostType,
    pub estimated_cost: Decimal,
    pub actual_cost: Option<Decimal>,
}

impl BudgetItemDetails {
    fn validate(self) -> DomainResult<Self> {
        let description = require_text("description", &self.description)?;
        require_non_negative("estimated_cost", self.estimated_cost)?;
        if let Some(actual) = self.actual_cost {
            require_non_negative("actual_cost", actual)?;
        }
        Ok(Self {
            description,
            ..self
        })
    }
}

impl BudgetItem {
    pub fn create(id: BudgetItemId, project_id: ProjectId, details: BudgetItemDetails) -> DomainResult<Self> {
        let d = details.validate()?;
        Ok(Self {
            id,
            project_id,
            description: d.description,
            cost_type: d.cost_type,
            estimated_cost: d.estimated_cost,
            actual_cost: d.actual_cost,
        })
    }

    pub fn update(&mut self, details: BudgetItemDetails) -> DomainResult<()> {
        let d = details.validate()?;
        self.description = d.description;
        self.cost_type = d.cost_type;
        self.estimated_cost = d.estimated_cost;
        self.actual_cost = d.actual_cost;
        Ok(())
    }

    /// `actual − estimated`, with a missing actual counted as zero.
    pub fn variance(&self) -> Decimal {
        self.actual_cost.unwrap_or(Decimal::ZERO) - self.estimated_cost
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Material,
    Equipment,
    Labor,
    Subcontractor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAllocationDetails {
    pub kind: ResourceKind,
    /// Referenced material/equipment/subcontractor; `None` for labor.
    pub resource: Option<AggregateId>,
    pub planned_quantity: Quantity,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: String,
}

/// Planned use of a resource by a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub id: AllocationId,
    pub project_id: ProjectId,
    pub kind: ResourceKind,
    pub resource: Option<AggregateId>,
    pub planned_quantity: Quantity,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: String,
}

impl ResourceAllocationDetails {
    fn validate(&self) -> DomainResult<()> {
        if let Some(end) = self.end_date {
            require_date_order("start_date", self.start_date, "end_date", end)?;
        }
        match (self.kind, self.resource) {
            (ResourceKind::Labor, _) => Ok(()),
            (_, Some(_)) => Ok(()),
            (kind, None) => Err(DomainError::validation(format!(
                "{kind:?} allocation must reference a resource"
            ))),
        }
    }
}

impl ResourceAllocation {
    pub fn create(
        id: AllocationId,
        project_id: ProjectId,
        details: ResourceAllocationDetails,
    ) -> DomainResult<Self> {
        details.validate()?;
        Ok(Self {
            id,
            project_id,
            kind: details.kind,
            resource: details.resource,
            planned_quantity: details.planned_quantity,
            start_date: details.start_date,
            end_date: details.end_date,
            notes: details.notes,
        })
    }

    pub fn update(&mut self, details: ResourceAllocationDetails) -> DomainResult<()> {
        details.validate()?;
        self.kind = details.kind;
        self.resource = details.resource;
        self.planned_quantity = details.planned_quantity;
        self.start_date = details.start_date;
        self.end_date = details.end_date;
        self.notes = details.notes;
        Ok(())
    }
}

macro_rules! impl_entity {
    ($t:ty, $id:ty) => {
        impl Entity for $t {
            type Id = $id;

            fn id(&self) -> &Self::Id {
                &self.id
            }
        }
    };
}

impl_entity!(Milestone, MilestoneId);
impl_entity!(BudgetItem, BudgetItemId);
impl_entity!(ResourceAllocation, AllocationId);

impl Auditable for Milestone {
    fn entity_type(&self) -> &'static str {
        "milestone"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{} ({})", self.name, self.due_date)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("project", self.project_id)
            .with("name", &self.name)
            .with("description", &self.description)
            .with("due_date", self.due_date)
            .with("achieved_on", self.achieved_on)
    }
}

impl Auditable for BudgetItem {
    fn entity_type(&self) -> &'static str {
        "budgetitem"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{} - {:?}", self.description, self.cost_type)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("project", self.project_id)
            .with("description", &self.description)
            .with("cost_type", self.cost_type)
            .with("estimated_cost", self.estimated_cost)
            .with("actual_cost", self.actual_cost)
    }
}

impl Auditable for ResourceAllocation {
    fn entity_type(&self) -> &'static str {
        "resourceallocation"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{:?} x {}", self.kind, self.planned_quantity)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("project", self.project_id)
            .with("kind", self.kind)
            .with("resource", self.resource)
            .with("planned_quantity", self.planned_quantity)
            .with("start_date", self.start_date)
            .with("end_date", self.end_date)
            .with("notes", &self.notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn budget_line_rejects_negative_costs() {
        let details = BudgetItemDetails {
            description: "Formwork".to_string(),
            cost_type: CostType::Material,
            estimated_cost: dec!(100),
            actual_cost: Some(dec!(-1)),
        };
        assert!(BudgetItem::create(BudgetItemId::generate(), ProjectId::generate(), details).is_err());
    }

    #[test]
    fn budget_line_variance() {
        let item = BudgetItem::create(
            BudgetItemId::generate(),
            ProjectId::generate(),
            BudgetItemDetails {
                description: "Crane hire".to_string(),
                cost_type: CostType::Equipment,
                estimated_cost: dec!(4000),
                actual_cost: Some(dec!(4250.75)),
            },
        )
        .unwrap();
        assert_eq!(item.variance(), dec!(250.75));
    }

    #[test]
    fn milestone_overdue_until_achieved() {
        let mut m = Milestone::create(
            MilestoneId::generate(),
            ProjectId::generate(),
            MilestoneDetails {
                name: "Topping out".to_string(),
                description: String::new(),
                due_date: date(2024, 6, 30),
            },
        )
        .unwrap();
        assert!(m.is_overdue(date(2024, 7, 1)));
        m.mark_achieved(date(2024, 7, 2));
        assert!(!m.is_overdue(date(2024, 7, 3)));
    }

    #[test]
    fn equipment_allocation_needs_a_resource() {
        let details = ResourceAllocationDetails {
            kind: ResourceKind::Equipment,
            resource: None,
            planned_quantity: Quantity::new(dec!(40)).unwrap(),
            start_date: date(2024, 1, 1),
            end_date: None,
            notes: String::new(),
        };
        assert!(ResourceAllocation::create(AllocationId::generate(), ProjectId::generate(), details.clone()).is_err());

        let labor = ResourceAllocationDetails {
            kind: ResourceKind::Labor,
            ..details
        };
        assert!(ResourceAllocation::create(AllocationId::generate(), ProjectId::generate(), labor).is_ok());
    }
}
