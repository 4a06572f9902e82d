//! Cost centers and the cost items booked against them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildtrack_audit::{Auditable, FieldMap};
use buildtrack_core::{DomainResult, require_max_len, require_non_negative, require_text};
use buildtrack_projects::{CostType, ProjectId};

buildtrack_core::entity_id!(
    /// Cost center identifier.
    CostCenterId
);

buildtrack_core::entity_id!(
    /// Cost item identifier.
    CostItemId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCenter {
    pub id: CostCenterId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    pub budget: Decimal,
}

impl CostCenter {
    pub fn create(
        id: CostCenterId,
        project_id: ProjectId,
        name: &str,
        description: &str,
        budget: Decimal,
    ) -> DomainResult<Self> {
        let name = require_text("name", name)?;
        require_max_len("name", &name, 100)?;
        require_non_negative("budget", budget)?;
        Ok(Self {
            id,
            project_id,
            name,
            description: description.to_string(),
            budget,
        })
    }

    pub fn update(&mut self, name: &str, description: &str, budget: Decimal) -> DomainResult<()> {
        let name = require_text("name", name)?;
        require_max_len("name", &name, 100)?;
        require_non_negative("budget", budget)?;
        self.name = name;
        self.description = description.to_string();
        self.budget = budget;
        Ok(())
    }

    /// Sum of item totals booked against this center.
    pub fn spent<'a>(&self, items: impl IntoIterator<Item = &'a CostItem>) -> Decimal {
        items
            .into_iter()
            .filter(|i| i.cost_center_id == self.id)
            .map(CostItem::total_cost)
            .sum()
    }

    /// `budget − spent`; negative when over budget.
    pub fn remaining<'a>(&self, items: impl IntoIterator<Item = &'a CostItem>) -> Decimal {
        self.budget - self.spent(items)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostItemDetails {
    pub description: String,
    pub cost_type: CostType,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostItem {
    pub id: CostItemId,
    pub cost_center_id: CostCenterId,
    pub description: String,
    pub cost_type: CostType,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl CostItemDetails {
    fn validate(self) -> DomainResult<Self> {
        let description = require_text("description", &self.description)?;
        require_max_len("description", &description, 200)?;
        require_non_negative("quantity", self.quantity)?;
        require_non_negative("unit_price", self.unit_price)?;
        Ok(Self {
            description,
            ..self
        })
    }
}

impl CostItem {
    pub fn create(id: CostItemId, cost_center_id: CostCenterId, details: CostItemDetails) -> DomainResult<Self> {
        let d = details.validate()?;
        Ok(Self {
            id,
            cost_center_id,
            description: d.description,
            cost_type: d.cost_type,
            quantity: d.quantity,
            unit_price: d.unit_price,
        })
    }

    pub fn update(&mut self, details: CostItemDetails) -> DomainResult<()> {
        let d = details.validate()?;
        self.description = d.description;
        self.cost_type = d.cost_type;
        self.quantity = d.quantity;
        self.unit_price = d.unit_price;
        Ok(())
    }

    pub fn total_cost(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

crate::impl_entity!(CostCenter, CostCenterId);
crate::impl_entity!(CostItem, CostItemId);

impl Auditable for CostCenter {
    fn entity_type(&self) -> &'static str {
        "costcenter"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        self.name.clone()
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("project", self.project_id)
            .with("name", &self.name)
            .with("description", &self.description)
            .with("budget", self.budget)
    }
}

impl Auditable for CostItem {
    fn entity_type(&self) -> &'static str {
        "costitem"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{} - {:?}", self.description, self.cost_type)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("cost_center", self.cost_center_id)
            .with("description", &self.description)
            .with("cost_type", self.cost_type)
            .with("quantity", self.quantity)
            .with("unit_price", self.unit_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(center: CostCenterId, qty: Decimal, price: Decimal) -> CostItem {
        CostItem::create(
            CostItemId::generate(),
            center,
            CostItemDetails {
                description: "Scaffold hire".to_string(),
                cost_type: CostType::Equipment,
                quantity: qty,
                unit_price: price,
            },
        )
        .unwrap()
    }

    #[test]
    fn spent_and_remaining_only_count_own_items() {
        let center = CostCenter::create(
            CostCenterId::generate(),
            ProjectId::generate(),
            "Site setup",
            "",
            dec!(1000),
        )
        .unwrap();
        let items = vec![
            item(center.id, dec!(3), dec!(120.50)),
            item(center.id, dec!(2), dec!(200)),
            item(CostCenterId::generate(), dec!(100), dec!(100)),
        ];

        assert_eq!(center.spent(&items), dec!(761.50));
        assert_eq!(center.remaining(&items), dec!(238.50));
    }

    #[test]
    fn over_budget_center_has_negative_remaining() {
        let center =
            CostCenter::create(CostCenterId::generate(), ProjectId::generate(), "Roof", "", dec!(100)).unwrap();
        let items = vec![item(center.id, dec!(1), dec!(150))];
        assert_eq!(center.remaining(&items), dec!(-50));
    }

    #[test]
    fn negative_budget_is_rejected() {
        assert!(
            CostCenter::create(CostCenterId::generate(), ProjectId::generate(), "X", "", dec!(-1)).is_err()
        );
    }
}
