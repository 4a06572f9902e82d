//! Material catalog reference data: categories, subcategories, units,
//! warehouses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildtrack_audit::{Auditable, FieldMap};
use buildtrack_core::{
    DomainError, DomainResult, Entity, UserId, require_max_len, require_positive, require_text,
};
use buildtrack_projects::ProjectId;

buildtrack_core::entity_id!(
    /// Material category identifier.
    CategoryId
);

buildtrack_core::entity_id!(
    /// Material subcategory identifier.
    SubcategoryId
);

buildtrack_core::entity_id!(
    /// Warehouse identifier.
    WarehouseId
);

/// Unit of measure for a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitOfMeasure {
    Kg,
    L,
    M,
    M2,
    M3,
    Unit,
    Bag,
}

impl UnitOfMeasure {
    pub fn symbol(self) -> &'static str {
        match self {
            UnitOfMeasure::Kg => "KG",
            UnitOfMeasure::L => "L",
            UnitOfMeasure::M => "M",
            UnitOfMeasure::M2 => "M2",
            UnitOfMeasure::M3 => "M3",
            UnitOfMeasure::Unit => "UNIT",
            UnitOfMeasure::Bag => "BAG",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UnitOfMeasure::Kg => "Kilogram",
            UnitOfMeasure::L => "Liter",
            UnitOfMeasure::M => "Meter",
            UnitOfMeasure::M2 => "Square Meter",
            UnitOfMeasure::M3 => "Cubic Meter",
            UnitOfMeasure::Unit => "Unit",
            UnitOfMeasure::Bag => "Bag",
        }
    }
}

impl core::str::FromStr for UnitOfMeasure {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KG" => Ok(UnitOfMeasure::Kg),
            "L" => Ok(UnitOfMeasure::L),
            "M" => Ok(UnitOfMeasure::M),
            "M2" => Ok(UnitOfMeasure::M2),
            "M3" => Ok(UnitOfMeasure::M3),
            "UNIT" => Ok(UnitOfMeasure::Unit),
            "BAG" => Ok(UnitOfMeasure::Bag),
            other => Err(DomainError::validation(format!("unknown unit of measure '{other}'"))),
        }
    }
}

impl core::fmt::Display for UnitOfMeasure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCategory {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    pub parent: Option<CategoryId>,
}

impl MaterialCategory {
    pub fn create(
        id: CategoryId,
        name: &str,
        description: &str,
        parent: Option<CategoryId>,
    ) -> DomainResult<Self> {
        let name = require_text("name", name)?;
        require_max_len("name", &name, 100)?;
        Ok(Self {
            id,
            name,
            description: description.to_string(),
            parent,
        })
    }

    pub fn rename(&mut self, name: &str, description: &str) -> DomainResult<()> {
        let name = require_text("name", name)?;
        require_max_len("name", &name, 100)?;
        self.name = name;
        self.description = description.to_string();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSubcategory {
    pub id: SubcategoryId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
}

impl MaterialSubcategory {
    pub fn create(
        id: SubcategoryId,
        category_id: CategoryId,
        name: &str,
        description: &str,
    ) -> DomainResult<Self> {
        let name = require_text("name", name)?;
        require_max_len("name", &name, 100)?;
        Ok(Self {
            id,
            category_id,
            name,
            description: description.to_string(),
        })
    }

    pub fn update(&mut self, category_id: CategoryId, name: &str, description: &str) -> DomainResult<()> {
        let name = require_text("name", name)?;
        require_max_len("name", &name, 100)?;
        self.category_id = category_id;
        self.name = name;
        self.description = description.to_string();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseDetails {
    pub code: String,
    pub name: String,
    pub location: String,
    /// Square or cubic meters.
    pub capacity: Decimal,
    pub manager: Option<UserId>,
    pub description: String,
    pub project_id: Option<ProjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub code: String,
    pub name: String,
    pub location: String,
    pub capacity: Decimal,
    pub manager: Option<UserId>,
    pub description: String,
    pub project_id: Option<ProjectId>,
    pub is_active: bool,
}

impl WarehouseDetails {
    fn validate(self) -> DomainResult<Self> {
        let code = require_text("code", &self.code)?;
        require_max_len("code", &code, 50)?;
        let name = require_text("name", &self.name)?;
        require_positive("capacity", self.capacity)?;
        Ok(Self { code, name, ..self })
    }
}

impl Warehouse {
    pub fn create(id: WarehouseId, details: WarehouseDetails) -> DomainResult<Self> {
        let d = details.validate()?;
        Ok(Self {
            id,
            code: d.code,
            name: d.name,
            location: d.location,
            capacity: d.capacity,
            manager: d.manager,
            description: d.description,
            project_id: d.project_id,
            is_active: true,
        })
    }

    pub fn update(&mut self, details: WarehouseDetails) -> DomainResult<()> {
        let d = details.validate()?;
        self.code = d.code;
        self.name = d.name;
        self.location = d.location;
        self.capacity = d.capacity;
        self.manager = d.manager;
        self.description = d.description;
        self.project_id = d.project_id;
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn activate(&mut self) {
        self.is_active = true;
    }
}

impl Entity for MaterialCategory {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for MaterialSubcategory {
    type Id = SubcategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Auditable for MaterialCategory {
    fn entity_type(&self) -> &'static str {
        "materialcategory"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        self.name.clone()
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("name", &self.name)
            .with("description", &self.description)
            .with("parent", self.parent)
    }
}

impl Auditable for MaterialSubcategory {
    fn entity_type(&self) -> &'static str {
        "materialsubcategory"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        self.name.clone()
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("category", self.category_id)
            .with("name", &self.name)
            .with("description", &self.description)
    }
}

impl Auditable for Warehouse {
    fn entity_type(&self) -> &'static str {
        "warehouse"
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
            .with("capacity", self.capacity)
            .with("manager", self.manager)
            .with("description", &self.description)
            .with("project", self.project_id)
            .with("is_active", self.is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn unit_serializes_as_symbol() {
        assert_eq!(serde_json::to_string(&UnitOfMeasure::M3).unwrap(), "\"M3\"");
        assert_eq!(serde_json::to_string(&UnitOfMeasure::Kg).unwrap(), "\"KG\"");
        assert_eq!(UnitOfMeasure::Bag.label(), "Bag");
        assert_eq!("M2".parse::<UnitOfMeasure>().unwrap(), UnitOfMeasure::M2);
        assert!("TON".parse::<UnitOfMeasure>().is_err());
    }

    #[test]
    fn category_name_is_required() {
        assert!(MaterialCategory::create(CategoryId::generate(), "  ", "", None).is_err());
    }

    #[test]
    fn warehouse_capacity_must_be_positive() {
        let details = WarehouseDetails {
            code: "WH-1".to_string(),
            name: "Main yard".to_string(),
            location: "North gate".to_string(),
            capacity: Decimal::ZERO,
            manager: None,
            description: String::new(),
            project_id: None,
        };
        assert!(Warehouse::create(WarehouseId::generate(), details.clone()).is_err());

        let ok = Warehouse::create(
            WarehouseId::generate(),
            WarehouseDetails {
                capacity: dec!(250),
                ..details
            },
        )
        .unwrap();
        assert!(ok.is_active);
    }
}
