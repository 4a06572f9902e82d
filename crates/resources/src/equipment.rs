//! Equipment fleet: machines, their maintenance, project usage and transfers
//! between sites.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildtrack_audit::{Auditable, FieldMap};
use buildtrack_core::{
    DomainError, DomainResult, UserId, require_date_order, require_max_len,
    require_non_negative, require_text,
};
use buildtrack_projects::{ProjectId, TaskId};

buildtrack_core::entity_id!(
    /// Equipment identifier.
    EquipmentId
);

buildtrack_core::entity_id!(
    /// Maintenance record identifier.
    MaintenanceId
);

buildtrack_core::entity_id!(
    /// Usage record identifier.
    UsageId
);

buildtrack_core::entity_id!(
    /// Transfer record identifier.
    TransferId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentStatus {
    #[default]
    Available,
    InUse,
    Maintenance,
    Repair,
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceType {
    Preventive,
    Corrective,
    Inspection,
    Calibration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentDetails {
    pub code: String,
    pub name: String,
    pub description: String,
    pub equipment_type: String,
    pub manufacturer: String,
    pub model_number: String,
    pub serial_number: String,
    pub purchase_date: NaiveDate,
    pub purchase_cost: Decimal,
    pub current_location: String,
    pub notes: String,
}

impl EquipmentDetails {
    fn validate(self) -> DomainResult<Self> {
        let code = require_text("code", &self.code)?;
        require_max_len("code", &code, 50)?;
        let name = require_text("name", &self.name)?;
        require_max_len("name", &name, 200)?;
        let serial_number = require_text("serial_number", &self.serial_number)?;
        require_max_len("serial_number", &serial_number, 100)?;
        let current_location = require_text("current_location", &self.current_location)?;
        require_non_negative("purchase_cost", self.purchase_cost)?;
        Ok(Self {
            code,
            name,
            serial_number,
            current_location,
            ..self
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub code: String,
    pub name: String,
    pub description: String,
    pub equipment_type: String,
    pub manufacturer: String,
    pub model_number: String,
    pub serial_number: String,
    pub purchase_date: NaiveDate,
    pub purchase_cost: Decimal,
    pub current_location: String,
    pub notes: String,
    status: EquipmentStatus,
}

impl Equipment {
    pub fn create(id: EquipmentId, details: EquipmentDetails) -> DomainResult<Self> {
        let d = details.validate()?;
        Ok(Self {
            id,
            code: d.code,
            name: d.name,
            description: d.description,
            equipment_type: d.equipment_type,
            manufacturer: d.manufacturer,
            model_number: d.model_number,
            serial_number: d.serial_number,
            purchase_date: d.purchase_date,
            purchase_cost: d.purchase_cost,
            current_location: d.current_location,
            notes: d.notes,
            status: EquipmentStatus::Available,
        })
    }

    pub fn update(&mut self, details: EquipmentDetails) -> DomainResult<()> {
        let d = details.validate()?;
        self.code = d.code;
        self.name = d.name;
        self.description = d.description;
        self.equipment_type = d.equipment_type;
        self.manufacturer = d.manufacturer;
        self.model_number = d.model_number;
        self.serial_number = d.serial_number;
        self.purchase_date = d.purchase_date;
        self.purchase_cost = d.purchase_cost;
        self.current_location = d.current_location;
        self.notes = d.notes;
        Ok(())
    }

    pub fn status(&self) -> EquipmentStatus {
        self.status
    }

    /// Retired equipment stays retired.
    pub fn set_status(&mut self, status: EquipmentStatus) -> DomainResult<()> {
        if self.status == EquipmentStatus::Retired && status != EquipmentStatus::Retired {
            return Err(DomainError::invariant("retired equipment cannot be reactivated"));
        }
        self.status = status;
        Ok(())
    }

    pub fn start_maintenance(&mut self) -> DomainResult<()> {
        self.set_status(EquipmentStatus::Maintenance)
    }

    /// Back to service after maintenance completes.
    pub fn finish_maintenance(&mut self) -> DomainResult<()> {
        if self.status == EquipmentStatus::Maintenance {
            self.status = EquipmentStatus::Available;
        }
        Ok(())
    }

    /// Move the equipment to `details.to_location`, returning the transfer record.
    pub fn transfer(&mut self, id: TransferId, details: TransferDetails) -> DomainResult<EquipmentTransfer> {
        if self.status == EquipmentStatus::Retired {
            return Err(DomainError::invariant("retired equipment cannot be transferred"));
        }
        let to_location = require_text("to_location", &details.to_location)?;
        if to_location == self.current_location {
            return Err(DomainError::validation(
                "to_location must differ from the current location",
            ));
        }

        let transfer = EquipmentTransfer {
            id,
            equipment_id: self.id,
            from_location: self.current_location.clone(),
            to_location: to_location.clone(),
            transfer_date: details.transfer_date,
            reason: require_text("reason", &details.reason)?,
            transferred_by: details.transferred_by,
            received_by: details.received_by,
            notes: details.notes,
        };
        self.current_location = to_location;
        Ok(transfer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceDetails {
    pub kind: MaintenanceType,
    pub description: String,
    pub scheduled_date: NaiveDate,
    pub cost: Decimal,
    pub performed_by: UserId,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: MaintenanceId,
    pub equipment_id: EquipmentId,
    pub kind: MaintenanceType,
    pub description: String,
    pub scheduled_date: NaiveDate,
    pub completed_date: Option<NaiveDate>,
    pub cost: Decimal,
    pub performed_by: UserId,
    pub notes: String,
}

impl MaintenanceRecord {
    pub fn schedule(id: MaintenanceId, equipment_id: EquipmentId, details: MaintenanceDetails) -> DomainResult<Self> {
        require_non_negative("cost", details.cost)?;
        Ok(Self {
            id,
            equipment_id,
            kind: details.kind,
            description: require_text("description", &details.description)?,
            scheduled_date: details.scheduled_date,
            completed_date: None,
            cost: details.cost,
            performed_by: details.performed_by,
            notes: details.notes,
        })
    }

    pub fn complete(&mut self, on: NaiveDate) -> DomainResult<()> {
        require_date_order("scheduled_date", self.scheduled_date, "completed_date", on)?;
        self.completed_date = Some(on);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.completed_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDetails {
    pub project_id: ProjectId,
    pub task_id: Option<TaskId>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub hours_used: Decimal,
    pub operator: UserId,
    pub notes: String,
}

/// Equipment hours booked against a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentUsage {
    pub id: UsageId,
    pub equipment_id: EquipmentId,
    pub project_id: ProjectId,
    pub task_id: Option<TaskId>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub hours_used: Decimal,
    pub operator: UserId,
    pub notes: String,
}

impl EquipmentUsage {
    pub fn record(id: UsageId, equipment: &Equipment, details: UsageDetails) -> DomainResult<Self> {
        if equipment.status() == EquipmentStatus::Retired {
            return Err(DomainError::invariant("retired equipment cannot be used"));
        }
        if let Some(end) = details.end_date {
            require_date_order("start_date", details.start_date, "end_date", end)?;
        }
        require_non_negative("hours_used", details.hours_used)?;
        Ok(Self {
            id,
            equipment_id: equipment.id,
            project_id: details.project_id,
            task_id: details.task_id,
            start_date: details.start_date,
            end_date: details.end_date,
            hours_used: details.hours_used,
            operator: details.operator,
            notes: details.notes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDetails {
    pub to_location: String,
    pub transfer_date: NaiveDate,
    pub reason: String,
    pub transferred_by: UserId,
    pub received_by: UserId,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentTransfer {
    pub id: TransferId,
    pub equipment_id: EquipmentId,
    pub from_location: String,
    pub to_location: String,
    pub transfer_date: NaiveDate,
    pub reason: String,
    pub transferred_by: UserId,
    pub received_by: UserId,
    pub notes: String,
}

crate::impl_entity!(Equipment, EquipmentId);
crate::impl_entity!(MaintenanceRecord, MaintenanceId);
crate::impl_entity!(EquipmentUsage, UsageId);
crate::impl_entity!(EquipmentTransfer, TransferId);

impl Auditable for Equipment {
    fn entity_type(&self) -> &'static str {
        "equipment"
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
            .with("description", &self.description)
            .with("equipment_type", &self.equipment_type)
            .with("manufacturer", &self.manufacturer)
            .with("model_number", &self.model_number)
            .with("serial_number", &self.serial_number)
            .with("purchase_date", self.purchase_date)
            .with("purchase_cost", self.purchase_cost)
            .with("status", self.status)
            .with("current_location", &self.current_location)
            .with("notes", &self.notes)
    }
}

impl Auditable for MaintenanceRecord {
    fn entity_type(&self) -> &'static str {
        "equipmentmaintenance"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{:?} - {}", self.kind, self.scheduled_date)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("equipment", self.equipment_id)
            .with("maintenance_type", self.kind)
            .with("description", &self.description)
            .with("scheduled_date", self.scheduled_date)
            .with("completed_date", self.completed_date)
            .with("cost", self.cost)
            .with("performed_by", self.performed_by)
            .with("notes", &self.notes)
    }
}

impl Auditable for EquipmentUsage {
    fn entity_type(&self) -> &'static str {
        "equipmentusage"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{} h from {}", self.hours_used, self.start_date)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("equipment", self.equipment_id)
            .with("project", self.project_id)
            .with("task", self.task_id)
            .with("start_date", self.start_date)
            .with("end_date", self.end_date)
            .with("hours_used", self.hours_used)
            .with("operator", self.operator)
            .with("notes", &self.notes)
    }
}

impl Auditable for EquipmentTransfer {
    fn entity_type(&self) -> &'static str {
        "equipmenttransfer"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{} -> {}", self.from_location, self.to_location)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("equipment", self.equipment_id)
            .with("from_location", &self.from_location)
            .with("to_location", &self.to_location)
            .with("transfer_date", self.transfer_date)
            .with("reason", &self.reason)
            .with("transferred_by", self.transferred_by)
            .with("received_by", self.received_by)
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

    fn excavator() -> Equipment {
        Equipment::create(
            EquipmentId::generate(),
            EquipmentDetails {
                code: "EX-07".to_string(),
                name: "Excavator".to_string(),
                description: String::new(),
                equipment_type: "Earthmoving".to_string(),
                manufacturer: "Komatsu".to_string(),
                model_number: "PC210".to_string(),
                serial_number: "KMT-5521".to_string(),
                purchase_date: date(2021, 5, 4),
                purchase_cost: dec!(185000),
                current_location: "Depot".to_string(),
                notes: String::new(),
            },
        )
        .unwrap()
    }

    fn transfer_to(location: &str) -> TransferDetails {
        TransferDetails {
            to_location: location.to_string(),
            transfer_date: date(2024, 2, 1),
            reason: "Foundation works".to_string(),
            transferred_by: UserId::new(),
            received_by: UserId::new(),
            notes: String::new(),
        }
    }

    #[test]
    fn transfer_moves_current_location() {
        let mut eq = excavator();
        let t = eq.transfer(TransferId::generate(), transfer_to("Site B")).unwrap();
        assert_eq!(t.from_location, "Depot");
        assert_eq!(t.to_location, "Site B");
        assert_eq!(eq.current_location, "Site B");
    }

    #[test]
    fn transfer_to_same_location_is_rejected() {
        let mut eq = excavator();
        assert!(eq.transfer(TransferId::generate(), transfer_to("Depot")).is_err());
    }

    #[test]
    fn maintenance_cycle_returns_to_available() {
        let mut eq = excavator();
        eq.start_maintenance().unwrap();
        assert_eq!(eq.status(), EquipmentStatus::Maintenance);
        eq.finish_maintenance().unwrap();
        assert_eq!(eq.status(), EquipmentStatus::Available);
    }

    #[test]
    fn retired_equipment_is_frozen() {
        let mut eq = excavator();
        eq.set_status(EquipmentStatus::Retired).unwrap();
        assert!(eq.start_maintenance().is_err());
        assert!(eq.transfer(TransferId::generate(), transfer_to("Site C")).is_err());
    }

    #[test]
    fn maintenance_completion_cannot_precede_schedule() {
        let mut rec = MaintenanceRecord::schedule(
            MaintenanceId::generate(),
            EquipmentId::generate(),
            MaintenanceDetails {
                kind: MaintenanceType::Preventive,
                description: "500h service".to_string(),
                scheduled_date: date(2024, 3, 10),
                cost: dec!(1200),
                performed_by: UserId::new(),
                notes: String::new(),
            },
        )
        .unwrap();
        assert!(rec.complete(date(2024, 3, 9)).is_err());
        rec.complete(date(2024, 3, 11)).unwrap();
        assert!(!rec.is_open());
    }

    #[test]
    fn usage_hours_cannot_be_negative() {
        let eq = excavator();
        let details = UsageDetails {
            project_id: ProjectId::generate(),
            task_id: None,
            start_date: date(2024, 1, 1),
            end_date: None,
            hours_used: dec!(-2),
            operator: UserId::new(),
            notes: String::new(),
        };
        assert!(EquipmentUsage::record(UsageId::generate(), &eq, details).is_err());
    }
}
