//! Resources module: equipment fleet, subcontractors and cost tracking.
//!
//! Pure domain logic only: no IO, no persistence concerns.

macro_rules! impl_entity {
    ($t:ty, $id:ty) => {
        impl buildtrack_core::Entity for $t {
            type Id = $id;

            fn id(&self) -> &Self::Id {
                &self.id
            }
        }
    };
}

pub(crate) use impl_entity;

pub mod cost;
pub mod equipment;
pub mod subcontractor;

pub use cost::{CostCenter, CostCenterId, CostItem, CostItemDetails, CostItemId};
pub use equipment::{
    Equipment, EquipmentDetails, EquipmentId, EquipmentStatus, EquipmentTransfer, EquipmentUsage,
    MaintenanceDetails, MaintenanceId, MaintenanceRecord, MaintenanceType, TransferDetails,
    TransferId, UsageDetails, UsageId,
};
pub use subcontractor::{
    Assignment, AssignmentDetails, AssignmentId, AssignmentStatus, Payment, PaymentDetails,
    PaymentId, PaymentType, Subcontractor, SubcontractorDetails, SubcontractorId,
    SubcontractorStatus,
};
