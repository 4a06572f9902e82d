//! Inventory domain module.
//!
//! Material catalog, the material stock aggregate and the immutable stock
//! ledger rows that drive it. Deterministic domain logic only (no IO, no
//! storage).

pub mod catalog;
pub mod material;
pub mod transaction;

pub use catalog::{
    CategoryId, MaterialCategory, MaterialSubcategory, SubcategoryId, UnitOfMeasure, Warehouse,
    WarehouseDetails, WarehouseId,
};
pub use material::{
    CreateMaterial, Material, MaterialCommand, MaterialCreated, MaterialDetails, MaterialEvent,
    MaterialId, MaterialUpdated, RecordMovement, ReverseMovement, StockAdjusted, StockStatus,
    UpdateMaterial,
};
pub use transaction::{NewStockTransaction, StockTransaction, StockTransactionId, TransactionType};
