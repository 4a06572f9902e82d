//! Stock ledger entries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildtrack_audit::{Auditable, FieldMap};
use buildtrack_core::{
    DomainError, DomainResult, Entity, Quantity, UserId, require_max_len, require_positive,
};
use buildtrack_projects::ProjectId;

use crate::catalog::WarehouseId;
use crate::material::MaterialId;

buildtrack_core::entity_id!(
    /// Stock transaction identifier.
    StockTransactionId
);

/// Direction of a stock movement. Quantities are always positive; the type
/// carries the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Delivery,
    Consumption,
}

impl TransactionType {
    pub fn label(self) -> &'static str {
        match self {
            TransactionType::Delivery => "Delivery",
            TransactionType::Consumption => "Consumption",
        }
    }

    /// Stored code (`DELIVERY` / `CONSUMPTION`).
    pub fn code(self) -> &'static str {
        match self {
            TransactionType::Delivery => "DELIVERY",
            TransactionType::Consumption => "CONSUMPTION",
        }
    }

    /// Effect on the material balance when the movement is recorded.
    pub fn signed(self, quantity: Quantity) -> Decimal {
        match self {
            TransactionType::Delivery => quantity.value(),
            TransactionType::Consumption => -quantity.value(),
        }
    }
}

impl core::str::FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DELIVERY" => Ok(TransactionType::Delivery),
            "CONSUMPTION" => Ok(TransactionType::Consumption),
            other => Err(DomainError::validation(format!("unknown transaction type '{other}'"))),
        }
    }
}

/// Input for recording a stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStockTransaction {
    pub material_id: MaterialId,
    pub kind: TransactionType,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub date: NaiveDate,
    pub project_id: Option<ProjectId>,
    pub warehouse_id: Option<WarehouseId>,
    pub supplier: Option<String>,
    pub invoice_number: Option<String>,
    pub notes: String,
}

/// Immutable ledger row. Never updated; deleting it reverses its effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: StockTransactionId,
    pub material_id: MaterialId,
    pub kind: TransactionType,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub date: NaiveDate,
    pub project_id: Option<ProjectId>,
    pub warehouse_id: Option<WarehouseId>,
    pub supplier: Option<String>,
    pub invoice_number: Option<String>,
    pub notes: String,
    pub recorded_by: Option<UserId>,
    pub recorded_at: DateTime<Utc>,
}

fn optional_text(field: &str, value: Option<String>, max: usize) -> DomainResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => {
            require_max_len(field, &v, max)?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

impl StockTransaction {
    pub fn record(
        id: StockTransactionId,
        draft: NewStockTransaction,
        recorded_by: Option<UserId>,
        recorded_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        require_positive("unit_price", draft.unit_price)?;
        let supplier = optional_text("supplier", draft.supplier, 200)?;
        let invoice_number = optional_text("invoice_number", draft.invoice_number, 100)?;

        Ok(Self {
            id,
            material_id: draft.material_id,
            kind: draft.kind,
            quantity: draft.quantity,
            unit_price: draft.unit_price,
            date: draft.date,
            project_id: draft.project_id,
            warehouse_id: draft.warehouse_id,
            supplier,
            invoice_number,
            notes: draft.notes,
            recorded_by,
            recorded_at,
        })
    }

    pub fn total_price(&self) -> Decimal {
        self.quantity.value() * self.unit_price
    }

    /// Effect this row has on the material balance.
    pub fn signed_quantity(&self) -> Decimal {
        self.kind.signed(self.quantity)
    }
}

impl Entity for StockTransaction {
    type Id = StockTransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Auditable for StockTransaction {
    fn entity_type(&self) -> &'static str {
        "materialtransaction"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{} - {} ({})", self.kind.label(), self.material_id, self.quantity)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("material", self.material_id)
            .with("transaction_type", self.kind)
            .with("quantity", self.quantity)
            .with("unit_price", self.unit_price)
            .with("date", self.date)
            .with("project", self.project_id)
            .with("warehouse", self.warehouse_id)
            .with("supplier", &self.supplier)
            .with("invoice_number", &self.invoice_number)
            .with("notes", &self.notes)
            .with("recorded_by", self.recorded_by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft() -> NewStockTransaction {
        NewStockTransaction {
            material_id: MaterialId::generate(),
            kind: TransactionType::Delivery,
            quantity: Quantity::new(dec!(12.5)).unwrap(),
            unit_price: dec!(8.40),
            date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            project_id: None,
            warehouse_id: None,
            supplier: Some("  ".to_string()),
            invoice_number: Some(" INV-204 ".to_string()),
            notes: String::new(),
        }
    }

    #[test]
    fn blank_optional_text_becomes_none() {
        let txn = StockTransaction::record(StockTransactionId::generate(), draft(), None, Utc::now()).unwrap();
        assert_eq!(txn.supplier, None);
        assert_eq!(txn.invoice_number.as_deref(), Some("INV-204"));
    }

    #[test]
    fn total_price_is_quantity_times_unit_price() {
        let txn = StockTransaction::record(StockTransactionId::generate(), draft(), None, Utc::now()).unwrap();
        assert_eq!(txn.total_price(), dec!(105.000));
        assert_eq!(txn.signed_quantity(), dec!(12.5));
    }

    #[test]
    fn unit_price_must_be_positive() {
        let mut d = draft();
        d.unit_price = Decimal::ZERO;
        assert!(StockTransaction::record(StockTransactionId::generate(), d, None, Utc::now()).is_err());
    }

    #[test]
    fn consumption_is_negative() {
        let q = Quantity::new(dec!(30)).unwrap();
        assert_eq!(TransactionType::Consumption.signed(q), dec!(-30));
    }
}
