use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildtrack_audit::{Auditable, FieldMap};
use buildtrack_core::{
    Aggregate, AggregateRoot, DomainError, Event, Quantity, require_max_len,
    require_non_negative, require_positive, require_text,
};

use crate::catalog::{CategoryId, SubcategoryId, UnitOfMeasure};
use crate::transaction::TransactionType;

buildtrack_core::entity_id!(
    /// Material identifier.
    MaterialId
);

/// Stock level relative to the reorder threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Out,
    Low,
    Normal,
}

/// Catalog fields of a material (everything except the ledger-owned balance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialDetails {
    pub code: String,
    pub name: String,
    pub category_id: CategoryId,
    pub subcategory_id: Option<SubcategoryId>,
    pub description: String,
    pub unit: UnitOfMeasure,
    pub unit_price: Decimal,
    pub minimum_stock: Decimal,
}

impl MaterialDetails {
    fn validate(&self) -> Result<MaterialDetails, DomainError> {
        let code = require_text("code", &self.code)?;
        require_max_len("code", &code, 50)?;
        let name = require_text("name", &self.name)?;
        require_max_len("name", &name, 200)?;
        require_positive("unit_price", self.unit_price)?;
        require_non_negative("minimum_stock", self.minimum_stock)?;
        Ok(MaterialDetails {
            code,
            name,
            ..self.clone()
        })
    }
}

/// Aggregate root: Material.
///
/// `current_stock` is a denormalized running balance; only stock movements
/// change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    id: MaterialId,
    details: MaterialDetails,
    current_stock: Decimal,
    version: u64,
    created: bool,
}

impl Material {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: MaterialId) -> Self {
        Self {
            id,
            details: MaterialDetails {
                code: String::new(),
                name: String::new(),
                category_id: CategoryId::generate(),
                subcategory_id: None,
                description: String::new(),
                unit: UnitOfMeasure::Unit,
                unit_price: Decimal::ZERO,
                minimum_stock: Decimal::ZERO,
            },
            current_stock: Decimal::ZERO,
            version: 0,
            created: false,
        }
    }

    /// Rebuild from a persisted row.
    pub fn rehydrate(id: MaterialId, details: MaterialDetails, current_stock: Decimal, version: u64) -> Self {
        Self {
            id,
            details,
            current_stock,
            version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> MaterialId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn details(&self) -> &MaterialDetails {
        &self.details
    }

    pub fn code(&self) -> &str {
        &self.details.code
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn category_id(&self) -> CategoryId {
        self.details.category_id
    }

    pub fn subcategory_id(&self) -> Option<SubcategoryId> {
        self.details.subcategory_id
    }

    pub fn unit(&self) -> UnitOfMeasure {
        self.details.unit
    }

    pub fn unit_price(&self) -> Decimal {
        self.details.unit_price
    }

    pub fn minimum_stock(&self) -> Decimal {
        self.details.minimum_stock
    }

    pub fn current_stock(&self) -> Decimal {
        self.current_stock
    }

    pub fn stock_status(&self) -> StockStatus {
        if self.current_stock.is_zero() {
            StockStatus::Out
        } else if self.current_stock <= self.details.minimum_stock {
            StockStatus::Low
        } else {
            StockStatus::Normal
        }
    }

    /// At or below the reorder threshold (includes out of stock).
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.details.minimum_stock
    }

    pub fn stock_value(&self) -> Decimal {
        self.current_stock * self.details.unit_price
    }
}

impl AggregateRoot for Material {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMaterial {
    pub material_id: MaterialId,
    pub details: MaterialDetails,
    /// Balance the material is catalogued with (e.g. migrated inventory).
    pub opening_stock: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateMaterial. Carries no stock field by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMaterial {
    pub material_id: MaterialId,
    pub details: MaterialDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement (ledger entry being created).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub material_id: MaterialId,
    pub kind: TransactionType,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReverseMovement (ledger entry being deleted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseMovement {
    pub material_id: MaterialId,
    pub kind: TransactionType,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialCommand {
    Create(CreateMaterial),
    Update(UpdateMaterial),
    RecordMovement(RecordMovement),
    ReverseMovement(ReverseMovement),
}

/// Event: MaterialCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCreated {
    pub material_id: MaterialId,
    pub details: MaterialDetails,
    pub opening_stock: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MaterialUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialUpdated {
    pub material_id: MaterialId,
    pub details: MaterialDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted. `delta` is signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub material_id: MaterialId,
    pub kind: TransactionType,
    pub delta: Decimal,
    pub reversal: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialEvent {
    Created(MaterialCreated),
    Updated(MaterialUpdated),
    StockAdjusted(StockAdjusted),
}

impl Event for MaterialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MaterialEvent::Created(_) => "inventory.material.created",
            MaterialEvent::Updated(_) => "inventory.material.updated",
            MaterialEvent::StockAdjusted(e) if e.reversal => "inventory.material.stock_reversed",
            MaterialEvent::StockAdjusted(_) => "inventory.material.stock_adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MaterialEvent::Created(e) => e.occurred_at,
            MaterialEvent::Updated(e) => e.occurred_at,
            MaterialEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Material {
    type Command = MaterialCommand;
    type Event = MaterialEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MaterialEvent::Created(e) => {
                self.id = e.material_id;
                self.details = e.details.clone();
                self.current_stock = e.opening_stock;
                self.created = true;
            }
            MaterialEvent::Updated(e) => {
                self.details = e.details.clone();
            }
            MaterialEvent::StockAdjusted(e) => {
                self.current_stock += e.delta;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MaterialCommand::Create(cmd) => self.handle_create(cmd),
            MaterialCommand::Update(cmd) => self.handle_update(cmd),
            MaterialCommand::RecordMovement(cmd) => self.handle_record(cmd),
            MaterialCommand::ReverseMovement(cmd) => self.handle_reverse(cmd),
        }
    }
}

impl Material {
    fn ensure_material_id(&self, material_id: MaterialId) -> Result<(), DomainError> {
        if self.id != material_id {
            return Err(DomainError::invariant("material_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self, material_id: MaterialId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_material_id(material_id)
    }

    fn handle_create(&self, cmd: &CreateMaterial) -> Result<Vec<MaterialEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("material already exists"));
        }
        let details = cmd.details.validate()?;
        require_non_negative("opening_stock", cmd.opening_stock)?;

        Ok(vec![MaterialEvent::Created(MaterialCreated {
            material_id: cmd.material_id,
            details,
            opening_stock: cmd.opening_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateMaterial) -> Result<Vec<MaterialEvent>, DomainError> {
        self.ensure_created(cmd.material_id)?;
        let details = cmd.details.validate()?;

        Ok(vec![MaterialEvent::Updated(MaterialUpdated {
            material_id: cmd.material_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<MaterialEvent>, DomainError> {
        self.ensure_created(cmd.material_id)?;

        let delta = cmd.kind.signed(cmd.quantity);
        self.ensure_covers(delta)?;

        Ok(vec![MaterialEvent::StockAdjusted(StockAdjusted {
            material_id: cmd.material_id,
            kind: cmd.kind,
            delta,
            reversal: false,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseMovement) -> Result<Vec<MaterialEvent>, DomainError> {
        self.ensure_created(cmd.material_id)?;

        let delta = -cmd.kind.signed(cmd.quantity);
        self.ensure_covers(delta)?;

        Ok(vec![MaterialEvent::StockAdjusted(StockAdjusted {
            material_id: cmd.material_id,
            kind: cmd.kind,
            delta,
            reversal: true,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// A negative delta may not exceed the current balance.
    fn ensure_covers(&self, delta: Decimal) -> Result<(), DomainError> {
        if delta.is_sign_negative() && -delta > self.current_stock {
            return Err(DomainError::insufficient_stock(self.current_stock, -delta));
        }
        Ok(())
    }
}

impl Auditable for Material {
    fn entity_type(&self) -> &'static str {
        "material"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{} - {}", self.details.code, self.details.name)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("code", &self.details.code)
            .with("name", &self.details.name)
            .with("category", self.details.category_id)
            .with("subcategory", self.details.subcategory_id)
            .with("description", &self.details.description)
            .with("unit", self.details.unit)
            .with("unit_price", self.details.unit_price)
            .with("minimum_stock", self.details.minimum_stock)
            .with("current_stock", self.current_stock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn details(code: &str) -> MaterialDetails {
        MaterialDetails {
            code: code.to_string(),
            name: "Portland cement".to_string(),
            category_id: CategoryId::generate(),
            subcategory_id: None,
            description: String::new(),
            unit: UnitOfMeasure::Bag,
            unit_price: dec!(9.75),
            minimum_stock: dec!(20),
        }
    }

    fn material_with_stock(opening: Decimal) -> Material {
        let id = MaterialId::generate();
        let mut m = Material::empty(id);
        m.execute(&MaterialCommand::Create(CreateMaterial {
            material_id: id,
            details: details("CEM-01"),
            opening_stock: opening,
            occurred_at: Utc::now(),
        }))
        .unwrap();
        m
    }

    fn record(m: &mut Material, kind: TransactionType, qty: Decimal) -> Result<Vec<MaterialEvent>, DomainError> {
        let cmd = MaterialCommand::RecordMovement(RecordMovement {
            material_id: m.id_typed(),
            kind,
            quantity: Quantity::new(qty).unwrap(),
            occurred_at: Utc::now(),
        });
        m.execute(&cmd)
    }

    #[test]
    fn cement_scenario() {
        let mut m = material_with_stock(dec!(100));

        record(&mut m, TransactionType::Delivery, dec!(50)).unwrap();
        assert_eq!(m.current_stock(), dec!(150));

        record(&mut m, TransactionType::Consumption, dec!(30)).unwrap();
        assert_eq!(m.current_stock(), dec!(120));

        let err = record(&mut m, TransactionType::Consumption, dec!(500)).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(dec!(120), dec!(500)));
        assert_eq!(m.current_stock(), dec!(120));
    }

    #[test]
    fn consuming_exact_balance_is_allowed() {
        let mut m = material_with_stock(dec!(12.5));
        record(&mut m, TransactionType::Consumption, dec!(12.5)).unwrap();
        assert_eq!(m.current_stock(), Decimal::ZERO);
        assert_eq!(m.stock_status(), StockStatus::Out);
    }

    #[test]
    fn amounts_storage_would_round_are_refused() {
        let id = MaterialId::generate();
        let mut m = Material::empty(id);
        let create = |opening: Decimal, price: Decimal| {
            MaterialCommand::Create(CreateMaterial {
                material_id: id,
                details: MaterialDetails {
                    unit_price: price,
                    ..details("CEM-02")
                },
                opening_stock: opening,
                occurred_at: Utc::now(),
            })
        };
        assert!(matches!(
            m.execute(&create(dec!(100.005), dec!(9.75))),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            m.execute(&create(dec!(100), dec!(9.755))),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(m.version(), 0);

        m.execute(&create(dec!(100), dec!(9.75))).unwrap();
        assert!(Quantity::new(dec!(0.005)).is_err());
        record(&mut m, TransactionType::Consumption, dec!(0.01)).unwrap();
        assert_eq!(m.current_stock(), dec!(99.99));
    }

    #[test]
    fn reversal_restores_previous_balance() {
        let mut m = material_with_stock(dec!(10));
        record(&mut m, TransactionType::Delivery, dec!(4)).unwrap();
        m.execute(&MaterialCommand::ReverseMovement(ReverseMovement {
            material_id: m.id_typed(),
            kind: TransactionType::Delivery,
            quantity: Quantity::new(dec!(4)).unwrap(),
            occurred_at: Utc::now(),
        }))
        .unwrap();
        assert_eq!(m.current_stock(), dec!(10));
    }

    #[test]
    fn reversing_consumed_delivery_is_insufficient_stock() {
        let mut m = material_with_stock(Decimal::ZERO);
        record(&mut m, TransactionType::Delivery, dec!(5)).unwrap();
        record(&mut m, TransactionType::Consumption, dec!(3)).unwrap();

        let err = m
            .execute(&MaterialCommand::ReverseMovement(ReverseMovement {
                material_id: m.id_typed(),
                kind: TransactionType::Delivery,
                quantity: Quantity::new(dec!(5)).unwrap(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        assert_eq!(m.current_stock(), dec!(2));
    }

    #[test]
    fn update_keeps_balance_and_validates_price() {
        let mut m = material_with_stock(dec!(40));
        let mut new_details = details("CEM-02");
        new_details.unit_price = Decimal::ZERO;
        let bad = MaterialCommand::Update(UpdateMaterial {
            material_id: m.id_typed(),
            details: new_details.clone(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(m.handle(&bad), Err(DomainError::Validation(_))));

        new_details.unit_price = dec!(11);
        m.execute(&MaterialCommand::Update(UpdateMaterial {
            material_id: m.id_typed(),
            details: new_details,
            occurred_at: Utc::now(),
        }))
        .unwrap();
        assert_eq!(m.code(), "CEM-02");
        assert_eq!(m.current_stock(), dec!(40));
        assert_eq!(m.version(), 2);
    }

    #[test]
    fn movement_on_missing_material_is_not_found() {
        let id = MaterialId::generate();
        let m = Material::empty(id);
        let cmd = MaterialCommand::RecordMovement(RecordMovement {
            material_id: id,
            kind: TransactionType::Delivery,
            quantity: Quantity::new(dec!(1)).unwrap(),
            occurred_at: Utc::now(),
        });
        assert_eq!(m.handle(&cmd).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn stock_status_thresholds() {
        let mut m = material_with_stock(dec!(20));
        assert_eq!(m.stock_status(), StockStatus::Low);
        record(&mut m, TransactionType::Delivery, dec!(0.01)).unwrap();
        assert_eq!(m.stock_status(), StockStatus::Normal);
        assert_eq!(m.stock_value(), dec!(20.01) * dec!(9.75));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after every accepted or rejected movement, the balance equals
        /// the opening stock plus the signed sum of accepted movements, and never
        /// goes negative.
        #[test]
        fn balance_equals_signed_sum_of_accepted_movements(
            opening in 0i64..500,
            moves in prop::collection::vec((any::<bool>(), 1i64..300), 1..40)
        ) {
            let mut m = material_with_stock(Decimal::from(opening));
            let mut expected = Decimal::from(opening);

            for (is_delivery, qty) in moves {
                let kind = if is_delivery { TransactionType::Delivery } else { TransactionType::Consumption };
                let qty = Decimal::from(qty);
                let before = m.current_stock();

                match record(&mut m, kind, qty) {
                    Ok(_) => expected += kind.signed(Quantity::new(qty).unwrap()),
                    Err(DomainError::InsufficientStock { .. }) => {
                        prop_assert_eq!(kind, TransactionType::Consumption);
                        prop_assert!(qty > before);
                        prop_assert_eq!(m.current_stock(), before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }

                prop_assert_eq!(m.current_stock(), expected);
                prop_assert!(m.current_stock() >= Decimal::ZERO);
            }
        }
    }
}
