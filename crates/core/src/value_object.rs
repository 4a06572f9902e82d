//! Value objects: equality by value, not identity.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two quantities of
/// `12.5` are the same quantity. To "modify" one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Decimal places kept for stored quantities and money (`NUMERIC(_, 2)`).
pub const DECIMAL_PLACES: u32 = 2;

/// Reject values that storage would round.
fn require_scale(field: &str, value: Decimal) -> DomainResult<()> {
    if value.normalize().scale() > DECIMAL_PLACES {
        return Err(DomainError::validation(format!(
            "{field} cannot have more than {DECIMAL_PLACES} decimal places"
        )));
    }
    Ok(())
}

/// A positive amount with at most two decimal places (stock quantities,
/// ledger movements). The smallest quantity is `0.01`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        require_scale("quantity", value)?;
        Ok(Self(value))
    }

    pub fn value(self) -> Decimal {
        self.0
    }
}

impl ValueObject for Quantity {}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Whole-number percentage in `0..=100` (task and project progress).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percent(u8);

impl Percent {
    pub const ZERO: Percent = Percent(0);
    pub const COMPLETE: Percent = Percent(100);

    pub fn new(value: u8) -> DomainResult<Self> {
        if value > 100 {
            return Err(DomainError::validation("progress must be between 0 and 100"));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl ValueObject for Percent {}

impl TryFrom<u8> for Percent {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percent> for u8 {
    fn from(value: Percent) -> Self {
        value.0
    }
}

pub fn require_positive(field: &str, value: Decimal) -> DomainResult<Decimal> {
    if value <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{field} must be greater than zero"
        )));
    }
    require_scale(field, value)?;
    Ok(value)
}

pub fn require_non_negative(field: &str, value: Decimal) -> DomainResult<Decimal> {
    if value < Decimal::ZERO {
        return Err(DomainError::validation(format!("{field} cannot be negative")));
    }
    require_scale(field, value)?;
    Ok(value)
}

/// `start` must not be later than `end`.
pub fn require_date_order(
    start_field: &str,
    start: NaiveDate,
    end_field: &str,
    end: NaiveDate,
) -> DomainResult<()> {
    if start > end {
        return Err(DomainError::validation(format!(
            "{start_field} cannot be later than {end_field}"
        )));
    }
    Ok(())
}
