//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Business-rule failures raised by pure domain code. Storage failures live in
/// the infra crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A state transition the aggregate does not allow.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Command addressed to an aggregate that does not exist yet.
    #[error("not found")]
    NotFound,

    /// Duplicate code or stale version.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A consumption (or a reversal) would take a stock balance below zero.
    #[error("insufficient stock: only {available} available, {requested} requested")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
    },

    /// A delete was blocked because other records still reference the target.
    #[error("referential integrity: {0}")]
    ReferentialIntegrity(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_stock(available: Decimal, requested: Decimal) -> Self {
        Self::InsufficientStock {
            available,
            requested,
        }
    }

    pub fn referential(msg: impl Into<String>) -> Self {
        Self::ReferentialIntegrity(msg.into())
    }
}

/// Reject blank strings; returns the trimmed value.
pub fn require_text(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Reject strings longer than `max` characters.
pub fn require_max_len(field: &str, value: &str, max: usize) -> DomainResult<()> {
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} cannot exceed {max} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn insufficient_stock_message_names_both_amounts() {
        let err = DomainError::insufficient_stock(dec!(120), dec!(500));
        assert_eq!(
            err.to_string(),
            "insufficient stock: only 120 available, 500 requested"
        );
    }

    #[test]
    fn require_text_trims_and_rejects_blank() {
        assert_eq!(require_text("name", "  Cement ").unwrap(), "Cement");
        assert!(matches!(
            require_text("name", "   "),
            Err(DomainError::Validation(msg)) if msg == "name cannot be empty"
        ));
    }

    #[test]
    fn require_max_len_counts_chars() {
        assert!(require_max_len("code", "ÄÖÜ", 3).is_ok());
        assert!(require_max_len("code", "ABCD", 3).is_err());
    }
}
