//! Infrastructure and application-service error types.

use rust_decimal::Decimal;
use thiserror::Error;

use buildtrack_core::DomainError;

/// Storage-level failure (constraint violations, missing rows, backend errors).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key violated: {0}")]
    ForeignKeyViolation(String),

    #[error("row not found: {0}")]
    RowNotFound(String),

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("database error in {operation}: {message}")]
    Database { operation: String, message: String },
}

impl StoreError {
    pub(crate) fn database(operation: &str, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// Error returned by application services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient stock: only {available} available, {requested} requested")]
    InsufficientStock { available: Decimal, requested: Decimal },

    #[error("referential integrity: {0}")]
    ReferentialIntegrity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl ServiceError {
    pub(crate) fn not_found(what: impl core::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound => ServiceError::NotFound("entity".to_string()),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::InsufficientStock {
                available,
                requested,
            } => ServiceError::InsufficientStock {
                available,
                requested,
            },
            DomainError::ReferentialIntegrity(msg) => ServiceError::ReferentialIntegrity(msg),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn insufficient_stock_keeps_both_amounts() {
        let err: ServiceError = DomainError::insufficient_stock(dec!(120), dec!(500)).into();
        assert_eq!(
            err,
            ServiceError::InsufficientStock {
                available: dec!(120),
                requested: dec!(500)
            }
        );
        assert_eq!(err.to_string(), "insufficient stock: only 120 available, 500 requested");
    }

    #[test]
    fn store_errors_surface_as_persistence() {
        let err: ServiceError = StoreError::UniqueViolation("materials.code".to_string()).into();
        assert!(matches!(err, ServiceError::Persistence(StoreError::UniqueViolation(_))));
    }
}
