//! Domain building blocks shared by every buildtrack crate.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod event;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, require_max_len, require_text};
pub use event::Event;
pub use id::{AggregateId, UserId};
pub use value_object::{
    Percent, Quantity, ValueObject, require_date_order, require_non_negative, require_positive,
};

pub use rust_decimal::Decimal;
pub use uuid;
