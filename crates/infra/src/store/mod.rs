//! Transactional record store.
//!
//! Every compound write (ledger row + balance + audit entry, cascades) goes
//! through [`InMemoryStore::transaction`] so that it commits or fails as a unit.

pub mod in_memory;

pub use in_memory::{InMemoryStore, Tables};
