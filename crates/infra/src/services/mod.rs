//! Application services over the in-memory store.
//!
//! Every mutating operation takes an explicit [`buildtrack_audit::AuditContext`]
//! and runs as one store transaction that includes its audit entries.

pub mod audit;
pub mod catalog;
pub mod ledger;
pub mod projects;
pub mod resources;

use std::collections::BTreeMap;
use std::sync::Arc;

use buildtrack_core::Event;

use crate::config::LedgerConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::store::InMemoryStore;

pub use audit::AuditTrail;
pub use catalog::{CatalogService, MaterialFilter, MaterialStats, NewMaterial, StockFilter};
pub use ledger::StockLedger;
pub use projects::ProjectService;
pub use resources::{CostCenterSummary, ResourceService};

/// Clone a row out of `table` or fail with `NotFound("<what> <key>")`.
pub(crate) fn fetch<K, V>(table: &BTreeMap<K, V>, key: K, what: &str) -> ServiceResult<V>
where
    K: Ord + core::fmt::Display,
    V: Clone,
{
    table
        .get(&key)
        .cloned()
        .ok_or_else(|| ServiceError::not_found(format!("{what} {key}")))
}

pub(crate) fn log_events<E: Event>(events: &[E]) {
    for event in events {
        tracing::debug!(
            event = event.event_type(),
            schema = event.version(),
            at = %event.occurred_at(),
            "domain event"
        );
    }
}

/// Every service, sharing one store.
#[derive(Debug, Clone)]
pub struct Services {
    pub audit: AuditTrail,
    pub catalog: CatalogService,
    pub ledger: StockLedger,
    pub projects: ProjectService,
    pub resources: ResourceService,
}

impl Services {
    pub fn new(store: Arc<InMemoryStore>, ledger: &LedgerConfig) -> Self {
        Self {
            audit: AuditTrail::new(store.clone()),
            catalog: CatalogService::new(store.clone(), ledger),
            ledger: StockLedger::new(store.clone()),
            projects: ProjectService::new(store.clone()),
            resources: ResourceService::new(store),
        }
    }
}
