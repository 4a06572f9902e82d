//! Audit trail service.
//!
//! Entries produced by the other services are staged with [`stage`] inside
//! their own store transaction, so an entry exists if and only if the audited
//! write committed.

use std::sync::Arc;

use tracing::{debug, instrument};

use buildtrack_audit::{
    AuditAction, AuditContext, AuditLogEntry, AuditQuery, Auditable, UserSession, record_change,
};
use buildtrack_core::UserId;

use crate::error::ServiceResult;
use crate::store::{InMemoryStore, Tables};

/// Build the entry for a change and append it to the staged tables.
pub(crate) fn stage<T>(
    tables: &mut Tables,
    action: AuditAction,
    ctx: &AuditContext,
    before: Option<&T>,
    after: Option<&T>,
) -> ServiceResult<()>
where
    T: Auditable + ?Sized,
{
    match record_change(action, ctx, before, after)? {
        Some(entry) => {
            debug!(action = %entry.action, entity_type = %entry.entity_type, entity_id = %entry.entity_id, "audit entry staged");
            tables.append_audit(entry);
        }
        None => debug!(%action, "no field changed; audit entry skipped"),
    }
    Ok(())
}

pub(crate) fn created<T: Auditable + ?Sized>(tables: &mut Tables, ctx: &AuditContext, after: &T) -> ServiceResult<()> {
    stage(tables, AuditAction::Create, ctx, None, Some(after))
}

pub(crate) fn updated<T: Auditable + ?Sized>(
    tables: &mut Tables,
    ctx: &AuditContext,
    before: &T,
    after: &T,
) -> ServiceResult<()> {
    stage(tables, AuditAction::Update, ctx, Some(before), Some(after))
}

pub(crate) fn deleted<T: Auditable + ?Sized>(tables: &mut Tables, ctx: &AuditContext, before: &T) -> ServiceResult<()> {
    stage(tables, AuditAction::Delete, ctx, Some(before), None)
}

/// Read side of the audit log plus standalone (session) entries.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    store: Arc<InMemoryStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }

    /// Record a change outside any other unit of work.
    ///
    /// Returns `None` when an update changed nothing (no entry is written).
    #[instrument(skip_all, fields(action = %action), err)]
    pub fn record_change<T>(
        &self,
        action: AuditAction,
        ctx: &AuditContext,
        before: Option<&T>,
        after: Option<&T>,
    ) -> ServiceResult<Option<AuditLogEntry>>
    where
        T: Auditable + ?Sized,
    {
        self.store.transaction(|t| {
            let entry = record_change(action, ctx, before, after)?;
            if let Some(entry) = &entry {
                t.append_audit(entry.clone());
            }
            Ok(entry)
        })
    }

    pub fn record_login(&self, ctx: &AuditContext, session: &UserSession) -> ServiceResult<Option<AuditLogEntry>> {
        self.record_change(AuditAction::Login, ctx, None, Some(session))
    }

    pub fn record_logout(&self, ctx: &AuditContext, session: &UserSession) -> ServiceResult<Option<AuditLogEntry>> {
        self.record_change(AuditAction::Logout, ctx, None, Some(session))
    }

    /// Filtered, newest-first page of entries.
    pub fn query(&self, query: &AuditQuery) -> ServiceResult<Vec<AuditLogEntry>> {
        Ok(self.store.read_audit(|log| query.run(log))?)
    }

    /// Full history of one entity, newest first.
    pub fn for_entity(&self, entity: &dyn Auditable) -> ServiceResult<Vec<AuditLogEntry>> {
        let query = AuditQuery {
            limit: usize::MAX,
            ..AuditQuery::for_entity(entity.entity_type(), entity.entity_id())
        };
        self.query(&query)
    }

    pub fn by_actor(&self, actor: UserId) -> ServiceResult<Vec<AuditLogEntry>> {
        let query = AuditQuery {
            limit: usize::MAX,
            ..AuditQuery::by_actor(actor)
        };
        self.query(&query)
    }
}
