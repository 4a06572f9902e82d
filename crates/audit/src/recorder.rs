use buildtrack_core::{DomainError, DomainResult};

use crate::context::AuditContext;
use crate::entry::{AuditAction, AuditEntryId, AuditLogEntry};
use crate::snapshot::{AuditDiff, Auditable, diff_snapshots};

/// Build the audit entry for a change, or `None` when there is nothing to log.
///
/// - `Create`: diff lists every field of `after` as added.
/// - `Update` / `StatusChange`: diff lists changed fields only; an update that
///   changes nothing yields `None`.
/// - `Delete`, `Login`, `Logout`: always logged, without a diff.
///
/// The entity identity and representation come from `after` when present,
/// otherwise from `before`.
pub fn record_change<T>(
    action: AuditAction,
    ctx: &AuditContext,
    before: Option<&T>,
    after: Option<&T>,
) -> DomainResult<Option<AuditLogEntry>>
where
    T: Auditable + ?Sized,
{
    let subject = after
        .or(before)
        .ok_or_else(|| DomainError::validation("audit record needs an entity"))?;

    let diff = match action {
        AuditAction::Create => {
            let after = after
                .ok_or_else(|| DomainError::validation("create audit needs the new state"))?;
            Some(AuditDiff::Added(after.snapshot()))
        }
        AuditAction::Update | AuditAction::StatusChange => {
            let (Some(before), Some(after)) = (before, after) else {
                return Err(DomainError::validation(
                    "update audit needs both previous and new state",
                ));
            };
            match diff_snapshots(&before.snapshot(), &after.snapshot()) {
                Some(diff) => Some(diff),
                None => return Ok(None),
            }
        }
        AuditAction::Delete | AuditAction::Login | AuditAction::Logout => None,
    };

    Ok(Some(AuditLogEntry {
        id: AuditEntryId::generate(),
        actor: ctx.actor,
        action,
        entity_type: subject.entity_type().to_string(),
        entity_id: subject.entity_id(),
        entity_repr: AuditLogEntry::truncate_repr(subject.display()),
        changes: diff.map(|d| d.to_json()),
        recorded_at: ctx.occurred_at,
        ip_address: ctx.request.ip_address,
        user_agent: ctx.request.user_agent.clone(),
    }))
}
