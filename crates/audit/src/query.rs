use buildtrack_core::UserId;

use crate::entry::{AuditAction, AuditLogEntry};

/// Filter + offset pagination over audit entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor: Option<UserId>,
    pub action: Option<AuditAction>,
    /// Maximum rows returned.
    pub limit: usize,
    /// Number of rows skipped.
    pub offset: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            entity_type: None,
            entity_id: None,
            actor: None,
            action: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl AuditQuery {
    pub fn for_entity(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    pub fn by_actor(actor: UserId) -> Self {
        Self {
            actor: Some(actor),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.entity_type
            .as_deref()
            .is_none_or(|t| t == entry.entity_type)
            && self.entity_id.as_deref().is_none_or(|id| id == entry.entity_id)
            && self.actor.is_none_or(|a| entry.actor == Some(a))
            && self.action.is_none_or(|a| a == entry.action)
    }

    /// Apply the filter to entries and return them newest first, paginated.
    pub fn run<'a>(&self, entries: impl IntoIterator<Item = &'a AuditLogEntry>) -> Vec<AuditLogEntry> {
        let mut hits: Vec<&AuditLogEntry> = entries.into_iter().filter(|e| self.matches(e)).collect();
        hits.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        hits.into_iter()
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect()
    }
}
