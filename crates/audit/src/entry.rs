use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use buildtrack_core::{DomainError, UserId};

buildtrack_core::entity_id!(
    /// Audit log entry identifier.
    AuditEntryId
);

const MAX_REPR_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
    StatusChange,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::StatusChange => "STATUS_CHANGE",
        }
    }
}

impl core::str::FromStr for AuditAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            "LOGIN" => Ok(AuditAction::Login),
            "LOGOUT" => Ok(AuditAction::Logout),
            "STATUS_CHANGE" => Ok(AuditAction::StatusChange),
            other => Err(DomainError::validation(format!("unknown audit action '{other}'"))),
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a create/update/delete (or session) event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub actor: Option<UserId>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub entity_repr: String,
    pub changes: Option<JsonValue>,
    pub recorded_at: DateTime<Utc>,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl AuditLogEntry {
    /// Cap the stored representation at 200 characters.
    pub fn truncate_repr(repr: String) -> String {
        if repr.chars().count() <= MAX_REPR_LEN {
            repr
        } else {
            repr.chars().take(MAX_REPR_LEN).collect()
        }
    }
}

impl core::fmt::Display for AuditLogEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.actor {
            Some(actor) => write!(
                f,
                "{} on {} by {} at {}",
                self.action, self.entity_type, actor, self.recorded_at
            ),
            None => write!(
                f,
                "{} on {} by system at {}",
                self.action, self.entity_type, self.recorded_at
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_is_capped_at_200_chars() {
        let repr = AuditLogEntry::truncate_repr("é".repeat(250));
        assert_eq!(repr.chars().count(), MAX_REPR_LEN);
        assert_eq!(AuditLogEntry::truncate_repr("short".to_string()), "short");
    }

    #[test]
    fn action_codes_parse_back() {
        for action in [
            AuditAction::Create,
            AuditAction::Update,
            AuditAction::Delete,
            AuditAction::Login,
            AuditAction::Logout,
            AuditAction::StatusChange,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("PURGE".parse::<AuditAction>().is_err());
    }
}
