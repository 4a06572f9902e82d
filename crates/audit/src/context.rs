use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use buildtrack_core::UserId;

const MAX_USER_AGENT_LEN: usize = 500;

/// Request metadata captured with each audit entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    /// Build from raw header values.
    ///
    /// The client address is the first hop of `X-Forwarded-For` when present,
    /// otherwise the peer address. Unparseable addresses are dropped.
    pub fn from_headers(
        forwarded_for: Option<&str>,
        remote_addr: Option<&str>,
        user_agent: Option<&str>,
    ) -> Self {
        let ip_address = match forwarded_for.and_then(|v| v.split(',').next()) {
            Some(first) if !first.trim().is_empty() => first.trim().parse().ok(),
            _ => remote_addr.and_then(|v| v.trim().parse().ok()),
        };

        let user_agent = user_agent
            .filter(|ua| !ua.is_empty())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());

        Self {
            ip_address,
            user_agent,
        }
    }
}

/// Who performs a mutation, from where, and when.
///
/// Passed explicitly into every mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub actor: Option<UserId>,
    pub request: RequestMeta,
    pub occurred_at: DateTime<Utc>,
}

impl AuditContext {
    pub fn new(actor: UserId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            actor: Some(actor),
            request: RequestMeta::default(),
            occurred_at,
        }
    }

    /// Context for mutations not attributable to a user (imports, maintenance).
    pub fn system(occurred_at: DateTime<Utc>) -> Self {
        Self {
            actor: None,
            request: RequestMeta::default(),
            occurred_at,
        }
    }

    pub fn with_request(mut self, request: RequestMeta) -> Self {
        self.request = request;
        self
    }

    pub fn today(&self) -> chrono::NaiveDate {
        self.occurred_at.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_wins_over_remote_addr() {
        let meta = RequestMeta::from_headers(
            Some("203.0.113.9, 10.0.0.1"),
            Some("10.0.0.1"),
            Some("curl/8.0"),
        );
        assert_eq!(meta.ip_address, Some("203.0.113.9".parse().unwrap()));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn falls_back_to_remote_addr() {
        let meta = RequestMeta::from_headers(None, Some("192.168.1.20"), None);
        assert_eq!(meta.ip_address, Some("192.168.1.20".parse().unwrap()));
        assert_eq!(meta.user_agent, None);
    }

    #[test]
    fn garbage_address_is_dropped_and_agent_truncated() {
        let long_agent = "x".repeat(800);
        let meta = RequestMeta::from_headers(Some("unknown"), None, Some(&long_agent));
        assert_eq!(meta.ip_address, None);
        assert_eq!(meta.user_agent.unwrap().len(), MAX_USER_AGENT_LEN);
    }
}
