use buildtrack_core::UserId;

use crate::snapshot::{Auditable, FieldMap};

/// Audit subject for `LOGIN` / `LOGOUT` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: UserId,
    pub username: String,
}

impl UserSession {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

impl Auditable for UserSession {
    fn entity_type(&self) -> &'static str {
        "user"
    }

    fn entity_id(&self) -> String {
        self.user_id.to_string()
    }

    fn display(&self) -> String {
        self.username.clone()
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new().with("username", &self.username)
    }
}
