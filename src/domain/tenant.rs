use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant is identified by an opaque id from an external identity provider
/// (§3). Created on first OAuth exchange; otherwise immortal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl Tenant {
    pub fn new(external_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            email: email.into(),
            display_name: None,
            avatar_url: None,
            created_at: Utc::now(),
            active: true,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tenant_is_active() {
        let t = Tenant::new("gh-123", "a@b.com");
        assert!(t.active);
        assert_eq!(t.external_id, "gh-123");
    }
}
