//! Tag auto-attach (§4.5): resolves the `X-LLMLab-Tags` header into tag rows,
//! creating any that don't exist yet, ready to be linked to a usage log row.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{parse_tag_header, Result, Tag};
use crate::storage::TagRepository;

pub struct TagRegistry {
    repo: Arc<dyn TagRepository>,
}

impl TagRegistry {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    /// Parses the header and get-or-creates each name, returning the
    /// resolved tags in header order. An absent or empty header yields no
    /// tags — tagging is opt-in per request.
    pub async fn auto_attach(&self, tenant_id: Uuid, header_value: Option<&str>) -> Result<Vec<Tag>> {
        let names = match header_value {
            Some(v) => parse_tag_header(v),
            None => return Ok(Vec::new()),
        };

        let mut tags = Vec::with_capacity(names.len());
        for name in names {
            tags.push(self.repo.get_or_create(tenant_id, &name).await?);
        }
        Ok(tags)
    }

    pub async fn list(&self, tenant_id: Uuid) -> Result<Vec<Tag>> {
        self.repo.list_by_tenant(tenant_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::{DatabaseConfig, DatabasePool};
    use crate::storage::SqliteTagRepository;

    async fn registry() -> TagRegistry {
        let pool = DatabasePool::new(&DatabaseConfig::sqlite_memory()).await.unwrap();
        let repo = Arc::new(SqliteTagRepository::new(pool.sqlite().clone()));
        TagRegistry::new(repo)
    }

    #[tokio::test]
    async fn absent_header_yields_no_tags() {
        let registry = registry().await;
        let tags = registry.auto_attach(Uuid::new_v4(), None).await.unwrap();
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn header_auto_creates_tags() {
        let registry = registry().await;
        let tenant_id = Uuid::new_v4();
        let tags = registry.auto_attach(tenant_id, Some("prod, backend")).await.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "prod");
        assert_eq!(tags[1].name, "backend");
    }

    #[tokio::test]
    async fn repeated_header_reuses_existing_tag() {
        let registry = registry().await;
        let tenant_id = Uuid::new_v4();
        let first = registry.auto_attach(tenant_id, Some("prod")).await.unwrap();
        let second = registry.auto_attach(tenant_id, Some("prod")).await.unwrap();
        assert_eq!(first[0].id, second[0].id);
    }
}
