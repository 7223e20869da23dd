use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TAG_COLOR: &str = "#6366f1";

/// A tenant-scoped named tag (§3, §4.5). `(tenant_id, name)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(tenant_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            color: DEFAULT_TAG_COLOR.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

/// Parses the `X-LLMLab-Tags` header value into trimmed, non-empty, deduped
/// names, per §4.5 / scenario 4 in §8.
pub fn parse_tag_header(value: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}

/// Validates a `#rrggbb` color string (§7: malformed color format is a
/// ValidationError).
pub fn is_valid_color(s: &str) -> bool {
    s.len() == 7
        && s.starts_with('#')
        && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}
