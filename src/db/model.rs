//! Row models returned by repository queries.

use crate::model::TagGroup;
use anyhow::{Context, Result};

/// `tag_groups` row with `tags` still JSON-encoded.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TagGroupRow {
    pub chat_id: i64,
    pub group_name: String,
    pub label: String,
    pub tags: String,
}

impl TagGroupRow {
    pub fn into_group(self) -> Result<TagGroup> {
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .with_context(|| format!("corrupt tags for group {}", self.group_name))?;
        Ok(TagGroup {
            chat_id: self.chat_id,
            name: self.group_name,
            label: self.label,
            tags,
        })
    }
}
